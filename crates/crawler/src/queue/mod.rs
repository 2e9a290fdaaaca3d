//! Queue abstraction: publish/consume with acknowledgable deliveries.
//!
//! Three logical queues (hashes, files, directories) feed the worker
//! pools. A consumed [`Delivery`] stays outstanding until it is acked
//! (done, remove from queue) or rejected: with requeue for another
//! attempt, without requeue to drop/dead-letter it.
//!
//! The broker transport is out of scope; [`MemoryBroker`] is the
//! in-process implementation used by the embedded runner and tests.

mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use trawl_core::ReferencedResource;

pub use self::memory::{MemoryBroker, MemoryQueue, QueueStats};

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
  /// The payload could not be serialized. Permanent: redelivery cannot fix it.
  #[error("failed to serialize message: {0}")]
  Serialize(#[from] serde_json::Error),
  /// The queue or its consumer channel is gone.
  #[error("queue closed")]
  Closed,
  #[error("queue backend error: {0}")]
  Backend(String),
}

impl QueueError {
  pub fn is_temporary(&self) -> bool {
    !matches!(self, QueueError::Serialize(_))
  }
}

#[async_trait]
pub trait Queue: Send + Sync {
  fn name(&self) -> &str;

  /// Serialize and enqueue one unit of work.
  async fn publish(&self, resource: &ReferencedResource) -> Result<(), QueueError>;

  /// Open the consumer channel for this queue. Workers share the returned
  /// receiver; deliveries stay outstanding until acked or rejected.
  async fn consume(&self) -> Result<mpsc::Receiver<Delivery>, QueueError>;
}

/// One consumed message plus its acknowledgment handle.
pub struct Delivery {
  pub body: Vec<u8>,
  acker: Box<dyn Acker>,
}

impl Delivery {
  pub fn new(body: Vec<u8>, acker: Box<dyn Acker>) -> Self {
    Self { body, acker }
  }

  /// The message is done; remove it from the queue.
  pub async fn ack(self) -> Result<(), QueueError> {
    self.acker.ack().await
  }

  /// The message failed. With `requeue` it becomes eligible for redelivery;
  /// without, the broker drops or dead-letters it.
  pub async fn reject(self, requeue: bool) -> Result<(), QueueError> {
    self.acker.reject(requeue).await
  }
}

impl std::fmt::Debug for Delivery {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Delivery")
      .field("body", &String::from_utf8_lossy(&self.body))
      .finish_non_exhaustive()
  }
}

/// Backend-specific acknowledgment of a single delivery.
#[async_trait]
pub trait Acker: Send + Sync {
  async fn ack(self: Box<Self>) -> Result<(), QueueError>;
  async fn reject(self: Box<Self>, requeue: bool) -> Result<(), QueueError>;
}

/// The three logical queues.
#[derive(Clone)]
pub struct Queues {
  pub files: Arc<dyn Queue>,
  pub directories: Arc<dyn Queue>,
  pub hashes: Arc<dyn Queue>,
}
