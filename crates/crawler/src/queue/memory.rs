//! In-process broker over tokio channels.
//!
//! Mirrors the acknowledgment contract of a durable broker channel:
//! deliveries stay outstanding until acked or rejected, reject-with-requeue
//! puts the message back for redelivery, reject-without-requeue drops it.
//! Queues are unbounded on the publish side (the broker buffers backlog);
//! the consumer channel is bounded, so workers provide natural
//! backpressure.

use std::sync::{
  Arc,
  atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use trawl_core::ReferencedResource;

use super::{Acker, Delivery, Queue, QueueError};

/// Outstanding deliveries handed to the consumer channel ahead of demand.
const CONSUMER_PREFETCH: usize = 16;

/// Point-in-time counters for one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
  pub published: u64,
  pub acked: u64,
  pub requeued: u64,
  pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
  published: AtomicU64,
  acked: AtomicU64,
  requeued: AtomicU64,
  dropped: AtomicU64,
}

impl Counters {
  fn snapshot(&self) -> QueueStats {
    QueueStats {
      published: self.published.load(Ordering::Relaxed),
      acked: self.acked.load(Ordering::Relaxed),
      requeued: self.requeued.load(Ordering::Relaxed),
      dropped: self.dropped.load(Ordering::Relaxed),
    }
  }
}

/// Named queues created on first use.
#[derive(Default)]
pub struct MemoryBroker {
  queues: DashMap<String, Arc<MemoryQueue>>,
}

impl MemoryBroker {
  pub fn new() -> Self {
    Self::default()
  }

  /// Get or create a queue.
  pub fn queue(&self, name: &str) -> Arc<MemoryQueue> {
    let entry = self
      .queues
      .entry(name.to_string())
      .or_insert_with(|| Arc::new(MemoryQueue::new(name)));

    Arc::clone(entry.value())
  }
}

pub struct MemoryQueue {
  name: String,
  tx: mpsc::UnboundedSender<Vec<u8>>,
  rx: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
  counters: Arc<Counters>,
  closed: CancellationToken,
}

impl MemoryQueue {
  pub fn new(name: impl Into<String>) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    Self {
      name: name.into(),
      tx,
      rx: Mutex::new(Some(rx)),
      counters: Arc::new(Counters::default()),
      closed: CancellationToken::new(),
    }
  }

  /// End the consumer channel while publishers remain, the way a severed
  /// broker connection would.
  pub fn close(&self) {
    self.closed.cancel();
  }

  /// Enqueue an already-serialized payload. Also the test hook for
  /// injecting malformed bodies.
  pub fn publish_raw(&self, body: Vec<u8>) -> Result<(), QueueError> {
    self.tx.send(body).map_err(|_| QueueError::Closed)?;
    self.counters.published.fetch_add(1, Ordering::Relaxed);
    Ok(())
  }

  pub fn stats(&self) -> QueueStats {
    self.counters.snapshot()
  }
}

#[async_trait]
impl Queue for MemoryQueue {
  fn name(&self) -> &str {
    &self.name
  }

  async fn publish(&self, resource: &ReferencedResource) -> Result<(), QueueError> {
    self.publish_raw(serde_json::to_vec(resource)?)
  }

  async fn consume(&self) -> Result<mpsc::Receiver<Delivery>, QueueError> {
    let Some(mut raw_rx) = self.rx.lock().await.take() else {
      return Err(QueueError::Backend(format!("queue {} already has a consumer", self.name)));
    };

    let (delivery_tx, delivery_rx) = mpsc::channel(CONSUMER_PREFETCH);
    let requeue_tx = self.tx.clone();
    let counters = self.counters.clone();
    let closed = self.closed.clone();

    tokio::spawn(async move {
      loop {
        let body = tokio::select! {
          biased;
          _ = closed.cancelled() => break,
          body = raw_rx.recv() => body,
        };

        let Some(body) = body else { break };

        let acker = MemoryAcker {
          body: body.clone(),
          requeue_tx: requeue_tx.clone(),
          counters: counters.clone(),
        };

        if delivery_tx.send(Delivery::new(body, Box::new(acker))).await.is_err() {
          // Consumer hung up; stop delivering.
          break;
        }
      }
    });

    Ok(delivery_rx)
  }
}

struct MemoryAcker {
  body: Vec<u8>,
  requeue_tx: mpsc::UnboundedSender<Vec<u8>>,
  counters: Arc<Counters>,
}

#[async_trait]
impl Acker for MemoryAcker {
  async fn ack(self: Box<Self>) -> Result<(), QueueError> {
    self.counters.acked.fetch_add(1, Ordering::Relaxed);
    Ok(())
  }

  async fn reject(self: Box<Self>, requeue: bool) -> Result<(), QueueError> {
    if requeue {
      self.counters.requeued.fetch_add(1, Ordering::Relaxed);
      self.requeue_tx.send(self.body).map_err(|_| QueueError::Closed)?;
    } else {
      self.counters.dropped.fetch_add(1, Ordering::Relaxed);
    }

    Ok(())
  }
}
