//! Daemon wiring and lifecycle.
//!
//! # Lifecycle
//!
//! 1. Create the master `CancellationToken`
//! 2. Build protocol + extractor over one shared HTTP client
//! 3. Build the embedded broker and indices
//! 4. Seed initial hashes
//! 5. Spawn the three worker pools into a `JoinSet`
//! 6. Run until ctrl-c or a worker crash
//! 7. Graceful shutdown: cancel, drain with a bounded grace period
//!
//! In-flight deliveries are never acknowledged during shutdown; a durable
//! broker would redeliver them on restart.

use std::{sync::Arc, time::Duration};

use tokio::{signal, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use trawl_core::{Config, ProtocolKind, ReferencedResource, Resource};

use crate::{
  crawl::Crawler,
  extractor::{Extractor, TikaExtractor},
  index::{Indexes, MemoryIndex},
  protocol::{IpfsClient, Protocol},
  queue::{MemoryBroker, Queue, QueueError, Queues},
  worker,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
  #[error(transparent)]
  Queue(#[from] QueueError),
  #[error("failed to build http client: {0}")]
  Http(#[from] reqwest::Error),
  #[error("invalid seed: {0:?}")]
  InvalidSeed(String),
}

/// The crawler process: adapters, queues, indices and worker pools under
/// one supervision root.
pub struct Daemon {
  config: Config,
}

impl Daemon {
  pub fn new(config: Config) -> Self {
    Self { config }
  }

  /// Run until ctrl-c. `seeds` are content IDs published to the hashes
  /// queue before the pools start.
  pub async fn run(&self, seeds: Vec<String>) -> Result<(), DaemonError> {
    let cancel = CancellationToken::new();

    let client = reqwest::Client::builder()
      .connect_timeout(Duration::from_secs(10))
      .build()?;

    let protocol: Arc<dyn Protocol> = Arc::new(IpfsClient::new(
      &self.config.ipfs,
      self.config.crawler.stat_timeout(),
      client.clone(),
    ));
    let extractor: Arc<dyn Extractor> = Arc::new(TikaExtractor::new(
      self.config.extractor.clone(),
      client,
      protocol.clone(),
    ));

    let broker = MemoryBroker::new();
    let queues = Queues {
      files: broker.queue(&self.config.queues.files),
      directories: broker.queue(&self.config.queues.directories),
      hashes: broker.queue(&self.config.queues.hashes),
    };

    let indexes = Indexes {
      files: Arc::new(MemoryIndex::new(&self.config.indexes.files)),
      directories: Arc::new(MemoryIndex::new(&self.config.indexes.directories)),
      invalids: Arc::new(MemoryIndex::new(&self.config.indexes.invalids)),
    };

    let crawler = Arc::new(Crawler::new(
      self.config.crawler.clone(),
      indexes,
      queues.clone(),
      protocol,
      extractor,
    ));

    for seed in seeds {
      let resource = Resource::new(ProtocolKind::Ipfs, seed);
      if !resource.is_valid() {
        return Err(DaemonError::InvalidSeed(resource.id));
      }
      info!(id = %resource.id, "seeding");
      queues.hashes.publish(&ReferencedResource::new(resource)).await?;
    }

    let workers = &self.config.workers;
    let mut tasks = JoinSet::new();
    worker::spawn_pool(
      &mut tasks,
      queues.hashes.clone(),
      crawler.clone(),
      workers.hash_workers,
      cancel.clone(),
    )
    .await?;
    worker::spawn_pool(
      &mut tasks,
      queues.files.clone(),
      crawler.clone(),
      workers.file_workers,
      cancel.clone(),
    )
    .await?;
    worker::spawn_pool(
      &mut tasks,
      queues.directories.clone(),
      crawler.clone(),
      workers.directory_workers,
      cancel.clone(),
    )
    .await?;

    info!(
      hash_workers = workers.hash_workers,
      file_workers = workers.file_workers,
      directory_workers = workers.directory_workers,
      "crawler running"
    );

    tokio::select! {
      _ = signal::ctrl_c() => {
        info!("shutdown signal received");
      }
      Some(result) = tasks.join_next() => {
        // Workers only return on cancellation; an early exit is a crashed
        // worker and the invariant violation must not be swallowed.
        cancel.cancel();
        match result {
          Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
          _ => error!("worker exited unexpectedly"),
        }
      }
    }

    cancel.cancel();
    let drain = async {
      while tasks.join_next().await.is_some() {}
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
      warn!("workers did not drain in time, abandoning");
    }

    info!("shutdown complete");
    Ok(())
  }
}
