//! Worker pools: queue consumption, crawl dispatch and acknowledgment.
//!
//! Per logical queue a pool of workers shares one consume channel. Each
//! worker processes deliveries sequentially; pools run fully in parallel
//! with no ordering guarantees across resources. The crawl graph is
//! explored breadth-first via queue hops, so none are needed.
//!
//! This is the only place where error classification becomes an ack/reject
//! decision: success → ack, temporary → reject-with-requeue, permanent →
//! reject-without-requeue. Cancellation exits promptly without acking
//! in-flight deliveries, so they are redelivered later.

use std::sync::Arc;

use tokio::{
  sync::{Mutex, mpsc},
  task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use trawl_core::ReferencedResource;

use crate::{
  crawl::{CrawlError, Crawler},
  queue::{Delivery, Queue, QueueError},
};

/// Open the queue's consume channel and spawn `count` workers over it.
pub async fn spawn_pool(
  tasks: &mut JoinSet<()>,
  queue: Arc<dyn Queue>,
  crawler: Arc<Crawler>,
  count: usize,
  cancel: CancellationToken,
) -> Result<(), QueueError> {
  let deliveries = Arc::new(Mutex::new(queue.consume().await?));
  let name = queue.name().to_string();

  for worker_id in 0..count {
    tasks.spawn(worker_loop(
      name.clone(),
      worker_id,
      deliveries.clone(),
      crawler.clone(),
      cancel.clone(),
    ));
  }

  debug!(queue = %name, workers = count, "worker pool started");
  Ok(())
}

async fn worker_loop(
  queue: String,
  worker_id: usize,
  deliveries: Arc<Mutex<mpsc::Receiver<Delivery>>>,
  crawler: Arc<Crawler>,
  cancel: CancellationToken,
) {
  trace!(queue = %queue, worker_id, "worker starting");

  loop {
    // Hold the receiver lock only while waiting for the next delivery.
    let delivery = {
      let mut rx = deliveries.lock().await;
      tokio::select! {
        biased;
        _ = cancel.cancelled() => {
          trace!(queue = %queue, worker_id, "worker cancelled");
          return;
        }
        delivery = rx.recv() => delivery,
      }
    };

    let Some(delivery) = delivery else {
      if cancel.is_cancelled() {
        return;
      }
      // The consume channel is gone while we are still supposed to be
      // running: the process must not keep operating against a severed
      // queue connection.
      panic!("delivery channel closed unexpectedly");
    };

    process_delivery(&queue, worker_id, delivery, &crawler).await;
  }
}

async fn process_delivery(queue: &str, worker_id: usize, delivery: Delivery, crawler: &Crawler) {
  match crawl_delivery(&delivery, crawler).await {
    Ok(id) => {
      debug!(queue, worker_id, id = %id, "done crawling");
      if let Err(e) = delivery.ack().await {
        warn!(queue, worker_id, error = %e, "ack failed");
      }
    }
    Err(e) => {
      let requeue = e.is_temporary();
      if requeue {
        debug!(queue, worker_id, error = %e, "temporary failure, requeueing");
      } else {
        warn!(queue, worker_id, error = %e, "permanent failure, dropping delivery");
      }

      if let Err(reject_err) = delivery.reject(requeue).await {
        warn!(queue, worker_id, error = %reject_err, "reject failed");
      }
    }
  }
}

/// Decode and crawl one delivery. Malformed payloads are permanent: the
/// bytes will not deserialize any better on redelivery.
async fn crawl_delivery(delivery: &Delivery, crawler: &Crawler) -> Result<String, CrawlError> {
  let mut r: ReferencedResource =
    serde_json::from_slice(&delivery.body).map_err(|e| CrawlError::InvalidResource(e.to_string()))?;

  if !r.is_valid() {
    return Err(CrawlError::InvalidResource(r.to_string()));
  }

  crawler.crawl(&mut r).await?;
  Ok(r.resource.id)
}
