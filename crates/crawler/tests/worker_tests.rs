//! Worker pool integration tests: acknowledgment semantics, retry
//! classification, malformed payloads, cancellation and the fatal
//! closed-channel condition.

mod common;

use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use trawl::{queue::Queue, worker::spawn_pool};
use trawl_core::ResourceType;

use common::{FakeExtractor, FakeProtocol, StatScript, harness, seed, wait_until};

const DEADLINE: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_successful_crawl_is_acked() {
  let protocol = FakeProtocol::new().with_stat("QmFile", StatScript::Ok(ResourceType::File, 42));
  let h = harness(protocol, FakeExtractor::new());

  h.hashes_queue.publish(&seed("QmFile")).await.unwrap();

  let cancel = CancellationToken::new();
  let mut tasks = JoinSet::new();
  spawn_pool(&mut tasks, h.hashes_queue.clone(), h.crawler.clone(), 2, cancel.clone())
    .await
    .unwrap();

  assert!(wait_until(DEADLINE, || h.hashes_queue.stats().acked == 1).await);
  assert!(h.files.contains("QmFile"));

  cancel.cancel();
  assert!(
    tokio::time::timeout(DEADLINE, async {
      while tasks.join_next().await.is_some() {}
    })
    .await
    .is_ok(),
    "workers should exit promptly on cancellation"
  );
}

#[tokio::test]
async fn test_temporary_failure_is_requeued() {
  // Unscripted stat times out: a temporary failure on every attempt.
  let h = harness(FakeProtocol::new(), FakeExtractor::new());

  h.hashes_queue.publish(&seed("QmSlow")).await.unwrap();

  let cancel = CancellationToken::new();
  let mut tasks = JoinSet::new();
  spawn_pool(&mut tasks, h.hashes_queue.clone(), h.crawler.clone(), 1, cancel.clone())
    .await
    .unwrap();

  // The message keeps coming back; it is never acked and never dropped.
  assert!(wait_until(DEADLINE, || h.hashes_queue.stats().requeued >= 2).await);
  assert_eq!(h.hashes_queue.stats().acked, 0);
  assert_eq!(h.hashes_queue.stats().dropped, 0);

  cancel.cancel();
  while tasks.join_next().await.is_some() {}
}

#[tokio::test]
async fn test_permanent_failure_is_dropped() {
  let protocol = FakeProtocol::new().with_stat("QmGone", StatScript::NotFound);
  let h = harness(protocol, FakeExtractor::new());

  h.hashes_queue.publish(&seed("QmGone")).await.unwrap();

  let cancel = CancellationToken::new();
  let mut tasks = JoinSet::new();
  spawn_pool(&mut tasks, h.hashes_queue.clone(), h.crawler.clone(), 1, cancel.clone())
    .await
    .unwrap();

  // Not-found is recorded invalid and the delivery rejected without
  // requeue.
  assert!(wait_until(DEADLINE, || h.hashes_queue.stats().dropped == 1).await);
  assert!(h.invalids.contains("QmGone"));
  assert_eq!(h.hashes_queue.stats().acked, 0);
  assert_eq!(h.hashes_queue.stats().requeued, 0);

  // A payload that cannot decode is also rejected without requeue.
  h.hashes_queue.publish_raw(b"not json".to_vec()).unwrap();
  assert!(wait_until(DEADLINE, || h.hashes_queue.stats().dropped == 2).await);

  // So is a structurally valid but empty resource.
  h.hashes_queue
    .publish_raw(br#"{"resource":{"protocol":"ipfs","id":""}}"#.to_vec())
    .unwrap();
  assert!(wait_until(DEADLINE, || h.hashes_queue.stats().dropped == 3).await);

  cancel.cancel();
  while tasks.join_next().await.is_some() {}
}

#[tokio::test]
async fn test_directory_children_drain_through_the_pool() {
  let protocol = FakeProtocol::new()
    .with_stat("QmDir", StatScript::Ok(ResourceType::Directory, 0))
    .with_listing(
      "QmDir",
      &[
        ("a.txt", "QmA", ResourceType::File, 10),
        ("b.txt", "QmB", ResourceType::File, 20),
      ],
    );
  let h = harness(protocol, FakeExtractor::new());

  h.hashes_queue.publish(&seed("QmDir")).await.unwrap();

  let cancel = CancellationToken::new();
  let mut tasks = JoinSet::new();
  spawn_pool(&mut tasks, h.hashes_queue.clone(), h.crawler.clone(), 4, cancel.clone())
    .await
    .unwrap();

  // The directory and both children flow through the same queue: the
  // listing publishes them, other workers pick them up.
  assert!(wait_until(DEADLINE, || h.files.len() == 2).await);
  assert!(h.directories.contains("QmDir"));
  assert!(h.files.contains("QmA"));
  assert!(h.files.contains("QmB"));

  // Children carried their type from the listing; only the directory
  // needed a stat.
  assert_eq!(h.stat_calls(), 1);

  assert!(wait_until(DEADLINE, || h.hashes_queue.stats().acked == 3).await);

  cancel.cancel();
  while tasks.join_next().await.is_some() {}
}

#[tokio::test]
async fn test_closed_delivery_channel_is_fatal() {
  let h = harness(FakeProtocol::new(), FakeExtractor::new());

  let cancel = CancellationToken::new();
  let mut tasks = JoinSet::new();
  spawn_pool(&mut tasks, h.hashes_queue.clone(), h.crawler.clone(), 1, cancel.clone())
    .await
    .unwrap();

  // Sever the consumer channel while the pool is still running.
  h.hashes_queue.close();

  let result = tokio::time::timeout(DEADLINE, tasks.join_next())
    .await
    .expect("worker should exit")
    .expect("one worker task");
  assert!(result.is_err_and(|e| e.is_panic()), "a severed channel must crash the worker");
}

#[tokio::test]
async fn test_cancellation_does_not_ack_inflight_deliveries() {
  // A stat that parks forever, holding the delivery in flight.
  let h = harness(FakeProtocol::new(), FakeExtractor::new());

  struct ParkedProtocol;

  #[async_trait::async_trait]
  impl trawl::protocol::Protocol for ParkedProtocol {
    fn supported_protocols(&self) -> &[trawl_core::ProtocolKind] {
      &[trawl_core::ProtocolKind::Ipfs]
    }

    fn gateway_url(&self, resource: &trawl_core::ReferencedResource) -> String {
      format!("http://gateway.test{}", resource.named_path())
    }

    async fn stat(
      &self,
      _resource: &trawl_core::Resource,
    ) -> Result<trawl::protocol::StatResult, trawl::protocol::ProtocolError> {
      // Parked: the worker is mid-crawl until cancelled.
      std::future::pending().await
    }

    async fn ls(
      &self,
      _resource: &trawl_core::Resource,
      _entries: tokio::sync::mpsc::Sender<trawl_core::ReferencedResource>,
    ) -> Result<(), trawl::protocol::ProtocolError> {
      std::future::pending().await
    }
  }

  let crawler = std::sync::Arc::new(trawl::Crawler::new(
    trawl_core::config::CrawlerConfig::default(),
    trawl::index::Indexes {
      files: h.files.clone(),
      directories: h.directories.clone(),
      invalids: h.invalids.clone(),
    },
    trawl::queue::Queues {
      files: h.files_queue.clone(),
      directories: h.directories_queue.clone(),
      hashes: h.hashes_queue.clone(),
    },
    std::sync::Arc::new(ParkedProtocol),
    h.extractor.clone(),
  ));

  h.hashes_queue.publish(&seed("QmParked")).await.unwrap();

  let cancel = CancellationToken::new();
  let mut tasks = JoinSet::new();
  spawn_pool(&mut tasks, h.hashes_queue.clone(), crawler, 1, cancel.clone())
    .await
    .unwrap();

  // Give the worker time to pick the delivery up, then cancel mid-crawl.
  tokio::time::sleep(Duration::from_millis(100)).await;
  cancel.cancel();
  tasks.abort_all();
  while tasks.join_next().await.is_some() {}

  // The in-flight delivery was neither acked nor rejected.
  let stats = h.hashes_queue.stats();
  assert_eq!(stats.acked, 0);
  assert_eq!(stats.requeued, 0);
  assert_eq!(stats.dropped, 0);
}
