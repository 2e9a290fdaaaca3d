//! Common test utilities for crawler integration tests.
//!
//! Provides scripted protocol/extractor fakes with call counters, plus a
//! harness wiring them to the in-memory broker and indices exactly as the
//! daemon wires the real adapters.

use std::{
  collections::HashMap,
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use tokio::sync::mpsc;
use trawl::{
  Crawler,
  extractor::{Extractor, ExtractorError, Metadata},
  index::{Indexes, MemoryIndex},
  protocol::{Protocol, ProtocolError, StatResult},
  queue::{MemoryBroker, MemoryQueue, Queues},
};
use trawl_core::{ProtocolKind, Reference, ReferencedResource, Resource, ResourceType, config::CrawlerConfig};

/// Scripted stat outcome per content ID. Unscripted IDs time out.
#[allow(dead_code)]
pub enum StatScript {
  Ok(ResourceType, u64),
  NotFound,
  Timeout,
}

/// One scripted directory entry: name, hash, type, size.
pub type Entry = (&'static str, &'static str, ResourceType, u64);

#[derive(Default)]
pub struct FakeProtocol {
  stats: HashMap<String, StatScript>,
  listings: HashMap<String, Vec<Entry>>,
  pub stat_calls: AtomicUsize,
  pub ls_calls: AtomicUsize,
}

#[allow(dead_code)]
impl FakeProtocol {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_stat(mut self, id: &str, script: StatScript) -> Self {
    self.stats.insert(id.to_string(), script);
    self
  }

  pub fn with_listing(mut self, id: &str, entries: &[Entry]) -> Self {
    self.listings.insert(id.to_string(), entries.to_vec());
    self
  }
}

#[async_trait]
impl Protocol for FakeProtocol {
  fn supported_protocols(&self) -> &[ProtocolKind] {
    &[ProtocolKind::Ipfs]
  }

  fn gateway_url(&self, resource: &ReferencedResource) -> String {
    format!("http://gateway.test{}", resource.named_path())
  }

  async fn stat(&self, resource: &Resource) -> Result<StatResult, ProtocolError> {
    self.stat_calls.fetch_add(1, Ordering::SeqCst);

    match self.stats.get(&resource.id) {
      Some(StatScript::Ok(resource_type, size)) => Ok(StatResult {
        resource_type: *resource_type,
        size: *size,
      }),
      Some(StatScript::NotFound) => Err(ProtocolError::NotFound(resource.id.clone())),
      Some(StatScript::Timeout) | None => Err(ProtocolError::Timeout),
    }
  }

  async fn ls(&self, resource: &Resource, entries: mpsc::Sender<ReferencedResource>) -> Result<(), ProtocolError> {
    self.ls_calls.fetch_add(1, Ordering::SeqCst);

    let Some(listing) = self.listings.get(&resource.id) else {
      return Err(ProtocolError::NotFound(resource.id.clone()));
    };

    for (name, hash, resource_type, size) in listing {
      let child = ReferencedResource {
        resource: Resource::new(resource.protocol, *hash),
        reference: Some(Reference::new(resource.clone(), *name)),
        resource_type: *resource_type,
        size: *size,
      };

      if entries.send(child).await.is_err() {
        return Ok(());
      }
    }

    Ok(())
  }
}

/// Scripted extraction outcome per content ID. Unscripted IDs succeed.
#[allow(dead_code)]
pub enum ExtractScript {
  Unsupported,
  Unavailable,
}

#[derive(Default)]
pub struct FakeExtractor {
  scripts: HashMap<String, ExtractScript>,
  pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl FakeExtractor {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_script(mut self, id: &str, script: ExtractScript) -> Self {
    self.scripts.insert(id.to_string(), script);
    self
  }
}

#[async_trait]
impl Extractor for FakeExtractor {
  async fn extract(&self, resource: &ReferencedResource) -> Result<Metadata, ExtractorError> {
    self.calls.fetch_add(1, Ordering::SeqCst);

    match self.scripts.get(resource.id()) {
      None => {
        let mut metadata = Metadata::new();
        metadata.insert("title".to_string(), serde_json::json!("a title"));
        metadata.insert("content".to_string(), serde_json::json!("extracted text"));
        Ok(metadata)
      }
      Some(ExtractScript::Unsupported) => Err(ExtractorError::Unsupported),
      Some(ExtractScript::Unavailable) => Err(ExtractorError::Upstream {
        status: 503,
        message: "unavailable".to_string(),
      }),
    }
  }
}

pub struct TestHarness {
  pub crawler: Arc<Crawler>,
  pub files: Arc<MemoryIndex>,
  pub directories: Arc<MemoryIndex>,
  pub invalids: Arc<MemoryIndex>,
  pub hashes_queue: Arc<MemoryQueue>,
  pub files_queue: Arc<MemoryQueue>,
  pub directories_queue: Arc<MemoryQueue>,
  pub protocol: Arc<FakeProtocol>,
  pub extractor: Arc<FakeExtractor>,
}

/// Wire a crawler to the given fakes, the in-memory broker and fresh
/// indices, with timeouts short enough for tests.
pub fn harness(protocol: FakeProtocol, extractor: FakeExtractor) -> TestHarness {
  let config = CrawlerConfig {
    dir_entry_buffer_size: 64,
    min_update_age_secs: 3600,
    stat_timeout_secs: 1,
    dir_entry_timeout_secs: 1,
  };

  let broker = MemoryBroker::new();
  let hashes_queue = broker.queue("hashes");
  let files_queue = broker.queue("files");
  let directories_queue = broker.queue("directories");

  let queues = Queues {
    files: files_queue.clone(),
    directories: directories_queue.clone(),
    hashes: hashes_queue.clone(),
  };

  let files = Arc::new(MemoryIndex::new("files"));
  let directories = Arc::new(MemoryIndex::new("directories"));
  let invalids = Arc::new(MemoryIndex::new("invalids"));

  let indexes = Indexes {
    files: files.clone(),
    directories: directories.clone(),
    invalids: invalids.clone(),
  };

  let protocol = Arc::new(protocol);
  let extractor = Arc::new(extractor);

  let crawler = Arc::new(Crawler::new(
    config,
    indexes,
    queues,
    protocol.clone(),
    extractor.clone(),
  ));

  TestHarness {
    crawler,
    files,
    directories,
    invalids,
    hashes_queue,
    files_queue,
    directories_queue,
    protocol,
    extractor,
  }
}

#[allow(dead_code)]
impl TestHarness {
  pub fn stat_calls(&self) -> usize {
    self.protocol.stat_calls.load(Ordering::SeqCst)
  }

  pub fn ls_calls(&self) -> usize {
    self.protocol.ls_calls.load(Ordering::SeqCst)
  }

  pub fn extract_calls(&self) -> usize {
    self.extractor.calls.load(Ordering::SeqCst)
  }
}

/// A seed resource: no reference, unknown type.
#[allow(dead_code)]
pub fn seed(id: &str) -> ReferencedResource {
  ReferencedResource::new(Resource::new(ProtocolKind::Ipfs, id))
}

/// A resource discovered as a named child of `parent`.
#[allow(dead_code)]
pub fn referenced(id: &str, parent: &str, name: &str) -> ReferencedResource {
  seed(id).with_reference(Reference::new(Resource::new(ProtocolKind::Ipfs, parent), name))
}

/// Poll `cond` until it holds or the deadline passes.
#[allow(dead_code)]
pub async fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
  let start = std::time::Instant::now();

  while start.elapsed() < deadline {
    if cond() {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }

  false
}
