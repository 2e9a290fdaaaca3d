//! Crawl orchestration: process one resource end-to-end.
//!
//! ```text
//! delivery → validate → updater (dedup/staleness)
//!                         │ not found / stale+unknown
//!                         ▼
//!                       stat (if type unknown)
//!                         │
//!         ┌───────────────┼────────────────┐
//!         ▼               ▼                ▼
//!       file          directory       unsupported
//!     extract →     ls → publish       invalid
//!     files idx     each entry to       index
//!                   hashes queue,
//!                   directories idx
//! ```
//!
//! Directory traversal is flattened into queue hops: one level is
//! enumerated, every child becomes an independent unit of work, and the
//! worker pools re-dispatch. Nothing recurses in-process, so adversarial
//! directory depth cannot exhaust the stack and fan-out is rate-limited by
//! queue backpressure.

mod directory;
mod file;

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use trawl_core::{ReferencedResource, ResourceType, config::CrawlerConfig};

use crate::{
  extractor::{Extractor, ExtractorError},
  index::{Document, Index, IndexError, Indexes, types},
  protocol::{Protocol, ProtocolError},
  queue::{QueueError, Queues},
  updater::{UpdateStatus, Updater},
};

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
  /// Malformed unit of work. Permanent; never retried.
  #[error("invalid resource: {0}")]
  InvalidResource(String),
  #[error(transparent)]
  Protocol(#[from] ProtocolError),
  #[error(transparent)]
  Extractor(#[from] ExtractorError),
  #[error(transparent)]
  Index(#[from] IndexError),
  #[error(transparent)]
  Queue(#[from] QueueError),
  /// The directory listing stalled between entries.
  #[error("timed out waiting for directory entry")]
  DirEntryTimeout,
  /// The listing task stopped without finishing.
  #[error("directory listing aborted")]
  LsAborted,
}

impl CrawlError {
  /// Whether redelivery may succeed. The worker pool turns this into the
  /// ack/reject decision; nothing else interprets errors.
  pub fn is_temporary(&self) -> bool {
    match self {
      CrawlError::InvalidResource(_) => false,
      CrawlError::Protocol(e) => e.is_temporary(),
      CrawlError::Extractor(e) => e.is_temporary(),
      // Index I/O is always transport; retry.
      CrawlError::Index(_) => true,
      CrawlError::Queue(e) => e.is_temporary(),
      CrawlError::DirEntryTimeout | CrawlError::LsAborted => true,
    }
  }
}

/// Processes one resource end-to-end. Stateless across calls; a single
/// instance is shared by all workers.
pub struct Crawler {
  config: CrawlerConfig,
  indexes: Indexes,
  queues: Queues,
  protocol: Arc<dyn Protocol>,
  extractor: Arc<dyn Extractor>,
  updater: Updater,
}

impl Crawler {
  pub fn new(
    config: CrawlerConfig,
    indexes: Indexes,
    queues: Queues,
    protocol: Arc<dyn Protocol>,
    extractor: Arc<dyn Extractor>,
  ) -> Self {
    let updater = Updater::new(indexes.clone(), config.min_update_age());

    Self {
      config,
      indexes,
      queues,
      protocol,
      extractor,
      updater,
    }
  }

  /// Crawl one resource: classify, update-or-skip, then extract (files),
  /// enumerate (directories) or record invalid (unsupported).
  ///
  /// `r` is annotated in place with the type and size resolved by stat.
  /// Returning `Ok` means the delivery can be acknowledged; the "already
  /// known" and "recorded invalid" outcomes count, they need no rework.
  pub async fn crawl(&self, r: &mut ReferencedResource) -> Result<(), CrawlError> {
    if !r.is_valid() {
      return Err(CrawlError::InvalidResource(r.to_string()));
    }

    let status = self.updater.update(r).await?;
    match status {
      UpdateStatus::Invalid => {
        debug!(id = %r.id(), "known invalid, skipping");
        return Ok(());
      }
      UpdateStatus::UpToDate => {
        debug!(id = %r.id(), "up to date");
        return Ok(());
      }
      // Refreshed and already classified: nothing further to do. A stale
      // document arriving with unknown type falls through and gets
      // re-classified, which is what re-enumerates old directories.
      UpdateStatus::Updated if r.resource_type != ResourceType::Unknown => {
        debug!(id = %r.id(), "references/last-seen refreshed");
        return Ok(());
      }
      UpdateStatus::NotFound | UpdateStatus::Updated => {}
      UpdateStatus::Undefined => panic!("undefined update status for {}", r.id()),
    }

    // On re-classification of an already-indexed resource the updater has
    // done all document mutation; the branches below must not rewrite it.
    let first_sighting = status == UpdateStatus::NotFound;

    if r.resource_type == ResourceType::Unknown {
      match self.protocol.stat(&r.resource).await {
        Ok(stat) => {
          r.resource_type = stat.resource_type;
          r.size = stat.size;
        }
        Err(e @ ProtocolError::NotFound(_)) if first_sighting => {
          debug!(id = %r.id(), "absent on filesystem, recording invalid");
          self.index_invalid(r).await?;
          // Still a permanent failure: the delivery is dropped, not acked.
          return Err(e.into());
        }
        // An already-indexed resource failing to resolve is more likely a
        // flaky node than vanished content; recording it invalid would put
        // the ID in two indices at once.
        Err(e) => return Err(e.into()),
      }
    }

    match r.resource_type {
      ResourceType::File => self.crawl_file(r, first_sighting).await,
      ResourceType::Directory => self.crawl_directory(r, first_sighting).await,
      ResourceType::Unsupported if first_sighting => self.index_invalid(r).await,
      ResourceType::Unsupported => Ok(()),
      ResourceType::Unknown => panic!("resource type still unknown after stat: {}", r.id()),
    }
  }

  /// Record a resource in the invalid index. Terminal: the ID never enters
  /// the files or directories indices afterwards.
  async fn index_invalid(&self, r: &ReferencedResource) -> Result<(), CrawlError> {
    self.indexes.invalids.update(r.id(), &Document::default()).await?;
    Ok(())
  }

  /// First-sighting document carrying the discovery reference, if any.
  fn initial_document(&self, r: &ReferencedResource) -> Document {
    let mut references = types::References::default();
    if let Some(reference) = &r.reference {
      references.push(types::Reference::new(&reference.parent.id, &reference.name));
    }

    Document {
      references,
      last_seen: Utc::now(),
      ..Document::default()
    }
  }
}
