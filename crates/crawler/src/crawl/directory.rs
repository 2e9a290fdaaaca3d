//! Directory branch: enumerate one level and fan out through the queue.

use tokio::sync::mpsc;
use tracing::info;
use trawl_core::ReferencedResource;

use super::{CrawlError, Crawler};
use crate::{index::Index, protocol::Protocol, queue::Queue};

impl Crawler {
  /// List the directory and publish every entry to the hashes queue for
  /// independent classification. Never recurses in-process.
  ///
  /// The listing runs as its own task feeding a bounded channel; a stall
  /// longer than `dir_entry_timeout` *between* entries fails the crawl as
  /// temporary, so a wedged node cannot hang a worker indefinitely even
  /// while the overall listing has no deadline.
  pub(super) async fn crawl_directory(&self, r: &ReferencedResource, first_sighting: bool) -> Result<(), CrawlError> {
    let (tx, mut rx) = mpsc::channel(self.config.dir_entry_buffer_size);
    let protocol = self.protocol.clone();
    let dir = r.resource.clone();

    let lister = tokio::spawn(async move { protocol.ls(&dir, tx).await });

    let mut published = 0usize;
    loop {
      match tokio::time::timeout(self.config.dir_entry_timeout(), rx.recv()).await {
        Ok(Some(entry)) => {
          self.queues.hashes.publish(&entry).await?;
          published += 1;
        }
        // Channel closed: the listing finished (or failed; checked below).
        Ok(None) => break,
        Err(_) => {
          lister.abort();
          return Err(CrawlError::DirEntryTimeout);
        }
      }
    }

    match lister.await {
      Ok(result) => result?,
      Err(e) => {
        if e.is_panic() {
          // Listing panics are invariant violations; let them crash.
          std::panic::resume_unwind(e.into_panic());
        }
        return Err(CrawlError::LsAborted);
      }
    }

    // The document is written after fan-out so a failed publish re-runs the
    // whole listing on redelivery instead of leaving children undiscovered.
    // On re-enumeration the updater has already refreshed the document and
    // rewriting it would clobber the accumulated reference list.
    if first_sighting {
      let doc = self.initial_document(r);
      self.indexes.directories.update(r.id(), &doc).await?;
    }

    info!(id = %r.id(), entries = published, "indexed directory");
    Ok(())
  }
}
