//! File branch: extract metadata and write the file document.

use tracing::{debug, info};
use trawl_core::ReferencedResource;

use super::{CrawlError, Crawler};
use crate::{extractor::Extractor, index::Index};

impl Crawler {
  /// The extraction outcome is recorded once per resource: content is
  /// immutable under a content address, so an already-indexed file never
  /// yields new metadata and is not re-extracted.
  pub(super) async fn crawl_file(&self, r: &ReferencedResource, first_sighting: bool) -> Result<(), CrawlError> {
    if !first_sighting {
      debug!(id = %r.id(), "file already indexed, skipping extraction");
      return Ok(());
    }

    let mut metadata = match self.extractor.extract(r).await {
      Ok(metadata) => metadata,
      Err(e) if e.is_invalid() => {
        debug!(id = %r.id(), error = %e, "unextractable file, recording invalid");
        return self.index_invalid(r).await;
      }
      Err(e) => return Err(e.into()),
    };

    let mut doc = self.initial_document(r);
    doc.size = Some(r.size);
    // Extracted text is its own field; everything else stays under metadata.
    doc.content = metadata.remove("content").and_then(|v| v.as_str().map(str::to_string));
    doc.metadata = Some(metadata);

    self.indexes.files.update(r.id(), &doc).await?;
    info!(id = %r.id(), size = r.size, "indexed file");
    Ok(())
  }
}
