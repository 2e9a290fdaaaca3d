//! Index abstraction: named document stores keyed by resource ID.
//!
//! The crawler maintains three logical indices (files, directories,
//! invalids) treated as one ID namespace: an ID lives in at most one of
//! them at a time. [`Indexes::multi_get`] answers the "does this ID exist
//! anywhere, and as what" question the update path is built on.
//!
//! The search-engine transport is out of scope; backends implement
//! [`Index`] over whatever client they use. [`MemoryIndex`] is the
//! in-process implementation used by the embedded runner and tests.

mod memory;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;

pub use self::{memory::MemoryIndex, types::Document};

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
  /// Backend I/O failure. Safe to retry at the delivery level.
  #[error("index backend error: {0}")]
  Backend(String),
}

#[async_trait]
pub trait Index: Send + Sync {
  fn name(&self) -> &str;

  /// Fetch a document by ID. `fields` is a projection hint for remote
  /// backends; implementations may return more than requested.
  async fn get(&self, id: &str, fields: &[&str]) -> Result<Option<Document>, IndexError>;

  /// Partial/merge update, creating the document when absent.
  async fn update(&self, id: &str, doc: &Document) -> Result<(), IndexError>;
}

/// Which logical index a document was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
  Files,
  Directories,
  Invalids,
}

/// The three logical indices as one ID namespace.
#[derive(Clone)]
pub struct Indexes {
  pub files: Arc<dyn Index>,
  pub directories: Arc<dyn Index>,
  pub invalids: Arc<dyn Index>,
}

impl Indexes {
  pub fn by_kind(&self, kind: IndexKind) -> &Arc<dyn Index> {
    match kind {
      IndexKind::Files => &self.files,
      IndexKind::Directories => &self.directories,
      IndexKind::Invalids => &self.invalids,
    }
  }

  /// Probe all indices for `id`, returning the first match and where it was
  /// found.
  pub async fn multi_get(&self, id: &str, fields: &[&str]) -> Result<Option<(IndexKind, Document)>, IndexError> {
    for kind in [IndexKind::Files, IndexKind::Directories, IndexKind::Invalids] {
      if let Some(doc) = self.by_kind(kind).get(id, fields).await? {
        return Ok(Some((kind, doc)));
      }
    }

    Ok(None)
  }
}
