//! In-memory index backed by a concurrent map.
//!
//! Stands in for the search engine in tests and the embedded runner. Update
//! semantics mirror a partial/merge upsert: per-document updates are atomic
//! (the map shard lock spans the merge), which is the same guarantee the
//! update path relies on from a real backend.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{Document, Index, IndexError};

#[derive(Debug, Default)]
pub struct MemoryIndex {
  name: String,
  docs: DashMap<String, Document>,
}

impl MemoryIndex {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      docs: DashMap::new(),
    }
  }

  pub fn len(&self) -> usize {
    self.docs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.docs.is_empty()
  }

  pub fn contains(&self, id: &str) -> bool {
    self.docs.contains_key(id)
  }

  /// Current state of a document, for assertions.
  pub fn snapshot(&self, id: &str) -> Option<Document> {
    self.docs.get(id).map(|doc| doc.clone())
  }
}

#[async_trait]
impl Index for MemoryIndex {
  fn name(&self) -> &str {
    &self.name
  }

  async fn get(&self, id: &str, _fields: &[&str]) -> Result<Option<Document>, IndexError> {
    Ok(self.docs.get(id).map(|doc| doc.clone()))
  }

  async fn update(&self, id: &str, doc: &Document) -> Result<(), IndexError> {
    self
      .docs
      .entry(id.to_string())
      .and_modify(|existing| existing.merge_from(doc))
      .or_insert_with(|| doc.clone());

    Ok(())
  }
}
