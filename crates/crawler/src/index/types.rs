//! Storage-side document shapes.
//!
//! The index-side reference (`parent_hash`/`name`) is deliberately decoupled
//! from the in-memory [`trawl_core::Reference`]: what the search engine
//! persists is a flat projection keyed by parent hash, while the in-memory
//! type carries a full parent [`trawl_core::Resource`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored discovery edge: the resource is a named entry of `parent_hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
  pub parent_hash: String,
  pub name: String,
}

impl Reference {
  pub fn new(parent_hash: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      parent_hash: parent_hash.into(),
      name: name.into(),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct References(pub Vec<Reference>);

impl References {
  /// Whether a reference with this parent hash is already recorded. Names
  /// are not compared; a known parent under a new name still counts as
  /// known.
  pub fn has_parent(&self, parent_hash: &str) -> bool {
    self.0.iter().any(|r| r.parent_hash == parent_hash)
  }

  pub fn push(&mut self, r: Reference) {
    self.0.push(r);
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }
}

/// Persisted projection of a crawled resource.
///
/// Created on first successful classification, then mutated by repeated
/// encounters: the reference list grows, `last-seen` is refreshed past the
/// staleness window. File documents additionally carry size and extracted
/// metadata. The invalid index stores bare default documents as markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
  #[serde(default, skip_serializing_if = "References::is_empty")]
  pub references: References,
  #[serde(rename = "last-seen", default = "epoch")]
  pub last_seen: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub size: Option<u64>,
  /// Extraction-service fields, stored as-is.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
  /// Extracted plain text, when the extractor produced any.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub content: Option<String>,
}

fn epoch() -> DateTime<Utc> {
  DateTime::UNIX_EPOCH
}

impl Default for Document {
  fn default() -> Self {
    Self {
      references: References::default(),
      last_seen: epoch(),
      size: None,
      metadata: None,
      content: None,
    }
  }
}

impl Document {
  /// Merge an incoming partial document into this one. References and
  /// `last-seen` always overwrite; optional fields only when present.
  pub fn merge_from(&mut self, incoming: &Document) {
    self.references = incoming.references.clone();
    self.last_seen = incoming.last_seen;

    if incoming.size.is_some() {
      self.size = incoming.size;
    }
    if incoming.metadata.is_some() {
      self.metadata = incoming.metadata.clone();
    }
    if incoming.content.is_some() {
      self.content = incoming.content.clone();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_has_parent_ignores_name() {
    let refs = References(vec![Reference::new("QmParentA", "x")]);
    assert!(refs.has_parent("QmParentA"));
    assert!(!refs.has_parent("QmParentB"));
  }

  #[test]
  fn test_document_serializes_last_seen_key() {
    let doc = Document {
      last_seen: "2024-05-01T00:00:00Z".parse().unwrap(),
      ..Document::default()
    };
    let json = serde_json::to_value(&doc).unwrap();
    assert!(json.get("last-seen").is_some());
    // Empty optional fields stay out of the stored document.
    assert!(json.get("references").is_none());
    assert!(json.get("size").is_none());
  }

  #[test]
  fn test_merge_keeps_existing_optionals() {
    let mut doc = Document {
      size: Some(42),
      content: Some("text".to_string()),
      ..Document::default()
    };

    let incoming = Document {
      references: References(vec![Reference::new("QmParentA", "x")]),
      last_seen: "2024-05-01T00:00:00Z".parse().unwrap(),
      ..Document::default()
    };

    doc.merge_from(&incoming);
    assert_eq!(doc.references.len(), 1);
    assert_eq!(doc.size, Some(42));
    assert_eq!(doc.content.as_deref(), Some("text"));
  }
}
