//! Addressable resources and the references by which they are discovered.
//!
//! A [`Resource`] identifies one addressable unit (a content hash) on a
//! distributed filesystem. A [`Reference`] records the edge by which a
//! resource was reached: a named entry in a parent directory. Resources are
//! reachable through any number of references, and the same content hash
//! may be listed under different names in different directories.
//!
//! These are pure value types; all I/O lives behind the protocol, index and
//! queue abstractions in the crawler crate.

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::{Deserialize, Serialize};

/// Characters escaped when a reference name is embedded as a URL path
/// segment. CONTROLS plus the segment-reserved set.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
  .add(b' ')
  .add(b'"')
  .add(b'#')
  .add(b'<')
  .add(b'>')
  .add(b'?')
  .add(b'`')
  .add(b'{')
  .add(b'}')
  .add(b'/')
  .add(b'%')
  .add(b'\\')
  .add(b'^')
  .add(b'|');

/// Distributed-filesystem protocols the crawler understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
  Ipfs,
  /// Unrecognized or unset protocol. Resources carrying it never validate,
  /// so unknown protocol strings in queue payloads are rejected permanently
  /// rather than failing decode.
  #[default]
  #[serde(other)]
  Invalid,
}

impl ProtocolKind {
  /// Path scheme used in content paths and gateway URLs, e.g. `/ipfs/<id>`.
  pub fn scheme(&self) -> &'static str {
    match self {
      ProtocolKind::Invalid => "invalid",
      ProtocolKind::Ipfs => "ipfs",
    }
  }
}

impl std::fmt::Display for ProtocolKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.scheme())
  }
}

/// An addressable unit of content on a distributed filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resource {
  pub protocol: ProtocolKind,
  pub id: String,
}

impl Resource {
  pub fn new(protocol: ProtocolKind, id: impl Into<String>) -> Self {
    Self {
      protocol,
      id: id.into(),
    }
  }

  /// A resource is valid when its protocol is recognized and its content ID
  /// is non-empty.
  pub fn is_valid(&self) -> bool {
    self.protocol != ProtocolKind::Invalid && !self.id.is_empty()
  }

  /// Canonical content-only path, ignoring any reference: `/ipfs/<id>`.
  pub fn absolute_path(&self) -> String {
    format!("/{}/{}", self.protocol.scheme(), self.id)
  }
}

impl std::fmt::Display for Resource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.absolute_path())
  }
}

/// Classification of a resource, resolved by a protocol stat or listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
  File,
  Directory,
  /// Terminal classification; never re-processed as file or directory work.
  Unsupported,
  /// Pre-classification state.
  #[default]
  Unknown,
}

/// The edge by which a resource was discovered: a named entry of `parent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
  pub parent: Resource,
  pub name: String,
}

impl Reference {
  pub fn new(parent: Resource, name: impl Into<String>) -> Self {
    Self {
      parent,
      name: name.into(),
    }
  }
}

/// A list of references to one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct References(pub Vec<Reference>);

impl References {
  /// Whether `new_ref` is already known. References match on parent ID
  /// alone; two references with the same parent and differing names count
  /// as one.
  ///
  /// # Panics
  ///
  /// When the compared references belong to different protocols. Resources
  /// from different protocols must never be compared as equal; reaching
  /// this indicates a broken invariant upstream.
  pub fn contains(&self, new_ref: &Reference) -> bool {
    for r in &self.0 {
      if r.parent.protocol != new_ref.parent.protocol {
        panic!("unmatching protocols in reference");
      }

      if r.parent.id == new_ref.parent.id {
        return true;
      }
    }

    false
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

/// A resource together with the (optional) edge by which it was discovered
/// and its resolved type and size, once stated.
///
/// This is the unit of work passed through queues and into the crawler.
/// Seed resources carry no reference; `type` stays `unknown` until a stat
/// or a parent directory listing resolves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencedResource {
  pub resource: Resource,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reference: Option<Reference>,
  #[serde(default, rename = "type")]
  pub resource_type: ResourceType,
  #[serde(default)]
  pub size: u64,
}

impl ReferencedResource {
  /// An unclassified resource without a discovery edge.
  pub fn new(resource: Resource) -> Self {
    Self {
      resource,
      reference: None,
      resource_type: ResourceType::Unknown,
      size: 0,
    }
  }

  pub fn with_reference(mut self, reference: Reference) -> Self {
    self.reference = Some(reference);
    self
  }

  pub fn id(&self) -> &str {
    &self.resource.id
  }

  pub fn is_valid(&self) -> bool {
    self.resource.is_valid()
  }

  /// Path through the parent directory and escaped name when a named
  /// reference exists, preserving filename-derived content-type hints for
  /// downstream consumers; the absolute path otherwise.
  pub fn named_path(&self) -> String {
    if let Some(reference) = &self.reference
      && !reference.name.is_empty()
    {
      return format!(
        "/{}/{}/{}",
        reference.parent.protocol.scheme(),
        reference.parent.id,
        utf8_percent_encode(&reference.name, PATH_SEGMENT)
      );
    }

    self.resource.absolute_path()
  }
}

impl std::fmt::Display for ReferencedResource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.named_path())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ipfs(id: &str) -> Resource {
    Resource::new(ProtocolKind::Ipfs, id)
  }

  #[test]
  fn test_resource_validity() {
    assert!(ipfs("QmFoo").is_valid());
    assert!(!ipfs("").is_valid());
    assert!(!Resource::new(ProtocolKind::Invalid, "QmFoo").is_valid());
  }

  #[test]
  fn test_unknown_protocol_decodes_as_invalid() {
    let r: Resource = serde_json::from_str(r#"{"protocol":"carrier-pigeon","id":"QmFoo"}"#).unwrap();
    assert_eq!(r.protocol, ProtocolKind::Invalid);
    assert!(!r.is_valid());
  }

  #[test]
  fn test_absolute_path() {
    assert_eq!(ipfs("QmFoo").absolute_path(), "/ipfs/QmFoo");
  }

  #[test]
  fn test_named_path_prefers_reference() {
    let r = ReferencedResource::new(ipfs("QmChild")).with_reference(Reference::new(ipfs("QmParent"), "report.pdf"));
    assert_eq!(r.named_path(), "/ipfs/QmParent/report.pdf");
  }

  #[test]
  fn test_named_path_escapes_name() {
    let r = ReferencedResource::new(ipfs("QmChild")).with_reference(Reference::new(ipfs("QmParent"), "a b/c#d"));
    assert_eq!(r.named_path(), "/ipfs/QmParent/a%20b%2Fc%23d");
  }

  #[test]
  fn test_named_path_falls_back_without_reference() {
    let r = ReferencedResource::new(ipfs("QmChild"));
    assert_eq!(r.named_path(), "/ipfs/QmChild");

    let unnamed = ReferencedResource::new(ipfs("QmChild")).with_reference(Reference::new(ipfs("QmParent"), ""));
    assert_eq!(unnamed.named_path(), "/ipfs/QmChild");
  }

  #[test]
  fn test_references_contains_matches_parent_id_only() {
    let refs = References(vec![Reference::new(ipfs("QmParentA"), "x")]);

    // Same parent, different name still counts as known.
    assert!(refs.contains(&Reference::new(ipfs("QmParentA"), "y")));
    assert!(!refs.contains(&Reference::new(ipfs("QmParentB"), "x")));
  }

  #[test]
  #[should_panic(expected = "unmatching protocols in reference")]
  fn test_references_cross_protocol_compare_panics() {
    let refs = References(vec![Reference::new(ipfs("QmParentA"), "x")]);
    refs.contains(&Reference::new(Resource::new(ProtocolKind::Invalid, "QmParentA"), "x"));
  }

  #[test]
  fn test_queue_payload_roundtrip() {
    let r = ReferencedResource::new(ipfs("QmChild")).with_reference(Reference::new(ipfs("QmParent"), "notes.txt"));
    let json = serde_json::to_string(&r).unwrap();
    let back: ReferencedResource = serde_json::from_str(&json).unwrap();
    assert_eq!(back, r);
    assert_eq!(back.resource_type, ResourceType::Unknown);
  }

  #[test]
  fn test_seed_payload_minimal_fields() {
    let r: ReferencedResource = serde_json::from_str(r#"{"resource":{"protocol":"ipfs","id":"QmSeed"}}"#).unwrap();
    assert!(r.reference.is_none());
    assert_eq!(r.resource_type, ResourceType::Unknown);
    assert_eq!(r.size, 0);
  }
}
