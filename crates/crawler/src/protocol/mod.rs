//! Protocol adapters: stat, list and gateway addressing for
//! distributed-filesystem backends.
//!
//! The crawler only sees this trait; backends are swappable and the test
//! suite runs against scripted fakes.

mod ipfs;

use async_trait::async_trait;
use tokio::sync::mpsc;
use trawl_core::{ProtocolKind, ReferencedResource, Resource, ResourceType};

pub use self::ipfs::IpfsClient;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
  /// The resource does not exist on the filesystem. Permanent.
  #[error("resource not found: {0}")]
  NotFound(String),
  /// The call exceeded its deadline.
  #[error("request timed out")]
  Timeout,
  #[error("request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("unexpected response from node: {0}")]
  InvalidResponse(String),
}

impl ProtocolError {
  /// Retryable at the delivery level. Only not-found is permanent: the
  /// resource itself is the problem, not the transport.
  pub fn is_temporary(&self) -> bool {
    !matches!(self, ProtocolError::NotFound(_))
  }
}

/// Resolved type and size of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatResult {
  pub resource_type: ResourceType,
  pub size: u64,
}

#[async_trait]
pub trait Protocol: Send + Sync {
  fn supported_protocols(&self) -> &[ProtocolKind];

  /// Retrieval URL for a resource, preferring the named path so downstream
  /// consumers can infer content types from filenames.
  fn gateway_url(&self, resource: &ReferencedResource) -> String;

  /// Resolve type and size. Bounded by the configured stat timeout.
  async fn stat(&self, resource: &Resource) -> Result<StatResult, ProtocolError>;

  /// Stream one level of directory entries into `entries`, each carrying
  /// the type and size resolved from the listing. Finite. The per-entry
  /// stall deadline is the caller's responsibility; a dropped receiver
  /// stops the listing without error.
  async fn ls(&self, resource: &Resource, entries: mpsc::Sender<ReferencedResource>) -> Result<(), ProtocolError>;
}
