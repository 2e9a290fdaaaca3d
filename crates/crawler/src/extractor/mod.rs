//! Metadata extraction for file resources.
//!
//! Unsupported or oversized content is a property of the resource, not of
//! the service: those outcomes are permanent and the resource lands in the
//! invalid index. Transport failures and server errors are temporary and
//! retried at the delivery level.

mod tika;

use async_trait::async_trait;
use trawl_core::ReferencedResource;

pub use self::tika::TikaExtractor;

/// Fields produced by the extraction service, stored as-is on the file
/// document.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, thiserror::Error)]
pub enum ExtractorError {
  /// Content exceeds the configured size ceiling. Permanent.
  #[error("file too large: {0} bytes")]
  FileTooLarge(u64),
  /// The extraction service cannot handle this content type. Permanent.
  #[error("unsupported content")]
  Unsupported,
  /// The call exceeded its deadline.
  #[error("request timed out")]
  Timeout,
  #[error("request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("extraction server returned {status}: {message}")]
  Upstream { status: u16, message: String },
}

impl ExtractorError {
  /// Permanent classification of the resource itself.
  pub fn is_invalid(&self) -> bool {
    matches!(self, ExtractorError::FileTooLarge(_) | ExtractorError::Unsupported)
  }

  pub fn is_temporary(&self) -> bool {
    !self.is_invalid()
  }
}

#[async_trait]
pub trait Extractor: Send + Sync {
  /// Extract metadata/text from a file-typed resource.
  async fn extract(&self, resource: &ReferencedResource) -> Result<Metadata, ExtractorError>;
}
