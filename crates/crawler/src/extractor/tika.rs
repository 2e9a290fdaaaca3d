//! Extraction through a tika-bridge server.
//!
//! The server fetches the content itself; we hand it the resource's gateway
//! URL (named path preferred so it sees a filename for content-type
//! detection) and get back a JSON object of metadata fields plus extracted
//! text.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, trace};
use trawl_core::{ReferencedResource, config::ExtractorConfig};

use super::{Extractor, ExtractorError, Metadata};
use crate::protocol::Protocol;

pub struct TikaExtractor {
  config: ExtractorConfig,
  client: reqwest::Client,
  protocol: Arc<dyn Protocol>,
}

impl TikaExtractor {
  pub fn new(config: ExtractorConfig, client: reqwest::Client, protocol: Arc<dyn Protocol>) -> Self {
    debug!(
      tika_url = %config.tika_url,
      max_file_size = config.max_file_size,
      "tika extractor initialized"
    );

    Self {
      config,
      client,
      protocol,
    }
  }

  fn extract_endpoint(&self) -> String {
    format!("{}/extract", self.config.tika_url.trim_end_matches('/'))
  }
}

#[async_trait]
impl Extractor for TikaExtractor {
  async fn extract(&self, resource: &ReferencedResource) -> Result<Metadata, ExtractorError> {
    // Size is known from stat or the parent listing; don't even ask the
    // server to fetch oversized content.
    if resource.size > self.config.max_file_size {
      return Err(ExtractorError::FileTooLarge(resource.size));
    }

    let gateway_url = self.protocol.gateway_url(resource);

    let request = async {
      let response = self
        .client
        .get(self.extract_endpoint())
        .query(&[("url", gateway_url.as_str())])
        .send()
        .await?;

      match response.status() {
        status if status.is_success() => Ok(response.json::<Metadata>().await?),
        StatusCode::UNSUPPORTED_MEDIA_TYPE | StatusCode::UNPROCESSABLE_ENTITY => Err(ExtractorError::Unsupported),
        status => Err(ExtractorError::Upstream {
          status: status.as_u16(),
          message: response.text().await.unwrap_or_default(),
        }),
      }
    };

    let metadata = tokio::time::timeout(self.config.timeout(), request)
      .await
      .map_err(|_| ExtractorError::Timeout)??;

    trace!(id = %resource.id(), fields = metadata.len(), "extracted");
    Ok(metadata)
  }
}
