//! IPFS protocol adapter over the node's HTTP API.
//!
//! Stat uses `files/stat`; listing uses streaming `ls`, decoded line by
//! line (NDJSON) so huge directories never buffer in memory. Entries carry
//! the type and size the listing already resolved, which saves the child
//! crawl a stat call.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use trawl_core::{ProtocolKind, Reference, ReferencedResource, Resource, ResourceType, config::IpfsConfig};
use url::Url;

use super::{Protocol, ProtocolError, StatResult};

const SUPPORTED: &[ProtocolKind] = &[ProtocolKind::Ipfs];

/// Concurrency-safe; one instance is shared by all workers.
pub struct IpfsClient {
  api_url: String,
  gateway_url: Url,
  stat_timeout: Duration,
  client: reqwest::Client,
}

impl IpfsClient {
  /// # Panics
  ///
  /// When the configured gateway URL is unparsable or not absolute. A bad
  /// gateway URL makes every extraction fail; refusing to start beats
  /// limping.
  pub fn new(config: &IpfsConfig, stat_timeout: Duration, client: reqwest::Client) -> Self {
    let gateway_url = Url::parse(&config.gateway_url)
      .unwrap_or_else(|e| panic!("could not parse gateway URL {}: {e}", config.gateway_url));

    if gateway_url.cannot_be_a_base() {
      panic!("gateway URL is not absolute: {gateway_url}");
    }

    debug!(api_url = %config.api_url, gateway_url = %gateway_url, "IPFS client initialized");

    Self {
      api_url: config.api_url.trim_end_matches('/').to_string(),
      gateway_url,
      stat_timeout,
      client,
    }
  }

  fn command_url(&self, command: &str) -> String {
    format!("{}/api/v0/{command}", self.api_url)
  }

  /// Map a non-success API response onto the error taxonomy.
  async fn api_error(response: reqwest::Response) -> ProtocolError {
    let status = response.status();
    let message = match response.json::<ApiError>().await {
      Ok(e) => e.message,
      Err(_) => status.to_string(),
    };

    if message.contains("not found") || message.contains("does not exist") || message.contains("no link named") {
      ProtocolError::NotFound(message)
    } else {
      ProtocolError::InvalidResponse(format!("{status}: {message}"))
    }
  }
}

#[async_trait]
impl Protocol for IpfsClient {
  fn supported_protocols(&self) -> &[ProtocolKind] {
    SUPPORTED
  }

  fn gateway_url(&self, resource: &ReferencedResource) -> String {
    match self.gateway_url.join(&resource.named_path()) {
      Ok(url) => url.to_string(),
      // The base is validated at construction and named_path is escaped;
      // failing here means a broken invariant upstream.
      Err(e) => panic!("error generating gateway URL for {resource}: {e}"),
    }
  }

  async fn stat(&self, resource: &Resource) -> Result<StatResult, ProtocolError> {
    let path = resource.absolute_path();

    let request = async {
      let response = self
        .client
        .post(self.command_url("files/stat"))
        .query(&[("arg", path.as_str())])
        .send()
        .await?;

      if !response.status().is_success() {
        return Err(Self::api_error(response).await);
      }

      Ok(response.json::<StatResponse>().await?)
    };

    let stat = tokio::time::timeout(self.stat_timeout, request)
      .await
      .map_err(|_| ProtocolError::Timeout)??;

    trace!(path = %path, kind = %stat.kind, size = stat.size, "stat");

    Ok(StatResult {
      resource_type: type_from_stat(&stat.kind),
      size: stat.size,
    })
  }

  async fn ls(&self, resource: &Resource, entries: mpsc::Sender<ReferencedResource>) -> Result<(), ProtocolError> {
    let response = self
      .client
      .post(self.command_url("ls"))
      .query(&[
        ("arg", resource.id.as_str()),
        ("stream", "true"),
        ("resolve-type", "true"),
        ("size", "true"),
      ])
      .send()
      .await?;

    if !response.status().is_success() {
      return Err(Self::api_error(response).await);
    }

    let mut stream = response.bytes_stream();
    let mut buf: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
      buf.extend_from_slice(&chunk?);

      while let Some(newline) = buf.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = buf.drain(..=newline).collect();
        if !send_entries(&line[..newline], resource, &entries).await? {
          return Ok(());
        }
      }
    }

    // A final object without a trailing newline.
    if !buf.is_empty() {
      send_entries(&buf, resource, &entries).await?;
    }

    Ok(())
  }
}

/// Decode one NDJSON listing line and forward its links. Returns false when
/// the receiver is gone (the crawl was abandoned) and listing should stop.
async fn send_entries(
  line: &[u8],
  parent: &Resource,
  entries: &mpsc::Sender<ReferencedResource>,
) -> Result<bool, ProtocolError> {
  let line = trim_line(line);
  if line.is_empty() {
    return Ok(true);
  }

  let decoded: LsResponse =
    serde_json::from_slice(line).map_err(|e| ProtocolError::InvalidResponse(format!("bad ls line: {e}")))?;

  for object in decoded.objects {
    for link in object.links {
      if entries.send(link.into_entry(parent)).await.is_err() {
        return Ok(false);
      }
    }
  }

  Ok(true)
}

fn trim_line(line: &[u8]) -> &[u8] {
  match line {
    [rest @ .., b'\r'] => rest,
    _ => line,
  }
}

/// unixfs type string from `files/stat`.
fn type_from_stat(kind: &str) -> ResourceType {
  match kind {
    "file" => ResourceType::File,
    "directory" => ResourceType::Directory,
    _ => ResourceType::Unsupported,
  }
}

/// unixfs data type codes carried by `ls` links:
/// 0 raw, 1 directory, 2 file, 3 metadata, 4 symlink, 5 HAMT shard.
fn type_from_link(code: i64) -> ResourceType {
  match code {
    0 | 2 => ResourceType::File,
    1 | 3 | 5 => ResourceType::Directory,
    _ => ResourceType::Unsupported,
  }
}

#[derive(Debug, Deserialize)]
struct ApiError {
  #[serde(rename = "Message", default)]
  message: String,
}

#[derive(Debug, Deserialize)]
struct StatResponse {
  #[serde(rename = "Type")]
  kind: String,
  #[serde(rename = "Size", default)]
  size: u64,
}

#[derive(Debug, Deserialize)]
struct LsResponse {
  #[serde(rename = "Objects", default)]
  objects: Vec<LsObject>,
}

#[derive(Debug, Deserialize)]
struct LsObject {
  #[serde(rename = "Links", default)]
  links: Vec<LsLink>,
}

#[derive(Debug, Clone, Deserialize)]
struct LsLink {
  #[serde(rename = "Name", default)]
  name: String,
  #[serde(rename = "Hash")]
  hash: String,
  #[serde(rename = "Size", default)]
  size: u64,
  #[serde(rename = "Type", default)]
  code: i64,
}

impl LsLink {
  fn into_entry(self, parent: &Resource) -> ReferencedResource {
    ReferencedResource {
      resource: Resource::new(parent.protocol, self.hash),
      reference: Some(Reference::new(parent.clone(), self.name)),
      resource_type: type_from_link(self.code),
      size: self.size,
    }
  }
}
