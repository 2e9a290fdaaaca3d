//! Crawler configuration, loaded from TOML with full defaults.
//!
//! Resolution order: explicit path (`--config`) > `TRAWL_CONFIG` env var >
//! user config (`~/.config/trawl/config.toml`) > built-in defaults. An
//! explicitly named file must exist and parse; the user config is skipped
//! silently when absent.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub ipfs: IpfsConfig,
  pub extractor: ExtractorConfig,
  pub crawler: CrawlerConfig,
  pub workers: WorkerConfig,
  pub queues: QueueNames,
  pub indexes: IndexNames,
  pub daemon: DaemonConfig,
}

/// Endpoints of the distributed-filesystem node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpfsConfig {
  /// URL of the IPFS API endpoint (stat and ls calls).
  pub api_url: String,
  /// URL of the IPFS gateway (content retrieval by the extractor).
  pub gateway_url: String,
}

impl Default for IpfsConfig {
  fn default() -> Self {
    Self {
      api_url: "http://localhost:5001".to_string(),
      gateway_url: "http://localhost:8080".to_string(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
  /// URL of the metadata extraction server.
  pub tika_url: String,
  /// Timeout for a single extraction request.
  pub timeout_secs: u64,
  /// Files larger than this are recorded as invalid instead of extracted.
  pub max_file_size: u64,
}

impl Default for ExtractorConfig {
  fn default() -> Self {
    Self {
      tika_url: "http://localhost:8081".to_string(),
      timeout_secs: 300,
      max_file_size: 4 * 1024 * 1024 * 1024,
    }
  }
}

impl ExtractorConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
  /// Buffer size for directory entry channels.
  pub dir_entry_buffer_size: usize,
  /// Minimum age before an indexed resource has its last-seen refreshed.
  pub min_update_age_secs: u64,
  /// Timeout for stat calls.
  pub stat_timeout_secs: u64,
  /// Timeout *between* successive directory entries.
  pub dir_entry_timeout_secs: u64,
}

impl Default for CrawlerConfig {
  fn default() -> Self {
    Self {
      dir_entry_buffer_size: 8192,
      min_update_age_secs: 3600,
      stat_timeout_secs: 60,
      dir_entry_timeout_secs: 15,
    }
  }
}

impl CrawlerConfig {
  pub fn min_update_age(&self) -> Duration {
    Duration::from_secs(self.min_update_age_secs)
  }

  pub fn stat_timeout(&self) -> Duration {
    Duration::from_secs(self.stat_timeout_secs)
  }

  pub fn dir_entry_timeout(&self) -> Duration {
    Duration::from_secs(self.dir_entry_timeout_secs)
  }
}

/// Concurrent consumers per logical queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
  pub hash_workers: usize,
  pub file_workers: usize,
  pub directory_workers: usize,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      hash_workers: 70,
      file_workers: 120,
      directory_workers: 70,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueNames {
  pub files: String,
  pub directories: String,
  pub hashes: String,
}

impl Default for QueueNames {
  fn default() -> Self {
    Self {
      files: "files".to_string(),
      directories: "directories".to_string(),
      hashes: "hashes".to_string(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexNames {
  pub files: String,
  pub directories: String,
  pub invalids: String,
}

impl Default for IndexNames {
  fn default() -> Self {
    Self {
      files: "ipfs_files".to_string(),
      directories: "ipfs_directories".to_string(),
      invalids: "ipfs_invalids".to_string(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
  /// Default log level when RUST_LOG is unset: off, error, warn, info, debug, trace.
  pub log_level: String,
  /// Log file rotation when running in the background: daily, hourly, never.
  pub log_rotation: String,
}

impl Default for DaemonConfig {
  fn default() -> Self {
    Self {
      log_level: "info".to_string(),
      log_rotation: "daily".to_string(),
    }
  }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("failed to read config file {path}: {source}")]
  Read {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("failed to parse config file {path}: {source}")]
  Parse {
    path: PathBuf,
    source: Box<toml::de::Error>,
  },
}

impl Config {
  /// Default user config location (`~/.config/trawl/config.toml`).
  pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("trawl").join("config.toml"))
  }

  /// Load configuration following the resolution order in the module docs.
  pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
    if let Some(path) = path {
      return Self::from_file(path);
    }

    if let Ok(env_path) = std::env::var("TRAWL_CONFIG") {
      return Self::from_file(Path::new(&env_path));
    }

    if let Some(user) = Self::user_config_path()
      && user.exists()
    {
      return Self::from_file(&user);
    }

    Ok(Self::default())
  }

  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source: Box::new(source),
    })
  }

  /// Render a default configuration file with a usage header.
  pub fn generate_template() -> String {
    let body = toml::to_string_pretty(&Self::default()).expect("default config serializes");
    format!("# trawl configuration\n# All values shown are the defaults; delete anything you don't override.\n\n{body}")
  }
}
