//! Runtime configuration.
//!
//! Values are layered: built-in defaults, then an optional JSON file, then `HOTSYNC_*`
//! environment variables, then command-line flags (applied by the binary).
//!
//! | Variable | Default |
//! |----------|---------|
//! | `HOTSYNC_CONFIG` | none (path of the JSON file) |
//! | `HOTSYNC_STORAGE_DIR` | `storage` |
//! | `HOTSYNC_CDN_BASE_URL` | `https://ak.hycdn.cn/assetbundle/official/Android/assets` |
//! | `HOTSYNC_TIMEOUT_SECS` | `10` |
//! | `HOTSYNC_USER_AGENT` | the client's Dalvik user agent |
//! | `HOTSYNC_CHECKSUM_HEADER` | `etag` |
//! | `HOTSYNC_FLATC_PATH` | `bin/flatc` (`bin/flatc.exe`, `bin/macos/flatc`) |
//! | `HOTSYNC_FBS_DIR` | `OpenArknightsFBS/FBS` |
//! | `HOTSYNC_MAX_CONCURRENT_DOWNLOADS` | `4 * cpus` |
//! | `HOTSYNC_RETRY_INITIAL_DELAY_MS` | `500` |
//! | `HOTSYNC_RETRY_MAX_DELAY_MS` | `30000` |
//! | `HOTSYNC_RETRY_MAX_ATTEMPTS` | unbounded |
//! | `HOTSYNC_CATALOG_ATTEMPTS` | `3` |
//! | `HOTSYNC_LOG_LEVEL` | `info` |

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::fetch::RetryPolicy;

pub const ENV_PREFIX: &str = "HOTSYNC_";
pub const DEFAULT_CDN_BASE_URL: &str = "https://ak.hycdn.cn/assetbundle/official/Android/assets";
pub const DEFAULT_USER_AGENT: &str = "Dalvik/2.1.0 (Linux; U; Android 6.0.1; vivo X9L Build/MMB29M)";

fn default_flatc_path() -> PathBuf {
    if cfg!(target_os = "windows") {
        PathBuf::from("bin/flatc.exe")
    } else if cfg!(target_os = "macos") {
        PathBuf::from("bin/macos/flatc")
    } else {
        PathBuf::from("bin/flatc")
    }
}

/// Backoff settings for bundle downloads.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RetrySettings {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// `None` retries until the request succeeds.
    pub max_attempts: Option<u32>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { initial_delay_ms: 500, max_delay_ms: 30_000, max_attempts: None }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    pub storage_dir: PathBuf,
    pub cdn_base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Response header whose value names the cache file of placeholder-hash bundles.
    pub checksum_header: String,
    pub flatc_path: PathBuf,
    pub fbs_dir: PathBuf,
    pub max_concurrent_downloads: usize,
    pub retry: RetrySettings,
    pub catalog_attempts: u32,
    pub log_level: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("storage"),
            cdn_base_url: DEFAULT_CDN_BASE_URL.to_string(),
            timeout_secs: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            checksum_header: "etag".to_string(),
            flatc_path: default_flatc_path(),
            fbs_dir: PathBuf::from("OpenArknightsFBS/FBS"),
            max_concurrent_downloads: 4 * num_cpus::get(),
            retry: RetrySettings::default(),
            catalog_attempts: 3,
            log_level: "info".to_string(),
        }
    }
}

fn parsed<T: FromStr>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}

impl SyncConfig {
    /// Reads a JSON config file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, SyncError> {
        let bytes = std::fs::read(path).map_err(|e| SyncError::io(e, path))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Loads from the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self, SyncError> {
        Self::load_with(file, |key| std::env::var(key).ok())
    }

    /// Loads with an injectable environment lookup. An explicit `file` wins over
    /// `HOTSYNC_CONFIG`.
    pub fn load_with(file: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Result<Self, SyncError> {
        let from_env = env(&format!("{}CONFIG", ENV_PREFIX)).map(PathBuf::from);
        let mut config = match file.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(env);
        Ok(config)
    }

    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| env(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = var("STORAGE_DIR") {
            self.storage_dir = PathBuf::from(v);
        }
        if let Some(v) = var("CDN_BASE_URL") {
            self.cdn_base_url = v;
        }
        if let Some(v) = parsed("TIMEOUT_SECS", var("TIMEOUT_SECS")) {
            self.timeout_secs = v;
        }
        if let Some(v) = var("USER_AGENT") {
            self.user_agent = v;
        }
        if let Some(v) = var("CHECKSUM_HEADER") {
            self.checksum_header = v;
        }
        if let Some(v) = var("FLATC_PATH") {
            self.flatc_path = PathBuf::from(v);
        }
        if let Some(v) = var("FBS_DIR") {
            self.fbs_dir = PathBuf::from(v);
        }
        if let Some(v) = parsed("MAX_CONCURRENT_DOWNLOADS", var("MAX_CONCURRENT_DOWNLOADS")) {
            self.max_concurrent_downloads = v;
        }
        if let Some(v) = parsed("RETRY_INITIAL_DELAY_MS", var("RETRY_INITIAL_DELAY_MS")) {
            self.retry.initial_delay_ms = v;
        }
        if let Some(v) = parsed("RETRY_MAX_DELAY_MS", var("RETRY_MAX_DELAY_MS")) {
            self.retry.max_delay_ms = v;
        }
        if let Some(v) = parsed("RETRY_MAX_ATTEMPTS", var("RETRY_MAX_ATTEMPTS")) {
            self.retry.max_attempts = Some(v);
        }
        if let Some(v) = parsed("CATALOG_ATTEMPTS", var("CATALOG_ATTEMPTS")) {
            self.catalog_attempts = v;
        }
        if let Some(v) = var("LOG_LEVEL") {
            self.log_level = v;
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Policy for bundle downloads.
    pub fn bundle_retry(&self) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            max_attempts: self.retry.max_attempts,
        }
    }

    /// Policy for catalog fetches: same backoff, bounded attempts.
    pub fn catalog_retry(&self) -> RetryPolicy {
        RetryPolicy { max_attempts: Some(self.catalog_attempts.max(1)), ..self.bundle_retry() }
    }
}
