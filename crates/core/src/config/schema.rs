//! Configuration schema definitions

use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration schema
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppConfig {
    /// Local report queue
    #[serde(default)]
    pub store: StoreConfig,

    /// Photo upload limits
    #[serde(default)]
    pub upload: UploadConfig,

    /// Background sync
    #[serde(default)]
    pub sync: SyncConfig,

    /// Location capture at submission
    #[serde(default)]
    pub location: LocationConfig,

    /// Logging
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

/// Where the local report queue lives
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Root directory holding `queue/` and `failed/`
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

fn default_store_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("fixmyarea")
        .join("reports")
}

/// Photo upload limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadConfig {
    /// Largest photo accepted, in bytes
    #[serde(default = "default_max_asset_bytes")]
    pub max_asset_bytes: u64,

    /// Remote folder that prefixes every object key
    #[serde(default = "default_folder")]
    pub folder: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_asset_bytes: default_max_asset_bytes(),
            folder: default_folder(),
        }
    }
}

fn default_max_asset_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_folder() -> String {
    "issue_images".to_string()
}

/// Background sync settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    /// Reports processed concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Timeout for a single upload or remote write
    #[serde(
        default = "default_op_timeout",
        with = "super::duration_secs",
        rename = "op_timeout_secs"
    )]
    pub op_timeout: Duration,

    /// Rescan interval while nothing else wakes the coordinator
    #[serde(
        default = "default_poll_interval",
        with = "super::duration_secs",
        rename = "poll_interval_secs"
    )]
    pub poll_interval: Duration,

    /// Backoff between attempts and the attempt cap
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            op_timeout: default_op_timeout(),
            poll_interval: default_poll_interval(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_workers() -> usize {
    3
}

fn default_op_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(15)
}

/// Location capture policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationConfig {
    /// Longest wait for a fresh fix at submission time
    #[serde(
        default = "default_fix_timeout",
        with = "super::duration_millis",
        rename = "timeout_ms"
    )]
    pub timeout: Duration,

    /// Oldest last-known fix accepted as a fallback
    #[serde(
        default = "default_max_fix_age",
        with = "super::duration_secs",
        rename = "max_fix_age_secs"
    )]
    pub max_fix_age: Duration,

    /// Fixes less accurate than this are flagged as degraded
    #[serde(default = "default_degraded_accuracy")]
    pub degraded_accuracy_m: f64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            timeout: default_fix_timeout(),
            max_fix_age: default_max_fix_age(),
            degraded_accuracy_m: default_degraded_accuracy(),
        }
    }
}

fn default_fix_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_max_fix_age() -> Duration {
    Duration::from_secs(300)
}

fn default_degraded_accuracy() -> f64 {
    100.0
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetrySection {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON lines instead of compact text
    #[serde(default)]
    pub json: bool,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
