//! Configuration for clone runs
//!
//! Every field has a default so a partial JSON file (or none at all) is
//! enough to run the pipeline.

use crate::error::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Top-level configuration shared by the three boundary operations
#[derive(Debug, Clone, Deserialize)]
pub struct CloneConfig {
    /// Per-asset download timeout
    #[serde(default = "default_asset_timeout_ms")]
    pub asset_timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub render: RenderConfig,
}

/// Headless browser settings
#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    /// Path to Chrome/Chromium (None for auto-detection)
    #[serde(default)]
    pub chrome_executable: Option<String>,
    #[serde(default = "default_first_attempt_timeout_ms")]
    pub first_attempt_timeout_ms: u64,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_retry_timeout_ms")]
    pub retry_timeout_ms: u64,
    /// Pause after navigation so deferred content can populate
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_true")]
    pub no_sandbox: bool,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
}

fn default_asset_timeout_ms() -> u64 { 20_000 }
fn default_user_agent() -> String { DEFAULT_USER_AGENT.to_string() }
fn default_first_attempt_timeout_ms() -> u64 { 75_000 }
fn default_retry_delay_ms() -> u64 { 1_500 }
fn default_retry_timeout_ms() -> u64 { 90_000 }
fn default_settle_delay_ms() -> u64 { 3_500 }
fn default_true() -> bool { true }
fn default_window_width() -> u32 { 1366 }
fn default_window_height() -> u32 { 900 }

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            asset_timeout_ms: default_asset_timeout_ms(),
            user_agent: default_user_agent(),
            render: RenderConfig::default(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            chrome_executable: None,
            first_attempt_timeout_ms: default_first_attempt_timeout_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_timeout_ms: default_retry_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            no_sandbox: default_true(),
            window_width: default_window_width(),
            window_height: default_window_height(),
        }
    }
}

impl CloneConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn asset_timeout(&self) -> Duration {
        Duration::from_millis(self.asset_timeout_ms)
    }
}

impl RenderConfig {
    pub fn first_attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.first_attempt_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn retry_timeout(&self) -> Duration {
        Duration::from_millis(self.retry_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}
