//! Session configuration.
//!
//! Loaded once per session from TOML; every field has a default so an empty
//! file is a valid configuration. Durations are whole seconds.
//!
//! ```toml
//! variant = "legacy"
//! region = "KR"
//! zone = "KR-2"
//!
//! [timeouts]
//! create = 1800
//! delete = 900
//!
//! [retry]
//! delay = 2
//! ```

use anyhow::{Context, Result, bail};
use converge::BackendVariant;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default provider endpoint.
pub const DEFAULT_ENDPOINT: &str = apiclient::transport::http::DEFAULT_ENDPOINT;

/// Configuration for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// API generation the session talks to
    pub variant: BackendVariant,
    /// Region code (e.g. `KR`)
    pub region: String,
    /// Default zone code used when a request names none
    pub zone: Option<String>,
    /// Provider endpoint
    pub endpoint: String,
    /// Per-operation convergence budgets
    pub timeouts: Timeouts,
    /// Seconds between status polls
    pub poll_interval: u64,
    /// Retry delays for busy provider objects
    pub retry: RetrySettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            variant: BackendVariant::default(),
            region: "KR".to_string(),
            zone: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeouts: Timeouts::default(),
            poll_interval: 1,
            retry: RetrySettings::default(),
        }
    }
}

/// Convergence budgets in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub create: u64,
    pub update: u64,
    pub delete: u64,
    pub stop: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: 1800,
            update: 600,
            delete: 900,
            stop: 300,
        }
    }
}

impl Timeouts {
    /// Create budget.
    pub fn create(&self) -> Duration {
        Duration::from_secs(self.create)
    }

    /// Update budget.
    pub fn update(&self) -> Duration {
        Duration::from_secs(self.update)
    }

    /// Delete budget.
    pub fn delete(&self) -> Duration {
        Duration::from_secs(self.delete)
    }

    /// Stop budget.
    pub fn stop(&self) -> Duration {
        Duration::from_secs(self.stop)
    }
}

/// Retry delays in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Delay between attempts for most busy codes
    pub delay: u64,
    /// Delay between attempts while a load balancer or scaling group is busy
    pub busy_object_delay: u64,
    /// Total sleep budget per call
    pub max_wait: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            delay: 2,
            busy_object_delay: 5,
            max_wait: 300,
        }
    }
}

impl SessionConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid session config: {}", path.display()))
    }

    /// Parse and validate a configuration string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).context("Invalid TOML format in session config")?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values no session can run with.
    pub fn validate(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            bail!("region must not be empty");
        }
        if self.zone.as_deref().is_some_and(|z| z.trim().is_empty()) {
            bail!("zone must not be empty when set");
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            bail!("endpoint must be an http(s) URL: {}", self.endpoint);
        }
        if self.poll_interval == 0 {
            bail!("poll_interval must be at least 1 second");
        }
        let t = &self.timeouts;
        for (name, secs) in [
            ("create", t.create),
            ("update", t.update),
            ("delete", t.delete),
            ("stop", t.stop),
        ] {
            if secs < self.poll_interval {
                bail!(
                    "timeouts.{name} ({secs}s) is shorter than poll_interval ({}s)",
                    self.poll_interval
                );
            }
        }
        let retry = &self.retry;
        if retry.delay > retry.max_wait || retry.busy_object_delay > retry.max_wait {
            bail!("retry delays must not exceed retry.max_wait ({}s)", self.retry.max_wait);
        }
        Ok(())
    }

    /// Delay between polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    /// Serialize back to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize session config")
    }
}
