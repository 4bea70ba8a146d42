//! Settings Models
//!
//! Client configuration stored in config.json. Every section has defaults so
//! a partial file (or none at all) is valid.

use std::time::Duration;

use seo_pipeline_api::BackendConfig;
use seo_pipeline_core::Stage;
use serde::{Deserialize, Serialize};

/// Environment variable holding the bearer credential
pub const TOKEN_ENV: &str = "SEO_PIPELINE_TOKEN";
/// Environment variable overriding the backend base URL
pub const BASE_URL_ENV: &str = "SEO_PIPELINE_BASE_URL";

/// Client configuration stored in config.json
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub backend: BackendSettings,
    pub progress: ProgressSettings,
    pub poller: PollerSettings,
    pub registry: RegistrySettings,
    pub resume: ResumeSettings,
    pub messages: MessageSettings,
    pub logging: LoggingSettings,
}

/// Backend connection and stage dispatch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    #[serde(flatten)]
    pub connection: BackendConfig,
    /// Stages whose progress is also pushed by the backend
    pub streaming_stages: Vec<Stage>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            connection: BackendConfig::default(),
            streaming_stages: vec![Stage::LsiAnalysis],
        }
    }
}

/// Progress simulation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressSettings {
    pub tick_ms: u64,
    pub fast_tick_ms: u64,
    /// Simulated progress stays strictly below this value
    pub cap: u8,
    pub min_increment: u8,
    pub max_increment: u8,
    pub fast_min_increment: u8,
    pub fast_max_increment: u8,
    /// How long 100% stays visible before resetting to idle
    pub hold_ms: u64,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            fast_tick_ms: 50,
            cap: 85,
            min_increment: 1,
            max_increment: 8,
            fast_min_increment: 15,
            fast_max_increment: 25,
            hold_ms: 1000,
        }
    }
}

impl ProgressSettings {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn fast_tick(&self) -> Duration {
        Duration::from_millis(self.fast_tick_ms)
    }

    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }
}

/// Background task poller parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerSettings {
    /// Interval while jobs are running
    pub active_interval_secs: u64,
    /// Interval while idle or after a failed poll
    pub idle_interval_secs: u64,
    pub refresh_debounce_ms: u64,
    /// Refresh on any job-count change; when false only on a decrease
    pub refresh_on_count_change: bool,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            active_interval_secs: 2,
            idle_interval_secs: 10,
            refresh_debounce_ms: 100,
            refresh_on_count_change: true,
        }
    }
}

impl PollerSettings {
    pub fn active_interval(&self) -> Duration {
        Duration::from_secs(self.active_interval_secs)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }

    pub fn refresh_debounce(&self) -> Duration {
        Duration::from_millis(self.refresh_debounce_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub safety_timeout_secs: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            safety_timeout_secs: 30,
        }
    }
}

impl RegistrySettings {
    pub fn safety_timeout(&self) -> Duration {
        Duration::from_secs(self.safety_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResumeSettings {
    /// Delay between startup and re-invoking a resumed stage
    pub settle_delay_ms: u64,
    /// Stages that leave a resume ticket when they need authorization
    pub resumable_stages: Vec<Stage>,
}

impl Default for ResumeSettings {
    fn default() -> Self {
        Self {
            settle_delay_ms: 1000,
            resumable_stages: vec![Stage::Parsing],
        }
    }
}

impl ResumeSettings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageSettings {
    /// Success messages disappear after this long; errors persist
    pub success_ttl_ms: u64,
}

impl Default for MessageSettings {
    fn default() -> Self {
        Self {
            success_ttl_ms: 4000,
        }
    }
}

impl MessageSettings {
    pub fn success_ttl(&self) -> Duration {
        Duration::from_millis(self.success_ttl_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// trace, debug, info, warn, or error
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Apply overrides (typically from the environment) on top of the file.
    pub fn apply_overrides(&mut self, base_url: Option<String>, token: Option<String>) {
        if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
            self.backend.connection.base_url = url;
        }
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.backend.connection.bearer_token = Some(token);
        }
    }

    /// Apply `SEO_PIPELINE_BASE_URL` / `SEO_PIPELINE_TOKEN`.
    pub fn apply_env(&mut self) {
        self.apply_overrides(std::env::var(BASE_URL_ENV).ok(), std::env::var(TOKEN_ENV).ok());
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        url::Url::parse(&self.backend.connection.base_url).map_err(|e| {
            format!(
                "Invalid backend base_url '{}': {}",
                self.backend.connection.base_url, e
            )
        })?;

        if self.backend.connection.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be at least 1".to_string());
        }

        let p = &self.progress;
        if p.tick_ms == 0 || p.fast_tick_ms == 0 {
            return Err("progress tick intervals must be non-zero".to_string());
        }
        if p.cap == 0 || p.cap > 99 {
            return Err(format!("progress cap must be within 1..=99, got {}", p.cap));
        }
        if p.min_increment == 0 || p.min_increment > p.max_increment {
            return Err(format!(
                "invalid progress increment range {}..={}",
                p.min_increment, p.max_increment
            ));
        }
        if p.fast_min_increment == 0 || p.fast_min_increment > p.fast_max_increment {
            return Err(format!(
                "invalid fast-complete increment range {}..={}",
                p.fast_min_increment, p.fast_max_increment
            ));
        }

        if self.poller.active_interval_secs == 0 || self.poller.idle_interval_secs == 0 {
            return Err("poller intervals must be non-zero".to_string());
        }

        if self.registry.safety_timeout_secs == 0 {
            return Err("registry safety_timeout_secs must be at least 1".to_string());
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(format!("Invalid log level: {}", self.logging.level));
        }

        Ok(())
    }
}
