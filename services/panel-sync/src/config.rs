//! Configuration types for the panel-sync service

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use reqwest::Url;

use crate::policy::RetryPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub panels: Vec<PanelConfig>,
    #[serde(default)]
    pub jobs: JobConfig,
}

/// Remote server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// No timeout when absent: a hung request stalls only its own session
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: None,
        }
    }
}

impl ServerConfig {
    pub fn base_url(&self) -> crate::Result<Url> {
        Url::parse(&self.base_url).map_err(|e| crate::SyncError::InvalidUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })
    }

    /// Resolve a locator (absolute or relative to the base URL)
    pub fn resolve(&self, locator: &str) -> crate::Result<Url> {
        if locator.is_empty() {
            return Err(crate::SyncError::InvalidUrl {
                url: locator.to_string(),
                reason: "locator is empty".to_string(),
            });
        }
        self.base_url()?
            .join(locator)
            .map_err(|e| crate::SyncError::InvalidUrl {
                url: locator.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

/// Anti-forgery token settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default = "default_header_name")]
    pub header_name: String,
    /// Raw cookie string the token is read from
    #[serde(default)]
    pub cookies: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            header_name: default_header_name(),
            cookies: None,
        }
    }
}

/// Which collection a panel shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelKind {
    Activities,
    Tasks,
    SubTasks,
}

impl PanelKind {
    pub fn default_page_size(&self) -> u64 {
        match self {
            PanelKind::Activities => 5,
            PanelKind::Tasks | PanelKind::SubTasks => 1,
        }
    }
}

/// One polled panel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelConfig {
    pub name: String,
    pub kind: PanelKind,
    pub locator: String,
    #[serde(default)]
    pub initial_page_size: Option<u64>,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl PanelConfig {
    pub fn new(name: &str, kind: PanelKind, locator: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            locator: locator.to_string(),
            initial_page_size: None,
            interval_ms: default_interval_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn page_size(&self) -> u64 {
        self.initial_page_size
            .unwrap_or_else(|| self.kind.default_page_size())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Background job settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default = "default_create_locator")]
    pub create_locator: String,
    #[serde(default = "default_status_locator")]
    pub status_locator: String,
    #[serde(default = "default_job_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Treat a `failed` status as terminal instead of polling on
    #[serde(default)]
    pub stop_on_failure: bool,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            create_locator: default_create_locator(),
            status_locator: default_status_locator(),
            poll_interval_ms: default_job_poll_interval_ms(),
            stop_on_failure: false,
            retry: RetryPolicy::default(),
        }
    }
}

impl JobConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_cookie_name() -> String {
    "csrftoken".to_string()
}

fn default_header_name() -> String {
    "X-CSRFToken".to_string()
}

fn default_interval_ms() -> u64 {
    10_000
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_create_locator() -> String {
    "/github/add-repository".to_string()
}

fn default_status_locator() -> String {
    "/github/get-celery-task-status".to_string()
}

fn default_job_poll_interval_ms() -> u64 {
    2_000
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::SyncError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Check values serde cannot express
    pub fn validate(&self) -> crate::Result<()> {
        self.server.base_url()?;
        for panel in &self.panels {
            if panel.page_size() == 0 {
                return Err(crate::SyncError::Config(format!(
                    "Panel '{}' has initial_page_size 0",
                    panel.name
                )));
            }
            if panel.interval_ms == 0 {
                return Err(crate::SyncError::Config(format!(
                    "Panel '{}' has interval_ms 0",
                    panel.name
                )));
            }
            if panel.retry_delay_ms == 0 {
                return Err(crate::SyncError::Config(format!(
                    "Panel '{}' has retry_delay_ms 0",
                    panel.name
                )));
            }
            self.server.resolve(&panel.locator)?;
        }
        if self.jobs.poll_interval_ms == 0 {
            return Err(crate::SyncError::Config(
                "jobs.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        self.server.resolve(&self.jobs.create_locator)?;
        self.server.resolve(&self.jobs.status_locator)?;
        let mut names: Vec<&str> = self.panels.iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        if let Some(dup) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(crate::SyncError::Config(format!(
                "Duplicate panel name '{}'",
                dup[0]
            )));
        }
        Ok(())
    }
}
