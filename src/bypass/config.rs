//! Bypass Settings
//!
//! Where forwarded requests go and whether forwarding is on. Settings are
//! kept as a JSON file next to the queue data. A missing or unreadable file
//! falls back to defaults with forwarding disabled.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::bypass::error::{BypassError, BypassResult};
use crate::notifications::{HubEvent, Publisher};

static HOST_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.\-]+$").expect("host pattern is a valid regex"));

/// Forwarding target and switch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BypassConfig {
    pub enabled: bool,
    pub target_host: String,
    pub target_port: u16,
    pub target_uri: String,
    pub api_key: Option<String>,
    pub use_https: bool,
    #[serde(rename = "timeout", alias = "timeout_secs")]
    pub timeout_secs: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for BypassConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target_host: "api.openai.com".to_string(),
            target_port: 443,
            target_uri: "/v1/chat/completions".to_string(),
            api_key: None,
            use_https: false,
            timeout_secs: 60,
            updated_at: None,
        }
    }
}

impl BypassConfig {
    /// Check every field against its allowed range
    pub fn validate(&self) -> BypassResult<()> {
        if self.target_host.is_empty() {
            return Err(BypassError::validation("target_host cannot be empty"));
        }
        if !HOST_PATTERN.is_match(&self.target_host) {
            return Err(BypassError::validation(format!(
                "Invalid target_host format: {}",
                self.target_host
            )));
        }
        if self.target_port == 0 {
            return Err(BypassError::validation("target_port must be 1-65535, got 0"));
        }
        if !self.target_uri.starts_with('/') {
            return Err(BypassError::validation("target_uri must start with '/'"));
        }
        if !(1..=300).contains(&self.timeout_secs) {
            return Err(BypassError::validation(format!(
                "timeout must be 1-300 seconds, got {}",
                self.timeout_secs
            )));
        }
        Ok(())
    }

    /// Upstream URL, leaving out the port when it is the scheme default
    pub fn target_url(&self) -> String {
        let scheme = if self.use_https { "https" } else { "http" };
        let default_port = if self.use_https { 443 } else { 80 };
        if self.target_port == default_port {
            format!("{}://{}{}", scheme, self.target_host, self.target_uri)
        } else {
            format!(
                "{}://{}:{}{}",
                scheme, self.target_host, self.target_port, self.target_uri
            )
        }
    }

    /// Public rendering that never exposes the key
    pub fn view(&self) -> BypassConfigView {
        BypassConfigView {
            enabled: self.enabled,
            target_host: self.target_host.clone(),
            target_port: self.target_port,
            target_uri: self.target_uri.clone(),
            use_https: self.use_https,
            timeout: self.timeout_secs,
            api_key_configured: self.api_key.as_deref().is_some_and(|key| !key.is_empty()),
            updated_at: self.updated_at,
        }
    }
}

/// Settings as shown to operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BypassConfigView {
    pub enabled: bool,
    pub target_host: String,
    pub target_port: u16,
    pub target_uri: String,
    pub use_https: bool,
    pub timeout: u64,
    pub api_key_configured: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Partial settings change; absent fields keep their value
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BypassUpdate {
    pub target_host: Option<String>,
    pub target_port: Option<u32>,
    pub target_uri: Option<String>,
    /// An empty string removes the stored key
    pub api_key: Option<String>,
    pub use_https: Option<bool>,
    #[serde(alias = "timeout_secs")]
    pub timeout: Option<u64>,
}

impl BypassUpdate {
    fn apply_to(&self, config: &mut BypassConfig) -> BypassResult<()> {
        if let Some(host) = &self.target_host {
            config.target_host = host.trim().to_string();
        }
        if let Some(port) = self.target_port {
            config.target_port = u16::try_from(port)
                .map_err(|_| BypassError::validation(format!("target_port must be 1-65535, got {}", port)))?;
        }
        if let Some(uri) = &self.target_uri {
            config.target_uri = uri.clone();
        }
        if let Some(key) = &self.api_key {
            config.api_key = if key.is_empty() { None } else { Some(key.clone()) };
        }
        if let Some(use_https) = self.use_https {
            config.use_https = use_https;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        Ok(())
    }
}

/// Owner of the live bypass settings
pub struct BypassSettings {
    config: RwLock<BypassConfig>,
    path: Option<PathBuf>,
    publisher: Arc<dyn Publisher<HubEvent>>,
}

impl BypassSettings {
    /// Load settings from `path`, or use defaults when it is absent or unreadable
    pub async fn load(path: impl Into<PathBuf>, publisher: Arc<dyn Publisher<HubEvent>>) -> Self {
        let path = path.into();
        let config = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => match serde_json::from_str::<BypassConfig>(&contents) {
                Ok(config) => {
                    info!("Loaded bypass config from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Ignoring unreadable bypass config {}: {}", path.display(), e);
                    BypassConfig::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Bypass config {} not found, using defaults", path.display());
                BypassConfig::default()
            }
            Err(e) => {
                warn!("Cannot read bypass config {}: {}", path.display(), e);
                BypassConfig::default()
            }
        };

        Self {
            config: RwLock::new(config),
            path: Some(path),
            publisher,
        }
    }

    /// Settings that are never written to disk
    pub fn in_memory(config: BypassConfig, publisher: Arc<dyn Publisher<HubEvent>>) -> Self {
        Self {
            config: RwLock::new(config),
            path: None,
            publisher,
        }
    }

    /// Copy of the current settings, key included
    pub async fn current(&self) -> BypassConfig {
        self.config.read().await.clone()
    }

    pub async fn view(&self) -> BypassConfigView {
        self.config.read().await.view()
    }

    pub async fn is_enabled(&self) -> bool {
        self.config.read().await.enabled
    }

    /// Apply a partial update after validating the result
    pub async fn update(&self, update: BypassUpdate) -> BypassResult<BypassConfigView> {
        self.modify(|config| {
            update.apply_to(config)?;
            config.validate()
        })
        .await
    }

    /// Turn forwarding on; the target must be complete
    pub async fn enable(&self) -> BypassResult<BypassConfigView> {
        let view = self
            .modify(|config| {
                if config.target_host.is_empty() {
                    return Err(BypassError::validation("target_host is required"));
                }
                if config.target_port == 0 {
                    return Err(BypassError::validation("target_port is required"));
                }
                config.enabled = true;
                Ok(())
            })
            .await?;
        info!("Bypass enabled: {}:{}", view.target_host, view.target_port);
        Ok(view)
    }

    /// Turn forwarding off
    pub async fn disable(&self) -> BypassResult<BypassConfigView> {
        let view = self
            .modify(|config| {
                config.enabled = false;
                Ok(())
            })
            .await?;
        info!("Bypass disabled");
        Ok(view)
    }

    /// Change a copy, persist it, then install it and announce the change
    async fn modify<F>(&self, change: F) -> BypassResult<BypassConfigView>
    where
        F: FnOnce(&mut BypassConfig) -> BypassResult<()>,
    {
        let mut config = self.config.write().await;
        let mut next = config.clone();
        change(&mut next)?;
        next.updated_at = Some(Utc::now());

        if let Some(path) = &self.path {
            persist(path, &next).await?;
        }
        *config = next;

        let view = config.view();
        drop(config);

        match serde_json::to_value(&view) {
            Ok(value) => self.publisher.publish(HubEvent::BypassConfigUpdated { config: value }),
            Err(e) => debug!("Bypass config event skipped: {}", e),
        }
        Ok(view)
    }
}

async fn persist(path: &Path, config: &BypassConfig) -> BypassResult<()> {
    let bytes = serde_json::to_vec_pretty(config)
        .map_err(|e| BypassError::persistence(e.to_string()))?;
    let temp_path = path.with_extension("json.tmp");
    tokio::fs::write(&temp_path, &bytes)
        .await
        .map_err(|e| BypassError::persistence(format!("{}: {}", temp_path.display(), e)))?;
    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(|e| BypassError::persistence(format!("{}: {}", path.display(), e)))?;
    debug!("Bypass config persisted to {}", path.display());
    Ok(())
}
