//! Monitor Configuration
//!
//! Loaded from environment variables (a `.env` file is read first by the
//! binary). Alert channels are assembled into the opaque name -> config map
//! consumed by `alerts::build_channels`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::alerts::ChannelConfig;
use crate::constants::{
    self, DATA_DIR_NAME, DEFAULT_EMAIL_FROM, DEFAULT_MONITORED_DIRS, DEFAULT_SMTP_PORT, DEFAULT_SMTP_SERVER,
    FORENSICS_DIR_NAME,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("invalid manifest {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
}

/// One honeyfile entry of the startup manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoneyfileEntry {
    pub decoy_id: String,
    pub path: PathBuf,
    #[serde(default)]
    pub seed_locations: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub monitored_directories: Vec<PathBuf>,
    pub alert_timeout: Duration,
    pub queue_capacity: usize,
    pub channels: HashMap<String, ChannelConfig>,
    pub manifest_path: Option<PathBuf>,
    pub forensic_log_dir: PathBuf,
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (environment in production, a map in tests)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let monitored_directories = get("MONITORED_DIRECTORIES")
            .map(|list| std::env::split_paths(&list).collect())
            .unwrap_or_else(default_monitored_directories);

        let alert_timeout = get("ALERT_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .filter(|s: &u64| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or_else(constants::get_alert_timeout);

        let queue_capacity = get("DETECTION_QUEUE_CAPACITY")
            .and_then(|s| s.parse().ok())
            .filter(|c: &usize| *c > 0)
            .unwrap_or_else(constants::get_queue_capacity);

        let mut channels = HashMap::new();
        if let Some(url) = get("SLACK_WEBHOOK_URL") {
            let platform = get("WEBHOOK_PLATFORM").unwrap_or_else(|| "slack".to_string());
            channels.insert(
                "slack".to_string(),
                ChannelConfig::enabled()
                    .with("type", "webhook")
                    .with("url", url)
                    .with("platform", platform),
            );
        }

        // Email needs credentials, like the SMTP relay it talks to
        if let (Some(user), Some(password)) = (get("EMAIL_SMTP_USER"), get("EMAIL_SMTP_PASSWORD")) {
            channels.insert(
                "email".to_string(),
                ChannelConfig::enabled()
                    .with("smtp_server", get("EMAIL_SMTP_SERVER").unwrap_or_else(|| DEFAULT_SMTP_SERVER.to_string()))
                    .with(
                        "smtp_port",
                        get("EMAIL_SMTP_PORT").unwrap_or_else(|| DEFAULT_SMTP_PORT.to_string()),
                    )
                    .with("smtp_user", user)
                    .with("smtp_password", password)
                    .with("from", get("EMAIL_FROM").unwrap_or_else(|| DEFAULT_EMAIL_FROM.to_string()))
                    .with("to", get("EMAIL_TO").unwrap_or_default()),
            );
        }

        Self {
            monitored_directories,
            alert_timeout,
            queue_capacity,
            channels,
            manifest_path: get("HONEYFILE_MANIFEST").map(PathBuf::from),
            forensic_log_dir: get("FORENSIC_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_forensic_log_dir),
        }
    }
}

fn default_monitored_directories() -> Vec<PathBuf> {
    match dirs::home_dir() {
        Some(home) => DEFAULT_MONITORED_DIRS.iter().map(|d| home.join(d)).collect(),
        None => Vec::new(),
    }
}

fn default_forensic_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR_NAME)
        .join(FORENSICS_DIR_NAME)
}

/// Load the honeyfile manifest (JSON array of entries)
pub fn load_manifest(path: &Path) -> Result<Vec<HoneyfileEntry>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

// ============================================================================
// TESTS
// ============================================================================
