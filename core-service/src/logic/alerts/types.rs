//! Alert Types

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

// ============================================================================
// SEVERITY
// ============================================================================

/// Alert severity, derived from the detection's event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertSeverity {
    Info = 0,
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "Info",
            AlertSeverity::Low => "Low",
            AlertSeverity::Medium => "Medium",
            AlertSeverity::High => "High",
            AlertSeverity::Critical => "Critical",
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "[INFO]",
            AlertSeverity::Low => "[LOW]",
            AlertSeverity::Medium => "[MEDIUM]",
            AlertSeverity::High => "[HIGH]",
            AlertSeverity::Critical => "[CRITICAL]",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "#3498db",
            AlertSeverity::Low => "#2ecc71",
            AlertSeverity::Medium => "#f1c40f",
            AlertSeverity::High => "#FFA500",
            AlertSeverity::Critical => "#FF0000",
        }
    }

    /// Color as a 24-bit integer (Discord embeds)
    pub fn color_value(&self) -> u32 {
        u32::from_str_radix(&self.color()[1..], 16).unwrap_or(0)
    }
}

// ============================================================================
// WEBHOOK PLATFORM
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookPlatform {
    Slack,
    Discord,
    MicrosoftTeams,
    Generic,
}

impl WebhookPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookPlatform::Slack => "slack",
            WebhookPlatform::Discord => "discord",
            WebhookPlatform::MicrosoftTeams => "teams",
            WebhookPlatform::Generic => "generic",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "slack" => WebhookPlatform::Slack,
            "discord" => WebhookPlatform::Discord,
            "teams" | "msteams" | "microsoft_teams" => WebhookPlatform::MicrosoftTeams,
            _ => WebhookPlatform::Generic,
        }
    }
}

// ============================================================================
// CHANNEL CONFIG
// ============================================================================

/// Externally supplied configuration for one channel.
///
/// `settings` are opaque construction parameters (url, smtp_server, to, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub enabled: bool,
    #[serde(default)]
    pub settings: HashMap<String, String>,
}

impl ChannelConfig {
    pub fn enabled() -> Self {
        Self { enabled: true, settings: HashMap::new() }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.settings.insert(key.to_string(), value.into());
        self
    }

    /// Non-empty setting value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.settings
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

// ============================================================================
// OUTCOME & ERRORS
// ============================================================================

/// Per-channel delivery result for one detection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertOutcome {
    pub results: BTreeMap<String, bool>,
}

impl AlertOutcome {
    pub fn record(&mut self, channel: impl Into<String>, success: bool) {
        self.results.insert(channel.into(), success);
    }

    pub fn get(&self, channel: &str) -> Option<bool> {
        self.results.get(channel).copied()
    }

    pub fn delivered(&self) -> usize {
        self.results.values().filter(|ok| **ok).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.delivered()
    }

    pub fn all_delivered(&self) -> bool {
        self.results.values().all(|ok| *ok)
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Channel-level delivery failure. Never escapes the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlertError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rejected with status {status}")]
    Rejected { status: u16 },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("timed out")]
    Timeout,
}
