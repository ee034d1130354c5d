//! Alerts Module - Notification Fan-out
//!
//! # Components
//! - `dispatcher.rs`: `AlertChannel` capability + concurrent dispatch with per-channel timeout
//! - `webhook.rs`: Slack / Discord / Teams / generic JSON webhooks
//! - `email.rs`: HTML email over a blocking SMTP transport
//! - `types.rs`: severity, channel config, outcome, errors

pub mod dispatcher;
pub mod email;
pub mod types;
pub mod webhook;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub use dispatcher::{AlertChannel, AlertDispatcher};
pub use email::{EmailChannel, EmailMessage, MailTransport, SmtpMailer};
pub use types::{AlertError, AlertOutcome, AlertSeverity, ChannelConfig, WebhookPlatform};
pub use webhook::WebhookChannel;

use crate::constants::{DEFAULT_EMAIL_FROM, DEFAULT_SMTP_PORT};

/// Build channels from the externally supplied configuration map.
///
/// Only the presence of required settings is checked. Disabled, unknown or
/// incomplete entries are skipped with a log line.
pub fn build_channels(configs: &HashMap<String, ChannelConfig>, timeout: Duration) -> Vec<Arc<dyn AlertChannel>> {
    let mut names: Vec<&String> = configs.keys().collect();
    names.sort();

    let mut channels: Vec<Arc<dyn AlertChannel>> = Vec::new();
    for name in names {
        let config = &configs[name];
        if !config.enabled {
            log::debug!("Alert channel {} disabled", name);
            continue;
        }

        let kind = config.get("type").unwrap_or(name.as_str()).to_lowercase();
        match kind.as_str() {
            "slack" | "discord" | "teams" | "webhook" => {
                let Some(url) = config.get("url") else {
                    log::warn!("Alert channel {} has no url, skipping", name);
                    continue;
                };
                let platform = WebhookPlatform::from_str(config.get("platform").unwrap_or(kind.as_str()));
                channels.push(Arc::new(WebhookChannel::new(name, url, platform)));
            }
            "email" => {
                let Some(server) = config.get("smtp_server") else {
                    log::warn!("Alert channel {} has no smtp_server, skipping", name);
                    continue;
                };
                let port = config
                    .get("smtp_port")
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(DEFAULT_SMTP_PORT);
                let mailer = SmtpMailer::new(
                    server,
                    port,
                    config.get("smtp_user").unwrap_or_default(),
                    config.get("smtp_password").unwrap_or_default(),
                    timeout,
                );
                let to: Vec<String> = config
                    .get("to")
                    .map(|list| {
                        list.split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or_default();
                let from = config.get("from").unwrap_or(DEFAULT_EMAIL_FROM);
                channels.push(Arc::new(EmailChannel::new(name, from, to, Arc::new(mailer))));
            }
            other => log::warn!("Unknown alert channel type {} for {}, skipping", other, name),
        }
    }

    log::info!("Configured {} alert channel(s)", channels.len());
    channels
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_channels_from_config() {
        let mut configs = HashMap::new();
        configs.insert(
            "slack".to_string(),
            ChannelConfig::enabled().with("url", "https://hooks.slack.com/services/T/B/X"),
        );
        configs.insert(
            "email".to_string(),
            ChannelConfig::enabled()
                .with("smtp_server", "smtp.example.com")
                .with("to", "soc@example.com, ir@example.com"),
        );
        configs.insert("teams".to_string(), ChannelConfig { enabled: false, ..ChannelConfig::enabled() });
        configs.insert("discord".to_string(), ChannelConfig::enabled());
        configs.insert("pager".to_string(), ChannelConfig::enabled().with("url", "https://example.com"));

        let channels = build_channels(&configs, Duration::from_secs(10));
        let names: Vec<&str> = channels.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["email", "slack"]);
    }

    #[test]
    fn test_type_setting_overrides_name() {
        let mut configs = HashMap::new();
        configs.insert(
            "soc-room".to_string(),
            ChannelConfig::enabled()
                .with("type", "webhook")
                .with("platform", "discord")
                .with("url", "https://discord.com/api/webhooks/1/x"),
        );

        let channels = build_channels(&configs, Duration::from_secs(10));
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name(), "soc-room");
    }
}
