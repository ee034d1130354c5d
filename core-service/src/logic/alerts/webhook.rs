//! Webhook Alert Channel
//!
//! Pushes a severity-colored message to Slack, Discord, Teams or a generic
//! JSON endpoint. Any non-2xx response counts as a failed delivery.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::json;

use super::dispatcher::AlertChannel;
use super::types::{AlertError, WebhookPlatform};
use crate::logic::types::ForensicSnapshot;

const ALERT_TITLE: &str = "DecoyDNA Honeyfile Access Detected";
const FOOTER: &str = "DecoyDNA Enterprise Monitoring";

pub struct WebhookChannel {
    name: String,
    url: String,
    platform: WebhookPlatform,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(name: &str, url: &str, platform: WebhookPlatform) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            platform,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AlertChannel for WebhookChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, snapshot: &ForensicSnapshot) -> Result<bool, AlertError> {
        let body = format_payload(self.platform, snapshot);

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| AlertError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            log::info!("Alert sent to {} ({})", self.name, self.platform.as_str());
            Ok(true)
        } else {
            Err(AlertError::Rejected { status: status.as_u16() })
        }
    }
}

// ============================================================================
// FORMATTING
// ============================================================================

/// Render the request body for `platform`
pub fn format_payload(platform: WebhookPlatform, snapshot: &ForensicSnapshot) -> String {
    match platform {
        WebhookPlatform::Slack => format_slack(snapshot),
        WebhookPlatform::Discord => format_discord(snapshot),
        WebhookPlatform::MicrosoftTeams => format_teams(snapshot),
        WebhookPlatform::Generic => snapshot.to_json(),
    }
}

/// Display fields shared by every platform: (title, value, short)
fn fields(snapshot: &ForensicSnapshot) -> Vec<(&'static str, String, bool)> {
    let unknown = || "unknown".to_string();
    let actor = &snapshot.actor;

    vec![
        ("Decoy ID", snapshot.decoy_id().chars().take(16).collect(), true),
        ("Event Type", snapshot.event_kind().to_string(), true),
        ("Username", actor.username.clone().unwrap_or_else(unknown), true),
        ("Hostname", actor.hostname.clone().unwrap_or_else(unknown), true),
        (
            "Process",
            snapshot.process.as_ref().map(|p| format!("{} ({})", p.name, p.pid)).unwrap_or_else(unknown),
            true,
        ),
        ("Timestamp", snapshot.detection.detected_at.to_rfc3339(), true),
        ("Path", snapshot.detection.observed_path.display().to_string(), false),
    ]
}

fn format_slack(snapshot: &ForensicSnapshot) -> String {
    let fields: Vec<_> = fields(snapshot)
        .into_iter()
        .map(|(title, value, short)| json!({ "title": title, "value": value, "short": short }))
        .collect();

    json!({
        "text": format!("{} {}", snapshot.severity.tag(), ALERT_TITLE),
        "attachments": [{
            "color": snapshot.severity.color(),
            "fields": fields,
            "footer": FOOTER,
            "ts": snapshot.collected_at.timestamp()
        }]
    })
    .to_string()
}

fn format_discord(snapshot: &ForensicSnapshot) -> String {
    let fields: Vec<_> = fields(snapshot)
        .into_iter()
        .map(|(name, value, inline)| json!({ "name": name, "value": value, "inline": inline }))
        .collect();

    json!({
        "embeds": [{
            "title": format!("{} {}", snapshot.severity.tag(), ALERT_TITLE),
            "color": snapshot.severity.color_value(),
            "fields": fields,
            "footer": { "text": FOOTER },
            "timestamp": snapshot.collected_at.to_rfc3339()
        }]
    })
    .to_string()
}

fn format_teams(snapshot: &ForensicSnapshot) -> String {
    let facts: Vec<_> = fields(snapshot)
        .into_iter()
        .map(|(name, value, _)| json!({ "name": name, "value": value }))
        .collect();

    json!({
        "@type": "MessageCard",
        "@context": "http://schema.org/extensions",
        "themeColor": snapshot.severity.color().trim_start_matches('#'),
        "summary": ALERT_TITLE,
        "sections": [{
            "activityTitle": format!("{} {}", snapshot.severity.tag(), ALERT_TITLE),
            "facts": facts
        }]
    })
    .to_string()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::forensics;
    use crate::logic::types::{Detection, EventKind};

    fn snapshot(kind: EventKind) -> ForensicSnapshot {
        forensics::collect(&Detection::new(
            "0123456789abcdef-long-tail",
            kind,
            "/home/alice/Documents/secret.docx".into(),
        ))
    }

    #[test]
    fn test_format_slack() {
        let body: serde_json::Value =
            serde_json::from_str(&format_payload(WebhookPlatform::Slack, &snapshot(EventKind::Accessed))).unwrap();

        let attachment = &body["attachments"][0];
        assert_eq!(attachment["color"], "#FFA500");
        assert_eq!(attachment["fields"][0]["value"], "0123456789abcdef");
        assert_eq!(attachment["fields"][1]["value"], "accessed");
        assert_eq!(attachment["fields"][6]["short"], false);
    }

    #[test]
    fn test_slack_color_is_red_for_modifications() {
        let body = format_payload(WebhookPlatform::Slack, &snapshot(EventKind::Modified));
        assert!(body.contains("#FF0000"));
    }

    #[test]
    fn test_format_discord() {
        let body: serde_json::Value =
            serde_json::from_str(&format_payload(WebhookPlatform::Discord, &snapshot(EventKind::Moved))).unwrap();

        assert_eq!(body["embeds"][0]["color"], 0xFF0000);
        assert!(body["embeds"][0]["title"].as_str().unwrap().contains("[CRITICAL]"));
    }

    #[test]
    fn test_format_teams() {
        let body = format_payload(WebhookPlatform::MicrosoftTeams, &snapshot(EventKind::Created));
        assert!(body.contains("MessageCard"));
        assert!(body.contains("secret.docx"));
    }

    #[test]
    fn test_generic_is_full_snapshot() {
        let snap = snapshot(EventKind::Accessed);
        let body: serde_json::Value = serde_json::from_str(&format_payload(WebhookPlatform::Generic, &snap)).unwrap();
        assert_eq!(body["id"], snap.id.as_str());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let channel = WebhookChannel::new("slack", "http://127.0.0.1:9/hook", WebhookPlatform::Slack);
        let result = channel.send(&snapshot(EventKind::Accessed)).await;
        assert!(matches!(result, Err(AlertError::Transport(_))));
    }
}
