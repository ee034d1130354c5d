//! Email Alert Channel
//!
//! Renders an HTML alert and hands it to a blocking `MailTransport` on the
//! blocking thread pool, so SMTP round-trips never stall the async dispatch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use super::dispatcher::AlertChannel;
use super::types::AlertError;
use crate::logic::types::ForensicSnapshot;

// ============================================================================
// TRANSPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
}

/// Blocking mail delivery
pub trait MailTransport: Send + Sync {
    fn send_mail(&self, message: &EmailMessage) -> Result<(), AlertError>;
}

/// SMTP relay with STARTTLS and login credentials
pub struct SmtpMailer {
    server: String,
    port: u16,
    username: String,
    password: String,
    timeout: Duration,
}

impl SmtpMailer {
    pub fn new(server: &str, port: u16, username: &str, password: &str, timeout: Duration) -> Self {
        Self {
            server: server.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
            timeout,
        }
    }
}

impl MailTransport for SmtpMailer {
    fn send_mail(&self, message: &EmailMessage) -> Result<(), AlertError> {
        let parse = |addr: &str| {
            addr.parse::<Mailbox>()
                .map_err(|e| AlertError::Config(format!("invalid address {}: {}", addr, e)))
        };

        let mut builder = Message::builder()
            .from(parse(&message.from)?)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_HTML);
        for to in &message.to {
            builder = builder.to(parse(to)?);
        }
        let email = builder
            .body(message.html_body.clone())
            .map_err(|e| AlertError::Config(e.to_string()))?;

        let mailer = SmtpTransport::starttls_relay(&self.server)
            .map_err(|e| AlertError::Transport(e.to_string()))?
            .port(self.port)
            .credentials(Credentials::new(self.username.clone(), self.password.clone()))
            .timeout(Some(self.timeout))
            .build();

        mailer
            .send(&email)
            .map(|_| ())
            .map_err(|e| AlertError::Transport(e.to_string()))
    }
}

// ============================================================================
// CHANNEL
// ============================================================================

pub struct EmailChannel {
    name: String,
    from: String,
    to: Vec<String>,
    transport: Arc<dyn MailTransport>,
}

impl EmailChannel {
    pub fn new(name: &str, from: &str, to: Vec<String>, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            name: name.to_string(),
            from: from.to_string(),
            to,
            transport,
        }
    }
}

#[async_trait]
impl AlertChannel for EmailChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, snapshot: &ForensicSnapshot) -> Result<bool, AlertError> {
        if self.to.is_empty() {
            log::warn!("Email channel {} has no recipients configured", self.name);
            return Ok(false);
        }

        let (subject, html_body) = render(snapshot);
        let message = EmailMessage {
            from: self.from.clone(),
            to: self.to.clone(),
            subject,
            html_body,
        };

        let transport = Arc::clone(&self.transport);
        tokio::task::spawn_blocking(move || transport.send_mail(&message))
            .await
            .map_err(|e| AlertError::Transport(format!("mail worker failed: {}", e)))??;

        log::info!("Alert emailed to {} recipient(s) via {}", self.to.len(), self.name);
        Ok(true)
    }
}

// ============================================================================
// TEMPLATE
// ============================================================================

/// Subject and HTML body for a snapshot
pub fn render(snapshot: &ForensicSnapshot) -> (String, String) {
    let kind = snapshot.event_kind().as_str().to_uppercase();
    let subject = format!("{} DecoyDNA ALERT: Honeyfile {} Detected", snapshot.severity.tag(), kind);

    let na = || "N/A".to_string();
    let actor = &snapshot.actor;
    let rows = [
        ("Alert Type", "Honeyfile Access Detected".to_string()),
        ("Event Type", kind.clone()),
        ("Decoy ID", format!("<code>{}</code>", escape_html(snapshot.decoy_id()))),
        ("Username", actor.username.as_deref().map(escape_html).unwrap_or_else(na)),
        ("Hostname", actor.hostname.as_deref().map(escape_html).unwrap_or_else(na)),
        ("Internal IP", actor.internal_ip.clone().unwrap_or_else(na)),
        ("Timestamp", snapshot.detection.detected_at.to_rfc3339()),
        (
            "Process",
            snapshot.process.as_ref().map(|p| escape_html(&p.name)).unwrap_or_else(na),
        ),
        (
            "Path",
            format!("<code>{}</code>", escape_html(&snapshot.detection.observed_path.display().to_string())),
        ),
    ];

    let mut table = String::new();
    for (i, (label, value)) in rows.iter().enumerate() {
        let background = if i % 2 == 0 { "#fff" } else { "#f9f9f9" };
        table.push_str(&format!(
            "<tr style=\"background: {bg};\">\
             <td style=\"padding: 10px; border: 1px solid #ddd;\"><strong>{label}:</strong></td>\
             <td style=\"padding: 10px; border: 1px solid #ddd;\">{value}</td></tr>\n",
            bg = background,
            label = label,
            value = value
        ));
    }

    let body = format!(
        "<html><body style=\"font-family: Arial, sans-serif;\">\
         <div style=\"background: #f0f0f0; padding: 20px; border-radius: 5px;\">\
         <h2 style=\"color: #d9534f;\">DECOY DNA SECURITY ALERT</h2>\
         <table style=\"width: 100%; border-collapse: collapse;\">\n{}</table>\
         <p style=\"margin-top: 20px; color: #666; font-size: 12px;\">\
         This is an automated alert from DecoyDNA Enterprise Monitoring System. \
         Immediate investigation is recommended.</p></div></body></html>",
        table
    );

    (subject, body)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::forensics;
    use crate::logic::types::{Detection, EventKind};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<EmailMessage>>,
        fail: bool,
    }

    impl MailTransport for RecordingTransport {
        fn send_mail(&self, message: &EmailMessage) -> Result<(), AlertError> {
            if self.fail {
                return Err(AlertError::Transport("connection refused".to_string()));
            }
            self.sent.lock().push(message.clone());
            Ok(())
        }
    }

    fn snapshot() -> ForensicSnapshot {
        forensics::collect(&Detection::new("d1", EventKind::Modified, "/srv/<share>/secret.docx".into()))
    }

    #[test]
    fn test_render_template() {
        let (subject, body) = render(&snapshot());

        assert!(subject.contains("Honeyfile MODIFIED Detected"));
        assert!(body.contains("DECOY DNA SECURITY ALERT"));
        assert!(body.contains("<code>d1</code>"));
        assert!(body.contains("&lt;share&gt;"));
    }

    #[tokio::test]
    async fn test_send_through_transport() {
        let transport = Arc::new(RecordingTransport::default());
        let channel = EmailChannel::new(
            "email",
            "decoydna@enterprise.com",
            vec!["soc@example.com".to_string()],
            transport.clone(),
        );

        assert_eq!(channel.send(&snapshot()).await, Ok(true));
        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["soc@example.com"]);
    }

    #[tokio::test]
    async fn test_no_recipients_declines() {
        let transport = Arc::new(RecordingTransport::default());
        let channel = EmailChannel::new("email", "decoydna@enterprise.com", Vec::new(), transport.clone());

        assert_eq!(channel.send(&snapshot()).await, Ok(false));
        assert!(transport.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_is_error() {
        let transport = Arc::new(RecordingTransport { fail: true, ..Default::default() });
        let channel = EmailChannel::new("email", "a@b.c", vec!["soc@example.com".to_string()], transport);

        assert!(matches!(channel.send(&snapshot()).await, Err(AlertError::Transport(_))));
    }
}
