//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.

use std::time::Duration;

/// Per-channel delivery ceiling (seconds)
pub const DEFAULT_ALERT_TIMEOUT_SECS: u64 = 10;

/// Maximum number of detections waiting for the processing loop
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// How long a watch callback may wait for queue space before dropping
pub const ENQUEUE_WAIT: Duration = Duration::from_millis(50);

/// Processing loop wake-up interval while the queue is empty
pub const QUEUE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Extra time granted to the processing loop on stop, on top of the alert timeout
pub const STOP_GRACE: Duration = Duration::from_secs(5);

/// Data directory name (under the platform local data dir)
pub const DATA_DIR_NAME: &str = "decoydna";

/// Forensic log sub-directory
pub const FORENSICS_DIR_NAME: &str = "forensics";

/// Default email sender
pub const DEFAULT_EMAIL_FROM: &str = "decoydna@enterprise.com";

/// Default SMTP relay
pub const DEFAULT_SMTP_SERVER: &str = "smtp.gmail.com";

/// Default SMTP port (STARTTLS)
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Directories watched when nothing else is configured (relative to home)
pub const DEFAULT_MONITORED_DIRS: [&str; 3] = ["Documents", "Desktop", "Downloads"];

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "DecoyDNA";

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Get the per-channel alert timeout from environment or use default
pub fn get_alert_timeout() -> Duration {
    let secs = std::env::var("ALERT_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|s: &u64| *s > 0)
        .unwrap_or(DEFAULT_ALERT_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

/// Get the detection queue capacity from environment or use default
pub fn get_queue_capacity() -> usize {
    std::env::var("DETECTION_QUEUE_CAPACITY")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|c: &usize| *c > 0)
        .unwrap_or(DEFAULT_QUEUE_CAPACITY)
}
