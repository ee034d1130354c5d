//! Core Types - Decoys, Detections, Forensic Snapshots

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::alerts::AlertSeverity;

// ============================================================================
// DECOY RECORD
// ============================================================================

/// A registered honeyfile location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoyRecord {
    pub decoy_id: String,
    pub canonical_path: PathBuf,
    /// Directories eligible to hold same-named copies of this decoy
    pub seed_roots: BTreeSet<PathBuf>,
}

// ============================================================================
// DETECTION
// ============================================================================

/// Kind of interaction observed on a honeyfile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Modified,
    Accessed,
    Moved,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Modified => "modified",
            EventKind::Accessed => "accessed",
            EventKind::Moved => "moved",
        }
    }

    /// Reads are a warning; anything that changes or relocates the decoy is critical.
    pub fn severity(&self) -> AlertSeverity {
        match self {
            EventKind::Accessed => AlertSeverity::High,
            _ => AlertSeverity::Critical,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One qualifying interaction with a tracked decoy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub decoy_id: String,
    pub event_kind: EventKind,
    /// Canonical path after the event (destination for moves)
    pub observed_path: PathBuf,
    pub detected_at: DateTime<Utc>,
    #[serde(skip, default = "Instant::now")]
    pub detected_instant: Instant,
}

impl Detection {
    pub fn new(decoy_id: impl Into<String>, event_kind: EventKind, observed_path: PathBuf) -> Self {
        Self {
            decoy_id: decoy_id.into(),
            event_kind,
            observed_path,
            detected_at: Utc::now(),
            detected_instant: Instant::now(),
        }
    }
}

// ============================================================================
// FORENSIC SNAPSHOT
// ============================================================================

/// Who/where the detection was observed
///
/// Every field is optional; missing ones are listed in `ForensicSnapshot::absent`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActorIdentity {
    pub username: Option<String>,
    pub hostname: Option<String>,
    pub internal_ip: Option<String>,
    pub mac_address: Option<String>,
    pub os: Option<String>,
}

/// Process observed at collection time.
///
/// This is the monitoring process itself: filesystem notification APIs do not
/// expose the process that touched the file, so this is context, not attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessIdentity {
    pub name: String,
    pub pid: u32,
    pub command_line: String,
}

/// File metadata at collection time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStat {
    pub size: u64,
    pub accessed_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// Marker for a fact that could not be collected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsentField {
    pub field: String,
    pub reason: String,
}

/// Detection enriched with best-effort forensic context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForensicSnapshot {
    pub id: String,
    pub detection: Detection,
    pub severity: AlertSeverity,
    pub collected_at: DateTime<Utc>,
    pub actor: ActorIdentity,
    pub process: Option<ProcessIdentity>,
    pub file: Option<FileStat>,
    pub absent: Vec<AbsentField>,
}

impl ForensicSnapshot {
    pub fn decoy_id(&self) -> &str {
        &self.detection.decoy_id
    }

    pub fn event_kind(&self) -> EventKind {
        self.detection.event_kind
    }

    /// Whether `field` (e.g. `"file"`, `"actor.username"`) was recorded as missing
    pub fn is_absent(&self, field: &str) -> bool {
        self.absent.iter().any(|a| a.field == field)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
