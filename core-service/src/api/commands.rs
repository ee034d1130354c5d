//! Engine Commands - External Interface
//!
//! Register honeyfiles, drive the monitoring lifecycle, read status and
//! intercept detections. Errors are returned as strings so any transport can
//! carry them unchanged.

use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::logic::engine::{EngineStatus, MonitoringEngine, StartedInfo};
use crate::logic::events::{DetectionHandler, SubscriptionGuard};
use crate::logic::forensics;
use crate::logic::types::{DecoyRecord, Detection, EventKind};

// ============================================================================
// GLOBAL STATE
// ============================================================================

static ENGINE: Lazy<RwLock<Option<Arc<MonitoringEngine>>>> = Lazy::new(|| RwLock::new(None));

const NOT_INSTALLED: &str = "monitoring engine not initialized";

fn engine() -> Result<Arc<MonitoringEngine>, String> {
    ENGINE.read().clone().ok_or_else(|| NOT_INSTALLED.to_string())
}

// ============================================================================
// DATA STRUCTURES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterHoneyfileRequest {
    pub decoy_id: String,
    pub path: PathBuf,
    #[serde(default)]
    pub seed_locations: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoneyfileInfo {
    pub decoy_id: String,
    pub path: String,
    pub seed_roots: Vec<String>,
}

impl From<DecoyRecord> for HoneyfileInfo {
    fn from(record: DecoyRecord) -> Self {
        Self {
            decoy_id: record.decoy_id,
            path: record.canonical_path.display().to_string(),
            seed_roots: record.seed_roots.iter().map(|p| p.display().to_string()).collect(),
        }
    }
}

// ============================================================================
// COMMANDS
// ============================================================================

/// Install the engine used by every command. Returns the previous one.
pub fn install_engine(engine: Arc<MonitoringEngine>) -> Option<Arc<MonitoringEngine>> {
    log::info!("Monitoring engine installed");
    ENGINE.write().replace(engine)
}

/// Remove the installed engine, stopping it first
pub fn uninstall_engine() -> Option<Arc<MonitoringEngine>> {
    let previous = ENGINE.write().take();
    if let Some(engine) = &previous {
        engine.stop();
    }
    previous
}

pub fn register_honeyfile(request: RegisterHoneyfileRequest) -> Result<(), String> {
    if request.decoy_id.trim().is_empty() {
        return Err("decoy_id must not be empty".to_string());
    }
    let engine = engine()?;
    engine.register_honeyfile(&request.path, &request.decoy_id, &request.seed_locations);
    Ok(())
}

pub fn list_honeyfiles() -> Result<Vec<HoneyfileInfo>, String> {
    Ok(engine()?.registered_honeyfiles().into_iter().map(HoneyfileInfo::from).collect())
}

pub fn start_monitoring(directories: Option<Vec<PathBuf>>) -> Result<StartedInfo, String> {
    let engine = engine()?;
    engine.start(directories.as_deref()).map_err(|e| e.to_string())
}

pub fn stop_monitoring() -> Result<(), String> {
    engine()?.stop();
    Ok(())
}

pub fn get_status() -> Result<EngineStatus, String> {
    Ok(engine()?.status())
}

/// Route detections to `handler` until the returned guard is dropped
pub fn subscribe_detections(handler: Arc<dyn DetectionHandler>) -> Result<SubscriptionGuard, String> {
    Ok(engine()?.subscribe(handler))
}

pub fn list_alert_channels() -> Result<Vec<String>, String> {
    Ok(engine()?.dispatcher().channel_names())
}

/// Send a synthetic detection to one channel
pub async fn send_test_alert(channel: &str) -> Result<bool, String> {
    let engine = engine()?;
    let detection = Detection::new("test-decoy", EventKind::Accessed, PathBuf::from("/decoydna/test-alert.docx"));
    let snapshot = forensics::collect(&detection);

    engine
        .dispatcher()
        .send_test(channel, &snapshot)
        .await
        .map_err(|e| e.to_string())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::engine::EngineOptions;
    use parking_lot::{const_mutex, Mutex};
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    // The facade is process-wide; keep its tests serial
    static SERIAL: Mutex<()> = const_mutex(());

    fn fresh_engine() -> Arc<MonitoringEngine> {
        let options = EngineOptions {
            queue_capacity: 16,
            enqueue_wait: Duration::from_millis(10),
            poll_interval: Duration::from_millis(50),
            alert_timeout: Duration::from_millis(500),
        };
        let engine = Arc::new(MonitoringEngine::new(options, Vec::new()));
        uninstall_engine();
        install_engine(Arc::clone(&engine));
        engine
    }

    #[test]
    fn test_commands_without_engine() {
        let _lock = SERIAL.lock();
        uninstall_engine();

        assert_eq!(get_status().unwrap_err(), NOT_INSTALLED);
        assert!(start_monitoring(None).is_err());
    }

    #[test]
    fn test_register_and_lifecycle() {
        let _lock = SERIAL.lock();
        let _engine = fresh_engine();
        let dir = tempdir().unwrap();
        let decoy = dir.path().join("passwords.xlsx");
        fs::write(&decoy, b"decoy").unwrap();

        register_honeyfile(RegisterHoneyfileRequest {
            decoy_id: "d1".to_string(),
            path: decoy,
            seed_locations: Vec::new(),
        })
        .unwrap();
        assert_eq!(list_honeyfiles().unwrap()[0].decoy_id, "d1");

        let info = start_monitoring(Some(vec![dir.path().to_path_buf()])).unwrap();
        assert_eq!(info.honeyfiles, 1);
        assert!(get_status().unwrap().running);
        assert!(start_monitoring(None).unwrap_err().contains("already running"));

        stop_monitoring().unwrap();
        stop_monitoring().unwrap();
        assert!(!get_status().unwrap().running);
        uninstall_engine();
    }

    #[test]
    fn test_rejects_empty_decoy_id() {
        let _lock = SERIAL.lock();
        let _engine = fresh_engine();

        let request = RegisterHoneyfileRequest {
            decoy_id: "  ".to_string(),
            path: PathBuf::from("/tmp/x"),
            seed_locations: Vec::new(),
        };
        assert!(register_honeyfile(request).is_err());
        uninstall_engine();
    }

    #[tokio::test]
    async fn test_send_test_alert_unknown_channel() {
        let _lock = SERIAL.lock();
        let _engine = fresh_engine();

        assert!(list_alert_channels().unwrap().is_empty());
        assert!(send_test_alert("slack").await.unwrap_err().contains("not found"));
        uninstall_engine();
    }
}
