//! Forensic Log
//!
//! Append-only JSONL record of every snapshot and its alert outcome, one file
//! per day. Serves as the default detection handler of the monitor binary.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::alerts::AlertOutcome;
use super::events::DetectionHandler;
use super::types::ForensicSnapshot;

const LOG_PREFIX: &str = "events-";
const LOG_EXT: &str = ".jsonl";

/// One line of the forensic log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum LogRecord {
    Detection { snapshot: ForensicSnapshot },
    AlertOutcome { snapshot_id: String, decoy_id: String, outcome: AlertOutcome },
}

struct OpenFile {
    day: NaiveDate,
    path: PathBuf,
    writer: BufWriter<File>,
}

pub struct ForensicLog {
    base_dir: PathBuf,
    current: Mutex<Option<OpenFile>>,
    records_written: AtomicU64,
}

impl ForensicLog {
    pub fn open(base_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        log::info!("Forensic log directory: {}", base_dir.display());

        Ok(Self {
            base_dir,
            current: Mutex::new(None),
            records_written: AtomicU64::new(0),
        })
    }

    pub fn append(&self, record: &LogRecord) -> std::io::Result<()> {
        let line = serde_json::to_string(record)?;
        let today = Utc::now().date_naive();

        let mut current = self.current.lock();
        if current.as_ref().map(|f| f.day != today).unwrap_or(true) {
            *current = Some(self.open_day(today)?);
        }
        if let Some(file) = current.as_mut() {
            file.writer.write_all(line.as_bytes())?;
            file.writer.write_all(b"\n")?;
            file.writer.flush()?;
        }

        self.records_written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn open_day(&self, day: NaiveDate) -> std::io::Result<OpenFile> {
        let path = self
            .base_dir
            .join(format!("{}{}{}", LOG_PREFIX, day.format("%Y%m%d"), LOG_EXT));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        log::info!("Opened forensic log: {}", path.display());

        Ok(OpenFile { day, path, writer: BufWriter::new(file) })
    }

    /// File currently being written, if any record was appended yet
    pub fn current_file(&self) -> Option<PathBuf> {
        self.current.lock().as_ref().map(|f| f.path.clone())
    }

    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::SeqCst)
    }
}

impl DetectionHandler for ForensicLog {
    fn on_snapshot(&self, snapshot: &ForensicSnapshot) {
        let record = LogRecord::Detection { snapshot: snapshot.clone() };
        if let Err(e) = self.append(&record) {
            log::error!("Failed to persist snapshot {}: {}", snapshot.id, e);
        }
    }

    fn on_alert_outcome(&self, snapshot: &ForensicSnapshot, outcome: &AlertOutcome) {
        let record = LogRecord::AlertOutcome {
            snapshot_id: snapshot.id.clone(),
            decoy_id: snapshot.decoy_id().to_string(),
            outcome: outcome.clone(),
        };
        if let Err(e) = self.append(&record) {
            log::error!("Failed to persist alert outcome for {}: {}", snapshot.id, e);
        }
    }
}

/// Read every record from a log file, skipping malformed lines
pub fn read_records(path: &Path) -> std::io::Result<Vec<LogRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LogRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => log::warn!("Skipping malformed forensic log line: {}", e),
        }
    }

    Ok(records)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::forensics;
    use crate::logic::types::{Detection, EventKind};
    use tempfile::TempDir;

    fn snapshot(decoy: &str) -> ForensicSnapshot {
        forensics::collect(&Detection::new(decoy, EventKind::Accessed, "/nonexistent/secret.docx".into()))
    }

    #[test]
    fn test_handler_writes_jsonl() {
        let temp_dir = TempDir::new().unwrap();
        let log = ForensicLog::open(temp_dir.path()).unwrap();

        let snap = snapshot("d1");
        let mut outcome = AlertOutcome::default();
        outcome.record("slack", true);
        outcome.record("email", false);

        log.on_snapshot(&snap);
        log.on_alert_outcome(&snap, &outcome);

        let path = log.current_file().unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().ends_with(".jsonl"));

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        match &records[0] {
            LogRecord::Detection { snapshot } => assert_eq!(snapshot.decoy_id(), "d1"),
            other => panic!("unexpected record {:?}", other),
        }
        match &records[1] {
            LogRecord::AlertOutcome { snapshot_id, outcome, .. } => {
                assert_eq!(snapshot_id, &snap.id);
                assert_eq!(outcome.get("email"), Some(false));
            }
            other => panic!("unexpected record {:?}", other),
        }
        assert_eq!(log.records_written(), 2);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let log = ForensicLog::open(temp_dir.path()).unwrap();
        log.on_snapshot(&snapshot("d1"));

        let path = log.current_file().unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "not json").unwrap();
        drop(file);
        log.on_snapshot(&snapshot("d2"));

        assert_eq!(read_records(&path).unwrap().len(), 2);
    }
}
