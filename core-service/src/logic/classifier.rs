//! Event Classifier
//!
//! Turns raw filesystem notifications into `Detection`s for tracked decoys.
//! Runs synchronously inside the watcher callback, so it only does a hash
//! lookup and a bounded enqueue per event.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify::event::{AccessKind, CreateKind, MetadataKind, ModifyKind, RenameMode};
use notify::EventKind as NotifyKind;
use parking_lot::Mutex;

use super::queue::DetectionQueue;
use super::registry::{normalize_path, HoneyfileRegistry};
use super::types::{Detection, EventKind};

// ============================================================================
// RAW EVENTS
// ============================================================================

/// Platform-neutral filesystem notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawKind {
    Created,
    Modified,
    Accessed,
    Renamed { from: PathBuf },
    /// Unpaired rename half: the path the file left
    RenameSource,
    /// Unpaired rename half: the path the file arrived at
    RenameTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFsEvent {
    pub kind: RawKind,
    /// Path after the event (rename destination)
    pub path: PathBuf,
    /// Set when the source already knows the event concerns a directory
    pub is_dir: bool,
}

impl RawFsEvent {
    pub fn new(kind: RawKind, path: impl Into<PathBuf>) -> Self {
        Self { kind, path: path.into(), is_dir: false }
    }

    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::new(RawKind::Created, path)
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(RawKind::Modified, path)
    }

    pub fn accessed(path: impl Into<PathBuf>) -> Self {
        Self::new(RawKind::Accessed, path)
    }

    pub fn renamed(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self::new(RawKind::Renamed { from: from.into() }, to)
    }

    pub fn rename_source(path: impl Into<PathBuf>) -> Self {
        Self::new(RawKind::RenameSource, path)
    }

    pub fn rename_target(path: impl Into<PathBuf>) -> Self {
        Self::new(RawKind::RenameTarget, path)
    }

    pub fn directory(mut self) -> Self {
        self.is_dir = true;
        self
    }
}

/// Map a `notify::Event` to zero or more raw events.
///
/// Removals are ignored: a decoy that disappears is not an interaction we can
/// enrich. `RenameMode::Both` carries the full move, so the `From`/`To` halves
/// that accompany it are dropped. Backends that only report `Any`/`Other`
/// (FSEvents) get one event per path; the path that no longer exists is the
/// source and the one that does is the target, and the classifier pairs them.
pub fn map_notify_event(event: &notify::Event) -> Vec<RawFsEvent> {
    let paths = &event.paths;

    let kind = match event.kind {
        NotifyKind::Create(CreateKind::Folder) => {
            return paths.iter().map(|p| RawFsEvent::created(p.clone()).directory()).collect();
        }
        NotifyKind::Create(_) => RawKind::Created,
        NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            return match (paths.first(), paths.get(1)) {
                (Some(from), Some(to)) => vec![RawFsEvent::renamed(from.clone(), to.clone())],
                _ => Vec::new(),
            };
        }
        NotifyKind::Modify(ModifyKind::Name(RenameMode::Any))
        | NotifyKind::Modify(ModifyKind::Name(RenameMode::Other)) => {
            return paths
                .iter()
                .map(|p| {
                    if p.exists() {
                        RawFsEvent::rename_target(p.clone())
                    } else {
                        RawFsEvent::rename_source(p.clone())
                    }
                })
                .collect();
        }
        NotifyKind::Modify(ModifyKind::Name(_)) => return Vec::new(),
        NotifyKind::Modify(ModifyKind::Metadata(MetadataKind::AccessTime)) => RawKind::Accessed,
        NotifyKind::Modify(_) => RawKind::Modified,
        NotifyKind::Access(AccessKind::Close(notify::event::AccessMode::Write)) => RawKind::Modified,
        NotifyKind::Access(_) => RawKind::Accessed,
        NotifyKind::Remove(_) | NotifyKind::Any | NotifyKind::Other => return Vec::new(),
    };

    paths.iter().map(|p| RawFsEvent::new(kind.clone(), p.clone())).collect()
}

// ============================================================================
// CLASSIFIER
// ============================================================================

pub struct EventClassifier {
    registry: Arc<HoneyfileRegistry>,
    queue: Arc<DetectionQueue>,
    enqueue_wait: Duration,
    /// Tracked path that left via an unpaired rename, waiting for its target
    pending_source: Mutex<Option<PathBuf>>,
    seen: AtomicU64,
    detected: AtomicU64,
}

impl EventClassifier {
    pub fn new(registry: Arc<HoneyfileRegistry>, queue: Arc<DetectionQueue>, enqueue_wait: Duration) -> Self {
        Self {
            registry,
            queue,
            enqueue_wait,
            pending_source: Mutex::new(None),
            seen: AtomicU64::new(0),
            detected: AtomicU64::new(0),
        }
    }

    /// Watcher callback entry point. Returns the number of detections enqueued.
    pub fn handle_notify_event(&self, event: &notify::Event) -> usize {
        map_notify_event(event)
            .into_iter()
            .filter(|raw| self.process(raw).is_some())
            .count()
    }

    /// Classify one raw event; enqueue and return the detection if it hit a decoy.
    pub fn process(&self, raw: &RawFsEvent) -> Option<Detection> {
        let detection = self.classify(raw)?;

        match self.queue.push(detection.clone(), self.enqueue_wait) {
            Ok(()) => {
                self.detected.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "Honeyfile {} {} at {}",
                    detection.decoy_id,
                    detection.event_kind,
                    detection.observed_path.display()
                );
                Some(detection)
            }
            Err(_) => {
                log::error!(
                    "Detection queue full ({}), dropped {} event on {}",
                    self.queue.capacity(),
                    detection.event_kind,
                    detection.decoy_id
                );
                None
            }
        }
    }

    /// Pure classification step (registry lookup, rename bookkeeping), no enqueue.
    pub fn classify(&self, raw: &RawFsEvent) -> Option<Detection> {
        self.seen.fetch_add(1, Ordering::Relaxed);

        if raw.is_dir || raw.path.is_dir() {
            return None;
        }
        let path = normalize_path(&raw.path);

        let (decoy_id, kind) = match &raw.kind {
            RawKind::Renamed { from } => {
                let from = normalize_path(from);
                if from != path {
                    self.registry.rename_canonical(&from, &path);
                }
                (self.registry.lookup_canonical(&path)?, EventKind::Moved)
            }
            RawKind::RenameSource => {
                let tracked = self.registry.lookup_canonical(&path).is_some();
                *self.pending_source.lock() = tracked.then_some(path);
                return None;
            }
            RawKind::RenameTarget => {
                if let Some(from) = self.pending_source.lock().take() {
                    if from != path {
                        self.registry.rename_canonical(&from, &path);
                    }
                }
                (self.registry.lookup_canonical(&path)?, EventKind::Moved)
            }
            RawKind::Created => (self.registry.lookup_canonical(&path)?, EventKind::Created),
            RawKind::Modified => (self.registry.lookup_canonical(&path)?, EventKind::Modified),
            RawKind::Accessed => (self.registry.lookup_canonical(&path)?, EventKind::Accessed),
        };

        Some(Detection::new(decoy_id, kind, path))
    }

    pub fn events_seen(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }

    pub fn detections_enqueued(&self) -> u64 {
        self.detected.load(Ordering::Relaxed)
    }

    pub fn registry(&self) -> &HoneyfileRegistry {
        &self.registry
    }
}

// ============================================================================
// TESTS
// ============================================================================
