//! Monitoring Engine
//!
//! Owns the registry, the detection queue and the alert dispatcher, and runs
//! the lifecycle `Stopped -> Starting -> Running -> Stopping -> Stopped`.
//!
//! While running there are three execution contexts:
//! - the `notify` watcher thread, which calls the classifier per raw event
//! - the processing loop thread, which drains the queue and runs
//!   collect -> handler -> dispatch for each detection
//! - the alert tasks spawned by the dispatcher inside the loop's runtime
//!
//! Stop abandons the queue: the detection in progress finishes, anything still
//! queued stays queued and is processed after the next `start()`.

use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::alerts::{AlertChannel, AlertDispatcher, AlertOutcome};
use super::classifier::EventClassifier;
use super::events::{DetectionHandler, HandlerSlot, SubscriptionGuard};
use super::forensics;
use super::queue::DetectionQueue;
use super::registry::{normalize_path, HoneyfileRegistry};
use super::types::{DecoyRecord, Detection, ForensicSnapshot};
use crate::constants::{self, ENQUEUE_WAIT, QUEUE_POLL_INTERVAL, STOP_GRACE};

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no directories to monitor")]
    NoDirectories,
    #[error("monitoring is already running")]
    AlreadyRunning,
    #[error("filesystem watch failed: {0}")]
    Watch(String),
    #[error("processing loop failed to start: {0}")]
    Thread(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub queue_capacity: usize,
    pub enqueue_wait: Duration,
    pub poll_interval: Duration,
    pub alert_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            queue_capacity: constants::get_queue_capacity(),
            enqueue_wait: ENQUEUE_WAIT,
            poll_interval: QUEUE_POLL_INTERVAL,
            alert_timeout: constants::get_alert_timeout(),
        }
    }
}

/// Returned by a successful `start()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedInfo {
    pub watched_roots: Vec<PathBuf>,
    pub honeyfiles: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub running: bool,
    pub state: EngineState,
    pub registry_size: usize,
    pub watched_roots: Vec<String>,
    pub queue_depth: usize,
    pub dropped_detections: u64,
    pub processed_detections: u64,
}

struct ActiveWatch {
    watcher: RecommendedWatcher,
    shutdown: Arc<AtomicBool>,
    worker: JoinHandle<()>,
}

/// Everything the processing loop needs, shared with the engine
struct Pipeline {
    queue: Arc<DetectionQueue>,
    handlers: Arc<HandlerSlot>,
    dispatcher: Arc<AlertDispatcher>,
    processed: AtomicU64,
    poll_interval: Duration,
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct MonitoringEngine {
    registry: Arc<HoneyfileRegistry>,
    classifier: Arc<EventClassifier>,
    pipeline: Arc<Pipeline>,
    state: RwLock<EngineState>,
    active: Mutex<Option<ActiveWatch>>,
    #[cfg(test)]
    fail_next_watch: AtomicBool,
}

impl MonitoringEngine {
    pub fn new(options: EngineOptions, channels: Vec<Arc<dyn AlertChannel>>) -> Self {
        let dispatcher = AlertDispatcher::with_channels(channels, options.alert_timeout);
        Self::with_dispatcher(options, dispatcher)
    }

    pub fn with_dispatcher(options: EngineOptions, dispatcher: AlertDispatcher) -> Self {
        let registry = Arc::new(HoneyfileRegistry::new());
        let queue = Arc::new(DetectionQueue::new(options.queue_capacity));
        let classifier = Arc::new(EventClassifier::new(
            Arc::clone(&registry),
            Arc::clone(&queue),
            options.enqueue_wait,
        ));

        Self {
            registry,
            classifier,
            pipeline: Arc::new(Pipeline {
                queue,
                handlers: HandlerSlot::new(),
                dispatcher: Arc::new(dispatcher),
                processed: AtomicU64::new(0),
                poll_interval: options.poll_interval,
            }),
            state: RwLock::new(EngineState::Stopped),
            active: Mutex::new(None),
            #[cfg(test)]
            fail_next_watch: AtomicBool::new(false),
        }
    }

    // ------------------------------------------------------------------------
    // Registration & handlers
    // ------------------------------------------------------------------------

    pub fn register_honeyfile(&self, path: &Path, decoy_id: &str, seed_locations: &[PathBuf]) {
        self.registry.register(path, decoy_id, seed_locations);
    }

    pub fn registered_honeyfiles(&self) -> Vec<DecoyRecord> {
        self.registry.records()
    }

    /// Replace the base detection handler (persistence)
    pub fn set_default_handler(&self, handler: Arc<dyn DetectionHandler>) {
        self.pipeline.handlers.set_base(handler);
    }

    /// Temporarily route detections to `handler` until the guard is dropped
    pub fn subscribe(&self, handler: Arc<dyn DetectionHandler>) -> SubscriptionGuard {
        self.pipeline.handlers.push(handler)
    }

    pub fn classifier(&self) -> &Arc<EventClassifier> {
        &self.classifier
    }

    pub fn registry(&self) -> &Arc<HoneyfileRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<AlertDispatcher> {
        &self.pipeline.dispatcher
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Start watching the union of `directories` and the registered roots.
    pub fn start(&self, directories: Option<&[PathBuf]>) -> Result<StartedInfo, EngineError> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        // Explicit directories join the registry's roots only once the watch is up
        let explicit: Vec<PathBuf> = directories
            .unwrap_or_default()
            .iter()
            .filter(|dir| existing_dir(dir))
            .map(|dir| normalize_path(dir))
            .collect();
        let mut roots: BTreeSet<PathBuf> = self
            .registry
            .watched_roots()
            .into_iter()
            .filter(|root| existing_dir(root))
            .collect();
        roots.extend(explicit.iter().cloned());
        if roots.is_empty() {
            return Err(EngineError::NoDirectories);
        }
        let roots: Vec<PathBuf> = roots.into_iter().collect();

        self.set_state(EngineState::Starting);
        match self.spawn_watch(&roots) {
            Ok(watch) => {
                for dir in &explicit {
                    self.registry.add_watched_root(dir);
                }
                *active = Some(watch);
                self.set_state(EngineState::Running);
                log::info!(
                    "Monitoring started: {} root(s), {} honeyfile(s)",
                    roots.len(),
                    self.registry.len()
                );
                Ok(StartedInfo { watched_roots: roots, honeyfiles: self.registry.len() })
            }
            Err(e) => {
                self.set_state(EngineState::Stopped);
                log::error!("Monitoring failed to start: {}", e);
                Err(e)
            }
        }
    }

    fn spawn_watch(&self, roots: &[PathBuf]) -> Result<ActiveWatch, EngineError> {
        #[cfg(test)]
        if self.fail_next_watch.swap(false, Ordering::SeqCst) {
            return Err(EngineError::Watch("watch backend unavailable".to_string()));
        }

        let classifier = Arc::clone(&self.classifier);
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    classifier.handle_notify_event(&event);
                }
                Err(e) => log::warn!("Filesystem watch error: {}", e),
            },
            Config::default(),
        )
        .map_err(|e| EngineError::Watch(e.to_string()))?;

        for root in roots {
            watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| EngineError::Watch(format!("{}: {}", root.display(), e)))?;
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| EngineError::Thread(e.to_string()))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let pipeline = Arc::clone(&self.pipeline);
        let flag = Arc::clone(&shutdown);
        let worker = thread::Builder::new()
            .name("decoydna-detections".to_string())
            .spawn(move || {
                pipeline.run(&runtime, &flag);
                runtime.shutdown_timeout(Duration::from_secs(1));
            })
            .map_err(|e| EngineError::Thread(e.to_string()))?;

        Ok(ActiveWatch { watcher, shutdown, worker })
    }

    /// Stop watching and processing. No-op when already stopped.
    pub fn stop(&self) {
        let mut active = self.active.lock();
        let Some(watch) = active.take() else {
            return;
        };
        self.set_state(EngineState::Stopping);

        let ActiveWatch { watcher, shutdown, worker } = watch;
        drop(watcher);
        shutdown.store(true, Ordering::SeqCst);
        self.pipeline.queue.wake_all();

        // In-flight alerts may run to their own timeout
        let deadline = Instant::now() + self.pipeline.dispatcher.timeout() + STOP_GRACE;
        while !worker.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        if worker.is_finished() {
            if worker.join().is_err() {
                log::error!("Processing loop panicked");
            }
        } else {
            log::warn!("Processing loop did not exit in time, detaching");
        }

        self.set_state(EngineState::Stopped);
        log::info!("Monitoring stopped ({} detection(s) still queued)", self.pipeline.queue.len());
    }

    pub fn is_running(&self) -> bool {
        *self.state.read() == EngineState::Running
    }

    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    pub fn status(&self) -> EngineStatus {
        let state = self.state();
        EngineStatus {
            running: state == EngineState::Running,
            state,
            registry_size: self.registry.len(),
            watched_roots: self
                .registry
                .watched_roots()
                .iter()
                .map(|r| r.display().to_string())
                .collect(),
            queue_depth: self.pipeline.queue.len(),
            dropped_detections: self.pipeline.queue.dropped(),
            processed_detections: self.pipeline.processed.load(Ordering::SeqCst),
        }
    }

    fn set_state(&self, state: EngineState) {
        *self.state.write() = state;
        log::debug!("Engine state -> {:?}", state);
    }
}

fn existing_dir(dir: &Path) -> bool {
    let exists = dir.is_dir();
    if !exists {
        log::warn!("Watched root {} does not exist, skipping", dir.display());
    }
    exists
}

impl Drop for MonitoringEngine {
    fn drop(&mut self) {
        self.stop();
        self.registry.clear();
    }
}

// ============================================================================
// PROCESSING LOOP
// ============================================================================

impl Pipeline {
    fn run(&self, runtime: &tokio::runtime::Runtime, shutdown: &AtomicBool) {
        log::info!("Detection processing loop started");

        while !shutdown.load(Ordering::SeqCst) {
            let Some(detection) = self.queue.pop_timeout(self.poll_interval) else {
                continue;
            };
            self.process(runtime, detection);
        }

        log::info!("Detection processing loop stopped");
    }

    /// collect -> handler -> dispatch; failures stay inside this detection
    fn process(&self, runtime: &tokio::runtime::Runtime, detection: Detection) {
        let snapshot = match catch_unwind(AssertUnwindSafe(|| forensics::collect(&detection))) {
            Ok(snapshot) => snapshot,
            Err(_) => {
                log::error!("Forensic collection panicked for {}", detection.decoy_id);
                return;
            }
        };

        let handler = self.handlers.active();
        if let Some(handler) = &handler {
            notify_handler(&snapshot, || handler.on_snapshot(&snapshot));
        }

        let outcome: AlertOutcome = runtime.block_on(self.dispatcher.dispatch(&snapshot));

        if let Some(handler) = &handler {
            notify_handler(&snapshot, || handler.on_alert_outcome(&snapshot, &outcome));
        }
        self.processed.fetch_add(1, Ordering::SeqCst);
    }
}

fn notify_handler(snapshot: &ForensicSnapshot, call: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(call)).is_err() {
        log::error!("Detection handler panicked on snapshot {}", snapshot.id);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::classifier::RawFsEvent;
    use crate::logic::types::EventKind;
    use std::fs;
    use std::sync::mpsc;
    use tempfile::tempdir;

    fn options() -> EngineOptions {
        EngineOptions {
            queue_capacity: 32,
            enqueue_wait: Duration::from_millis(10),
            poll_interval: Duration::from_millis(50),
            alert_timeout: Duration::from_millis(500),
        }
    }

    #[test]
    fn test_stop_before_start_is_noop() {
        let engine = MonitoringEngine::new(options(), Vec::new());
        engine.stop();
        assert!(!engine.status().running);
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[test]
    fn test_start_without_directories() {
        let engine = MonitoringEngine::new(options(), Vec::new());
        assert!(matches!(engine.start(None), Err(EngineError::NoDirectories)));

        let dir = tempdir().unwrap();
        let missing = vec![dir.path().join("missing")];
        assert!(matches!(engine.start(Some(missing.as_slice())), Err(EngineError::NoDirectories)));
        assert_eq!(engine.state(), EngineState::Stopped);
        assert!(engine.status().watched_roots.is_empty());
    }

    #[test]
    fn test_missing_explicit_directory_is_not_remembered() {
        let dir = tempdir().unwrap();
        let engine = MonitoringEngine::new(options(), Vec::new());
        let dirs = vec![dir.path().to_path_buf(), dir.path().join("missing")];

        let info = engine.start(Some(dirs.as_slice())).unwrap();
        assert_eq!(info.watched_roots, vec![normalize_path(dir.path())]);
        assert_eq!(engine.status().watched_roots, vec![normalize_path(dir.path()).display().to_string()]);
        engine.stop();
    }

    #[test]
    fn test_failed_watch_leaves_engine_stopped() {
        let dir = tempdir().unwrap();
        let engine = MonitoringEngine::new(options(), Vec::new());
        let roots = vec![dir.path().to_path_buf()];

        engine.fail_next_watch.store(true, Ordering::SeqCst);
        assert!(matches!(engine.start(Some(roots.as_slice())), Err(EngineError::Watch(_))));
        assert_eq!(engine.state(), EngineState::Stopped);
        let status = engine.status();
        assert!(!status.running);
        assert!(status.watched_roots.is_empty());
        engine.stop();

        let info = engine.start(Some(roots.as_slice())).unwrap();
        assert_eq!(info.watched_roots.len(), 1);
        assert!(engine.is_running());
        engine.stop();
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let dir = tempdir().unwrap();
        let engine = MonitoringEngine::new(options(), Vec::new());
        let roots = vec![dir.path().to_path_buf()];

        let info = engine.start(Some(roots.as_slice())).unwrap();
        assert_eq!(info.watched_roots.len(), 1);
        assert!(matches!(engine.start(None), Err(EngineError::AlreadyRunning)));
        assert!(engine.status().running);

        engine.stop();
        assert!(!engine.status().running);
        engine.start(None).unwrap();
        engine.stop();
    }

    #[test]
    fn test_seed_roots_are_watched() {
        let seed = tempdir().unwrap();
        let decoy = seed.path().join("secret.docx");
        fs::write(&decoy, b"decoy").unwrap();

        let engine = MonitoringEngine::new(options(), Vec::new());
        engine.register_honeyfile(&decoy, "d1", &[seed.path().to_path_buf()]);

        let info = engine.start(None).unwrap();
        assert_eq!(info.honeyfiles, 1);
        assert_eq!(engine.status().watched_roots.len(), 1);
        engine.stop();
    }

    #[test]
    fn test_panicking_handler_does_not_stop_loop() {
        let dir = tempdir().unwrap();
        let decoy = dir.path().join("secret.docx");
        fs::write(&decoy, b"decoy").unwrap();

        let engine = MonitoringEngine::new(options(), Vec::new());
        engine.register_honeyfile(&decoy, "d1", &[]);
        engine.start(Some(vec![dir.path().to_path_buf()].as_slice())).unwrap();

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let calls = AtomicU64::new(0);
        let _guard = engine.subscribe(Arc::new(move |snapshot: &ForensicSnapshot| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("handler failure");
            }
            let _ = tx.lock().send(snapshot.event_kind());
        }));

        engine.classifier().process(&RawFsEvent::accessed(&decoy)).unwrap();
        engine.classifier().process(&RawFsEvent::modified(&decoy)).unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(10)).unwrap(), EventKind::Modified);
        engine.stop();
        assert_eq!(engine.status().processed_detections, 2);
    }

    #[test]
    fn test_queued_detections_survive_restart() {
        let dir = tempdir().unwrap();
        let decoy = dir.path().join("secret.docx");
        fs::write(&decoy, b"decoy").unwrap();

        let engine = MonitoringEngine::new(options(), Vec::new());
        engine.register_honeyfile(&decoy, "d1", &[]);

        // Classified while stopped: stays queued
        engine.classifier().process(&RawFsEvent::accessed(&decoy)).unwrap();
        assert_eq!(engine.status().queue_depth, 1);

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        engine.set_default_handler(Arc::new(move |snapshot: &ForensicSnapshot| {
            let _ = tx.lock().send(snapshot.decoy_id().to_string());
        }));
        engine.start(Some(vec![dir.path().to_path_buf()].as_slice())).unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(10)).unwrap(), "d1");
        engine.stop();
        assert_eq!(engine.status().queue_depth, 0);
    }
}
