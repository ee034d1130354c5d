//! Logic Module - Detection & Alert Dispatch
//!
//! ## Pipeline
//! - `registry` - canonical path -> decoy id mapping, watched roots
//! - `classifier` - raw filesystem notifications -> `Detection`
//! - `queue` - bounded FIFO between the watch callback and the processing loop
//! - `forensics` - best-effort forensic snapshot per detection
//! - `alerts` - concurrent fan-out to alert channels
//! - `engine` - lifecycle orchestration (watch + processing loop)

pub mod types;
pub mod registry;
pub mod classifier;
pub mod queue;
pub mod forensics;
pub mod events;
pub mod alerts;
pub mod engine;
pub mod forensic_log;
pub mod config;

pub use types::{DecoyRecord, Detection, EventKind, ForensicSnapshot};
pub use registry::HoneyfileRegistry;
pub use classifier::{EventClassifier, RawFsEvent};
pub use queue::DetectionQueue;
pub use events::{DetectionHandler, HandlerSlot, SubscriptionGuard};
pub use alerts::{AlertChannel, AlertDispatcher, AlertOutcome};
pub use engine::{EngineError, EngineOptions, EngineState, EngineStatus, MonitoringEngine, StartedInfo};
