//! API Module
//!
//! Facade used by external collaborators (HTTP layer, persistence, the
//! monitor binary). Everything here goes through one process-wide engine.
//!
//! Usage:
//! - `api::install_engine(engine)` once at startup
//! - `api::register_honeyfile(..)`, `api::start_monitoring(..)`, ...

pub mod commands;

pub use commands::*;
