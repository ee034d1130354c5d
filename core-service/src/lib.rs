//! DecoyDNA Core - Honeyfile Detection & Alert Dispatch Engine
//!
//! Plants nothing by itself: operators register decoy files, the engine watches
//! the filesystem around them and turns every interaction into a forensic
//! snapshot that is persisted and fanned out to alert channels.

pub mod api;
pub mod constants;
pub mod logic;
