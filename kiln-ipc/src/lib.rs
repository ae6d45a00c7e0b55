//! Engine wire protocol for Kiln
//!
//! The runtime emulator is driven through two one-way channels: a JSON
//! options payload handed to it at startup, and newline-delimited JSON
//! control frames it emits on its structured output channel. This crate
//! defines both, plus the incremental scanner that picks the debug-listener
//! announcement out of the engine's diagnostic stream.

pub mod announce;
pub mod error;
pub mod protocol;

// Re-export main types
pub use announce::{scan, AnnouncementScanner};
pub use error::{IpcError, Result};
pub use protocol::{EngineMessage, EngineOptions, EngineReady};
