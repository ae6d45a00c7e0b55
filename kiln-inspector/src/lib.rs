//! Debugger endpoint discovery for Kiln
//!
//! The engine exposes a standard browser-debug-protocol listing endpoint.
//! This crate finds the worker's own debugger target in that listing and
//! rewrites its websocket URL so tooling keyed on URL identity reattaches
//! after every restart, even when the physical address is unchanged.

pub mod bridge;
pub mod error;
pub mod types;

// Re-export main types
pub use bridge::{listing_url, InspectorBridge};
pub use error::{InspectorError, Result};
pub use types::{DebugTarget, InspectorTarget, USER_TARGET_PREFIX};
