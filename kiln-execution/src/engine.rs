//! The embedded engine seam
//!
//! The runtime emulator is opaque to the supervisor: it accepts a
//! configuration payload and exposes readiness, reconfiguration, and
//! disposal. In-process engines implement this trait; the subprocess path
//! speaks the same contract over stdio instead.

use async_trait::async_trait;
use thiserror::Error;

use kiln_ipc::{EngineOptions, EngineReady};

#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine's own controlled startup failure path. The engine has
    /// already printed its diagnostics, so callers log the message without
    /// a full error chain.
    #[error("{0}")]
    Runtime(String),

    #[error("Invalid engine configuration: {0}")]
    Config(String),

    #[error("Engine already disposed")]
    Disposed,
}

/// An in-process runtime emulator.
#[async_trait]
pub trait DevEngine: Send + Sync {
    /// Start serving `options`. Resolves once the engine is ready, with the
    /// ports it actually bound.
    async fn start(&self, options: EngineOptions) -> Result<EngineReady, EngineError>;

    /// Reconfigure a running engine in place, retaining in-memory state
    /// (emulated storage, the bound listener).
    async fn update(&self, options: EngineOptions) -> Result<EngineReady, EngineError>;

    /// Tear down the engine. Idempotent; called fire-and-forget.
    async fn dispose(&self) -> Result<(), EngineError>;
}
