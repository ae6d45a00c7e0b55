//! Error types for instance supervision

use thiserror::Error;

use crate::engine::EngineError;
use crate::ports::PortWaitError;

/// Errors surfaced by launching and supervising runtime instances.
///
/// Work abandoned because its generation was superseded never produces an
/// error; cancellation is silent by design.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Port {port} is unavailable: {source}")]
    PortUnavailable {
        port: u16,
        #[source]
        source: PortWaitError,
    },

    #[error("Failed to spawn engine process: {0}")]
    SpawnFailure(String),

    #[error("Malformed readiness message: {0}")]
    MalformedReadiness(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Invalid instance state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IPC error: {0}")]
    Ipc(#[from] kiln_ipc::IpcError),
}

pub type Result<T> = std::result::Result<T, ExecutionError>;
