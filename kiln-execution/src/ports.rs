//! Waiting for a network port to come free
//!
//! A relaunch may race the previous instance's teardown for the same port.
//! Rather than blocking on process exit, the launcher polls bindability
//! until the port frees up or the deadline passes.

use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tracing::debug;

use crate::generation::GenerationToken;

#[derive(Error, Debug)]
pub enum PortWaitError {
    #[error("Timed out after {0:?} waiting for port to be free")]
    Timeout(Duration),

    #[error("Superseded while waiting for port")]
    Cancelled,
}

/// Polling cadence and deadline for [`wait_for_port`].
#[derive(Debug, Clone)]
pub struct PortWaitOptions {
    pub retry_interval: Duration,
    pub timeout: Duration,
}

impl Default for PortWaitOptions {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_millis(200),
            timeout: Duration::from_secs(2),
        }
    }
}

/// Resolve once `host:port` accepts a bind, or fail at the deadline.
///
/// The generation token is checked once per retry interval so a superseded
/// reload stops waiting promptly. The probe listener is dropped on success;
/// the caller owns the window between probe and actual bind.
pub async fn wait_for_port(
    host: &str,
    port: u16,
    options: &PortWaitOptions,
    token: &GenerationToken,
) -> Result<(), PortWaitError> {
    let deadline = Instant::now() + options.timeout;
    loop {
        if token.is_stale() {
            return Err(PortWaitError::Cancelled);
        }
        match TcpListener::bind((host, port)).await {
            Ok(listener) => {
                drop(listener);
                return Ok(());
            }
            Err(e) => debug!("Port {} not yet free: {}", port, e),
        }
        if Instant::now() >= deadline {
            return Err(PortWaitError::Timeout(options.timeout));
        }
        tokio::time::sleep(options.retry_interval).await;
    }
}
