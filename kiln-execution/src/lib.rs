//! Kiln execution engine
//!
//! This crate is the supervision core of the Kiln dev server: it owns
//! exactly one live runtime instance at a time, reacts to new bundle
//! versions by reconfiguring or relaunching that instance, and coordinates
//! readiness, discovery publication, and debugger rediscovery across
//! restarts. Superseded reloads are cancelled cooperatively through
//! generation tokens and never surface errors.

pub mod coordinator;
pub mod engine;
pub mod error;
pub mod exit;
pub mod generation;
pub mod launcher;
pub mod ports;

// Re-export main types
pub use coordinator::{CoordinatorOptions, ReadyCallback, ReloadCoordinator};
pub use engine::{DevEngine, EngineError};
pub use error::{ExecutionError, Result};
pub use exit::{ExitHookGuard, ExitHooks};
pub use generation::{GenerationCounter, GenerationToken};
pub use launcher::{EngineCommand, EngineLauncher, InstanceStatus, RuntimeInstanceHandle};
pub use ports::{wait_for_port, PortWaitError, PortWaitOptions};
