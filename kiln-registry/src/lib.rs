//! Local worker discovery client for Kiln
//!
//! Every dev server publishes its worker's reachable address to a shared
//! local discovery service so sibling workers can resolve service and
//! stateful-object bindings against it. Registry availability must never
//! block or crash a dev server, so publication and retraction are
//! best-effort: failures are logged and swallowed.

pub mod client;
pub mod error;
pub mod types;

// Re-export main types
pub use client::{RegistryClient, DEFAULT_REGISTRY_PORT};
pub use error::{RegistryError, Result};
pub use types::{RegistryEntry, RegistryMode, StatefulObjectRecord};
