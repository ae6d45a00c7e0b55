//! Core domain models for Kiln
//!
//! This crate contains the fundamental types shared by the Kiln dev server
//! components. It has minimal dependencies and defines the domain language
//! of the application: the configuration snapshot describing one runtime
//! instance and the binding declarations attached to it.

pub mod bindings;
pub mod bundle;
pub mod network;

// Re-export commonly used types at the crate root
pub use bindings::{
    Bindings, KvNamespace, R2Bucket, ServiceBinding, StatefulObjectBinding,
};
pub use bundle::{
    AuxiliaryModule, BundleType, ConfigBundle, EngineMode, ScriptFormat, UsageModel,
    WorkerArtifact,
};
pub use network::{NetworkConfig, Protocol};
