//! The per-reload configuration snapshot

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::bindings::Bindings;
use crate::network::NetworkConfig;

/// How the engine for a bundle is hosted.
///
/// In-place reconfiguration is only attempted between two `Embedded`
/// bundles; a `Subprocess` instance is always torn down and relaunched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    /// The engine runs as a child process and reports readiness on stdout.
    Subprocess,
    /// The engine runs in-process behind the `DevEngine` trait.
    Embedded,
}

/// Worker script format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptFormat {
    Modules,
    ServiceWorker,
}

/// Module system of the compiled entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleType {
    Esm,
    CommonJs,
}

/// Usage accounting mode reported to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageModel {
    Bundled,
    Unbound,
}

/// A dependent module the engine loads from disk next to the entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxiliaryModule {
    /// Path of the module relative to the entry module.
    pub name: String,
    pub content: Vec<u8>,
}

/// Compiled output of the worker program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerArtifact {
    /// Resolved path of the compiled entry module.
    pub entry_path: PathBuf,
    pub bundle_type: BundleType,
    pub modules: Vec<AuxiliaryModule>,
    pub source_map_path: Option<PathBuf>,
}

/// Immutable snapshot describing one runtime instance.
///
/// Produced once per reload cycle by the bundler collaborator; a new update
/// produces a new `ConfigBundle` rather than patching the old one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigBundle {
    /// Worker identity. `None` disables registry publication.
    pub name: Option<String>,
    pub artifact: WorkerArtifact,
    pub format: ScriptFormat,
    pub compatibility_date: String,
    pub compatibility_flags: Vec<String>,
    pub usage_model: Option<UsageModel>,
    pub bindings: Bindings,
    pub network: NetworkConfig,
    /// Directory for emulated storage. `None` keeps state in memory.
    pub persist_dir: Option<PathBuf>,
    pub live_reload: bool,
    /// Scheduled-trigger declarations in cron syntax, passed to the engine.
    pub crons: Vec<String>,
    pub engine_mode: EngineMode,
}

impl ConfigBundle {
    /// Directory the engine runs in; auxiliary modules are written here.
    pub fn working_dir(&self) -> PathBuf {
        self.artifact
            .entry_path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
