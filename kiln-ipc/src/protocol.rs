//! Engine configuration payload and control frames

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use kiln_core::{
    ConfigBundle, KvNamespace, R2Bucket, ScriptFormat, StatefulObjectBinding, UsageModel,
};

use crate::error::{IpcError, Result};

/// Configuration payload consumed by the engine.
///
/// Built from a [`ConfigBundle`] once per launch. A subprocess engine
/// receives this serialized as its single JSON argument; an embedded engine
/// receives the struct directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineOptions {
    pub name: Option<String>,
    pub script_path: PathBuf,
    /// True when the worker uses module syntax rather than a service-worker
    /// global scope.
    pub modules: bool,
    pub port: u16,
    pub host: String,
    pub protocol: String,
    pub upstream: Option<String>,
    pub inspector_port: u16,
    pub compatibility_date: String,
    pub compatibility_flags: Vec<String>,
    pub usage_model: Option<UsageModel>,
    pub vars: HashMap<String, String>,
    pub kv_namespaces: Vec<KvNamespace>,
    pub r2_buckets: Vec<R2Bucket>,
    /// Namespaces implemented by this worker.
    pub stateful_objects: Vec<StatefulObjectBinding>,
    /// Namespaces routed to sibling workers.
    pub external_stateful_objects: Vec<StatefulObjectBinding>,
    pub wasm_modules: HashMap<String, PathBuf>,
    pub text_blobs: HashMap<String, PathBuf>,
    pub data_blobs: HashMap<String, PathBuf>,
    pub persist_dir: Option<PathBuf>,
    pub live_reload: bool,
    pub crons: Vec<String>,
}

impl EngineOptions {
    pub fn from_bundle(bundle: &ConfigBundle) -> Self {
        Self {
            name: bundle.name.clone(),
            script_path: bundle.artifact.entry_path.clone(),
            modules: bundle.format == ScriptFormat::Modules,
            port: bundle.network.port,
            host: bundle.network.host.clone(),
            protocol: bundle.network.protocol.scheme().to_string(),
            upstream: bundle.network.upstream_url(),
            inspector_port: bundle.network.inspector_port,
            compatibility_date: bundle.compatibility_date.clone(),
            compatibility_flags: bundle.compatibility_flags.clone(),
            usage_model: bundle.usage_model,
            vars: bundle.bindings.vars.clone(),
            kv_namespaces: bundle.bindings.kv_namespaces.clone(),
            r2_buckets: bundle.bindings.r2_buckets.clone(),
            stateful_objects: bundle.bindings.internal_stateful_objects().cloned().collect(),
            external_stateful_objects: bundle
                .bindings
                .external_stateful_objects()
                .cloned()
                .collect(),
            wasm_modules: bundle.bindings.wasm_modules.clone(),
            text_blobs: bundle.bindings.text_blobs.clone(),
            data_blobs: bundle.bindings.data_blobs.clone(),
            persist_dir: bundle.persist_dir.clone(),
            live_reload: bundle.live_reload,
            crons: bundle.crons.clone(),
        }
    }

    /// Serialize for handing to a subprocess engine as one argument.
    pub fn to_payload(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A control frame on the engine's structured output channel.
///
/// The only frame currently defined is the single-shot readiness
/// announcement carrying the bound port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineMessage {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub stateful_object_port: Option<u16>,
}

/// Contents of a valid readiness frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineReady {
    /// Port the engine actually bound (authoritative even when a port was
    /// requested).
    pub port: u16,
    /// Secondary port for stateful-object routing, when the engine runs one.
    pub stateful_object_port: Option<u16>,
}

impl EngineMessage {
    /// Parse one line of the structured channel into a readiness event.
    ///
    /// A frame that does not decode, or decodes without `ready: true` and a
    /// bound port, is malformed.
    pub fn parse_ready(line: &str) -> Result<EngineReady> {
        let frame: EngineMessage = serde_json::from_str(line)
            .map_err(|e| IpcError::MalformedFrame(format!("{line:?}: {e}")))?;
        match frame {
            EngineMessage {
                ready: true,
                port: Some(port),
                stateful_object_port,
            } => Ok(EngineReady {
                port,
                stateful_object_port,
            }),
            _ => Err(IpcError::MalformedFrame(format!(
                "expected readiness frame, got {line:?}"
            ))),
        }
    }
}
