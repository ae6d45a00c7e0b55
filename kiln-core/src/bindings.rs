//! Binding declarations attached to a worker

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A key-value storage namespace handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvNamespace {
    pub binding: String,
    pub id: String,
}

/// An object-storage bucket handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct R2Bucket {
    pub binding: String,
    pub bucket_name: String,
}

/// A stateful-object namespace declaration.
///
/// A binding carrying a `script_name` is external: its class is implemented
/// by a sibling worker resolved through the registry rather than by this
/// instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatefulObjectBinding {
    pub name: String,
    pub class_name: String,
    pub script_name: Option<String>,
}

impl StatefulObjectBinding {
    pub fn is_external(&self) -> bool {
        self.script_name.is_some()
    }
}

/// A service binding targeting another worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceBinding {
    pub binding: String,
    pub service: String,
    pub environment: Option<String>,
}

/// All binding declarations for one worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bindings {
    pub vars: HashMap<String, String>,
    pub kv_namespaces: Vec<KvNamespace>,
    pub r2_buckets: Vec<R2Bucket>,
    pub stateful_objects: Vec<StatefulObjectBinding>,
    pub services: Vec<ServiceBinding>,
    pub wasm_modules: HashMap<String, PathBuf>,
    pub text_blobs: HashMap<String, PathBuf>,
    pub data_blobs: HashMap<String, PathBuf>,
}

impl Bindings {
    /// Stateful-object namespaces implemented by this worker.
    pub fn internal_stateful_objects(&self) -> impl Iterator<Item = &StatefulObjectBinding> {
        self.stateful_objects.iter().filter(|b| !b.is_external())
    }

    /// Stateful-object namespaces implemented by sibling workers.
    pub fn external_stateful_objects(&self) -> impl Iterator<Item = &StatefulObjectBinding> {
        self.stateful_objects.iter().filter(|b| b.is_external())
    }
}
