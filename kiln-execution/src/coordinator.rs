//! The reload coordinator
//!
//! Owns the single live runtime instance and drives it through bundle
//! updates. All state transitions happen on one driver task; `submit` and
//! `shutdown` only enqueue commands, so a fast stream of edits never blocks
//! on instance startup. Superseded work is cancelled cooperatively through
//! generation tokens and aborts without side effects.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use kiln_core::{ConfigBundle, EngineMode};
use kiln_inspector::{listing_url, DebugTarget, InspectorBridge};
use kiln_ipc::{EngineOptions, EngineReady};
use kiln_registry::{RegistryClient, RegistryEntry, RegistryMode, StatefulObjectRecord};

use crate::engine::EngineError;
use crate::error::ExecutionError;
use crate::generation::{GenerationCounter, GenerationToken};
use crate::launcher::{EngineLauncher, InstanceStatus, RuntimeInstanceHandle};

/// Cadence of staleness checks while blocked on engine readiness.
const STALE_POLL: Duration = Duration::from_millis(50);

/// Invoked with (host, port) at most once per generation that reaches
/// readiness.
pub type ReadyCallback = Arc<dyn Fn(&str, u16) + Send + Sync>;

/// Collaborators and callbacks for a [`ReloadCoordinator`].
pub struct CoordinatorOptions {
    pub launcher: EngineLauncher,
    pub registry: Option<RegistryClient>,
    pub inspector: InspectorBridge,
    pub on_ready: Option<ReadyCallback>,
}

impl CoordinatorOptions {
    pub fn new(launcher: EngineLauncher) -> Self {
        Self {
            launcher,
            registry: None,
            inspector: InspectorBridge::new(),
            on_ready: None,
        }
    }

    pub fn with_registry(mut self, registry: RegistryClient) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_on_ready(mut self, on_ready: ReadyCallback) -> Self {
        self.on_ready = Some(on_ready);
        self
    }
}

enum Command {
    Update {
        bundle: ConfigBundle,
        token: GenerationToken,
    },
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

/// Supervises the single live runtime instance across bundle updates.
pub struct ReloadCoordinator {
    commands: mpsc::UnboundedSender<Command>,
    generations: GenerationCounter,
    debug_rx: watch::Receiver<Option<DebugTarget>>,
    shut: AtomicBool,
}

impl ReloadCoordinator {
    pub fn new(options: CoordinatorOptions) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (debug_tx, debug_rx) = watch::channel(None);
        let driver = Driver {
            launcher: options.launcher,
            registry: options.registry,
            inspector: options.inspector,
            on_ready: options.on_ready,
            debug_tx,
            current: None,
            current_name: None,
        };
        tokio::spawn(driver.run(rx));
        Self {
            commands,
            generations: GenerationCounter::new(),
            debug_rx,
            shut: AtomicBool::new(false),
        }
    }

    /// Queue a bundle for (re)load. Fire-and-forget: the call never blocks
    /// on instance startup, and any in-flight reload is superseded
    /// immediately.
    pub fn submit(&self, bundle: ConfigBundle) {
        if self.shut.load(Ordering::SeqCst) {
            return;
        }
        let token = self.generations.next();
        debug!("Queued reload generation {}", token.value());
        let _ = self.commands.send(Command::Update { bundle, token });
    }

    /// Tear down the live instance and release resources. Idempotent; the
    /// second call returns without doing anything.
    pub async fn shutdown(&self) {
        if self.shut.swap(true, Ordering::SeqCst) {
            return;
        }
        // Supersede all in-flight reload work
        self.generations.next();
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown { ack: ack_tx }).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Latest discovered debug target, `None` while the debugger is
    /// unavailable. Every restart yields a distinct target value.
    pub fn debug_target(&self) -> watch::Receiver<Option<DebugTarget>> {
        self.debug_rx.clone()
    }
}

/// Single owner of the mutable supervision state.
struct Driver {
    launcher: EngineLauncher,
    registry: Option<RegistryClient>,
    inspector: InspectorBridge,
    on_ready: Option<ReadyCallback>,
    debug_tx: watch::Sender<Option<DebugTarget>>,
    current: Option<RuntimeInstanceHandle>,
    current_name: Option<String>,
}

impl Driver {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Update { bundle, token } => self.handle_update(bundle, token).await,
                Command::Shutdown { ack } => {
                    self.teardown().await;
                    let _ = ack.send(());
                    break;
                }
            }
        }
    }

    async fn handle_update(&mut self, bundle: ConfigBundle, token: GenerationToken) {
        if token.is_stale() {
            return;
        }

        // Prefer reconfiguring a live embedded engine over a relaunch: it
        // retains emulated storage and the bound listener
        if let Some(handle) = self.current.as_mut() {
            if handle.status() == InstanceStatus::Ready
                && handle.mode() == EngineMode::Embedded
                && bundle.engine_mode == EngineMode::Embedded
            {
                info!("Reconfiguring local server in place");
                match handle.reconfigure(EngineOptions::from_bundle(&bundle)).await {
                    Ok(ready) => {
                        self.publish_ready(&bundle, ready, &token).await;
                        return;
                    }
                    Err(e) => warn!("In-place reconfiguration failed, restarting: {}", e),
                }
            }
        }

        if let Some(mut old) = self.current.take() {
            info!("Restarting local server");
            old.dispose();
            self.retract_current().await;
            let _ = self.debug_tx.send(None);
        }

        if token.is_stale() {
            return;
        }

        let mut handle = match self.launcher.launch(&bundle, &token).await {
            Ok(Some(handle)) => handle,
            // Superseded mid-launch; already cleaned up, nothing to report
            Ok(None) => return,
            Err(e) => {
                log_launch_error(&e);
                return;
            }
        };

        let ready = match self.await_ready(&mut handle, &token).await {
            Some(Ok(ready)) => ready,
            Some(Err(e)) => {
                handle.dispose();
                log_launch_error(&e);
                return;
            }
            None => {
                handle.dispose();
                return;
            }
        };

        if token.is_stale() {
            handle.dispose();
            return;
        }
        self.current = Some(handle);
        self.publish_ready(&bundle, ready, &token).await;
    }

    /// Await readiness, polling the token so a superseded launch is
    /// abandoned promptly without surfacing an error.
    async fn await_ready(
        &self,
        handle: &mut RuntimeInstanceHandle,
        token: &GenerationToken,
    ) -> Option<std::result::Result<EngineReady, ExecutionError>> {
        loop {
            match tokio::time::timeout(STALE_POLL, handle.ready()).await {
                Ok(outcome) => return Some(outcome),
                Err(_) => {
                    if token.is_stale() {
                        return None;
                    }
                }
            }
        }
    }

    /// Side effects of readiness, each gated on the token still being
    /// current so a late completion of superseded work publishes nothing.
    async fn publish_ready(
        &mut self,
        bundle: &ConfigBundle,
        ready: EngineReady,
        token: &GenerationToken,
    ) {
        if !token.is_current() {
            return;
        }

        if let Some(registry) = &self.registry {
            // A rename retires the entry published under the old name
            if let Some(previous) = self.current_name.take() {
                if bundle.name.as_ref() != Some(&previous) {
                    registry.retract(&previous).await;
                }
            }
            if let Some(name) = &bundle.name {
                if token.is_current() {
                    registry.publish(name, &registry_entry(bundle, &ready)).await;
                }
            }
        }
        self.current_name = bundle.name.clone();

        if !token.is_current() {
            return;
        }
        if let Some(on_ready) = &self.on_ready {
            on_ready(&bundle.network.host, ready.port);
        }
        info!(
            "Local server ready on {}://{}:{}",
            bundle.network.protocol, bundle.network.host, ready.port
        );

        let listing = listing_url(bundle.network.inspector_port);
        match self.inspector.discover(&listing).await {
            Ok(target) => {
                if token.is_current() {
                    let _ = self.debug_tx.send(target);
                }
            }
            Err(e) => error!("Error attempting to retrieve debugger URL: {}", e),
        }
    }

    async fn retract_current(&mut self) {
        let name = self.current_name.take();
        if let (Some(registry), Some(name)) = (&self.registry, name) {
            registry.retract(&name).await;
        }
    }

    async fn teardown(&mut self) {
        if let Some(mut handle) = self.current.take() {
            info!("Shutting down local server");
            handle.dispose();
        }
        self.retract_current().await;
        let _ = self.debug_tx.send(None);
    }
}

/// Startup failures from the engine's own controlled failure path are
/// logged without a chain; the engine already printed its diagnostics.
fn log_launch_error(error: &ExecutionError) {
    match error {
        ExecutionError::Engine(EngineError::Runtime(message)) => error!("{}", message),
        other => error!("Failed to start local server: {}", other),
    }
}

fn registry_entry(bundle: &ConfigBundle, ready: &EngineReady) -> RegistryEntry {
    RegistryEntry {
        protocol: bundle.network.protocol,
        mode: RegistryMode::Local,
        host: bundle.network.host.clone(),
        port: ready.port,
        stateful_objects: bundle
            .bindings
            .internal_stateful_objects()
            .map(|binding| StatefulObjectRecord {
                name: binding.name.clone(),
                class_name: binding.class_name.clone(),
            })
            .collect(),
        stateful_object_host: ready
            .stateful_object_port
            .map(|_| bundle.network.host.clone()),
        stateful_object_port: ready.stateful_object_port,
    }
}
