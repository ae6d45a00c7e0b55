//! Launching runtime instances
//!
//! One launcher turns a [`ConfigBundle`] into a live [`RuntimeInstanceHandle`]:
//! it waits for the requested port, writes the bundle's auxiliary modules to
//! disk, starts the engine (as a subprocess or through the embedded
//! [`DevEngine`] seam), and wires up readiness, output passthrough, debug
//! announcement scanning, and abrupt-exit teardown.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{oneshot, Notify};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use kiln_core::{ConfigBundle, EngineMode};
use kiln_ipc::{AnnouncementScanner, EngineMessage, EngineOptions, EngineReady};

use crate::engine::DevEngine;
use crate::error::{ExecutionError, Result};
use crate::exit::{ExitHookGuard, ExitHooks};
use crate::generation::GenerationToken;
use crate::ports::{wait_for_port, PortWaitError, PortWaitOptions};

/// Command line that starts a subprocess engine.
///
/// The launcher appends the serialized [`EngineOptions`] payload as the
/// final argument.
#[derive(Debug, Clone)]
pub struct EngineCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Lifecycle position of a runtime instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    Starting,
    Ready,
    Disposed,
}

/// Signals the process monitor to kill its child. Idempotent.
#[derive(Debug, Clone)]
struct KillSwitch {
    notify: Arc<Notify>,
    fired: Arc<AtomicBool>,
}

impl KillSwitch {
    fn new() -> Self {
        Self {
            notify: Arc::new(Notify::new()),
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    fn fire(&self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            // notify_one stores a permit, so a fire before the monitor
            // starts waiting is not lost
            self.notify.notify_one();
        }
    }

    async fn triggered(&self) {
        if self.fired.load(Ordering::SeqCst) {
            return;
        }
        self.notify.notified().await;
    }
}

enum Backend {
    Subprocess { kill: KillSwitch },
    Embedded { engine: Arc<dyn DevEngine> },
}

/// One live runtime instance.
///
/// Exclusively owned by the reload coordinator; at most one non-disposed
/// handle exists at a time.
pub struct RuntimeInstanceHandle {
    id: Uuid,
    mode: EngineMode,
    host: String,
    inspector_port: u16,
    status: InstanceStatus,
    ready: Option<oneshot::Receiver<Result<EngineReady>>>,
    backend: Backend,
    debug_base: Arc<OnceLock<String>>,
    exit_guard: Option<ExitHookGuard>,
}

impl RuntimeInstanceHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port of the engine's debug-protocol listing endpoint.
    pub fn inspector_port(&self) -> u16 {
        self.inspector_port
    }

    pub fn status(&self) -> InstanceStatus {
        self.status
    }

    /// Debug listener announced on the diagnostic channel, once seen.
    pub fn debug_base(&self) -> Option<String> {
        self.debug_base.get().cloned()
    }

    /// Wait for the single-shot readiness message.
    ///
    /// Cancellation-safe: dropping the future (e.g. from a timeout) leaves
    /// readiness consumable by a later call.
    pub async fn ready(&mut self) -> Result<EngineReady> {
        let rx = match self.ready.as_mut() {
            Some(rx) => rx,
            None => {
                return Err(ExecutionError::InvalidState(
                    "readiness already consumed".to_string(),
                ))
            }
        };
        let outcome = rx.await;
        self.ready = None;
        match outcome {
            Ok(Ok(ready)) => {
                self.status = InstanceStatus::Ready;
                Ok(ready)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ExecutionError::MalformedReadiness(
                "engine terminated before reporting readiness".to_string(),
            )),
        }
    }

    /// Reconfigure an embedded engine in place.
    pub async fn reconfigure(&mut self, options: EngineOptions) -> Result<EngineReady> {
        match &self.backend {
            Backend::Embedded { engine } => {
                let ready = engine.update(options).await?;
                self.status = InstanceStatus::Ready;
                Ok(ready)
            }
            Backend::Subprocess { .. } => Err(ExecutionError::InvalidState(
                "subprocess instances cannot be reconfigured in place".to_string(),
            )),
        }
    }

    /// Tear the instance down. Idempotent and non-blocking: a subprocess is
    /// signalled and reaped by its monitor, an embedded engine's dispose
    /// runs detached with secondary errors swallowed.
    pub fn dispose(&mut self) {
        if self.status == InstanceStatus::Disposed {
            return;
        }
        self.status = InstanceStatus::Disposed;
        // Normal teardown; the process-exit hook must not fire a second one
        self.exit_guard.take();
        match &self.backend {
            Backend::Subprocess { kill } => kill.fire(),
            Backend::Embedded { engine } => {
                let engine = Arc::clone(engine);
                let id = self.id;
                tokio::spawn(async move {
                    if let Err(e) = engine.dispose().await {
                        debug!("Engine {} dispose reported: {}", id, e);
                    }
                });
            }
        }
    }
}

/// Starts engine instances for bundles.
pub struct EngineLauncher {
    command: Option<EngineCommand>,
    embedded: Option<Arc<dyn DevEngine>>,
    port_wait: PortWaitOptions,
    exit_hooks: Arc<ExitHooks>,
}

impl EngineLauncher {
    pub fn new(exit_hooks: Arc<ExitHooks>) -> Self {
        Self {
            command: None,
            embedded: None,
            port_wait: PortWaitOptions::default(),
            exit_hooks,
        }
    }

    /// Command line for [`EngineMode::Subprocess`] bundles.
    pub fn with_command(mut self, command: EngineCommand) -> Self {
        self.command = Some(command);
        self
    }

    /// Engine for [`EngineMode::Embedded`] bundles.
    pub fn with_embedded(mut self, engine: Arc<dyn DevEngine>) -> Self {
        self.embedded = Some(engine);
        self
    }

    pub fn with_port_wait(mut self, options: PortWaitOptions) -> Self {
        self.port_wait = options;
        self
    }

    /// Start one instance for `bundle`.
    ///
    /// Returns `Ok(None)` when the generation was superseded mid-launch;
    /// superseded work is silent and leaves no resources behind.
    pub async fn launch(
        &self,
        bundle: &ConfigBundle,
        token: &GenerationToken,
    ) -> Result<Option<RuntimeInstanceHandle>> {
        if token.is_stale() {
            return Ok(None);
        }

        if bundle.network.port != 0 {
            match wait_for_port(&bundle.network.host, bundle.network.port, &self.port_wait, token)
                .await
            {
                Ok(()) => {}
                Err(PortWaitError::Cancelled) => return Ok(None),
                Err(source @ PortWaitError::Timeout(_)) => {
                    return Err(ExecutionError::PortUnavailable {
                        port: bundle.network.port,
                        source,
                    })
                }
            }
        }

        // The engine loads modules from disk paths, so referenced modules
        // are written next to the entry point before start
        let working_dir = bundle.working_dir();
        for module in &bundle.artifact.modules {
            let path = working_dir.join(&module.name);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &module.content).await?;
        }

        if token.is_stale() {
            return Ok(None);
        }

        let options = EngineOptions::from_bundle(bundle);
        let handle = match bundle.engine_mode {
            EngineMode::Subprocess => self.spawn_subprocess(bundle, options)?,
            EngineMode::Embedded => self.start_embedded(bundle, options)?,
        };
        Ok(Some(handle))
    }

    fn spawn_subprocess(
        &self,
        bundle: &ConfigBundle,
        options: EngineOptions,
    ) -> Result<RuntimeInstanceHandle> {
        let command = self.command.as_ref().ok_or_else(|| {
            ExecutionError::SpawnFailure("no engine command configured".to_string())
        })?;
        let payload = options.to_payload()?;

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .arg(payload)
            .current_dir(bundle.working_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutionError::SpawnFailure(e.to_string()))?;

        let id = Uuid::new_v4();
        info!("Started engine process {} (pid {:?})", id, child.id());

        let stdout = child.stdout.take().ok_or_else(|| {
            ExecutionError::SpawnFailure("engine stdout not captured".to_string())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            ExecutionError::SpawnFailure("engine stderr not captured".to_string())
        })?;

        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(read_control_channel(id, stdout, ready_tx));

        let debug_base = Arc::new(OnceLock::new());
        tokio::spawn(read_diagnostic_channel(id, stderr, Arc::clone(&debug_base)));

        let kill = KillSwitch::new();
        tokio::spawn(monitor_process(id, child, kill.clone()));

        let exit_kill = kill.clone();
        let exit_guard = self.exit_hooks.register(move || exit_kill.fire());

        Ok(RuntimeInstanceHandle {
            id,
            mode: EngineMode::Subprocess,
            host: bundle.network.host.clone(),
            inspector_port: bundle.network.inspector_port,
            status: InstanceStatus::Starting,
            ready: Some(ready_rx),
            backend: Backend::Subprocess { kill },
            debug_base,
            exit_guard: Some(exit_guard),
        })
    }

    fn start_embedded(
        &self,
        bundle: &ConfigBundle,
        options: EngineOptions,
    ) -> Result<RuntimeInstanceHandle> {
        let engine = self.embedded.clone().ok_or_else(|| {
            ExecutionError::SpawnFailure("no embedded engine configured".to_string())
        })?;

        let id = Uuid::new_v4();
        info!("Starting embedded engine {}", id);

        let (ready_tx, ready_rx) = oneshot::channel();
        let starter = Arc::clone(&engine);
        tokio::spawn(async move {
            let outcome = starter
                .start(options)
                .await
                .map_err(ExecutionError::Engine);
            let _ = ready_tx.send(outcome);
        });

        let hooked = Arc::clone(&engine);
        let runtime = tokio::runtime::Handle::current();
        let exit_guard = self.exit_hooks.register(move || {
            runtime.spawn(async move {
                let _ = hooked.dispose().await;
            });
        });

        Ok(RuntimeInstanceHandle {
            id,
            mode: EngineMode::Embedded,
            host: bundle.network.host.clone(),
            inspector_port: bundle.network.inspector_port,
            status: InstanceStatus::Starting,
            ready: Some(ready_rx),
            backend: Backend::Embedded { engine },
            debug_base: Arc::new(OnceLock::new()),
            exit_guard: Some(exit_guard),
        })
    }
}

/// Read the structured channel: control frames (lines opening with `{`) are
/// consumed, the first of which must be the readiness frame; everything
/// else passes through verbatim.
async fn read_control_channel(
    id: Uuid,
    stdout: ChildStdout,
    ready_tx: oneshot::Sender<Result<EngineReady>>,
) {
    let mut lines = BufReader::new(stdout).lines();
    let mut ready_tx = Some(ready_tx);
    let mut passthrough = tokio::io::stdout();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim_start().starts_with('{') {
                    if let Some(tx) = ready_tx.take() {
                        let parsed = EngineMessage::parse_ready(&line)
                            .map_err(|e| ExecutionError::MalformedReadiness(e.to_string()));
                        let _ = tx.send(parsed);
                    } else {
                        debug!("Engine {} control frame after readiness ignored", id);
                    }
                } else {
                    let _ = passthrough.write_all(line.as_bytes()).await;
                    let _ = passthrough.write_all(b"\n").await;
                }
            }
            Ok(None) => {
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(Err(ExecutionError::MalformedReadiness(
                        "engine output channel closed before readiness".to_string(),
                    )));
                }
                break;
            }
            Err(e) => {
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(Err(ExecutionError::Io(e)));
                }
                break;
            }
        }
    }
}

/// Pass the diagnostic channel through while scanning it for the debug
/// listener announcement; the first match populates `debug_base`.
async fn read_diagnostic_channel(id: Uuid, stderr: ChildStderr, debug_base: Arc<OnceLock<String>>) {
    let mut stderr = stderr;
    let mut scanner = AnnouncementScanner::new();
    let mut passthrough = tokio::io::stderr();
    let mut buf = [0u8; 4096];
    loop {
        match stderr.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let _ = passthrough.write_all(&buf[..n]).await;
                if let Some(url) = scanner.push(&String::from_utf8_lossy(&buf[..n])) {
                    debug!("Engine {} debug listener at {}", id, url);
                    let _ = debug_base.set(url);
                }
            }
        }
    }
}

/// Own the child until it exits or the kill switch fires.
async fn monitor_process(id: Uuid, mut child: Child, kill: KillSwitch) {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) if status.success() => debug!("Engine process {} exited cleanly", id),
            Ok(status) => error!("Engine process {} exited with {}", id, status),
            Err(e) => warn!("Failed to observe engine process {} exit: {}", id, e),
        },
        _ = kill.triggered() => {
            if let Err(e) = child.start_kill() {
                debug!("Engine process {} already gone: {}", id, e);
            }
            let _ = child.wait().await;
            debug!("Engine process {} terminated", id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationCounter;
    use kiln_core::{
        AuxiliaryModule, Bindings, BundleType, NetworkConfig, Protocol, ScriptFormat,
        WorkerArtifact,
    };
    use std::time::Duration;

    fn sh_command(script: &str) -> EngineCommand {
        EngineCommand {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    fn bundle_in(dir: &std::path::Path, port: u16) -> ConfigBundle {
        ConfigBundle {
            name: Some("worker".to_string()),
            artifact: WorkerArtifact {
                entry_path: dir.join("worker.js"),
                bundle_type: BundleType::Esm,
                modules: Vec::new(),
                source_map_path: None,
            },
            format: ScriptFormat::Modules,
            compatibility_date: "2023-01-01".to_string(),
            compatibility_flags: Vec::new(),
            usage_model: None,
            bindings: Bindings::default(),
            network: NetworkConfig {
                port,
                host: "127.0.0.1".to_string(),
                protocol: Protocol::Http,
                upstream: None,
                inspector_port: 0,
            },
            persist_dir: None,
            live_reload: false,
            crons: Vec::new(),
            engine_mode: EngineMode::Subprocess,
        }
    }

    #[tokio::test]
    async fn test_subprocess_reports_readiness() {
        let dir = tempfile::tempdir().unwrap();
        let hooks = ExitHooks::new();
        let launcher = EngineLauncher::new(Arc::clone(&hooks)).with_command(sh_command(
            r#"echo '{"ready":true,"port":8787,"statefulObjectPort":8788}'; sleep 5"#,
        ));
        let token = GenerationCounter::new().next();

        let mut handle = launcher
            .launch(&bundle_in(dir.path(), 0), &token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handle.status(), InstanceStatus::Starting);

        let ready = handle.ready().await.unwrap();
        assert_eq!(ready.port, 8787);
        assert_eq!(ready.stateful_object_port, Some(8788));
        assert_eq!(handle.status(), InstanceStatus::Ready);
        assert_eq!(hooks.len(), 1);

        handle.dispose();
        assert_eq!(handle.status(), InstanceStatus::Disposed);
        assert!(hooks.is_empty());
        // Second dispose is a no-op
        handle.dispose();
    }

    #[tokio::test]
    async fn test_malformed_readiness_frame_fails_instance() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = EngineLauncher::new(ExitHooks::new())
            .with_command(sh_command(r#"echo '{"hello":"world"}'; sleep 5"#));
        let token = GenerationCounter::new().next();

        let mut handle = launcher
            .launch(&bundle_in(dir.path(), 0), &token)
            .await
            .unwrap()
            .unwrap();
        let err = handle.ready().await.unwrap_err();
        assert!(matches!(err, ExecutionError::MalformedReadiness(_)));
        handle.dispose();
    }

    #[tokio::test]
    async fn test_absent_readiness_fails_instance() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = EngineLauncher::new(ExitHooks::new()).with_command(sh_command("true"));
        let token = GenerationCounter::new().next();

        let mut handle = launcher
            .launch(&bundle_in(dir.path(), 0), &token)
            .await
            .unwrap()
            .unwrap();
        let err = handle.ready().await.unwrap_err();
        assert!(matches!(err, ExecutionError::MalformedReadiness(_)));
        handle.dispose();
    }

    #[tokio::test]
    async fn test_auxiliary_modules_written_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = EngineLauncher::new(ExitHooks::new())
            .with_command(sh_command(r#"echo '{"ready":true,"port":1}'"#));
        let token = GenerationCounter::new().next();

        let mut bundle = bundle_in(dir.path(), 0);
        bundle.artifact.modules = vec![AuxiliaryModule {
            name: "wasm/add.wasm".to_string(),
            content: vec![1, 2, 3],
        }];

        let mut handle = launcher.launch(&bundle, &token).await.unwrap().unwrap();
        let written = tokio::fs::read(dir.path().join("wasm/add.wasm")).await.unwrap();
        assert_eq!(written, vec![1, 2, 3]);
        let _ = handle.ready().await;
        handle.dispose();
    }

    #[tokio::test]
    async fn test_occupied_port_is_port_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let launcher = EngineLauncher::new(ExitHooks::new())
            .with_command(sh_command("true"))
            .with_port_wait(PortWaitOptions {
                retry_interval: Duration::from_millis(10),
                timeout: Duration::from_millis(50),
            });
        let token = GenerationCounter::new().next();

        let err = launcher
            .launch(&bundle_in(dir.path(), port), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::PortUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_superseded_launch_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = EngineLauncher::new(ExitHooks::new()).with_command(sh_command("true"));
        let counter = GenerationCounter::new();
        let token = counter.next();
        counter.next();

        let outcome = launcher.launch(&bundle_in(dir.path(), 0), &token).await.unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn test_diagnostic_announcement_populates_debug_base() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = EngineLauncher::new(ExitHooks::new()).with_command(sh_command(
            r#"echo '{"ready":true,"port":1}'; echo 'Debugger listening on ws://127.0.0.1:9229/tok-1' >&2; sleep 5"#,
        ));
        let token = GenerationCounter::new().next();

        let mut handle = launcher
            .launch(&bundle_in(dir.path(), 0), &token)
            .await
            .unwrap()
            .unwrap();
        handle.ready().await.unwrap();

        // The diagnostic reader runs concurrently; give it a moment
        let mut base = None;
        for _ in 0..50 {
            base = handle.debug_base();
            if base.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(base.as_deref(), Some("ws://127.0.0.1:9229/tok-1"));
        handle.dispose();
    }
}
