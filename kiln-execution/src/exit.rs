//! Process-exit hook registry
//!
//! An abrupt parent-process termination must still terminate child engine
//! instances. Hooks live in an explicit, reference-counted registry rather
//! than ambient process-global state so multiple coordinators (and tests)
//! can run in isolation. The hosting process wires [`ExitHooks::fire`] into
//! its signal and exit paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

type Hook = Box<dyn FnOnce() + Send>;

/// Registry of teardown callbacks to run when the process exits abruptly.
#[derive(Default)]
pub struct ExitHooks {
    hooks: Mutex<HashMap<u64, Hook>>,
    next_id: AtomicU64,
    fired: AtomicBool,
}

impl ExitHooks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a hook; it is removed when the returned guard drops.
    pub fn register(self: &Arc<Self>, hook: impl FnOnce() + Send + 'static) -> ExitHookGuard {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.hooks.lock().expect("exit hooks lock").insert(id, Box::new(hook));
        ExitHookGuard {
            hooks: Arc::clone(self),
            id,
        }
    }

    /// Run and drain all registered hooks. Idempotent.
    pub fn fire(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        let hooks: Vec<Hook> = {
            let mut map = self.hooks.lock().expect("exit hooks lock");
            map.drain().map(|(_, hook)| hook).collect()
        };
        debug!("Running {} exit hooks", hooks.len());
        for hook in hooks {
            hook();
        }
    }

    /// Number of currently registered hooks.
    pub fn len(&self) -> usize {
        self.hooks.lock().expect("exit hooks lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes its hook from the registry on drop.
///
/// Held by a live instance; dropped on clean dispose so a normally
/// torn-down instance is not torn down a second time at process exit.
pub struct ExitHookGuard {
    hooks: Arc<ExitHooks>,
    id: u64,
}

impl Drop for ExitHookGuard {
    fn drop(&mut self) {
        if let Ok(mut map) = self.hooks.hooks.lock() {
            map.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_fire_runs_registered_hooks_once() {
        let hooks = ExitHooks::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counted = Arc::clone(&calls);
        let _guard = hooks.register(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        hooks.fire();
        hooks.fire();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_guard_removes_hook() {
        let hooks = ExitHooks::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counted = Arc::clone(&calls);
        let guard = hooks.register(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hooks.len(), 1);

        drop(guard);
        assert!(hooks.is_empty());

        hooks.fire();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_independent_registries() {
        let first = ExitHooks::new();
        let second = ExitHooks::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counted = Arc::clone(&calls);
        let _guard = second.register(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        first.fire();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        second.fire();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
