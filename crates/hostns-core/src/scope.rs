//! Scoped namespace switching
//!
//! [`NamespaceScope`] is the "switch, act, switch back" guard. Entering it
//! captures the thread's namespace, resolves the target and switches into it;
//! leaving it (explicitly via [`NamespaceScope::exit`] or by drop) switches
//! back and releases both handles, target first.
//!
//! The guard is `!Send`, so it cannot migrate away from the thread whose
//! namespace it changed.

use crate::namespace::NetNs;
use crate::{NetnsError, Result};
use std::cell::Cell;
use std::marker::PhantomData;
use std::path::Path;

thread_local! {
    static POISONED: Cell<bool> = const { Cell::new(false) };
}

/// Whether this thread failed to restore its namespace at some point.
#[must_use]
pub fn thread_poisoned() -> bool {
    POISONED.with(Cell::get)
}

fn poison_thread() {
    POISONED.with(|p| p.set(true));
}

/// Namespace primitives the scope is built on.
///
/// [`LinuxNetns`] is the real implementation; the indirection lets the
/// switching protocol be exercised without `CAP_SYS_ADMIN`.
pub trait NamespaceOps {
    /// Handle type. Dropping it releases the namespace.
    type Handle;

    /// Capture the calling thread's current namespace.
    fn current(&self) -> Result<Self::Handle>;

    /// Open the namespace referenced by `path`.
    fn resolve(&self, path: &Path) -> Result<Self::Handle>;

    /// Set the calling thread's namespace to `handle`.
    fn switch_to(&self, handle: &Self::Handle) -> nix::Result<()>;
}

/// Network namespaces as the kernel provides them
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxNetns;

impl NamespaceOps for LinuxNetns {
    type Handle = NetNs;

    fn current(&self) -> Result<NetNs> {
        NetNs::current()
    }

    fn resolve(&self, path: &Path) -> Result<NetNs> {
        NetNs::from_path(path)
    }

    fn switch_to(&self, handle: &NetNs) -> nix::Result<()> {
        tracing::debug!(netns = %handle.id(), "switching network namespace");
        handle.enter()
    }
}

/// Guard holding the calling thread inside a target namespace
pub struct NamespaceScope<'a, N: NamespaceOps> {
    ops: &'a N,
    original: Option<N::Handle>,
    target: Option<N::Handle>,
    // Namespace membership belongs to this OS thread; keep the guard on it.
    _pinned: PhantomData<*const ()>,
}

impl<'a, N: NamespaceOps> NamespaceScope<'a, N> {
    /// Capture the current namespace, resolve `path` and switch into it.
    ///
    /// On error nothing needs restoring: either no switch happened or the
    /// forward switch itself failed. Handles acquired so far are released.
    pub fn enter(ops: &'a N, path: &Path) -> Result<Self> {
        if thread_poisoned() {
            return Err(NetnsError::ThreadPoisoned);
        }

        let original = ops.current()?;
        let target = ops.resolve(path)?;

        ops.switch_to(&target)
            .map_err(|source| NetnsError::NamespaceSwitchFailed { source })?;

        Ok(Self {
            ops,
            original: Some(original),
            target: Some(target),
            _pinned: PhantomData,
        })
    }

    /// Switch back to the original namespace and release both handles.
    ///
    /// A failure here is [`NetnsError::RestoreFailed`] and poisons the thread.
    pub fn exit(mut self) -> Result<()> {
        self.restore()
    }

    fn restore(&mut self) -> Result<()> {
        let Some(original) = self.original.take() else {
            return Ok(());
        };

        let switched = self.ops.switch_to(&original);
        drop(self.target.take());
        drop(original);

        switched.map_err(|source| {
            poison_thread();
            tracing::error!(error = %source, fatal = true, "failed to restore network namespace");
            NetnsError::RestoreFailed {
                source,
                pending: None,
            }
        })
    }
}

impl<N: NamespaceOps> Drop for NamespaceScope<'_, N> {
    fn drop(&mut self) {
        if self.original.is_some() {
            tracing::warn!("namespace scope dropped without exit, restoring");
            // Failure is logged and the thread poisoned inside restore.
            let _ = self.restore();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Event, FakeNetns};
    use super::*;

    const TARGET: &str = "/proc/1/ns/net";

    #[test]
    fn enter_then_exit_restores_and_releases() {
        let ops = FakeNetns::new();
        let scope = NamespaceScope::enter(&ops, Path::new(TARGET)).unwrap();
        assert_eq!(ops.active(), "target");

        scope.exit().unwrap();
        assert_eq!(ops.active(), "orig");
        assert_eq!(
            ops.events(),
            vec![
                Event::Capture("orig"),
                Event::Resolve("target"),
                Event::Switch("target"),
                Event::Switch("orig"),
                Event::Release("target"),
                Event::Release("orig"),
            ]
        );
    }

    #[test]
    fn drop_without_exit_restores() {
        let ops = FakeNetns::new();
        {
            let _scope = NamespaceScope::enter(&ops, Path::new(TARGET)).unwrap();
            assert_eq!(ops.active(), "target");
        }
        assert_eq!(ops.active(), "orig");
        assert_eq!(ops.count(&Event::Release("orig")), 1);
        assert_eq!(ops.count(&Event::Release("target")), 1);
    }

    #[test]
    fn panic_inside_scope_restores() {
        let ops = FakeNetns::new();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = NamespaceScope::enter(&ops, Path::new(TARGET)).unwrap();
            panic!("listener setup blew up");
        }));
        assert!(outcome.is_err());
        assert_eq!(ops.active(), "orig");
        assert_eq!(ops.count(&Event::Release("orig")), 1);
    }

    #[test]
    fn capture_failure_touches_nothing() {
        let ops = FakeNetns {
            fail_capture: true,
            ..FakeNetns::new()
        };
        let err = NamespaceScope::enter(&ops, Path::new(TARGET)).err().unwrap();
        assert!(matches!(err, NetnsError::NamespaceUnavailable { .. }));
        assert!(ops.events().is_empty());
    }

    #[test]
    fn resolve_failure_releases_captured_handle() {
        let ops = FakeNetns {
            fail_resolve: true,
            ..FakeNetns::new()
        };
        let err = NamespaceScope::enter(&ops, Path::new(TARGET)).err().unwrap();
        assert!(matches!(err, NetnsError::NamespaceNotFound { .. }));
        assert_eq!(
            ops.events(),
            vec![Event::Capture("orig"), Event::Release("orig")]
        );
        assert_eq!(ops.active(), "orig");
    }

    #[test]
    fn forward_switch_failure_releases_both() {
        let ops = FakeNetns {
            fail_forward: true,
            ..FakeNetns::new()
        };
        let err = NamespaceScope::enter(&ops, Path::new(TARGET)).err().unwrap();
        assert!(matches!(err, NetnsError::NamespaceSwitchFailed { .. }));
        assert!(!err.is_fatal());
        assert_eq!(ops.active(), "orig");
        assert_eq!(ops.count(&Event::Release("orig")), 1);
        assert_eq!(ops.count(&Event::Release("target")), 1);
        assert!(!ops.events().iter().any(|e| matches!(e, Event::Switch(_))));
    }

    #[test]
    fn restore_failure_poisons_thread() {
        std::thread::spawn(|| {
            let ops = FakeNetns {
                fail_restore: true,
                ..FakeNetns::new()
            };
            let scope = NamespaceScope::enter(&ops, Path::new(TARGET)).unwrap();
            let err = scope.exit().unwrap_err();
            assert!(err.is_fatal());
            assert!(matches!(err, NetnsError::RestoreFailed { pending: None, .. }));
            assert_eq!(ops.count(&Event::Release("orig")), 1);
            assert_eq!(ops.count(&Event::Release("target")), 1);
            assert!(thread_poisoned());

            let healthy = FakeNetns::new();
            let err = NamespaceScope::enter(&healthy, Path::new(TARGET)).err().unwrap();
            assert!(matches!(err, NetnsError::ThreadPoisoned));
            assert!(healthy.events().is_empty());
        })
        .join()
        .unwrap();

        // Poisoning is per thread.
        assert!(!thread_poisoned());
    }
}
