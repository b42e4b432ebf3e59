//! Listener bootstrap across network namespaces
//!
//! The protocol, strictly in order:
//!
//! 1. capture the calling thread's namespace
//! 2. resolve the target namespace by path
//! 3. switch into the target
//! 4. run the block (bind the listener)
//! 5. switch back, even when step 4 failed
//! 6. release the target handle, then the original
//!
//! Everything runs synchronously on the calling thread. The first error wins,
//! except that a failed switch back is always reported as
//! [`NetnsError::RestoreFailed`], with the block's own error attached.

use crate::listener::{ListenAddress, bind_listener};
use crate::scope::{LinuxNetns, NamespaceOps, NamespaceScope};
use crate::{NetnsError, Result};
use std::net::TcpListener;
use std::path::{Path, PathBuf};

/// Run `block` with the calling thread inside the namespace at `path`.
pub fn run_in_namespace<N, T, F>(ops: &N, path: &Path, block: F) -> Result<T>
where
    N: NamespaceOps,
    F: FnOnce() -> Result<T>,
{
    let scope = NamespaceScope::enter(ops, path)?;
    let outcome = block();

    match (outcome, scope.exit()) {
        (outcome, Ok(())) => outcome,
        (Ok(_), Err(restore)) => Err(restore),
        (Err(err), Err(NetnsError::RestoreFailed { source, .. })) => Err(NetnsError::RestoreFailed {
            source,
            pending: Some(Box::new(err)),
        }),
        (Err(_), Err(other)) => Err(other),
    }
}

/// Bind `address` inside the network namespace at `netns_path` and return the
/// listener with the calling thread back in its original namespace.
pub fn listen_in_namespace(netns_path: &Path, address: &ListenAddress) -> Result<TcpListener> {
    tracing::debug!(netns_path = %netns_path.display(), %address, "binding listener in namespace");

    let listener = run_in_namespace(&LinuxNetns, netns_path, || bind_listener(address))?;

    tracing::info!(
        netns_path = %netns_path.display(),
        local_addr = ?listener.local_addr().ok(),
        "listener ready, namespace restored"
    );
    Ok(listener)
}

/// Like [`listen_in_namespace`], but on a fresh OS thread.
///
/// The caller's thread never changes namespace, which makes this safe to
/// call from inside an async runtime. If switching back fails, only the
/// helper thread is affected and it exits right away.
pub fn listen_on_dedicated_thread(netns_path: &Path, address: &ListenAddress) -> Result<TcpListener> {
    let netns_path: PathBuf = netns_path.to_path_buf();
    let address = address.clone();

    std::thread::Builder::new()
        .name("netns-bootstrap".into())
        .spawn(move || listen_in_namespace(&netns_path, &address))
        .map_err(NetnsError::ThreadSpawn)?
        .join()
        .map_err(|_| NetnsError::DedicatedThreadPanicked)?
}
