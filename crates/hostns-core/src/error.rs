//! Error types for hostns-core

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetnsError {
    #[error("cannot read current network namespace: {source}")]
    NamespaceUnavailable {
        #[source]
        source: std::io::Error,
    },

    #[error("network namespace not found at {}: {reason}", .path.display())]
    NamespaceNotFound { path: PathBuf, reason: String },

    #[error("failed to switch to target network namespace: {source}")]
    NamespaceSwitchFailed {
        #[source]
        source: nix::Error,
    },

    #[error("failed to listen on {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The thread could not be switched back and is now in an unknown
    /// namespace. `pending` holds the error of the guarded block, if it had
    /// failed too.
    #[error(
        "{}failed to switch back to original network namespace: {source}; thread namespace is unknown",
        .pending.as_ref().map(|e| format!("{e}; ")).unwrap_or_default()
    )]
    RestoreFailed {
        #[source]
        source: nix::Error,
        pending: Option<Box<NetnsError>>,
    },

    #[error("thread previously failed to restore its network namespace")]
    ThreadPoisoned,

    #[error("invalid listen address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to spawn namespace bootstrap thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    #[error("namespace bootstrap thread panicked")]
    DedicatedThreadPanicked,
}

impl NetnsError {
    /// Errors after which the calling thread must not be used for
    /// namespace-sensitive work again.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::RestoreFailed { .. } | Self::ThreadPoisoned)
    }
}
