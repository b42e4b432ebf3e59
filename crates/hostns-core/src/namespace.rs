//! Network namespace handles
//!
//! A [`NetNs`] owns an open descriptor on an nsfs file such as
//! `/proc/1/ns/net`. The descriptor is the handle: it keeps the namespace
//! alive, it is what `setns(2)` takes, and closing it on drop is the release.

use crate::{NetnsError, Result};
use nix::sched::{CloneFlags, setns};
use std::fmt;
use std::fs::File;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::path::Path;

/// Network namespace of the init process, i.e. the host's default namespace
/// when the process shares the host PID namespace.
pub const HOST_NETNS_PATH: &str = "/proc/1/ns/net";

/// Network namespace of the calling thread.
pub const THREAD_NETNS_PATH: &str = "/proc/thread-self/ns/net";

/// Identity of a network namespace (its nsfs inode number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NamespaceId(u64);

impl NamespaceId {
    #[must_use]
    pub const fn inode(self) -> u64 {
        self.0
    }

    /// Parse the `net:[4026531840]` form the kernel uses for nsfs links.
    fn from_link(link: &str) -> Option<Self> {
        link.strip_prefix("net:[")?
            .strip_suffix(']')?
            .parse()
            .ok()
            .map(Self)
    }
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "net:[{}]", self.0)
    }
}

/// Owned handle to one network namespace
#[derive(Debug)]
pub struct NetNs {
    fd: OwnedFd,
    id: NamespaceId,
}

impl NetNs {
    /// Capture the network namespace the calling thread is in right now.
    ///
    /// This must be taken on the same thread that will later switch, since
    /// namespace membership is per thread.
    pub fn current() -> Result<Self> {
        let file = File::open(THREAD_NETNS_PATH)
            .or_else(|_| {
                // Kernels before 3.17 have no /proc/thread-self.
                let tid = nix::unistd::gettid();
                File::open(format!("/proc/self/task/{tid}/ns/net"))
            })
            .map_err(|source| NetnsError::NamespaceUnavailable { source })?;

        Self::from_file(file).map_err(|source| NetnsError::NamespaceUnavailable { source })
    }

    /// Open the network namespace referenced by `path`.
    ///
    /// Anything that is not an nsfs network namespace file is reported as
    /// [`NetnsError::NamespaceNotFound`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let not_found = |e: io::Error| NetnsError::NamespaceNotFound {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let file = File::open(path).map_err(not_found)?;
        Self::from_file(file).map_err(not_found)
    }

    fn from_file(file: File) -> io::Result<Self> {
        let fd = OwnedFd::from(file);
        let id = identify(fd.as_fd())?;
        Ok(Self { fd, id })
    }

    #[must_use]
    pub const fn id(&self) -> NamespaceId {
        self.id
    }

    /// Move the calling thread into this namespace.
    pub fn enter(&self) -> nix::Result<()> {
        setns(&self.fd, CloneFlags::CLONE_NEWNET)
    }
}

impl AsFd for NetNs {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl Drop for NetNs {
    fn drop(&mut self) {
        tracing::trace!(netns = %self.id, fd = self.fd.as_raw_fd(), "releasing namespace handle");
    }
}

/// Read the namespace identity behind an open descriptor.
fn identify(fd: BorrowedFd<'_>) -> io::Result<NamespaceId> {
    let link = std::fs::read_link(format!("/proc/self/fd/{}", fd.as_raw_fd()))?;
    let link = link.to_string_lossy();

    NamespaceId::from_link(&link).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{link} is not a network namespace"),
        )
    })
}
