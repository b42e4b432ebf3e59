//! TCP listener creation
//!
//! [`bind_listener`] is an ordinary bind/listen. It has no namespace logic of
//! its own; whatever namespace the calling thread is in when it runs is the
//! one the socket belongs to for its whole life.

use crate::{NetnsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, ToSocketAddrs};
use std::str::FromStr;

/// Address to listen on, in `host:port` form.
///
/// An empty host (`":7082"`) means every interface. IPv6 literals must be
/// bracketed (`"[::1]:7082"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ListenAddress {
    host: String,
    port: u16,
}

impl ListenAddress {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Every interface on `port`.
    #[must_use]
    pub const fn any(port: u16) -> Self {
        Self {
            host: String::new(),
            port,
        }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Candidate socket addresses, in the order they are tried.
    ///
    /// Hostnames are resolved here, so call this from the namespace the
    /// listener is meant for.
    pub fn socket_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        if self.host.is_empty() {
            // Dual-stack first, plain IPv4 when IPv6 is unavailable.
            return Ok(vec![
                SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), self.port),
                SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.port),
            ]);
        }
        if let Ok(ip) = self.host.parse::<IpAddr>() {
            return Ok(vec![SocketAddr::new(ip, self.port)]);
        }
        Ok((self.host.as_str(), self.port).to_socket_addrs()?.collect())
    }
}

impl FromStr for ListenAddress {
    type Err = NetnsError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| NetnsError::InvalidAddress {
            address: s.to_string(),
            reason: reason.to_string(),
        };

        let (host, port) = s.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;

        let host = if let Some(inner) = host.strip_prefix('[') {
            let inner = inner
                .strip_suffix(']')
                .ok_or_else(|| invalid("missing ']' in address"))?;
            inner
                .parse::<Ipv6Addr>()
                .map_err(|_| invalid("bracketed host is not an IPv6 address"))?;
            inner
        } else if host.contains(':') {
            return Err(invalid("too many colons in address"));
        } else {
            host
        };

        if port.is_empty() {
            return Err(invalid("missing port"));
        }
        let port = port.parse::<u16>().map_err(|_| invalid("invalid port"))?;

        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for ListenAddress {
    type Error = NetnsError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ListenAddress> for String {
    fn from(value: ListenAddress) -> Self {
        value.to_string()
    }
}

impl From<SocketAddr> for ListenAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Bind and listen on `address` in the calling thread's current namespace.
///
/// Candidates from [`ListenAddress::socket_addrs`] are tried in order; the
/// first that binds wins. On failure no socket is left open.
pub fn bind_listener(address: &ListenAddress) -> Result<TcpListener> {
    let bind_failed = |source| NetnsError::BindFailed {
        address: address.to_string(),
        source,
    };

    let mut last_err = None;
    for addr in address.socket_addrs().map_err(bind_failed)? {
        match TcpListener::bind(addr) {
            Ok(listener) => {
                tracing::info!(address = %address, bound = %addr, "listener bound");
                return Ok(listener);
            }
            Err(e) if !may_try_next(addr, &e) => return Err(bind_failed(e)),
            Err(e) => {
                tracing::debug!(candidate = %addr, error = %e, "bind attempt failed");
                last_err = Some(e);
            }
        }
    }

    Err(bind_failed(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "address resolved to nothing")
    })))
}

/// Whether a failed bind on `addr` lets the next candidate be tried.
///
/// The dual-stack `[::]` candidate only gives way to `0.0.0.0` when IPv6 is
/// missing in the namespace; anything else, such as the port being taken,
/// is final.
fn may_try_next(addr: SocketAddr, err: &io::Error) -> bool {
    match addr.ip() {
        IpAddr::V6(ip) if ip.is_unspecified() => {
            err.kind() == io::ErrorKind::AddrNotAvailable
                || err.raw_os_error() == Some(nix::errno::Errno::EAFNOSUPPORT as i32)
        }
        _ => true,
    }
}
