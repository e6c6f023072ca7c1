use std::{
    fmt, io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs as _, UdpSocket},
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::debug;

pub mod sync;

/// Remote server address.
///
/// The host is kept unresolved until a socket is actually created, so that building a client never touches the network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RemoteAddr {
    pub host: String,
    pub port: u16,
}

impl RemoteAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        RemoteAddr { host: host.into(), port }
    }

    fn resolve(&self) -> io::Result<Vec<SocketAddr>> {
        (self.host.as_str(), self.port).to_socket_addrs().map(|addrs| addrs.collect())
    }
}

impl fmt::Display for RemoteAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl<'a> TryFrom<&'a str> for RemoteAddr {
    type Error = String;

    fn try_from(addr: &'a str) -> Result<Self, Self::Error> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| format!("missing port in '{}' (expected '<host>:<port>')", addr))?;

        // Bracketed IPv6 literals, such as `[::1]:8251`.
        let host = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host);
        if host.is_empty() {
            return Err(format!("missing host in '{}' (expected '<host>:<port>')", addr));
        }

        let port = port.parse::<u16>().map_err(|e| format!("invalid port '{}': {}", port, e))?;

        Ok(RemoteAddr::new(host, port))
    }
}

/// A connected, connectionless socket that metric payloads are written to.
pub trait PacketSocket: Send {
    /// Sends a single payload as one datagram.
    ///
    /// # Errors
    ///
    /// If the payload cannot be handed off to the underlying transport, an error is returned.
    fn send(&mut self, payload: &[u8]) -> io::Result<usize>;
}

impl PacketSocket for UdpSocket {
    fn send(&mut self, payload: &[u8]) -> io::Result<usize> {
        UdpSocket::send(self, payload)
    }
}

/// Creates sockets for the transport.
///
/// The transport calls [`Connector::connect`] lazily, on the first send, and again whenever a send fails and the
/// current socket has to be replaced.
pub trait Connector: Send {
    /// Creates a new socket connected to the remote server.
    ///
    /// # Errors
    ///
    /// If the socket cannot be created or connected, an error is returned.
    fn connect(&self) -> io::Result<Box<dyn PacketSocket>>;
}

// How long resolved addresses are reused before the host is looked up again.
const RESOLUTION_TTL: Duration = Duration::from_secs(60);

// How long a failed lookup is remembered, during which socket creation fails without touching the resolver.
const FAILED_RESOLUTION_TTL: Duration = Duration::from_secs(5);

#[derive(Debug)]
enum Resolution {
    Resolved(Vec<SocketAddr>),
    Failed(io::ErrorKind, String),
}

#[derive(Debug)]
struct CachedResolution {
    resolution: Resolution,
    expires_at: Instant,
}

/// Connector for UDP sockets.
///
/// Each socket is bound to an ephemeral local port and connected to the first resolved address of the remote host that
/// accepts the connection.
///
/// Resolved addresses are cached for a minute, and failed lookups for a few seconds, so that replacing a socket after
/// a send error does not normally wait on the resolver.
#[derive(Debug)]
pub struct UdpConnector {
    remote_addr: RemoteAddr,
    resolved: Mutex<Option<CachedResolution>>,
}

impl UdpConnector {
    /// Creates a new `UdpConnector` for the given host and port.
    ///
    /// The host is not resolved until a socket is created.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::from_remote_addr(RemoteAddr::new(host, port))
    }

    pub(crate) fn from_remote_addr(remote_addr: RemoteAddr) -> Self {
        UdpConnector { remote_addr, resolved: Mutex::new(None) }
    }

    fn addrs_with<F>(&self, now: Instant, resolve: F) -> io::Result<Vec<SocketAddr>>
    where
        F: FnOnce(&RemoteAddr) -> io::Result<Vec<SocketAddr>>,
    {
        let mut resolved = self.resolved.lock();

        if let Some(cached) = resolved.as_ref().filter(|cached| now < cached.expires_at) {
            return match &cached.resolution {
                Resolution::Resolved(addrs) => Ok(addrs.clone()),
                Resolution::Failed(kind, message) => Err(io::Error::new(*kind, message.clone())),
            };
        }

        let (resolution, result) = match resolve(&self.remote_addr) {
            Ok(addrs) => {
                debug!(remote_addr = %self.remote_addr, addrs = addrs.len(), "Resolved remote address.");
                (Resolution::Resolved(addrs.clone()), Ok(addrs))
            }
            Err(e) => {
                debug!(remote_addr = %self.remote_addr, error = %e, "Failed to resolve remote address.");
                (Resolution::Failed(e.kind(), e.to_string()), Err(e))
            }
        };

        let ttl = match resolution {
            Resolution::Resolved(_) => RESOLUTION_TTL,
            Resolution::Failed(..) => FAILED_RESOLUTION_TTL,
        };
        *resolved = Some(CachedResolution { resolution, expires_at: now + ttl });

        result
    }

    fn forget_addrs(&self) {
        *self.resolved.lock() = None;
    }
}

impl Connector for UdpConnector {
    fn connect(&self) -> io::Result<Box<dyn PacketSocket>> {
        let mut last_error = None;
        for addr in self.addrs_with(Instant::now(), RemoteAddr::resolve)? {
            let local_addr = if addr.is_ipv4() {
                SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
            } else {
                SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
            };

            // Connect before handing the socket out, so callers never see a half-initialized socket.
            let result = UdpSocket::bind(local_addr).and_then(|socket| {
                socket.connect(addr)?;
                Ok(socket)
            });

            match result {
                Ok(socket) => {
                    debug!(remote_addr = %self.remote_addr, peer = %addr, "Created socket.");
                    return Ok(Box::new(socket));
                }
                Err(e) => last_error = Some(e),
            }
        }

        // None of the cached addresses worked, so look the host up again next time.
        self.forget_addrs();

        Err(last_error.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses found for '{}'", self.remote_addr),
            )
        }))
    }
}
