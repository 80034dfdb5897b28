use std::{
    fmt, io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs as _, UdpSocket},
    time::Duration,
};

use once_cell::sync::OnceCell;
use tracing::debug;

/// Sends serialized payloads to a collector.
///
/// Sends are fire-and-forget: nothing is read back, and a failed send is reported once and never retried.
pub trait Transport: Send + Sync {
    /// Sends a single payload, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// If the payload could not be handed to the network, the underlying I/O error is returned.
    fn send(&self, payload: &[u8]) -> io::Result<usize>;

    /// Returns a short identifier for the transport, such as `udp`.
    fn transport_id(&self) -> &'static str;
}

/// UDP transport.
///
/// The socket is created on the first send and reused for every send after that. The destination host is resolved on
/// every send, so DNS changes are picked up without any caching beyond what the platform provides.
///
/// Every resolved address is considered. The socket is bound for IPv4 when the destination has an IPv4 address, and
/// for IPv6 only when it has none. Once bound, each send goes to the first resolved address of the socket's family; a
/// send fails only when the destination no longer resolves to any address of that family.
///
/// Cloning a `UdpTransport` copies its configuration only: the clone creates its own socket when first used.
pub struct UdpTransport {
    host: String,
    port: u16,
    write_timeout: Option<Duration>,
    socket: OnceCell<BoundSocket>,
}

struct BoundSocket {
    socket: UdpSocket,
    family: AddrFamily,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AddrFamily {
    V4,
    V6,
}

impl AddrFamily {
    fn of(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(_) => AddrFamily::V4,
            SocketAddr::V6(_) => AddrFamily::V6,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            AddrFamily::V4 => "IPv4",
            AddrFamily::V6 => "IPv6",
        }
    }
}

/// Picks the destination address out of everything the host resolved to.
///
/// With a bound socket, only addresses of its family qualify. Without one, IPv4 is preferred.
fn select_addr(addrs: &[SocketAddr], bound: Option<AddrFamily>) -> Option<SocketAddr> {
    match bound {
        Some(family) => addrs.iter().find(|addr| AddrFamily::of(addr) == family).copied(),
        None => addrs.iter().find(|addr| addr.is_ipv4()).or_else(|| addrs.first()).copied(),
    }
}

impl UdpTransport {
    /// Creates a new `UdpTransport` for the given destination.
    pub fn new<H>(host: H, port: u16) -> Self
    where
        H: Into<String>,
    {
        UdpTransport { host: host.into(), port, write_timeout: None, socket: OnceCell::new() }
    }

    /// Sets the write timeout applied to the socket when it is created.
    #[must_use]
    pub fn with_write_timeout(mut self, write_timeout: Option<Duration>) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Returns the destination host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the destination port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns `true` if the socket has been created.
    pub fn is_connected(&self) -> bool {
        self.socket.get().is_some()
    }

    fn resolve(&self) -> io::Result<Vec<SocketAddr>> {
        let addrs = (self.host.as_str(), self.port).to_socket_addrs()?.collect::<Vec<_>>();
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no addresses found for {}:{}", self.host, self.port),
            ));
        }
        Ok(addrs)
    }

    fn socket_for(&self, family: AddrFamily) -> io::Result<&BoundSocket> {
        self.socket.get_or_try_init(|| {
            let socket = match family {
                AddrFamily::V4 => UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?,
                AddrFamily::V6 => UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0))?,
            };
            socket.set_write_timeout(self.write_timeout)?;

            debug!(local_addr = ?socket.local_addr().ok(), ?family, host = %self.host, "Created UDP socket.");
            Ok(BoundSocket { socket, family })
        })
    }
}

impl Transport for UdpTransport {
    fn send(&self, payload: &[u8]) -> io::Result<usize> {
        let addrs = self.resolve()?;

        // Another thread may bind the socket first, so the address is picked against the socket actually bound.
        let preferred = self.socket.get().map(|bound| bound.family);
        let family = select_addr(&addrs, preferred).map_or(AddrFamily::V4, |addr| AddrFamily::of(&addr));
        let bound = self.socket_for(family)?;

        let addr = select_addr(&addrs, Some(bound.family)).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no {} addresses found for {}:{}", bound.family.as_str(), self.host, self.port),
            )
        })?;
        bound.socket.send_to(payload, addr)
    }

    fn transport_id(&self) -> &'static str {
        "udp"
    }
}

impl Clone for UdpTransport {
    fn clone(&self) -> Self {
        UdpTransport {
            host: self.host.clone(),
            port: self.port,
            write_timeout: self.write_timeout,
            socket: OnceCell::new(),
        }
    }
}

impl fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdpTransport")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("write_timeout", &self.write_timeout)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

/// Transport that discards every payload.
///
/// Useful for turning metrics off without changing call sites.
#[derive(Clone, Copy, Debug, Default)]
pub struct NopTransport;

impl Transport for NopTransport {
    fn send(&self, payload: &[u8]) -> io::Result<usize> {
        Ok(payload.len())
    }

    fn transport_id(&self) -> &'static str {
        "nop"
    }
}
