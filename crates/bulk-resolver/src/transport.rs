use bytes::{Bytes, BytesMut};
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::VecDeque;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tokio::time::{sleep, timeout};

/// Pause after every send attempt, unless changed with
/// `Transport::set_delay`.
pub const DEFAULT_DELAY: Duration = Duration::from_micros(1000);

/// Size of the receive buffer.  Longer replies are truncated.
pub const RECV_BUFFER_LEN: usize = 1024;

/// How many ports `rebind` tries before giving up.
pub const PORT_PROBE_LIMIT: u32 = 65536;

/// Address family of the socket, and so of the nameservers which can
/// be used.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Family {
    Inet,
    Inet6,
}

impl Family {
    fn domain(self) -> Domain {
        match self {
            Family::Inet => Domain::IPV4,
            Family::Inet6 => Domain::IPV6,
        }
    }

    fn unspecified(self) -> IpAddr {
        match self {
            Family::Inet => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            Family::Inet6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }

    pub fn matches(self, address: &SocketAddr) -> bool {
        match self {
            Family::Inet => address.is_ipv4(),
            Family::Inet6 => address.is_ipv6(),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SocketKind {
    /// Independent UDP datagrams, spread over every nameserver.
    Datagram,
    /// One TCP session to the first nameserver.
    Stream,
}

#[derive(Debug)]
enum Connection {
    Udp(UdpSocket),
    Tcp(TcpStream),
}

/// A non-blocking socket plus the nameservers it talks to.
///
/// Queries are spread over the nameservers round-robin, and replies
/// are read from whichever nameserver sent them.  Nothing here knows
/// which reply belongs to which query: that is left to the caller.
#[derive(Debug)]
pub struct Transport {
    family: Family,
    kind: SocketKind,
    delay: Duration,
    nameservers: Vec<SocketAddr>,
    next: usize,
    connection: Option<Connection>,
}

impl Transport {
    pub fn new(family: Family, kind: SocketKind) -> Self {
        Self {
            family,
            kind,
            delay: DEFAULT_DELAY,
            nameservers: Vec::new(),
            next: 0,
            connection: None,
        }
    }

    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    pub fn nameservers(&self) -> &[SocketAddr] {
        &self.nameservers
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.connection {
            Some(Connection::Udp(socket)) => socket.local_addr().ok(),
            Some(Connection::Tcp(stream)) => stream.local_addr().ok(),
            None => None,
        }
    }

    /// Resolve `host` and add its first address of the right family
    /// to the end of the rotation.  A stream transport only ever talks
    /// to one nameserver, so once it has one this does nothing.
    ///
    /// # Errors
    ///
    /// If the name does not resolve to an address of the right family.
    pub async fn add_nameserver(&mut self, host: &str, port: u16) -> Result<(), Error> {
        if self.kind == SocketKind::Stream && !self.nameservers.is_empty() {
            tracing::debug!(%host, "ignoring extra nameserver for stream transport");
            return Ok(());
        }

        let addresses = lookup_host((host, port))
            .await
            .map_err(|error| Error::Resolve {
                host: host.to_string(),
                error: Some(error),
            })?;

        let family = self.family;
        let address = addresses
            .into_iter()
            .find(|address| family.matches(address))
            .ok_or_else(|| Error::Resolve {
                host: host.to_string(),
                error: None,
            })?;

        tracing::debug!(%host, %address, "added nameserver");
        self.nameservers.push(address);

        Ok(())
    }

    /// Replace the datagram socket with a fresh one bound to a port
    /// picked from the clock, so replies to an earlier run which are
    /// still in flight cannot be mistaken for ours.  Does nothing for
    /// a stream transport.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// If a socket cannot be created, or no port in range is free.
    pub fn rebind(&mut self) -> Result<(), Error> {
        if self.kind == SocketKind::Stream {
            return Ok(());
        }

        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |now| now.subsec_micros());

        self.bind_from(seed)
    }

    /// Bind a fresh datagram socket to the first free port counting up
    /// from `seed`.
    fn bind_from(&mut self, seed: u32) -> Result<(), Error> {
        self.connection = None;

        let socket =
            Socket::new(self.family.domain(), Type::DGRAM, Some(Protocol::UDP)).map_err(Error::Socket)?;
        socket.set_nonblocking(true).map_err(Error::Socket)?;

        let mut last_error = None;
        for attempt in 0..PORT_PROBE_LIMIT {
            let address = SocketAddr::new(self.family.unspecified(), port_candidate(seed, attempt));
            match socket.bind(&address.into()) {
                Ok(()) => {
                    let socket =
                        UdpSocket::from_std(socket.into()).map_err(Error::Socket)?;
                    tracing::debug!(local = ?socket.local_addr().ok(), attempt, "rebound socket");
                    self.connection = Some(Connection::Udp(socket));
                    return Ok(());
                }
                Err(error) => {
                    tracing::trace!(%address, %error, "port unavailable");
                    last_error = Some(error);
                }
            }
        }

        Err(Error::Bind(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::AddrInUse, "no port available")
        })))
    }

    /// Send every query in `queries`, front to back, removing each
    /// from the queue once it is on the wire.  Queries go to the
    /// nameservers in turn, carrying on from where the last call left
    /// off.  Sleeps for the configured delay after every attempt.
    ///
    /// # Errors
    ///
    /// If there are no nameservers, the socket cannot be set up, or a
    /// send fails for any reason other than a full socket buffer.  The
    /// failed query, and any after it, are left in `queries`.
    pub async fn send(&mut self, queries: &mut VecDeque<BytesMut>) -> Result<(), Error> {
        if self.nameservers.is_empty() {
            return Err(Error::NoNameservers);
        }

        if self.connection.is_none() {
            self.connect().await?;
        }

        let delay = self.delay;
        while let Some(query) = queries.front() {
            let address = self.nameservers[self.next];
            self.next = (self.next + 1) % self.nameservers.len();

            match &mut self.connection {
                Some(Connection::Udp(socket)) => send_udp(socket, address, query, delay).await?,
                Some(Connection::Tcp(stream)) => send_tcp(stream, address, query, delay).await?,
                None => return Err(Error::NoSocket),
            }

            tracing::trace!(%address, len = query.len(), "sent query");
            queries.pop_front();
        }

        Ok(())
    }

    /// Read one reply, if there is one waiting.  Never blocks.
    ///
    /// # Errors
    ///
    /// If there is no socket, the read fails, or the TCP session has
    /// been closed.
    pub fn recv(&self) -> Result<Option<Bytes>, Error> {
        let mut buf = [0u8; RECV_BUFFER_LEN];

        match &self.connection {
            Some(Connection::Udp(socket)) => match socket.try_recv_from(&mut buf) {
                Ok((len, from)) => {
                    tracing::trace!(%from, len, "received reply");
                    Ok(Some(Bytes::copy_from_slice(&buf[..len])))
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
                Err(error) => Err(Error::Recv(error)),
            },
            Some(Connection::Tcp(stream)) => match stream.try_read(&mut buf) {
                Ok(0) => Err(Error::Recv(io::ErrorKind::UnexpectedEof.into())),
                Ok(len) if len < 2 => Err(Error::Recv(io::ErrorKind::InvalidData.into())),
                Ok(len) => {
                    let size = usize::from(u16::from_be_bytes([buf[0], buf[1]]));
                    let end = len.min(size + 2);
                    tracing::trace!(len = end - 2, "received reply");
                    Ok(Some(Bytes::copy_from_slice(&buf[2..end])))
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
                Err(error) => Err(Error::Recv(error)),
            },
            None => Err(Error::NoSocket),
        }
    }

    /// Wait up to `wait` for a reply to become readable.  Returns
    /// `false` on timeout, or if there is no socket.
    pub async fn poll(&self, wait: Duration) -> bool {
        let ready = match &self.connection {
            Some(Connection::Udp(socket)) => timeout(wait, socket.readable()).await,
            Some(Connection::Tcp(stream)) => timeout(wait, stream.readable()).await,
            None => return false,
        };

        matches!(ready, Ok(Ok(())))
    }

    async fn connect(&mut self) -> Result<(), Error> {
        let connection = match self.kind {
            SocketKind::Datagram => {
                let address = SocketAddr::new(self.family.unspecified(), 0);
                let socket = UdpSocket::bind(address).await.map_err(Error::Socket)?;
                Connection::Udp(socket)
            }
            SocketKind::Stream => {
                let address = *self.nameservers.first().ok_or(Error::NoNameservers)?;
                let stream = TcpStream::connect(address)
                    .await
                    .map_err(|error| Error::Connect { address, error })?;
                Connection::Tcp(stream)
            }
        };

        self.connection = Some(connection);
        Ok(())
    }
}

async fn send_udp(
    socket: &UdpSocket,
    address: SocketAddr,
    query: &[u8],
    delay: Duration,
) -> Result<(), Error> {
    loop {
        socket
            .writable()
            .await
            .map_err(|error| Error::Send { address, error })?;
        let result = socket.try_send_to(query, address);
        sleep(delay).await;

        match result {
            Ok(_) => return Ok(()),
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                tracing::trace!(%address, "socket buffer full, retrying");
            }
            Err(error) => return Err(Error::Send { address, error }),
        }
    }
}

/// DNS over TCP needs a big-endian u16 length prefix on every
/// message.
async fn send_tcp(
    stream: &mut TcpStream,
    address: SocketAddr,
    query: &[u8],
    delay: Duration,
) -> Result<(), Error> {
    let len = u16::try_from(query.len()).map_err(|_| Error::Send {
        address,
        error: io::ErrorKind::InvalidInput.into(),
    })?;

    let result = async {
        stream.write_all(&len.to_be_bytes()).await?;
        stream.write_all(query).await
    }
    .await;
    sleep(delay).await;

    result.map_err(|error| Error::Send { address, error })
}

/// Ports wrap at 65536: a candidate of 0 lets the OS pick.
#[allow(clippy::cast_possible_truncation)]
fn port_candidate(seed: u32, attempt: u32) -> u16 {
    (seed.wrapping_add(attempt) & 0xffff) as u16
}

/// Errors from setting up or using the transport.
#[derive(Debug)]
pub enum Error {
    /// A socket could not be created.
    Socket(io::Error),

    /// No port could be bound.  This is the error from the last
    /// attempt.
    Bind(io::Error),

    /// The TCP session could not be established.
    Connect {
        address: SocketAddr,
        error: io::Error,
    },

    /// A query could not be sent.
    Send {
        address: SocketAddr,
        error: io::Error,
    },

    /// A reply could not be read.
    Recv(io::Error),

    /// `recv` was called before any socket exists.
    NoSocket,

    /// `send` was called with no nameservers configured.
    NoNameservers,

    /// A nameserver name could not be resolved to an address of the
    /// right family.  If there is no `error`, the lookup succeeded
    /// but had no suitable address.
    Resolve {
        host: String,
        error: Option<io::Error>,
    },
}

impl Error {
    /// Whether the TCP session has been closed by the other end, so no
    /// further replies can arrive.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Recv(error) if error.kind() == io::ErrorKind::UnexpectedEof)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Socket(error) => write!(f, "could not create socket: {error}"),
            Error::Bind(error) => write!(f, "could not bind socket: {error}"),
            Error::Connect { address, error } => {
                write!(f, "could not connect to {address}: {error}")
            }
            Error::Send { address, error } => write!(f, "could not send to {address}: {error}"),
            Error::Recv(error) => write!(f, "could not receive: {error}"),
            Error::NoSocket => write!(f, "no socket"),
            Error::NoNameservers => write!(f, "no nameservers"),
            Error::Resolve {
                host,
                error: Some(error),
            } => write!(f, "could not resolve '{host}': {error}"),
            Error::Resolve { host, error: None } => {
                write!(f, "'{host}' has no address of the requested family")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Socket(error)
            | Error::Bind(error)
            | Error::Connect { error, .. }
            | Error::Send { error, .. }
            | Error::Recv(error)
            | Error::Resolve {
                error: Some(error), ..
            } => Some(error),
            Error::NoSocket | Error::NoNameservers | Error::Resolve { error: None, .. } => None,
        }
    }
}
