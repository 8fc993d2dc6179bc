use std::{
    fmt::Display,
    io::Write,
    net::{AddrParseError, Ipv4Addr, SocketAddrV4},
    sync::Arc,
};

use parking_lot::Mutex;
use tilt_packet::Packet;
use tracing::{debug, info, warn};

use crate::link::{Dialer, Link, TcpDialer};

pub const DEFAULT_HOST: &str = "192.168.1.110";
pub const DEFAULT_PORT: u16 = 1025;

/// Where the robot controller listens. The host must be an IPv4 literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
        }
    }
}

impl RemoteConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses the host as a numeric address. No name resolution is done.
    pub fn socket_addr(&self) -> Result<SocketAddrV4, ConnectError> {
        let ip: Ipv4Addr =
            self.host
                .trim()
                .parse()
                .map_err(|source| ConnectError::InvalidAddress {
                    host: self.host.clone(),
                    source,
                })?;
        Ok(SocketAddrV4::new(ip, self.port))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("{host:?} is not an IPv4 address: {source}")]
    InvalidAddress {
        host: String,
        source: AddrParseError,
    },
    #[error("Failed to connect to {addr}: {source}")]
    Io {
        addr: SocketAddrV4,
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// There was no live connection. The packet was dropped.
    #[error("Socket is not connected")]
    NotConnected,
    /// The write failed and the connection has been torn down.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// What the host should show the operator after the latest attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Disconnected,
    Connected(SocketAddrV4),
    Ok,
    ConnectFailed(String),
    SendFailed(String),
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Disconnected => write!(f, "Not connected"),
            Status::Connected(addr) => write!(f, "Connected to {addr}"),
            Status::Ok => write!(f, "OK"),
            Status::ConnectFailed(msg) => write!(f, "[ERROR] connecting to server message: {msg}"),
            Status::SendFailed(msg) => write!(f, "[ERROR] sending message: {msg}"),
        }
    }
}

struct State<L> {
    link: Option<L>,
    /// Only true while `link` is `Some`.
    healthy: bool,
    status: Status,
}

struct Inner<D: Dialer> {
    dialer: D,
    remote: Mutex<RemoteConfig>,
    state: Mutex<State<D::Link>>,
    /// Serializes connect attempts. Never held together with `state` while dialing.
    connecting: Mutex<()>,
}

/// Owns the single connection to the robot.
///
/// All connection state lives behind one lock, so the sensor path and the
/// health check can call in from different threads. Cloning is cheap and
/// every clone drives the same session.
pub struct SessionManager<D: Dialer = TcpDialer> {
    inner: Arc<Inner<D>>,
}

impl<D: Dialer> Clone for SessionManager<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl SessionManager<TcpDialer> {
    pub fn new(remote: RemoteConfig) -> Self {
        Self::with_dialer(TcpDialer::default(), remote)
    }
}

impl<D: Dialer> SessionManager<D> {
    pub fn with_dialer(dialer: D, remote: RemoteConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                dialer,
                remote: Mutex::new(remote),
                state: Mutex::new(State {
                    link: None,
                    healthy: false,
                    status: Status::Disconnected,
                }),
                connecting: Mutex::new(()),
            }),
        }
    }

    pub fn remote(&self) -> RemoteConfig {
        self.inner.remote.lock().clone()
    }

    /// Takes effect on the next connect attempt. A live connection is kept.
    pub fn set_remote(&self, remote: RemoteConfig) {
        *self.inner.remote.lock() = remote;
    }

    pub fn state(&self) -> ConnectionState {
        if self.inner.state.lock().link.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.inner.state.lock().healthy
    }

    pub fn status(&self) -> Status {
        self.inner.state.lock().status.clone()
    }

    /// Opens a new connection using the current [`RemoteConfig`].
    ///
    /// On failure the session is left as it was and the error is recorded in
    /// the status. On success any previous connection is replaced.
    pub fn connect(&self) -> Result<(), ConnectError> {
        let _connecting = self.inner.connecting.lock();
        self.connect_locked()
    }

    fn connect_locked(&self) -> Result<(), ConnectError> {
        let remote = self.remote();
        // Dial without the state lock so `send` keeps failing fast meanwhile
        let result = remote.socket_addr().and_then(|addr| {
            self.inner
                .dialer
                .dial(addr)
                .map(|link| (addr, link))
                .map_err(|source| ConnectError::Io { addr, source })
        });

        let mut state = self.inner.state.lock();
        match result {
            Ok((addr, link)) => {
                if let Some(old) = state.link.replace(link) {
                    let _ = old.close();
                }
                state.healthy = true;
                state.status = Status::Connected(addr);
                drop(state);
                info!("Connected to robot at {addr}");
                Ok(())
            }
            Err(e) => {
                let status = Status::ConnectFailed(e.to_string());
                let repeated = state.status == status;
                state.status = status;
                drop(state);
                if repeated {
                    debug!("{e}");
                } else {
                    warn!("{e}");
                }
                Err(e)
            }
        }
    }

    /// Writes one packet on the live connection.
    ///
    /// Never reconnects. Without a connection this fails immediately with
    /// [`SendError::NotConnected`]. A failed write closes the connection and
    /// leaves the session disconnected for the health check to repair.
    pub fn send(&self, packet: &Packet) -> Result<(), SendError> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        let Some(link) = state.link.as_mut() else {
            state.healthy = false;
            let e = SendError::NotConnected;
            state.status = Status::SendFailed(e.to_string());
            return Err(e);
        };

        match link.write_all(packet.as_bytes()).and_then(|()| link.flush()) {
            Ok(()) => {
                state.healthy = true;
                state.status = Status::Ok;
                Ok(())
            }
            Err(e) => {
                if let Some(link) = state.link.take() {
                    if let Err(close_err) = link.close() {
                        debug!("Ignoring error while closing broken connection: {close_err}");
                    }
                }
                state.healthy = false;
                state.status = Status::SendFailed(e.to_string());
                drop(guard);
                warn!("Failed to send packet, dropping connection: {e}");
                Err(SendError::Io(e))
            }
        }
    }

    /// Reconnects if the session is not healthy, otherwise does nothing.
    ///
    /// Returns `None` when no attempt was made. Concurrent calls perform at
    /// most one connect between them.
    pub fn health_check(&self) -> Option<Result<(), ConnectError>> {
        let _connecting = self.inner.connecting.lock();
        if self.is_healthy() {
            return None;
        }
        Some(self.connect_locked())
    }

    /// Closes the connection, if any.
    pub fn disconnect(&self) {
        let mut state = self.inner.state.lock();
        if let Some(link) = state.link.take() {
            if let Err(e) = link.close() {
                debug!("Ignoring error while closing connection: {e}");
            }
            info!("Disconnected from robot");
        }
        state.healthy = false;
        state.status = Status::Disconnected;
    }
}
