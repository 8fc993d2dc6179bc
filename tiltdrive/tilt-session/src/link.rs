use std::{
    io::Write,
    net::{Shutdown, SocketAddr, SocketAddrV4, TcpStream},
    time::Duration,
};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(100);

/// A live, writable connection to the robot.
pub trait Link: Write + Send + Sized + 'static {
    /// Closes the connection. Errors here are never allowed to mask the
    /// failure that caused the close.
    fn close(self) -> std::io::Result<()>;
}

impl Link for TcpStream {
    fn close(self) -> std::io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

/// Opens [`Link`]s. Every call must return within a bounded time.
pub trait Dialer: Send + Sync {
    type Link: Link;

    fn dial(&self, addr: SocketAddrV4) -> std::io::Result<Self::Link>;
}

/// Dials plain TCP with Nagle disabled and bounded connect and write times.
#[derive(Debug, Clone, Copy)]
pub struct TcpDialer {
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl Dialer for TcpDialer {
    type Link = TcpStream;

    fn dial(&self, addr: SocketAddrV4) -> std::io::Result<TcpStream> {
        let stream = TcpStream::connect_timeout(&SocketAddr::V4(addr), self.connect_timeout)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(self.write_timeout))?;
        Ok(stream)
    }
}
