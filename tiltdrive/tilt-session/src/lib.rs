//! Connection lifecycle and deadman gating for the tilt teleoperation client.
//!
//! Two independent callers drive a session: the sensor path, which encodes
//! and sends one packet per sample and fails fast, and a periodic
//! [`HealthMonitor`] that is the only thing allowed to reconnect.

mod link;
mod lock;
mod monitor;
mod session;
mod teleop;

pub use link::{Dialer, Link, TcpDialer, DEFAULT_CONNECT_TIMEOUT, DEFAULT_WRITE_TIMEOUT};
pub use lock::LockState;
pub use monitor::{HealthMonitor, DEFAULT_HEALTH_CHECK_PERIOD};
pub use session::{
    ConnectError, ConnectionState, RemoteConfig, SendError, SessionManager, Status, DEFAULT_HOST,
    DEFAULT_PORT,
};
pub use teleop::Teleop;
pub use tilt_packet;

#[cfg(test)]
pub(crate) mod mock;
