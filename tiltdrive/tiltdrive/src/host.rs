//! Drives a [`Teleop`] from a line protocol on stdin.
//!
//! Each line is one event:
//!
//! | line            | event                                   |
//! |-----------------|-----------------------------------------|
//! | `<x> <y> <z>`   | sensor sample                           |
//! | `sample x y z`  | sensor sample                           |
//! | `hold`          | deadman pressed                         |
//! | `release`       | deadman released                        |
//! | `lock`/`unlock` | explicit lock change                    |
//! | `pause`         | host lost focus, lock until held again  |
//! | `status`        | print the operator status to stdout     |
//!
//! Blank lines and lines starting with `#` are ignored.
use std::str::FromStr;

use tilt_packet::ControlSample;
use tilt_session::{SendError, Teleop};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostEvent {
    Sample(ControlSample),
    Deadman(bool),
    Lock(bool),
    Pause,
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseEventError {
    #[error("Empty line")]
    Empty,
    #[error("Unknown event: {0}")]
    Unknown(String),
    #[error("Expected 3 axes, got {0}")]
    WrongAxisCount(usize),
    #[error("Invalid axis value: {0}")]
    InvalidAxis(String),
}

fn parse_axes<'a>(
    parts: impl Iterator<Item = &'a str>,
) -> Result<ControlSample, ParseEventError> {
    let axes = parts
        .map(|s| {
            s.parse::<f32>()
                .map_err(|_| ParseEventError::InvalidAxis(s.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    match axes.as_slice() {
        &[x, y, z] => Ok(ControlSample::new(x, y, z)),
        _ => Err(ParseEventError::WrongAxisCount(axes.len())),
    }
}

impl FromStr for HostEvent {
    type Err = ParseEventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let Some(first) = parts.next() else {
            return Err(ParseEventError::Empty);
        };
        let event = match first.to_lowercase().as_str() {
            "sample" => return parse_axes(parts).map(HostEvent::Sample),
            "hold" => HostEvent::Deadman(true),
            "release" => HostEvent::Deadman(false),
            "lock" => HostEvent::Lock(true),
            "unlock" => HostEvent::Lock(false),
            "pause" => HostEvent::Pause,
            "status" => HostEvent::Status,
            _ if first.parse::<f32>().is_ok() => {
                return parse_axes(s.split_whitespace()).map(HostEvent::Sample)
            }
            _ => return Err(ParseEventError::Unknown(first.to_string())),
        };
        if parts.next().is_some() {
            return Err(ParseEventError::Unknown(s.trim().to_string()));
        }
        Ok(event)
    }
}

/// Sends one sample from inside the runtime.
///
/// The write is bounded by the session's write timeout but still blocks, so
/// the worker is handed off while it runs. Needs the multi-threaded runtime.
pub fn send_sample(teleop: &Teleop, sample: ControlSample) -> Result<(), SendError> {
    tokio::task::block_in_place(|| teleop.on_sensor_sample(sample))
}

pub fn apply(teleop: &Teleop, event: HostEvent) {
    match event {
        HostEvent::Sample(sample) => match send_sample(teleop, sample) {
            Ok(()) => {}
            // The health check reconnects, nothing else to do
            Err(SendError::NotConnected) => debug!("Dropped sample, not connected"),
            Err(e) => debug!("Dropped sample: {e}"),
        },
        HostEvent::Deadman(pressed) => {
            teleop.deadman(pressed);
            info!(pressed, "Deadman");
        }
        HostEvent::Lock(locked) => {
            teleop.on_lock_state_changed(locked);
            info!(locked, "Lock state changed");
        }
        HostEvent::Pause => {
            teleop.pause();
            info!("Paused");
        }
        HostEvent::Status => println!("{}", teleop.status()),
    }
}

/// Reads events from stdin until it closes or ctrl-c is pressed.
pub async fn drive(teleop: &Teleop) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result?;
                info!("Interrupted");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Input closed");
                    break;
                };
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                match line.parse() {
                    Ok(event) => apply(teleop, event),
                    Err(e) => warn!("{e}"),
                }
            }
        }
    }
    Ok(())
}

/// Leaves the robot stopped.
///
/// Locks, makes a best effort to send one STOP packet, then drops the connection.
pub fn shutdown(teleop: &Teleop) {
    teleop.pause();
    if let Err(e) = send_sample(teleop, ControlSample::default()) {
        debug!("Final stop not sent: {e}");
    }
    teleop.session().disconnect();
}
