//! A stand-in for the robot: accepts connections and logs the packets it receives.
use std::net::SocketAddr;

use tilt_packet::{ControlCode, DecodeError, DecodedPacket, Packet, PACKET_LEN};
use tokio::{
    io::AsyncReadExt,
    net::{TcpListener, TcpStream},
    sync::mpsc,
};
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;

#[derive(Debug)]
pub enum FrameEvent {
    Packet {
        peer: SocketAddr,
        packet: DecodedPacket,
    },
    Corrupt {
        peer: SocketAddr,
        error: DecodeError,
    },
    Closed {
        peer: SocketAddr,
    },
}

pub async fn monitor(config: &MonitorConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.listen).await?;
    info!("Listening on {}", listener.local_addr()?);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let server = tokio::spawn(serve(listener, tx));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut last: Option<(bool, u8)> = None;
    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result?;
                info!("Interrupted");
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else {
                    break;
                };
                match event {
                    FrameEvent::Packet { peer, packet } => {
                        let key = (packet.run, packet.control_code);
                        if last != Some(key) {
                            info!(
                                %peer,
                                run = packet.run,
                                control_code = %ControlCode(packet.control_code),
                                "Command changed"
                            );
                            last = Some(key);
                        }
                        let s = packet.sample;
                        debug!(%peer, x = s.x, y = s.y, z = s.z, run = packet.run);
                    }
                    FrameEvent::Corrupt { peer, error } => warn!(%peer, "{error}"),
                    FrameEvent::Closed { peer } => {
                        info!(%peer, "Disconnected");
                        last = None;
                    }
                }
            }
        }
    }
    server.abort();
    Ok(())
}

/// Accepts connections until the receiving side of `tx` is dropped.
pub async fn serve(listener: TcpListener, tx: mpsc::UnboundedSender<FrameEvent>) {
    loop {
        let (stream, peer) = tokio::select! {
            result = listener.accept() => match result {
                Ok(x) => x,
                Err(e) => {
                    error!("Failed to accept connection: {e}");
                    continue;
                }
            },
            _ = tx.closed() => break,
        };
        info!(%peer, "Accepted connection");
        tokio::spawn(read_frames(stream, peer, tx.clone()));
    }
}

async fn read_frames(mut stream: TcpStream, peer: SocketAddr, tx: mpsc::UnboundedSender<FrameEvent>) {
    let mut buf = [0u8; PACKET_LEN];
    loop {
        if let Err(e) = stream.read_exact(&mut buf).await {
            if e.kind() != std::io::ErrorKind::UnexpectedEof {
                warn!(%peer, "Failed to read from connection: {e}");
            }
            let _ = tx.send(FrameEvent::Closed { peer });
            break;
        }
        let event = match Packet::decode(&buf) {
            Ok(packet) => FrameEvent::Packet { peer, packet },
            Err(error) => FrameEvent::Corrupt { peer, error },
        };
        if tx.send(event).is_err() {
            break;
        }
    }
}
