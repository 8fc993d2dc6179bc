use std::{f32::consts::TAU, time::Duration};

use tilt_packet::ControlSample;
use tilt_session::Teleop;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::{config::DemoConfig, host};

const GRAVITY: f32 = 9.81;
/// Seconds per full circle.
const CIRCLE_PERIOD: f32 = 8.0;
/// Peak tilt along x and y.
const TILT: f32 = 3.0;

/// A phone tilted around a slow circle while lying mostly flat.
pub fn tilt_at(t: Duration) -> ControlSample {
    let angle = TAU * (t.as_secs_f32() / CIRCLE_PERIOD).fract();
    let x = TILT * angle.cos();
    let y = TILT * angle.sin();
    let z = (GRAVITY * GRAVITY - x * x - y * y).sqrt();
    ControlSample::new(x, y, z)
}

/// Streams synthetic samples, holding the deadman once `unlock_after` has passed.
pub async fn demo(teleop: &Teleop, config: &DemoConfig) -> anyhow::Result<()> {
    anyhow::ensure!(
        config.rate_hz.is_finite() && config.rate_hz > 0.0,
        "rate_hz must be positive, got {}",
        config.rate_hz
    );
    let mut interval = tokio::time::interval(Duration::from_secs_f64(config.rate_hz.recip()));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let start = Instant::now();
    let mut holding = false;
    let mut last_status = teleop.status();
    info!("Streaming at {} Hz", config.rate_hz);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result?;
                info!("Interrupted");
                break;
            }
            now = interval.tick() => {
                let elapsed = now - start;
                if !holding && elapsed >= config.unlock_after {
                    holding = true;
                    teleop.deadman(true);
                    info!("Holding deadman");
                }
                if let Err(e) = host::send_sample(teleop, tilt_at(elapsed)) {
                    debug!("Dropped sample: {e}");
                }
                let status = teleop.status();
                if status != last_status {
                    info!("{status}");
                    last_status = status;
                }
            }
        }
    }
    Ok(())
}
