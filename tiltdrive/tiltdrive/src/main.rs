use std::process::ExitCode;

use config::{AppConfig, Command};
use tilt_session::HealthMonitor;
use tracing::{error, info, Level};

mod config;
mod demo;
mod host;
mod logging;
mod monitor;

#[tokio::main]
async fn main() -> ExitCode {
    let config = config::load();
    let level = config
        .as_ref()
        .map(|c| Level::from(c.log_level))
        .unwrap_or(Level::INFO);
    if let Err(e) = logging::init(level) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let AppConfig {
        connection,
        command,
        ..
    } = config;

    if let Command::Monitor(monitor_config) = &command {
        return monitor::monitor(monitor_config).await;
    }

    info!(
        "Driving {}:{} with control code {}",
        connection.host, connection.port, connection.control_code
    );
    let teleop = connection.build_teleop();
    let health = HealthMonitor::spawn(teleop.session().clone(), connection.health_check_period)?;

    let result = match &command {
        Command::Demo(demo_config) => demo::demo(&teleop, demo_config).await,
        _ => host::drive(&teleop).await,
    };

    // Joining waits out an in-flight connect
    tokio::task::block_in_place(|| health.stop());
    host::shutdown(&teleop);
    info!("{}", teleop.status());
    result
}
