use std::{backtrace::Backtrace, panic::set_hook};

use anyhow::Context;
use tracing::Level;
use tracing_subscriber::fmt::time::Uptime;

#[derive(serde::Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[allow(clippy::upper_case_acronyms)]
pub enum SerdeLevel {
    ERROR,
    WARN,
    #[default]
    INFO,
    DEBUG,
    TRACE,
}

impl From<SerdeLevel> for Level {
    fn from(level: SerdeLevel) -> Self {
        match level {
            SerdeLevel::ERROR => Level::ERROR,
            SerdeLevel::WARN => Level::WARN,
            SerdeLevel::INFO => Level::INFO,
            SerdeLevel::DEBUG => Level::DEBUG,
            SerdeLevel::TRACE => Level::TRACE,
        }
    }
}

/// Installs the global subscriber and a panic hook that logs through it.
///
/// Logs go to stderr so that stdout stays free for status lines.
pub fn init(level: Level) -> anyhow::Result<()> {
    let sub = tracing_subscriber::fmt()
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .with_thread_names(true)
        .with_timer(Uptime::default())
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(sub)
        .context("Failed to set global default tracing subscriber")?;

    set_hook(Box::new(move |info| {
        let backtrace = Backtrace::capture();
        tracing::error!("{info}\n{backtrace}");
    }));

    Ok(())
}
