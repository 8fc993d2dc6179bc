//! Configuration is read from `app-config.toml`, like the rest of our apps.
//!
//! The first command line argument picks the command. Top-level values apply
//! to every command and the command's own table (`[drive]`, `[demo]`,
//! `[monitor]`) overrides them. Environment variables come next, and
//! `key=value` arguments after the command win over everything.
use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    path::PathBuf,
    time::Duration,
};

use anyhow::Context;
use serde::{de::DeserializeOwned, Deserialize};
use tilt_packet::ControlCode;
use tilt_session::{
    RemoteConfig, SessionManager, TcpDialer, Teleop, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_HEALTH_CHECK_PERIOD, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_WRITE_TIMEOUT,
};
use toml::{Table, Value};

use crate::logging::SerdeLevel;

pub const CONFIG_PATH: &str = "app-config.toml";
pub const CONFIG_PATH_VAR: &str = "TILTDRIVE_CONFIG";

const ENV_OVERRIDES: [(&str, &str); 3] = [
    ("TILTDRIVE_HOST", "host"),
    ("TILTDRIVE_PORT", "port"),
    ("TILTDRIVE_CONTROL_CODE", "control_code"),
];

/// Keys whose override values must stay strings even when they look numeric.
const STRING_KEYS: [&str; 2] = ["host", "control_code"];

pub const COMMANDS: [&str; 3] = ["drive", "demo", "monitor"];

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub control_code: ControlCode,
    #[serde(with = "humantime_serde", default = "default_health_check_period")]
    pub health_check_period: Duration,
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_write_timeout")]
    pub write_timeout: Duration,
}

fn default_host() -> String {
    DEFAULT_HOST.into()
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

const fn default_health_check_period() -> Duration {
    DEFAULT_HEALTH_CHECK_PERIOD
}

const fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

const fn default_write_timeout() -> Duration {
    DEFAULT_WRITE_TIMEOUT
}

impl ConnectionConfig {
    /// Sockets reject zero timeouts, and a zero period would spin the health check.
    fn validate(&self) -> anyhow::Result<()> {
        for (key, value) in [
            ("health_check_period", self.health_check_period),
            ("connect_timeout", self.connect_timeout),
            ("write_timeout", self.write_timeout),
        ] {
            anyhow::ensure!(!value.is_zero(), "{key} must be greater than zero");
        }
        Ok(())
    }

    pub fn build_teleop(&self) -> Teleop {
        let dialer = TcpDialer {
            connect_timeout: self.connect_timeout,
            write_timeout: self.write_timeout,
        };
        let session =
            SessionManager::with_dialer(dialer, RemoteConfig::new(self.host.clone(), self.port));
        Teleop::new(session, self.control_code)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct DemoConfig {
    #[serde(default = "default_rate_hz")]
    pub rate_hz: f64,
    #[serde(with = "humantime_serde", default = "default_unlock_after")]
    pub unlock_after: Duration,
}

const fn default_rate_hz() -> f64 {
    50.0
}

const fn default_unlock_after() -> Duration {
    Duration::from_secs(2)
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
}

fn default_listen() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_PORT))
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Default)]
struct Common {
    #[serde(default)]
    log_level: SerdeLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Drive,
    Demo(DemoConfig),
    Monitor(MonitorConfig),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub log_level: SerdeLevel,
    pub connection: ConnectionConfig,
    pub command: Command,
}

impl AppConfig {
    /// Builds the configuration for `command` out of an already parsed file.
    pub fn from_parts(
        command: &str,
        file: Table,
        env: &[(String, String)],
        overrides: &[String],
    ) -> anyhow::Result<Self> {
        let command = command.to_lowercase();
        if !COMMANDS.contains(&command.as_str()) {
            anyhow::bail!("Unknown command: {command}. Use one of: {}", COMMANDS.join(", "));
        }
        let table = merge_command_table(file, &command, env, overrides)?;

        let common: Common = deserialize(&table, &command)?;
        let connection: ConnectionConfig = deserialize(&table, &command)?;
        connection.validate()?;
        let command = match command.as_str() {
            "drive" => Command::Drive,
            "demo" => Command::Demo(deserialize(&table, &command)?),
            _ => Command::Monitor(deserialize(&table, &command)?),
        };

        Ok(Self {
            log_level: common.log_level,
            connection,
            command,
        })
    }
}

fn deserialize<T: DeserializeOwned>(table: &Table, command: &str) -> anyhow::Result<T> {
    table
        .clone()
        .try_into()
        .with_context(|| format!("Failed to deserialize config for {command}"))
}

/// Loads the configuration from the process arguments, environment and config file.
pub fn load() -> anyhow::Result<AppConfig> {
    let mut args = std::env::args().skip(1);
    let command = args
        .next()
        .with_context(|| format!("No command provided. Use one of: {}", COMMANDS.join(", ")))?;

    let path = std::env::var_os(CONFIG_PATH_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIG_PATH));
    let file = if path.exists() {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {path:?}"))?;
        toml::from_str(&text).with_context(|| format!("Failed to parse config file {path:?}"))?
    } else {
        Table::new()
    };

    let env: Vec<(String, String)> = ENV_OVERRIDES
        .iter()
        .filter_map(|(var, key)| std::env::var(var).ok().map(|v| (key.to_string(), v)))
        .collect();
    let overrides: Vec<String> = args.collect();

    AppConfig::from_parts(&command, file, &env, &overrides)
}

fn merge_command_table(
    file: Table,
    command: &str,
    env: &[(String, String)],
    overrides: &[String],
) -> anyhow::Result<Table> {
    let mut cmd_config = None;
    let mut common_values = vec![];
    for (k, v) in file {
        if let Value::Table(v) = v {
            if k.eq_ignore_ascii_case(command) {
                cmd_config = Some(v);
            }
        } else {
            common_values.push((k, v));
        }
    }

    let mut cmd_config = cmd_config.unwrap_or_default();
    for (k, v) in common_values {
        cmd_config.entry(k).or_insert(v);
    }
    for (k, v) in env {
        cmd_config.insert(k.clone(), inline_parse(k, v));
    }
    for arg in overrides {
        let Some((k, v)) = arg.split_once('=') else {
            anyhow::bail!("Invalid command line argument: {arg}");
        };
        let k = k.trim();
        cmd_config.insert(k.to_string(), inline_parse(k, v.trim()));
    }
    Ok(cmd_config)
}

fn inline_parse(key: &str, string: &str) -> Value {
    if STRING_KEYS.contains(&key) {
        return Value::String(string.into());
    }
    if let Ok(n) = string.parse() {
        return Value::Integer(n);
    }
    if let Ok(n) = string.parse() {
        return Value::Float(n);
    }
    Value::String(string.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Table {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = AppConfig::from_parts("drive", Table::new(), &[], &[]).unwrap();
        assert_eq!(config.command, Command::Drive);
        assert_eq!(config.log_level, SerdeLevel::INFO);
        assert_eq!(config.connection.host, "192.168.1.110");
        assert_eq!(config.connection.port, 1025);
        assert_eq!(config.connection.control_code, ControlCode(0));
        assert_eq!(config.connection.health_check_period, Duration::from_millis(200));
    }

    #[test]
    fn command_table_overrides_common() {
        let file = parse(
            r#"
            host = "10.42.43.1"
            port = 1025
            control_code = "0a"
            log_level = "DEBUG"

            [demo]
            port = 2000
            rate_hz = 20
            unlock_after = "500ms"

            [monitor]
            listen = "127.0.0.1:2000"
            "#,
        );
        let config = AppConfig::from_parts("demo", file, &[], &[]).unwrap();
        assert_eq!(config.log_level, SerdeLevel::DEBUG);
        assert_eq!(config.connection.host, "10.42.43.1");
        assert_eq!(config.connection.port, 2000);
        assert_eq!(config.connection.control_code, ControlCode(0x0a));
        assert_eq!(
            config.command,
            Command::Demo(DemoConfig {
                rate_hz: 20.0,
                unlock_after: Duration::from_millis(500),
            })
        );
    }

    #[test]
    fn command_name_is_case_insensitive() {
        let file = parse("[Monitor]\nlisten = \"127.0.0.1:2000\"");
        let config = AppConfig::from_parts("MONITOR", file, &[], &[]).unwrap();
        assert_eq!(
            config.command,
            Command::Monitor(MonitorConfig {
                listen: "127.0.0.1:2000".parse().unwrap()
            })
        );
    }

    #[test]
    fn env_then_arguments_override() {
        let file = parse("host = \"10.0.0.1\"\nport = 1025");
        let env = vec![
            ("host".to_string(), "10.0.0.2".to_string()),
            ("control_code".to_string(), "10".to_string()),
        ];
        let args = vec!["port=3000".to_string(), "host=10.0.0.3".to_string()];
        let config = AppConfig::from_parts("drive", file, &env, &args).unwrap();
        assert_eq!(config.connection.host, "10.0.0.3");
        assert_eq!(config.connection.port, 3000);
        // Hex, not decimal
        assert_eq!(config.connection.control_code, ControlCode(0x10));
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(AppConfig::from_parts("fly", Table::new(), &[], &[]).is_err());
        assert!(AppConfig::from_parts("drive", Table::new(), &[], &["port".into()]).is_err());
        assert!(AppConfig::from_parts("drive", parse("port = 70000"), &[], &[]).is_err());
        assert!(AppConfig::from_parts("drive", parse("control_code = \"xyz\""), &[], &[]).is_err());
        assert!(
            AppConfig::from_parts("drive", parse("health_check_period = \"soon\""), &[], &[])
                .is_err()
        );
    }

    #[test]
    fn zero_durations_are_errors() {
        for key in ["health_check_period", "connect_timeout", "write_timeout"] {
            let err = AppConfig::from_parts("drive", parse(&format!("{key} = \"0s\"")), &[], &[])
                .unwrap_err();
            assert!(err.to_string().contains(key), "{err}");
            assert!(
                AppConfig::from_parts("drive", Table::new(), &[], &[format!("{key}=0ms")]).is_err()
            );
        }
        assert!(
            AppConfig::from_parts("drive", parse("connect_timeout = \"1ms\""), &[], &[]).is_ok()
        );
    }

    #[test]
    fn inline_values_are_typed() {
        assert_eq!(inline_parse("port", "12"), Value::Integer(12));
        assert_eq!(inline_parse("rate_hz", "12.5"), Value::Float(12.5));
        assert_eq!(inline_parse("connect_timeout", "2s"), Value::String("2s".into()));
        assert_eq!(inline_parse("control_code", "12"), Value::String("12".into()));
    }
}
