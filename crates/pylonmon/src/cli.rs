//! Command line and environment configuration
//!
//! Every flag can also be set through the environment variable named after it.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use pylonmon_core::protocol::{ConnectionConfig, Target, DEFAULT_BAUD_RATE, DEFAULT_RETRIES};

/// Monitor battery parameters and send them to an MQTT server.
#[derive(Parser, Debug)]
#[command(name = "pylonmon", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll the power table and publish it to MQTT until an error occurs
    Monitor(MonitorArgs),
    /// Send one console command and print the response
    Send(SendArgs),
}

/// How the BMS console is reached
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Serial,
    Network,
}

#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    /// Connection mode
    #[arg(long, env = "MODE", value_enum)]
    pub mode: Mode,

    /// Battery IO device
    #[arg(long, env = "DEVICE", required_if_eq("mode", "serial"))]
    pub device: Option<PathBuf>,

    /// Line speed of the battery IO device
    #[arg(long, env = "BAUD_RATE", default_value_t = DEFAULT_BAUD_RATE)]
    pub baud_rate: u32,

    /// Remote host of the battery IO bridge
    #[arg(long, env = "HOST", required_if_eq("mode", "network"))]
    pub host: Option<String>,

    /// Remote port of the battery IO bridge
    #[arg(long, env = "PORT", required_if_eq("mode", "network"))]
    pub port: Option<u16>,

    /// Retries after a failed command
    #[arg(long, env = "RETRIES", default_value_t = DEFAULT_RETRIES)]
    pub retries: u32,
}

impl DeviceArgs {
    pub fn target(&self) -> Result<Target> {
        match self.mode {
            Mode::Serial => {
                let device = self.device.clone().context("--device is required in serial mode")?;
                Ok(Target::serial(device).with_baud_rate(self.baud_rate))
            }
            Mode::Network => match (&self.host, self.port) {
                (Some(host), Some(port)) => Ok(Target::network(host.clone(), port)),
                _ => bail!("--host and --port are required in network mode"),
            },
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            retries: self.retries,
            ..ConnectionConfig::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct MqttArgs {
    /// MQTT server address, `host` or `host:port`
    #[arg(long, env = "MQTT_SERVER")]
    pub mqtt_server: String,

    /// MQTT username
    #[arg(long, env = "MQTT_USER")]
    pub mqtt_user: String,

    /// MQTT password
    #[arg(long, env = "MQTT_PASS", hide_env_values = true)]
    pub mqtt_pass: String,

    /// MQTT client id
    #[arg(long, env = "MQTT_CLIENT_ID")]
    pub mqtt_client_id: String,

    /// MQTT topic for data
    #[arg(long, env = "MQTT_TOPIC")]
    pub mqtt_topic: String,
}

#[derive(Args, Debug, Clone)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub device: DeviceArgs,

    #[command(flatten)]
    pub mqtt: MqttArgs,

    /// Seconds to sleep between iterations
    #[arg(long, env = "SLEEP_ITERATION", default_value_t = 5.0)]
    pub sleep_iteration: f64,
}

impl MonitorArgs {
    pub fn interval(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.sleep_iteration)
            .with_context(|| format!("invalid --sleep-iteration {}", self.sleep_iteration))
    }
}

#[derive(Args, Debug, Clone)]
pub struct SendArgs {
    #[command(flatten)]
    pub device: DeviceArgs,

    /// Command to send, e.g. `pwr`
    pub command: String,

    /// Skip frame validation and print the whole transcript
    #[arg(long, conflicts_with = "parse")]
    pub raw: bool,

    /// Parse the response as a power table and print it as JSON
    #[arg(long)]
    pub parse: bool,
}

/// Split `host[:port]`, defaulting to the standard MQTT port
pub fn split_server(server: &str) -> Result<(String, u16)> {
    match server.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && !host.ends_with(':') => {
            let port = port
                .parse()
                .with_context(|| format!("invalid port in MQTT server {:?}", server))?;
            Ok((host.to_string(), port))
        }
        Some(_) => bail!("invalid MQTT server {:?}", server),
        None if server.is_empty() => bail!("MQTT server is empty"),
        None => Ok((server.to_string(), 1883)),
    }
}
