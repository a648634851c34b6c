//! pylonmon: Pylontech BMS poller
//!
//! `pylonmon monitor` reads the power table in a loop and publishes it to MQTT.
//! `pylonmon send <COMMAND>` runs a single console command for diagnostics.

mod cli;
mod mqtt;

use anyhow::{Context, Result};
use clap::Parser;
use pylonmon_core::monitor::Monitor;
use pylonmon_core::protocol::{Connection, ConsoleCommand};
use pylonmon_core::telemetry::parse_power_table;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Cli, Commands, MonitorArgs, SendArgs};
use crate::mqtt::MqttPublisher;

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn monitor(args: MonitorArgs) -> Result<()> {
    let interval = args.interval()?;
    let target = args.device.target()?;
    info!("pylonmon {} polling {}", pylonmon_core::VERSION, target);

    let connection = Connection::with_config(target, args.device.connection_config());
    let publisher = MqttPublisher::connect(&args.mqtt).context("Failed to set up MQTT client")?;

    Monitor::new(connection, publisher, args.mqtt.mqtt_topic)
        .run(interval)
        .context("Monitoring stopped")
}

fn send(args: SendArgs) -> Result<()> {
    let command = ConsoleCommand::new(args.command)?;
    let mut connection =
        Connection::with_config(args.device.target()?, args.device.connection_config());

    let response = if args.raw {
        connection.send_raw(&command)?
    } else {
        connection.send_command(&command)?
    };

    if args.parse {
        let records = parse_power_table(&response)?;
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        println!("{}", response);
    }
    Ok(())
}

fn main() -> Result<()> {
    init_logging();

    match Cli::parse().command {
        Commands::Monitor(args) => monitor(args),
        Commands::Send(args) => send(args),
    }
}
