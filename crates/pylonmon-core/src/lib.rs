//! # pylonmon Core Library
//!
//! Core functionality for polling a Pylontech battery management system.
//!
//! This library provides:
//! - The framed console protocol over a serial device or a TCP bridge
//! - Parsing of the fixed-width `pwr` power table
//! - A poll loop that republishes the parsed table
//!
//! ## Example
//!
//! ```rust,ignore
//! use pylonmon_core::protocol::{Connection, ConsoleCommand, Target};
//! use pylonmon_core::telemetry::parse_power_table;
//!
//! let mut conn = Connection::new(Target::serial("/dev/ttyUSB0"));
//! let response = conn.send_command(&ConsoleCommand::power())?;
//! for record in parse_power_table(&response)? {
//!     println!("{:?}", record.get("Volt"));
//! }
//! ```

#![warn(missing_docs)]

pub mod monitor;
pub mod protocol;
pub mod telemetry;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::monitor::{Monitor, MonitorError, PublishError, Publisher};
    pub use crate::protocol::{Connection, ConnectionConfig, ConsoleCommand, ProtocolError, Target};
    pub use crate::telemetry::{parse_power_table, CellValue, TableParseError, TelemetryRecord};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
