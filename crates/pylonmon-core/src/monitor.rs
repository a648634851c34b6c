//! Telemetry Monitor
//!
//! Polls the power table and hands the JSON-encoded records to a
//! [`Publisher`]. Errors are returned to the caller untouched so the process
//! can exit and be restarted by its supervisor.

use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::protocol::{Connection, ConsoleCommand, Endpoint, ProtocolError};
use crate::telemetry::{parse_power_table, TableParseError, TelemetryRecord};

/// Delivery failure reported by a publisher
#[derive(Error, Debug)]
#[error("Error sending data to {destination}: {message}")]
pub struct PublishError {
    /// Where the data was headed
    pub destination: String,
    /// Reason reported by the transport
    pub message: String,
}

impl PublishError {
    /// Create a delivery failure
    pub fn new(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            message: message.into(),
        }
    }
}

/// Sink for encoded telemetry
pub trait Publisher {
    /// Deliver `payload` to `topic`
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), PublishError>;
}

/// Errors that end a poll iteration
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Command exchange failed after retries
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Power table could not be parsed
    #[error(transparent)]
    Parse(#[from] TableParseError),

    /// Records could not be encoded as JSON
    #[error("Error encoding telemetry: {0}")]
    Encode(#[from] serde_json::Error),

    /// Publisher rejected the payload
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Polls one BMS and republishes its power table
pub struct Monitor<E, P> {
    connection: Connection<E>,
    publisher: P,
    topic: String,
}

impl<E: Endpoint, P: Publisher> Monitor<E, P> {
    /// Poll over `connection` and publish to `topic`
    pub fn new(connection: Connection<E>, publisher: P, topic: impl Into<String>) -> Self {
        Self {
            connection,
            publisher,
            topic: topic.into(),
        }
    }

    /// The underlying connection
    pub fn connection(&self) -> &Connection<E> {
        &self.connection
    }

    /// The publisher receiving payloads
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Query, parse and publish once
    pub fn poll_once(&mut self) -> Result<Vec<TelemetryRecord>, MonitorError> {
        let response = self.connection.send_command(&ConsoleCommand::power())?;
        let records = parse_power_table(&response)?;
        let data = serde_json::to_string(&records)?;
        info!("power {}", data);
        self.publisher.publish(&self.topic, &data)?;
        Ok(records)
    }

    /// Poll forever, sleeping `interval` after each iteration. Returns on the first error.
    pub fn run(&mut self, interval: Duration) -> Result<(), MonitorError> {
        info!("Reading from battery");
        loop {
            self.poll_once()?;
            std::thread::sleep(interval);
        }
    }
}
