//! Protocol errors

use thiserror::Error;

/// Errors that can occur while exchanging a command with the BMS console
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Device or socket could not be opened
    #[error("Error connecting to device {target}: {source}")]
    ConnectError {
        /// Display form of the target
        target: String,
        /// Underlying open or connect failure
        #[source]
        source: std::io::Error,
    },

    /// Channel did not accept the command in time
    #[error("Write operation timed out")]
    WriteTimeout,

    /// Idle-read budget ran out before the end marker
    #[error("Read operation timed out")]
    ReadTimeout,

    /// End marker seen but the frame around the output is wrong
    #[error("Response frame corrupt: {0}")]
    FrameCorrupt(String),

    /// Command text cannot be sent as one console line
    #[error("Invalid command {0:?}: commands are a single line of ASCII")]
    InvalidCommand(String),

    /// Retry budget exhausted
    #[error("Error sending command {command}")]
    CommandFailed {
        /// Command that failed
        command: String,
        /// Error from the last attempt
        #[source]
        source: Box<ProtocolError>,
    },

    /// Other transport failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
