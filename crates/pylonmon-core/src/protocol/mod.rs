//! Console Protocol Communication
//!
//! Implements the line-oriented Pylontech console protocol: a command is
//! echoed back by the BMS, followed by [`MARK_BEGIN`], the command output and
//! [`MARK_END`].
//!
//! Works over a serial character device or a TCP serial bridge.

pub mod commands;
mod connection;
mod error;
pub mod stream;

pub use commands::{ConsoleCommand, POWER_COMMAND};
pub use connection::{unwrap_frame, Connection, ConnectionConfig, Counters};
pub use error::ProtocolError;
pub use stream::{CommunicationChannel, Endpoint, SerialChannel, Target, TcpChannel};

/// Prompt printed by the console when it is ready for input
pub const MARK_PROMPT: &[u8] = b"\rpylon>";

/// Banner between the echoed command and its output
pub const MARK_BEGIN: &[u8] = b"\n\r@\r\r\n";

/// Trailer after the command output, always followed by the prompt
pub const MARK_END: &[u8] = b"\r\n\rCommand completed successfully\r\n\r$$\r\n\rpylon>";

/// Timeout for a single read or write in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Empty or timed-out reads tolerated before giving up on a response
pub const DEFAULT_MAX_IDLE_READS: u32 = 5;

/// Line speed of the console port
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Retries after the first attempt
pub const DEFAULT_RETRIES: u32 = 1;

/// Largest chunk requested from the transport per read
pub const READ_CHUNK_SIZE: usize = 256;
