//! Connection management
//!
//! Sends console commands and unwraps the framed response. Each attempt opens
//! a fresh channel and releases it before returning, whatever the outcome.

use std::io;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::{
    CommunicationChannel, ConsoleCommand, Endpoint, ProtocolError, Target, DEFAULT_MAX_IDLE_READS,
    DEFAULT_RETRIES, DEFAULT_TIMEOUT_MS, MARK_BEGIN, MARK_END, MARK_PROMPT, READ_CHUNK_SIZE,
};

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for each read
    pub read_timeout: Duration,
    /// Timeout for the command write
    pub write_timeout: Duration,
    /// Empty reads tolerated before the response is declared lost
    pub max_idle_reads: u32,
    /// Pause before the recovery probe
    pub retry_pause: Duration,
    /// Retries after the first attempt
    pub retries: u32,
    /// Bytes requested per read
    pub read_chunk: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            write_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_idle_reads: DEFAULT_MAX_IDLE_READS,
            retry_pause: Duration::from_millis(100),
            retries: DEFAULT_RETRIES,
            read_chunk: READ_CHUNK_SIZE,
        }
    }
}

/// Cumulative traffic and attempt counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    /// Bytes written, probes included
    pub tx_bytes: u64,
    /// Bytes read
    pub rx_bytes: u64,
    /// Channel opens, probes included
    pub attempts: u64,
    /// Failed command attempts
    pub failures: u64,
}

/// BMS console connection
pub struct Connection<E = Target> {
    endpoint: E,
    config: ConnectionConfig,
    counters: Counters,
}

impl<E: Endpoint> Connection<E> {
    /// Connection with default timeouts and retries
    pub fn new(endpoint: E) -> Self {
        Self::with_config(endpoint, ConnectionConfig::default())
    }

    /// Connection with explicit settings
    pub fn with_config(endpoint: E, config: ConnectionConfig) -> Self {
        Self {
            endpoint,
            config,
            counters: Counters::default(),
        }
    }

    /// Where each attempt connects to
    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Active settings
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Snapshot of the traffic counters
    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// Send a framed command with the configured retry budget and return its output
    pub fn send_command(&mut self, command: &ConsoleCommand) -> Result<String, ProtocolError> {
        self.execute(command, true, self.config.retries)
    }

    /// Send a command without frame validation and return the whole transcript
    pub fn send_raw(&mut self, command: &ConsoleCommand) -> Result<String, ProtocolError> {
        self.execute(command, false, self.config.retries)
    }

    /// Execute `command`, retrying up to `retries` more times.
    ///
    /// Before every retry the channel is released, the connection pauses and
    /// an unframed empty command is sent to bring the console back to a bare
    /// prompt. The probe's own failure is ignored.
    pub fn execute(
        &mut self,
        command: &ConsoleCommand,
        framed: bool,
        retries: u32,
    ) -> Result<String, ProtocolError> {
        let mut remaining = retries;
        loop {
            info!("Sending command {}", command);
            let err = match self.attempt(command, framed) {
                Ok(payload) => return Ok(payload),
                Err(e) => e,
            };
            self.counters.failures = self.counters.failures.saturating_add(1);

            if remaining == 0 {
                error!("Error sending command {}: {}", command, err);
                return Err(ProtocolError::CommandFailed {
                    command: command.to_string(),
                    source: Box::new(err),
                });
            }

            warn!(
                "Error sending command {}, {} retries remaining: {}",
                command, remaining, err
            );
            std::thread::sleep(self.config.retry_pause);

            info!("Sending recovery probe");
            if let Err(e) = self.attempt(&ConsoleCommand::empty(), false) {
                debug!("Recovery probe failed (ignored): {}", e);
            }
            remaining -= 1;
        }
    }

    /// One open/write/read/validate cycle on a fresh channel
    fn attempt(&mut self, command: &ConsoleCommand, framed: bool) -> Result<String, ProtocolError> {
        self.counters.attempts = self.counters.attempts.saturating_add(1);
        let mut channel = self.endpoint.open()?;
        let result = self.exchange(channel.as_mut(), command, framed);
        channel.close();
        result
    }

    fn exchange(
        &mut self,
        channel: &mut dyn CommunicationChannel,
        command: &ConsoleCommand,
        framed: bool,
    ) -> Result<String, ProtocolError> {
        let cmd_bytes = command.to_bytes();
        channel.write_timeout(&cmd_bytes, self.config.write_timeout)?;
        self.counters.tx_bytes = self.counters.tx_bytes.saturating_add(cmd_bytes.len() as u64);

        let terminator = if framed { MARK_END } else { MARK_PROMPT };
        let response = self.read_until(channel, terminator)?;
        unwrap_frame(command.as_str(), &response, framed)
    }

    /// Accumulate reads until `terminator` shows up in the buffer.
    ///
    /// Empty and timed-out reads count against the idle budget. The count is
    /// never reset by incoming data.
    fn read_until(
        &mut self,
        channel: &mut dyn CommunicationChannel,
        terminator: &[u8],
    ) -> Result<Vec<u8>, ProtocolError> {
        let mut response = Vec::new();
        let mut buffer = vec![0u8; self.config.read_chunk.max(1)];
        let mut idle_reads = 0u32;

        while !contains(&response, terminator) {
            if idle_reads > self.config.max_idle_reads {
                return Err(ProtocolError::ReadTimeout);
            }
            match channel.read_timeout(&mut buffer, self.config.read_timeout) {
                Ok(0) => idle_reads += 1,
                Ok(n) => {
                    response.extend_from_slice(&buffer[..n]);
                    self.counters.rx_bytes = self.counters.rx_bytes.saturating_add(n as u64);
                    debug!("read {} bytes, total = {}", n, response.len());
                }
                Err(ref e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    idle_reads += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(response)
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

/// Trim a complete response and strip the frame around the command output.
///
/// Framed responses must read `command + MARK_BEGIN + payload + MARK_END`
/// once trailing whitespace is removed. Unframed responses are returned as
/// the trimmed transcript.
pub fn unwrap_frame(command: &str, response: &[u8], framed: bool) -> Result<String, ProtocolError> {
    let trimmed = response.trim_ascii_end();

    let payload = if framed {
        let prefix_len = command.len() + MARK_BEGIN.len();
        let well_formed = trimmed.len() >= prefix_len + MARK_END.len()
            && trimmed.starts_with(command.as_bytes())
            && trimmed[command.len()..].starts_with(MARK_BEGIN)
            && trimmed.ends_with(MARK_END);
        if !well_formed {
            return Err(ProtocolError::FrameCorrupt(format!(
                "expected {:?} wrapped in the begin/end banner, got {} bytes",
                command,
                trimmed.len()
            )));
        }
        &trimmed[prefix_len..trimmed.len() - MARK_END.len()]
    } else {
        trimmed
    };

    String::from_utf8(payload.to_vec())
        .map_err(|e| ProtocolError::FrameCorrupt(format!("payload is not valid UTF-8: {}", e)))
}
