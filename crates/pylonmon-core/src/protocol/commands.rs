//! Console commands
//!
//! The BMS console takes one line of ASCII per command and answers inside a
//! fixed banner. Only the telemetry query is modelled; anything else can be
//! sent verbatim through [`ConsoleCommand::new`].

use super::ProtocolError;

/// Telemetry query returning the power table
pub const POWER_COMMAND: &str = "pwr";

/// A text command for the BMS console
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleCommand {
    command: String,
}

impl ConsoleCommand {
    /// Create a console command, rejecting non-ASCII text and embedded line breaks
    pub fn new(command: impl Into<String>) -> Result<Self, ProtocolError> {
        let command = command.into();
        if !command.is_ascii() || command.contains(['\n', '\r']) {
            return Err(ProtocolError::InvalidCommand(command));
        }
        Ok(Self { command })
    }

    /// The `pwr` telemetry query
    pub fn power() -> Self {
        Self {
            command: POWER_COMMAND.to_string(),
        }
    }

    /// Empty command used to provoke a fresh prompt
    pub fn empty() -> Self {
        Self {
            command: String::new(),
        }
    }

    /// Command text without the trailing newline
    pub fn as_str(&self) -> &str {
        &self.command
    }

    /// Whether this is the bare-prompt probe
    pub fn is_empty(&self) -> bool {
        self.command.is_empty()
    }

    /// Convert command to bytes, appending the newline the console waits for
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.command.as_bytes().to_vec();
        bytes.push(b'\n');
        bytes
    }
}

impl std::fmt::Display for ConsoleCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_command_to_bytes() {
        let cmd = ConsoleCommand::new("pwr").unwrap();
        assert_eq!(cmd.to_bytes(), b"pwr\n".to_vec());
    }

    #[test]
    fn test_power_command() {
        assert_eq!(ConsoleCommand::power().as_str(), "pwr");
        assert_eq!(ConsoleCommand::power(), ConsoleCommand::new("pwr").unwrap());
    }

    #[test]
    fn test_empty_command_is_bare_newline() {
        let cmd = ConsoleCommand::empty();
        assert!(cmd.is_empty());
        assert_eq!(cmd.to_bytes(), b"\n".to_vec());
    }

    #[test]
    fn test_embedded_newline_rejected() {
        assert!(matches!(
            ConsoleCommand::new("pwr\nbat"),
            Err(ProtocolError::InvalidCommand(_))
        ));
        assert!(ConsoleCommand::new("pwr\r").is_err());
    }

    #[test]
    fn test_non_ascii_rejected() {
        assert!(matches!(
            ConsoleCommand::new("pwr°"),
            Err(ProtocolError::InvalidCommand(_))
        ));
        assert!(ConsoleCommand::new("bat 1").is_ok());
    }
}
