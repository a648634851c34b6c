//! Scripted BMS console used by the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pylonmon_core::protocol::{
    CommunicationChannel, ConnectionConfig, Endpoint, ProtocolError, MARK_BEGIN, MARK_END,
    MARK_PROMPT,
};

/// One read as seen by the connection
#[derive(Debug, Clone)]
pub enum Step {
    Data(Vec<u8>),
    /// Zero-byte read
    Empty,
    /// Read timed out
    Timeout,
    Fail(io::ErrorKind),
}

/// What happens on one open of the endpoint
#[derive(Debug, Clone)]
pub enum Session {
    Refuse,
    WriteTimeout,
    Reads(Vec<Step>),
}

impl Session {
    /// Whole response delivered in one read
    pub fn respond(bytes: Vec<u8>) -> Self {
        Session::Reads(vec![Step::Data(bytes)])
    }

    /// Response split into `size`-byte reads
    pub fn chunked(bytes: &[u8], size: usize) -> Self {
        Session::Reads(bytes.chunks(size).map(|c| Step::Data(c.to_vec())).collect())
    }

    /// Console that never answers
    pub fn silent() -> Self {
        Session::Reads(Vec::new())
    }
}

pub fn framed(command: &str, payload: &str) -> Vec<u8> {
    let mut bytes = command.as_bytes().to_vec();
    bytes.extend_from_slice(MARK_BEGIN);
    bytes.extend_from_slice(payload.as_bytes());
    bytes.extend_from_slice(MARK_END);
    bytes
}

/// Answer to the empty recovery command
pub fn bare_prompt() -> Vec<u8> {
    let mut bytes = b"\n".to_vec();
    bytes.extend_from_slice(MARK_PROMPT);
    bytes
}

/// Config with no pauses so retries run instantly
pub fn fast_config() -> ConnectionConfig {
    ConnectionConfig {
        retry_pause: Duration::ZERO,
        read_timeout: Duration::from_millis(1),
        ..ConnectionConfig::default()
    }
}

#[derive(Debug, Default)]
struct Log {
    opens: usize,
    closes: usize,
    reads: usize,
    writes: Vec<Vec<u8>>,
}

/// Endpoint replaying one [`Session`] per open; silent once the script runs out
#[derive(Clone, Default)]
pub struct MockEndpoint {
    sessions: Arc<Mutex<VecDeque<Session>>>,
    log: Arc<Mutex<Log>>,
}

impl MockEndpoint {
    pub fn new(sessions: Vec<Session>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(sessions.into())),
            log: Arc::default(),
        }
    }

    pub fn writes(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .writes
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    pub fn opens(&self) -> usize {
        self.log.lock().unwrap().opens
    }

    pub fn closes(&self) -> usize {
        self.log.lock().unwrap().closes
    }

    pub fn reads(&self) -> usize {
        self.log.lock().unwrap().reads
    }
}

impl Endpoint for MockEndpoint {
    fn open(&self) -> Result<Box<dyn CommunicationChannel>, ProtocolError> {
        let session = self
            .sessions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(Session::silent);

        let steps: Option<VecDeque<Step>> = match session {
            Session::Refuse => {
                return Err(ProtocolError::ConnectError {
                    target: "mock".to_string(),
                    source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
                })
            }
            Session::WriteTimeout => None,
            Session::Reads(steps) => Some(steps.into()),
        };

        self.log.lock().unwrap().opens += 1;
        Ok(Box::new(MockChannel {
            steps,
            log: Arc::clone(&self.log),
            closed: false,
        }))
    }
}

struct MockChannel {
    /// `None` makes every write time out
    steps: Option<VecDeque<Step>>,
    log: Arc<Mutex<Log>>,
    closed: bool,
}

impl CommunicationChannel for MockChannel {
    fn write_timeout(&mut self, data: &[u8], _timeout: Duration) -> Result<(), ProtocolError> {
        if self.steps.is_none() {
            return Err(ProtocolError::WriteTimeout);
        }
        self.log.lock().unwrap().writes.push(data.to_vec());
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        self.log.lock().unwrap().reads += 1;
        let steps = match self.steps.as_mut() {
            Some(steps) => steps,
            None => return Ok(0),
        };
        match steps.pop_front() {
            None | Some(Step::Empty) => Ok(0),
            Some(Step::Timeout) => Err(io::Error::new(io::ErrorKind::TimedOut, "timeout")),
            Some(Step::Fail(kind)) => Err(io::Error::new(kind, "mock failure")),
            Some(Step::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    steps.push_front(Step::Data(data.split_off(n)));
                }
                Ok(n)
            }
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.log.lock().unwrap().closes += 1;
        }
    }
}

impl Drop for MockChannel {
    fn drop(&mut self) {
        self.close();
    }
}
