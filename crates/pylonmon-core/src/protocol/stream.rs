//! Transport channels
//!
//! A [`Target`] names where the BMS console lives; opening it yields a boxed
//! [`CommunicationChannel`] that the connection drives with per-call timeouts.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serialport::SerialPort;

use super::{ProtocolError, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS};

/// Abstraction for communication channels (serial device or TCP)
pub trait CommunicationChannel {
    /// Write all of `data`, failing if the channel stays busy past `timeout`
    fn write_timeout(&mut self, data: &[u8], timeout: Duration) -> Result<(), ProtocolError>;

    /// Read whatever is available within `timeout`.
    ///
    /// A timeout is reported as an error of kind `TimedOut` or `WouldBlock`;
    /// `Ok(0)` means the peer had nothing to give.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Release the channel. Safe to call more than once.
    fn close(&mut self);
}

/// Something a connection can open a fresh channel to
pub trait Endpoint {
    /// Open a fresh channel for one attempt
    fn open(&self) -> Result<Box<dyn CommunicationChannel>, ProtocolError>;
}

/// Location of the BMS console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Serial character device, e.g. `/dev/ttyUSB0`
    Serial {
        /// Device path
        path: PathBuf,
        /// Line speed
        baud_rate: u32,
    },
    /// TCP serial bridge
    Network {
        /// Bridge host name or address
        host: String,
        /// Bridge TCP port
        port: u16,
        /// Limit on establishing the connection
        connect_timeout: Duration,
    },
}

impl Target {
    /// Serial device at the default baud rate
    pub fn serial(path: impl Into<PathBuf>) -> Self {
        Target::Serial {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }

    /// TCP bridge with a 5 second connect timeout
    pub fn network(host: impl Into<String>, port: u16) -> Self {
        Target::Network {
            host: host.into(),
            port,
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Override the line speed of a serial target
    pub fn with_baud_rate(mut self, baud: u32) -> Self {
        if let Target::Serial { baud_rate, .. } = &mut self {
            *baud_rate = baud;
        }
        self
    }

    /// Override the connect timeout of a network target
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        if let Target::Network {
            connect_timeout, ..
        } = &mut self
        {
            *connect_timeout = timeout;
        }
        self
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Serial { path, .. } => write!(f, "{}", path.display()),
            Target::Network { host, port, .. } => write!(f, "{}:{}", host, port),
        }
    }
}

impl Endpoint for Target {
    fn open(&self) -> Result<Box<dyn CommunicationChannel>, ProtocolError> {
        let connect_error = |source| ProtocolError::ConnectError {
            target: self.to_string(),
            source,
        };

        match self {
            Target::Serial { path, baud_rate } => {
                let channel = SerialChannel::open(path, *baud_rate).map_err(connect_error)?;
                Ok(Box::new(channel))
            }
            Target::Network {
                host,
                port,
                connect_timeout,
            } => {
                let channel =
                    TcpChannel::connect(host, *port, *connect_timeout).map_err(connect_error)?;
                Ok(Box::new(channel))
            }
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

/// Serial console opened through `serialport`, with per-call timeouts
pub struct SerialChannel {
    port: Option<Box<dyn SerialPort>>,
}

impl SerialChannel {
    /// Wrap an already opened port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port: Some(port) }
    }

    /// Open `path` raw at `baud_rate`
    pub fn open(path: &Path, baud_rate: u32) -> io::Result<Self> {
        let port = serialport::new(path.to_string_lossy(), baud_rate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;
        Ok(Self::new(port))
    }

    fn port(&mut self, timeout: Duration) -> io::Result<&mut Box<dyn SerialPort>> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "channel closed"))?;
        port.set_timeout(timeout)?;
        Ok(port)
    }
}

impl CommunicationChannel for SerialChannel {
    fn write_timeout(&mut self, data: &[u8], timeout: Duration) -> Result<(), ProtocolError> {
        match self.port(timeout)?.write_all(data) {
            Ok(()) => Ok(()),
            Err(ref e) if is_timeout(e) => Err(ProtocolError::WriteTimeout),
            Err(e) => Err(e.into()),
        }
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.port(timeout)?.read(buf)
    }

    fn close(&mut self) {
        self.port.take();
    }
}

impl Drop for SerialChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// TCP stream to a serial bridge, blocking with per-call timeouts
pub struct TcpChannel {
    stream: Option<TcpStream>,
}

impl TcpChannel {
    /// Wrap a connected stream
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    /// Connect to `host:port`, trying each resolved address in turn
    pub fn connect(host: &str, port: u16, timeout: Duration) -> io::Result<Self> {
        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(Self::new(stream)),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{}:{} did not resolve to any address", host, port),
            )
        }))
    }

    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "channel closed"))
    }
}

impl CommunicationChannel for TcpChannel {
    fn write_timeout(&mut self, data: &[u8], timeout: Duration) -> Result<(), ProtocolError> {
        let stream = self.stream()?;
        stream.set_write_timeout(Some(timeout))?;
        match stream.write_all(data) {
            Ok(()) => Ok(()),
            Err(ref e) if is_timeout(e) => Err(ProtocolError::WriteTimeout),
            Err(e) => Err(e.into()),
        }
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let stream = self.stream()?;
        stream.set_read_timeout(Some(timeout))?;
        stream.read(buf)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

impl Drop for TcpChannel {
    fn drop(&mut self) {
        self.close();
    }
}
