//! # Atlas Scientific EZO circuits in UART mode
//!
//! The pH, ORP and EC circuits sit behind USB-serial bridges and speak a
//! line-oriented ASCII protocol at 9600 baud, 8N1.
//!
//! ## Single reading
//!
//! | Step | Direction    | Bytes                    |
//! |------|--------------|--------------------------|
//! | 1    | host         | clear input/output queues|
//! | 2    | host → EZO   | `R` `\r` (0x52 0x0d)     |
//! | 3    | (wait)       | ~600 ms conversion time  |
//! | 4    | EZO → host   | one line ending in `\n`  |
//!
//! ## Response line
//!
//! - `?R,<value>`: reading echoed with its command prefix
//! - `<value>`: bare reading, e.g. `7.02` or `1413`
//! - `?<anything else>`: status or error reply, not a reading
//! - empty line: nothing measured

use log::debug;
use regex::Regex;
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::SerialConfig;
use crate::models::Reading;

const READ_COMMAND: &[u8] = b"R\r";
const READ_PREFIX: &str = "?R,";

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("serial I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("response is not ASCII")]
    NotAscii,

    #[error("empty response")]
    Empty,

    #[error("device replied {0:?}")]
    DeviceReply(String),

    #[error("malformed value {0:?}")]
    Malformed(String),

    #[error("read task failed: {0}")]
    Task(String),
}

/// An open connection to one circuit.
pub trait SerialLink: Read + Write + Send {
    /// Drops anything queued in either direction.
    fn discard_buffers(&mut self) -> io::Result<()>;
}

impl SerialLink for Box<dyn SerialPort> {
    fn discard_buffers(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::All).map_err(io::Error::from)
    }
}

/// Opens serial links by device path.
pub trait PortOpener: Send + Sync {
    fn open(&self, port: &str, settings: &SerialConfig) -> Result<Box<dyn SerialLink>, ReadError>;
}

/// Opens real tty devices through `serialport`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;

impl PortOpener for SystemPorts {
    fn open(&self, port: &str, settings: &SerialConfig) -> Result<Box<dyn SerialLink>, ReadError> {
        let link = serialport::new(port, settings.baud_rate)
            .timeout(settings.read_timeout())
            .open()
            .map_err(|source| ReadError::Open {
                port: port.to_string(),
                source,
            })?;

        Ok(Box::new(link))
    }
}

/// Takes one reading per call. The port is opened for the duration of the
/// call and closed when it returns, whatever the outcome.
#[derive(Clone)]
pub struct EzoReader {
    opener: Arc<dyn PortOpener>,
    settings: SerialConfig,
}

impl EzoReader {
    pub fn new(opener: Arc<dyn PortOpener>, settings: SerialConfig) -> Self {
        Self { opener, settings }
    }

    pub fn read(&self, port: &str, sensor_type: &str) -> Result<Reading, ReadError> {
        let start = Instant::now();
        let mut link = self.opener.open(port, &self.settings)?;

        link.discard_buffers()?;
        thread::sleep(self.settings.settle_delay());

        link.write_all(READ_COMMAND)?;
        link.flush()?;
        thread::sleep(self.settings.response_delay());

        let line = read_line(&mut *link, self.settings.read_timeout())?;
        if !line.is_ascii() {
            return Err(ReadError::NotAscii);
        }
        let response = String::from_utf8_lossy(&line);
        let response = response.trim();

        debug!(
            "{} on {} answered {:?} in {} ms",
            sensor_type,
            port,
            response,
            start.elapsed().as_millis()
        );

        parse_response(response)
    }
}

/// Reads up to and including `\n`. Partial data is returned once the timeout
/// elapses; only a line with no bytes at all counts as a timeout.
fn read_line(link: &mut dyn SerialLink, timeout: Duration) -> Result<Vec<u8>, ReadError> {
    let deadline = Instant::now() + timeout;
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        match link.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                line.push(byte[0]);
                if byte[0] == b'\n' {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }

        if Instant::now() >= deadline {
            break;
        }
    }

    if line.is_empty() {
        return Err(ReadError::Timeout(timeout));
    }
    Ok(line)
}

/// Interprets a trimmed response line.
///
/// A `?R,` value counts as numeric when it is made only of digits, `.` and
/// `-` with at least one digit; such a value that still fails to convert
/// (`1.2.3`, `--4`) is reported as malformed rather than passed on as text.
/// Values that parse to NaN or infinity stay text, since JSON has no number
/// for them.
pub fn parse_response(response: &str) -> Result<Reading, ReadError> {
    if let Some(rest) = response.strip_prefix(READ_PREFIX) {
        let value = rest.split(',').next().unwrap_or_default();
        if looks_numeric(value) {
            match value.parse::<f64>() {
                Ok(number) if number.is_finite() => Ok(Reading::Number(number)),
                Ok(_) => Ok(Reading::Text(value.to_string())),
                Err(_) => Err(ReadError::Malformed(value.to_string())),
            }
        } else {
            Ok(Reading::Text(value.to_string()))
        }
    } else if response.is_empty() {
        Err(ReadError::Empty)
    } else if response.starts_with('?') {
        Err(ReadError::DeviceReply(response.to_string()))
    } else {
        match response.parse::<f64>() {
            Ok(number) if number.is_finite() => Ok(Reading::Number(number)),
            _ => Ok(Reading::Text(response.to_string())),
        }
    }
}

fn looks_numeric(value: &str) -> bool {
    static NUMERIC: OnceLock<Regex> = OnceLock::new();
    NUMERIC
        .get_or_init(|| Regex::new(r"^[-.]*[0-9][-.0-9]*$").expect("numeric pattern is valid"))
        .is_match(value)
}
