//! In-memory serial ports and a stub pool controller for unit tests.

use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use crate::client::ezo::{PortOpener, ReadError, SerialLink};
use crate::config::{AppConfig, SensorConfig, SerialConfig};

pub(crate) enum PortBehavior {
    /// Bytes the device sends back after `R`; a read past them times out.
    Reply(Vec<u8>),
    /// Opens fine, never answers.
    Silent,
    /// Opens fine, every read fails.
    Broken,
}

impl PortBehavior {
    pub fn reply(line: &str) -> Self {
        PortBehavior::Reply(line.as_bytes().to_vec())
    }
}

#[derive(Default)]
struct PortLog {
    written: Vec<u8>,
    cleared: usize,
    closed: usize,
}

#[derive(Default)]
pub(crate) struct MockPorts {
    behaviors: HashMap<String, PortBehavior>,
    logs: Arc<Mutex<HashMap<String, PortLog>>>,
    opens: AtomicUsize,
}

impl MockPorts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, port: &str, behavior: PortBehavior) -> Self {
        self.behaviors.insert(port.to_string(), behavior);
        self
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn written(&self, port: &str) -> Vec<u8> {
        self.logs.lock().unwrap().get(port).map(|log| log.written.clone()).unwrap_or_default()
    }

    pub fn cleared(&self, port: &str) -> usize {
        self.logs.lock().unwrap().get(port).map(|log| log.cleared).unwrap_or_default()
    }

    pub fn closed(&self, port: &str) -> usize {
        self.logs.lock().unwrap().get(port).map(|log| log.closed).unwrap_or_default()
    }
}

impl PortOpener for MockPorts {
    fn open(&self, port: &str, _settings: &SerialConfig) -> Result<Box<dyn SerialLink>, ReadError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let behavior = self.behaviors.get(port).ok_or_else(|| ReadError::Open {
            port: port.to_string(),
            source: serialport::Error::new(serialport::ErrorKind::NoDevice, "no such device"),
        })?;

        let input = match behavior {
            PortBehavior::Reply(bytes) => bytes.clone(),
            PortBehavior::Silent | PortBehavior::Broken => Vec::new(),
        };

        Ok(Box::new(MockLink {
            port: port.to_string(),
            input: Cursor::new(input),
            broken: matches!(behavior, PortBehavior::Broken),
            logs: self.logs.clone(),
        }))
    }
}

struct MockLink {
    port: String,
    input: Cursor<Vec<u8>>,
    broken: bool,
    logs: Arc<Mutex<HashMap<String, PortLog>>>,
}

impl MockLink {
    fn log(&self, update: impl FnOnce(&mut PortLog)) {
        update(self.logs.lock().unwrap().entry(self.port.clone()).or_default());
    }
}

impl Read for MockLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.broken {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        match Read::read(&mut self.input, buf)? {
            0 => Err(io::Error::new(io::ErrorKind::TimedOut, "operation timed out")),
            n => Ok(n),
        }
    }
}

impl Write for MockLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.log(|log| log.written.extend_from_slice(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialLink for MockLink {
    fn discard_buffers(&mut self) -> io::Result<()> {
        self.log(|log| log.cleared += 1);
        Ok(())
    }
}

impl Drop for MockLink {
    fn drop(&mut self) {
        self.log(|log| log.closed += 1);
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

/// Answers every request with a fixed status and records what it received.
pub(crate) struct StubController {
    pub base_url: String,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl StubController {
    pub async fn start(status: u16) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let captured = requests.clone();

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                if let Some(request) = read_request(&mut stream).await {
                    captured.lock().unwrap().push(request);
                }
                let response = format!(
                    "HTTP/1.1 {} Stub\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    status
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Base URL of a port nothing listens on.
pub(crate) async fn unreachable_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

async fn read_request(stream: &mut TcpStream) -> Option<CapturedRequest> {
    // Scoped here so it does not clash with `std::io::Read` on `Cursor`
    use tokio::io::AsyncReadExt;

    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let mut request_line = head.lines().next()?.split_whitespace();
    Some(CapturedRequest {
        method: request_line.next()?.to_string(),
        path: request_line.next()?.to_string(),
        body: String::from_utf8_lossy(&buf[header_end..header_end + content_length]).to_string(),
    })
}

/// Config with zero serial delays, pointed at `base_url` and `dev_dir`.
pub(crate) fn test_config(base_url: &str, dev_dir: &str, sensors: Vec<SensorConfig>) -> AppConfig {
    let mut config = AppConfig::default();
    config.controller.base_url = base_url.to_string();
    config.serial.settle_ms = 0;
    config.serial.response_ms = 0;
    config.serial.timeout_ms = 50;
    config.serial.dev_dir = dev_dir.to_string();
    config.sensors = sensors;
    config
}
