use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serialport::SerialPort;

use crate::drivers::error::{ConnectionError, SourceError};

/// Something that yields newline-terminated lines without blocking when idle.
pub trait LineSource: Send {
    /// `Ok(None)` when no complete line is available yet.
    fn poll_line(&mut self) -> Result<Option<Vec<u8>>, SourceError>;
    fn name(&self) -> &str;
}

/// Opens a fresh connection handle for each capture session.
pub trait Connector {
    fn connect(&self) -> Result<Box<dyn LineSource>, ConnectionError>;
}

/// How the serial port is chosen: a fixed name or the first enumerated port.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortSelection {
    Fixed(String),
    Auto,
}

impl Default for PortSelection {
    fn default() -> Self {
        if cfg!(windows) {
            PortSelection::Fixed("COM3".to_owned())
        } else {
            PortSelection::Fixed("/dev/ttyACM0".to_owned())
        }
    }
}

pub fn list_ports() -> Result<Vec<String>, ConnectionError> {
    let ports = serialport::available_ports().map_err(ConnectionError::Enumerate)?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

impl PortSelection {
    pub fn resolve(&self) -> Result<String, ConnectionError> {
        match self {
            PortSelection::Fixed(name) => Ok(name.clone()),
            PortSelection::Auto => list_ports()?
                .into_iter()
                .next()
                .ok_or(ConnectionError::NoPortAvailable),
        }
    }
}

pub struct SerialConnector {
    pub selection: PortSelection,
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

impl Connector for SerialConnector {
    fn connect(&self) -> Result<Box<dyn LineSource>, ConnectionError> {
        let port = self.selection.resolve()?;
        log::info!("Opening {} at {} baud", port, self.baud_rate);
        let serial = serialport::new(&port, self.baud_rate)
            .timeout(self.read_timeout)
            .open()
            .map_err(|source| ConnectionError::Open {
                port: port.clone(),
                source,
            })?;
        Ok(Box::new(SerialSource::new(port, serial)))
    }
}

/// Byte stream that can report how much input is waiting without blocking.
pub trait ByteStream: Read + Send {
    fn bytes_available(&self) -> Result<u32, SourceError>;
}

impl ByteStream for Box<dyn SerialPort> {
    fn bytes_available(&self) -> Result<u32, SourceError> {
        Ok(self.bytes_to_read()?)
    }
}

pub struct SerialSource<P = Box<dyn SerialPort>> {
    port_name: String,
    reader: BufReader<P>,
    // bytes of a line whose newline has not arrived yet
    pending: Vec<u8>,
}

impl<P: ByteStream> SerialSource<P> {
    pub fn new(port_name: String, port: P) -> Self {
        Self {
            port_name,
            reader: BufReader::new(port),
            pending: Vec::new(),
        }
    }
}

impl<P: ByteStream> LineSource for SerialSource<P> {
    fn poll_line(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        // lines already buffered are served even when the port reports nothing
        if self.reader.buffer().is_empty() && self.reader.get_ref().bytes_available()? == 0 {
            return Ok(None);
        }
        match self.reader.read_until(b'\n', &mut self.pending) {
            Ok(_) if self.pending.ends_with(b"\n") => Ok(Some(std::mem::take(&mut self.pending))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &str {
        &self.port_name
    }
}

pub const SIMULATED_PORT: &str = "simulated";

pub struct SimulatedConnector {
    pub line_interval: Duration,
}

impl Connector for SimulatedConnector {
    fn connect(&self) -> Result<Box<dyn LineSource>, ConnectionError> {
        log::info!("Opening simulated device");
        Ok(Box::new(SimulatedSource::new(self.line_interval)))
    }
}

/// Synthetic board: noisy 0.5 Hz square wave through a first-order RC low-pass.
pub struct SimulatedSource {
    rng: StdRng,
    interval: Duration,
    next_due: Instant,
    elapsed: f64,
    filtered: f64,
    sent_banner: bool,
}

impl SimulatedSource {
    const HIGH_VOLTS: f64 = 3.3;
    const PERIOD_SECS: f64 = 2.0;
    const RC_SECS: f64 = 0.2;
    const NOISE_VOLTS: f64 = 0.05;

    pub fn new(interval: Duration) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            interval,
            next_due: Instant::now(),
            elapsed: 0.0,
            filtered: 0.0,
            sent_banner: false,
        }
    }

    fn next_pair(&mut self) -> (f64, f64) {
        let dt = self.interval.as_secs_f64();
        self.elapsed += dt;
        let level = if self.elapsed % Self::PERIOD_SECS < Self::PERIOD_SECS / 2.0 {
            Self::HIGH_VOLTS
        } else {
            0.0
        };
        let raw = level + self.rng.gen_range(-Self::NOISE_VOLTS..Self::NOISE_VOLTS);
        let alpha = dt / (Self::RC_SECS + dt);
        self.filtered += alpha * (raw - self.filtered);
        (raw, self.filtered)
    }
}

impl LineSource for SimulatedSource {
    fn poll_line(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        let now = Instant::now();
        if now < self.next_due {
            return Ok(None);
        }
        self.next_due = now + self.interval;
        // boards usually print something at reset before the first reading
        if !self.sent_banner {
            self.sent_banner = true;
            return Ok(Some(b"Sistema listo\r\n".to_vec()));
        }
        let (raw, filtered) = self.next_pair();
        let line = format!("Voltaje entrada: {raw:.2} V\tVoltaje filtrado: {filtered:.2} V\r\n");
        Ok(Some(line.into_bytes()))
    }

    fn name(&self) -> &str {
        SIMULATED_PORT
    }
}

/// Scripted source for deterministic playback in tests.
#[cfg(test)]
pub struct ManualSource {
    queue: std::collections::VecDeque<Result<Vec<u8>, ErrorKind>>,
}

#[cfg(test)]
impl ManualSource {
    pub fn new<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            queue: lines
                .into_iter()
                .map(|l| Ok(format!("{l}\n").into_bytes()))
                .collect(),
        }
    }

    pub fn push_error(&mut self, kind: ErrorKind) {
        self.queue.push_back(Err(kind));
    }

    pub fn push_line(&mut self, line: &str) {
        self.queue.push_back(Ok(format!("{line}\n").into_bytes()));
    }
}

#[cfg(test)]
impl LineSource for ManualSource {
    fn poll_line(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        match self.queue.pop_front() {
            Some(Ok(line)) => Ok(Some(line)),
            Some(Err(kind)) => Err(std::io::Error::from(kind).into()),
            None => Ok(None),
        }
    }

    fn name(&self) -> &str {
        "manual"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::parser::parse_bytes;
    use std::collections::VecDeque;

    enum PortEvent {
        Data(Vec<u8>),
        Timeout,
        Fail(ErrorKind),
    }

    /// Port double: each `read` consumes one scripted event.
    #[derive(Default)]
    struct FakePort {
        events: VecDeque<PortEvent>,
        unplugged: bool,
    }

    impl FakePort {
        fn data(mut self, bytes: &str) -> Self {
            self.events.push_back(PortEvent::Data(bytes.as_bytes().to_vec()));
            self
        }

        fn then(mut self, event: PortEvent) -> Self {
            self.events.push_back(event);
            self
        }
    }

    impl Read for FakePort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.events.pop_front() {
                None => Ok(0),
                Some(PortEvent::Timeout) => Err(ErrorKind::TimedOut.into()),
                Some(PortEvent::Fail(kind)) => Err(kind.into()),
                Some(PortEvent::Data(mut bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    if n < bytes.len() {
                        self.events.push_front(PortEvent::Data(bytes.split_off(n)));
                    }
                    Ok(n)
                }
            }
        }
    }

    impl ByteStream for FakePort {
        fn bytes_available(&self) -> Result<u32, SourceError> {
            if self.unplugged {
                return Err(serialport::Error::new(serialport::ErrorKind::NoDevice, "unplugged").into());
            }
            // a pending timeout or failure only shows up once read
            let n: usize = self
                .events
                .iter()
                .map(|e| match e {
                    PortEvent::Data(bytes) => bytes.len(),
                    _ => 1,
                })
                .sum();
            Ok(n as u32)
        }
    }

    fn serial(port: FakePort) -> SerialSource<FakePort> {
        SerialSource::new("fake".into(), port)
    }

    #[test]
    fn line_split_by_timeout_is_joined() {
        let port = FakePort::default()
            .data("a: 1 V\tb")
            .then(PortEvent::Timeout)
            .data(": 2 V\n");
        let mut source = serial(port);
        assert!(source.poll_line().unwrap().is_none());
        let line = source.poll_line().unwrap().unwrap();
        assert_eq!(line, b"a: 1 V\tb: 2 V\n");
        let pair = parse_bytes(&line).unwrap();
        assert_eq!((pair.raw, pair.filtered), (1.0, 2.0));
        assert!(source.poll_line().unwrap().is_none());
    }

    #[test]
    fn buffered_second_line_is_served_without_new_input() {
        let mut source = serial(FakePort::default().data("a: 1 V\tb: 1 V\na: 2 V\tb: 2 V\n"));
        assert_eq!(source.poll_line().unwrap().unwrap(), b"a: 1 V\tb: 1 V\n");
        assert_eq!(source.reader.get_ref().bytes_available().unwrap(), 0);
        assert_eq!(source.poll_line().unwrap().unwrap(), b"a: 2 V\tb: 2 V\n");
        assert!(source.poll_line().unwrap().is_none());
    }

    #[test]
    fn idle_port_is_not_read() {
        let mut source = serial(FakePort::default());
        assert!(source.poll_line().unwrap().is_none());
    }

    #[test]
    fn read_failure_is_a_source_error() {
        let mut source = serial(FakePort::default().then(PortEvent::Fail(ErrorKind::PermissionDenied)));
        match source.poll_line() {
            Err(SourceError::Io(e)) => assert_eq!(e.kind(), ErrorKind::PermissionDenied),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn unplugged_port_fails_the_poll() {
        let mut port = FakePort::default().data("a: 1 V\tb: 1 V\n");
        port.unplugged = true;
        let mut source = serial(port);
        assert!(matches!(source.poll_line(), Err(SourceError::Port(_))));
    }

    #[test]
    fn fixed_selection_resolves_without_enumeration() {
        let sel = PortSelection::Fixed("/dev/ttyUSB3".into());
        assert_eq!(sel.resolve().unwrap(), "/dev/ttyUSB3");
    }

    #[test]
    fn opening_missing_port_is_a_connection_error() {
        let connector = SerialConnector {
            selection: PortSelection::Fixed("/dev/voltcap-does-not-exist".into()),
            baud_rate: 115_200,
            read_timeout: Duration::from_millis(10),
        };
        match connector.connect() {
            Err(ConnectionError::Open { port, .. }) => {
                assert_eq!(port, "/dev/voltcap-does-not-exist")
            }
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("opened a port that should not exist"),
        }
    }

    #[test]
    fn simulated_source_emits_banner_then_parseable_lines() {
        let mut source = SimulatedSource::new(Duration::ZERO);
        let banner = source.poll_line().unwrap().unwrap();
        assert!(parse_bytes(&banner).is_err());
        for _ in 0..50 {
            let line = source.poll_line().unwrap().unwrap();
            let pair = parse_bytes(&line).unwrap();
            assert!(pair.raw > -0.1 && pair.raw < 3.4);
            assert!(pair.filtered > -0.1 && pair.filtered < 3.4);
        }
    }

    #[test]
    fn simulated_source_waits_for_its_interval() {
        let mut source = SimulatedSource::new(Duration::from_secs(3600));
        assert!(source.poll_line().unwrap().is_some());
        assert!(source.poll_line().unwrap().is_none());
    }

    #[test]
    fn manual_source_replays_script() {
        let mut source = ManualSource::new(["a", "b"]);
        source.push_error(ErrorKind::BrokenPipe);
        assert_eq!(source.poll_line().unwrap().unwrap(), b"a\n");
        assert_eq!(source.poll_line().unwrap().unwrap(), b"b\n");
        assert!(source.poll_line().is_err());
        assert!(source.poll_line().unwrap().is_none());
    }
}
