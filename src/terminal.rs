use chrono::{DateTime, Local};
use strum::{AsRefStr, IntoEnumIterator};
use strum_macros::EnumIter;
use tracing::info;

use crate::connection::{Connection, Transport};
use crate::link::{Link, LinkEvent};

#[derive(AsRefStr, Clone, Copy, EnumIter, PartialEq, Eq)]
pub enum BaudRate {
    #[strum(serialize = "1200")]
    B1200,
    #[strum(serialize = "2400")]
    B2400,
    #[strum(serialize = "9600")]
    B9600,
    #[strum(serialize = "19200")]
    B19200,
    #[strum(serialize = "38400")]
    B38400,
    #[strum(serialize = "57600")]
    B57600,
    #[strum(serialize = "115200")]
    B115200,
}

impl BaudRate {
    pub fn all() -> Vec<BaudRate> {
        BaudRate::iter().collect()
    }

    pub fn value(self) -> u32 {
        match self {
            BaudRate::B1200 => 1200,
            BaudRate::B2400 => 2400,
            BaudRate::B9600 => 9600,
            BaudRate::B19200 => 19200,
            BaudRate::B38400 => 38400,
            BaudRate::B57600 => 57600,
            BaudRate::B115200 => 115200,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LogLine {
    pub stamp: DateTime<Local>,
    pub text: String,
}

/// Glue between the UI and the connection: the connect/disconnect state,
/// the selector models, the input buffer and the terminal log. Connected
/// means a live link worker exists.
pub struct Terminal {
    transport: Box<dyn Transport>,
    link: Option<Link>,
    log: Vec<LogLine>,
    pub ports: Vec<String>,
    pub port_choice: usize,
    pub bauds: Vec<BaudRate>,
    pub baud_choice: usize,
    pub input: String,
}

impl Terminal {
    pub fn new(transport: Box<dyn Transport>, ports: Vec<String>) -> Self {
        Terminal {
            transport,
            link: None,
            log: Vec::new(),
            ports,
            port_choice: 0,
            bauds: BaudRate::all(),
            baud_choice: 0,
            input: String::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    pub fn log(&self) -> &[LogLine] {
        &self.log
    }

    fn push_log(&mut self, text: String) {
        self.log.push(LogLine {
            stamp: Local::now(),
            text,
        });
    }

    /// Opens the selected port and starts the link worker. The state flips
    /// to connected only after the open has succeeded; on failure the error
    /// text lands in the log and nothing else changes.
    pub fn connect(&mut self) {
        if self.link.is_some() {
            return;
        }

        let Some(port) = self.ports.get(self.port_choice).cloned() else {
            self.push_log("No serial port selected".to_string());
            return;
        };
        let baud = self.bauds[self.baud_choice].value();

        info!("connecting to {port} with baudrate {baud}");
        match Connection::open(self.transport.as_mut(), &port, baud) {
            Ok(conn) => {
                self.link = Some(Link::start(conn));
                self.push_log(format!("Connected to {port} with baudrate {baud}"));
            }
            Err(e) => {
                self.push_log(e.to_string());
            }
        }
    }

    /// Stops the link worker, which closes the connection on its way out.
    pub fn disconnect(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };

        link.stop();
        let port = link.port().to_string();
        info!("disconnected from {port}");
        self.push_log(format!("Disconnected from {port}"));
    }

    /// Echoes the input buffer into the log and hands it to the worker.
    /// An empty buffer is a no-op: no log line, no write.
    pub fn submit(&mut self) {
        if self.input.is_empty() || self.link.is_none() {
            return;
        }

        let text = std::mem::take(&mut self.input);
        self.push_log(format!("> {text}"));
        if let Some(link) = &self.link {
            link.send(text);
        }
    }

    /// Replaces the port selector contents wholesale.
    pub fn set_ports(&mut self, ports: Vec<String>) {
        self.ports = ports;
        if self.port_choice >= self.ports.len() {
            self.port_choice = 0;
        }
    }

    /// Drains pending worker events into the log. A `Closed` event not
    /// preceded by a user disconnect means the device vanished; the state
    /// falls back to disconnected.
    pub fn poll(&mut self) {
        let mut events = Vec::new();
        if let Some(link) = &mut self.link {
            while let Some(event) = link.try_recv() {
                events.push(event);
            }
        }

        for event in events {
            match event {
                LinkEvent::Line(line) => self.push_log(line),
                LinkEvent::Status(status) => self.push_log(status),
                LinkEvent::Closed => {
                    if let Some(link) = self.link.take() {
                        self.push_log(format!("Disconnected from {}", link.port()));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{SerialStream, Transport};
    use std::io::{self, Read, Write};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    // One entry per write call, shared with the worker thread.
    #[derive(Clone, Default)]
    struct Wire(Arc<Mutex<Vec<Vec<u8>>>>);

    struct FakeDevice {
        wire: Wire,
    }

    impl Read for FakeDevice {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            // a silent device
            std::thread::sleep(Duration::from_millis(1));
            Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"))
        }
    }

    impl Write for FakeDevice {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.wire.0.lock().unwrap().push(buf.to_vec());
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct FakeTransport {
        wire: Wire,
        fail: bool,
    }

    impl Transport for FakeTransport {
        fn connect(&mut self, _port: &str, _baud: u32) -> io::Result<Box<dyn SerialStream>> {
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such device"));
            }

            Ok(Box::new(FakeDevice {
                wire: self.wire.clone(),
            }))
        }
    }

    fn terminal(fail: bool) -> (Terminal, Wire) {
        let wire = Wire::default();
        let transport = FakeTransport {
            wire: wire.clone(),
            fail,
        };
        let term = Terminal::new(
            Box::new(transport),
            vec!["FAKE0".to_string(), "FAKE1".to_string()],
        );

        (term, wire)
    }

    fn texts(term: &Terminal) -> Vec<&str> {
        term.log().iter().map(|l| l.text.as_str()).collect()
    }

    #[test]
    fn baud_rates_cover_the_fixed_set() {
        let values: Vec<u32> = BaudRate::all().iter().map(|b| b.value()).collect();
        assert_eq!(values, vec![1200, 2400, 9600, 19200, 38400, 57600, 115200]);
        assert_eq!(BaudRate::B9600.as_ref(), "9600");
    }

    #[test]
    fn connect_success_logs_once_and_transitions() {
        let (mut term, _wire) = terminal(false);

        term.connect();

        assert!(term.is_connected());
        assert_eq!(texts(&term), vec!["Connected to FAKE0 with baudrate 1200"]);
    }

    #[test]
    fn connect_failure_logs_the_error_string_and_stays_disconnected() {
        let (mut term, _wire) = terminal(true);

        term.connect();

        assert!(!term.is_connected());
        assert_eq!(term.log().len(), 1);
        assert!(
            term.log()[0]
                .text
                .contains("Unable to open serial port FAKE0")
        );
    }

    #[test]
    fn empty_submit_is_ignored() {
        let (mut term, wire) = terminal(false);
        term.connect();

        let before = term.log().len();
        term.submit();

        assert_eq!(term.log().len(), before);
        std::thread::sleep(Duration::from_millis(30));
        assert!(wire.0.lock().unwrap().is_empty());
    }

    #[test]
    fn submit_echoes_input_and_writes_once() {
        let (mut term, wire) = terminal(false);
        term.connect();

        term.input = "ping".to_string();
        term.submit();

        assert_eq!(term.input, "");
        assert_eq!(term.log().last().unwrap().text, "> ping");

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            {
                let writes = wire.0.lock().unwrap();
                if !writes.is_empty() {
                    assert_eq!(writes.len(), 1);
                    assert_eq!(writes[0], b"ping");
                    break;
                }
            }
            assert!(
                Instant::now() < deadline,
                "command never reached the wire"
            );
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn disconnect_logs_the_port_once() {
        let (mut term, _wire) = terminal(false);
        term.connect();

        term.disconnect();

        assert!(!term.is_connected());
        let lines = texts(&term);
        assert_eq!(lines.last(), Some(&"Disconnected from FAKE0"));
        assert_eq!(
            lines
                .iter()
                .filter(|l| l.starts_with("Disconnected"))
                .count(),
            1
        );
    }

    #[test]
    fn refresh_replaces_ports_and_is_idempotent() {
        let (mut term, _wire) = terminal(false);
        term.port_choice = 1;

        term.set_ports(vec!["C".to_string()]);
        assert_eq!(term.ports, vec!["C".to_string()]);
        assert_eq!(term.port_choice, 0);

        term.set_ports(vec!["C".to_string()]);
        assert_eq!(term.ports, vec!["C".to_string()]);
    }

    #[test]
    fn device_loss_returns_to_disconnected() {
        struct DyingDevice;

        impl Read for DyingDevice {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"))
            }
        }

        impl Write for DyingDevice {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        struct DyingTransport;

        impl Transport for DyingTransport {
            fn connect(&mut self, _port: &str, _baud: u32) -> io::Result<Box<dyn SerialStream>> {
                Ok(Box::new(DyingDevice))
            }
        }

        let mut term = Terminal::new(Box::new(DyingTransport), vec!["FAKE0".to_string()]);
        term.connect();
        assert!(term.is_connected());

        let deadline = Instant::now() + Duration::from_secs(2);
        while term.is_connected() {
            term.poll();
            assert!(Instant::now() < deadline, "device loss never surfaced");
            std::thread::sleep(Duration::from_millis(5));
        }

        let lines = texts(&term);
        assert!(lines.iter().any(|l| l.contains("device unplugged")));
        assert_eq!(lines.last(), Some(&"Disconnected from FAKE0"));
    }
}
