//! Station communication client.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

use anyhow::Result;
use serialport::SerialPort;

use crate::protocol::{build_line, kiss_encode, Incoming, OutputSplitter};

/// Find stations by scanning serial adapters and sending `ping`.
pub fn find_station_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports()?;
    let mut station_ports = Vec::new();

    for port_info in ports {
        // USB to UART adapters on the Linux board header
        if !port_info.port_name.contains("ttyUSB") && !port_info.port_name.contains("ttyACM") {
            continue;
        }

        if let Ok(mut client) = DeviceClient::new(&port_info.port_name, 115200) {
            client.set_timeout(Duration::from_millis(500));
            if let Ok(reply) = client.command("ping") {
                if reply == "Pong!" {
                    station_ports.push(port_info.port_name.clone());
                }
            }
        }
    }

    Ok(station_ports)
}

/// Find a single station port. Returns error if none found.
pub fn find_station_port() -> Result<String> {
    let ports = find_station_ports()?;
    match ports.into_iter().next() {
        Some(port) => Ok(port),
        None => anyhow::bail!("No station found - check the UART adapter"),
    }
}

/// Resolve a port argument - returns the port path if not "auto", otherwise auto-detects.
pub fn resolve_port(port_arg: &str) -> Result<String> {
    if port_arg == "auto" {
        find_station_port()
    } else {
        Ok(port_arg.to_string())
    }
}

/// Resolve port arguments for two-station tests.
pub fn resolve_two_ports(port_a: &str, port_b: &str) -> Result<(String, String)> {
    if port_a == "auto" || port_b == "auto" {
        let ports = find_station_ports()?;
        let mut found = ports
            .into_iter()
            .filter(|p| p.as_str() != port_a && p.as_str() != port_b);
        let a = match port_a {
            "auto" => found.next(),
            a => Some(a.to_string()),
        };
        let b = match port_b {
            "auto" => found.next(),
            b => Some(b.to_string()),
        };
        match (a, b) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => anyhow::bail!("Need two stations connected"),
        }
    } else {
        Ok((port_a.to_string(), port_b.to_string()))
    }
}

/// Client for the UART link of a station.
pub struct DeviceClient {
    port: Box<dyn SerialPort>,
    timeout: Duration,
    splitter: OutputSplitter,
    /// KISS frames read while waiting for a reply
    frames: VecDeque<Vec<u8>>,
}

impl DeviceClient {
    pub fn new(port_name: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(100))
            .open()?;

        Ok(Self {
            port,
            timeout: Duration::from_secs(2),
            splitter: OutputSplitter::new(),
            frames: VecDeque::new(),
        })
    }

    /// Set the reply timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Read and discard everything pending on the port.
    pub fn drain_buffer(&mut self) -> Result<()> {
        self.port.clear(serialport::ClearBuffer::All)?;

        let mut buf = [0u8; 256];
        loop {
            match self.port.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }

        self.splitter = OutputSplitter::new();
        self.frames.clear();
        Ok(())
    }

    /// Send a command line and wait for its reply line.
    pub fn command(&mut self, command: &str) -> Result<String> {
        self.send_line(command)?;
        self.read_line(self.timeout)
    }

    /// Send a line without waiting for a reply.
    pub fn send_line(&mut self, line: &str) -> Result<()> {
        self.port.write_all(&build_line(line))?;
        self.port.flush()?;
        Ok(())
    }

    /// Send a KISS frame for transmission on air.
    pub fn send_kiss(&mut self, data: &[u8]) -> Result<()> {
        self.port.write_all(&kiss_encode(data))?;
        self.port.flush()?;
        Ok(())
    }

    /// Read the next reply line. KISS frames seen meanwhile are kept.
    pub fn read_line(&mut self, timeout: Duration) -> Result<String> {
        let start = Instant::now();
        while start.elapsed() < timeout {
            match self.read_incoming()? {
                Some(Incoming::Line(line)) => return Ok(line),
                Some(Incoming::Kiss(frame)) => self.frames.push_back(frame),
                None => {}
            }
        }
        anyhow::bail!("Timeout waiting for reply")
    }

    /// Wait for a KISS frame passed through from the radio.
    pub fn wait_for_kiss_frame(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        if let Some(frame) = self.frames.pop_front() {
            return Ok(frame);
        }

        let start = Instant::now();
        while start.elapsed() < timeout {
            // Unsolicited lines are not expected here
            if let Some(Incoming::Kiss(frame)) = self.read_incoming()? {
                return Ok(frame);
            }
        }
        anyhow::bail!("Timeout waiting for KISS frame")
    }

    /// Feed pending bytes to the splitter, one unit at most.
    fn read_incoming(&mut self) -> Result<Option<Incoming>> {
        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(1) => Ok(self.splitter.push(buf[0])),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
