//! Serial link format of the station.
//!
//! Commands are newline terminated text lines, replies come back the same
//! way. Frames received on air that are not APRS arrive as KISS data frames
//! on port 0, interleaved with the replies.

#![allow(dead_code)]

pub const FEND: u8 = 0xC0;
pub const FESC: u8 = 0xDB;
pub const TFEND: u8 = 0xDC;
pub const TFESC: u8 = 0xDD;

/// KISS data frame on port 0
pub const CMD_DATA: u8 = 0x00;

/// Generic failure reply
pub const KO: &str = "KO";
pub const OK: &str = "OK";

/// Build a command line.
pub fn build_line(command: &str) -> Vec<u8> {
    let mut line = Vec::with_capacity(command.len() + 1);
    line.extend_from_slice(command.as_bytes());
    line.push(b'\n');
    line
}

/// Wrap `data` in a KISS data frame.
pub fn kiss_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2 + 3);
    out.push(FEND);
    out.push(CMD_DATA);
    for &byte in data {
        match byte {
            FEND => out.extend_from_slice(&[FESC, TFEND]),
            FESC => out.extend_from_slice(&[FESC, TFESC]),
            byte => out.push(byte),
        }
    }
    out.push(FEND);
    out
}

/// Unit of output from the station
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Line(String),
    /// KISS payload, command byte removed
    Kiss(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Line,
    Kiss,
    KissEscape,
}

/// Splits the station output into reply lines and KISS frames.
pub struct OutputSplitter {
    mode: Mode,
    buffer: Vec<u8>,
}

impl OutputSplitter {
    pub fn new() -> Self {
        Self {
            mode: Mode::Line,
            buffer: Vec::new(),
        }
    }

    pub fn push(&mut self, byte: u8) -> Option<Incoming> {
        match self.mode {
            Mode::Line => match byte {
                FEND => {
                    self.buffer.clear();
                    self.mode = Mode::Kiss;
                    None
                }
                b'\n' => {
                    let line = String::from_utf8_lossy(&self.buffer).trim_end().to_string();
                    self.buffer.clear();
                    if line.is_empty() {
                        None
                    } else {
                        Some(Incoming::Line(line))
                    }
                }
                byte => {
                    self.buffer.push(byte);
                    None
                }
            },
            Mode::Kiss => match byte {
                // Back to back FENDs open a new frame
                FEND if self.buffer.is_empty() => None,
                FEND => {
                    self.mode = Mode::Line;
                    let frame = std::mem::take(&mut self.buffer);
                    match frame.split_first() {
                        Some((&CMD_DATA, data)) => Some(Incoming::Kiss(data.to_vec())),
                        _ => None,
                    }
                }
                FESC => {
                    self.mode = Mode::KissEscape;
                    None
                }
                byte => {
                    self.buffer.push(byte);
                    None
                }
            },
            Mode::KissEscape => {
                self.mode = Mode::Kiss;
                self.buffer.push(match byte {
                    TFEND => FEND,
                    TFESC => FESC,
                    other => other,
                });
                None
            }
        }
    }
}

impl Default for OutputSplitter {
    fn default() -> Self {
        Self::new()
    }
}
