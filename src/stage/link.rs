//! The byte stream to the controller.

use super::StageError;

use log::{debug, warn};
use serial2::SerialPort;
use std::io;
use std::path::PathBuf;
use std::str;
use std::time::Duration;

/// A line-oriented byte stream to the motion controller. The protocol client
/// only ever talks to the device through this, so tests and the simulator can
/// stand in for the serial port.
pub trait StageLink: Send {
    /// Writes raw bytes to the device.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), StageError>;

    /// Writes one command line, adding the line terminator.
    fn write_line(&mut self, line: &str) -> Result<(), StageError> {
        debug!("stage <- {}", line);
        let mut buf = Vec::with_capacity(line.len() + 2);
        buf.extend_from_slice(line.as_bytes());
        buf.extend_from_slice(b"\r\n");
        self.write_bytes(&buf)
    }

    /// Reads one line, without its terminator. Returns `Ok(None)` if no
    /// complete line arrived within the link's read timeout.
    fn read_line(&mut self) -> Result<Option<String>, StageError>;

    /// Throws away anything the device sent that has not been read yet.
    fn discard_input(&mut self) -> Result<(), StageError> {
        Ok(())
    }
}

impl<L: StageLink + ?Sized> StageLink for Box<L> {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), StageError> {
        (**self).write_bytes(bytes)
    }

    fn write_line(&mut self, line: &str) -> Result<(), StageError> {
        (**self).write_line(line)
    }

    fn read_line(&mut self) -> Result<Option<String>, StageError> {
        (**self).read_line()
    }

    fn discard_input(&mut self) -> Result<(), StageError> {
        (**self).discard_input()
    }
}

/// A [`StageLink`] over a real serial port.
#[derive(Debug)]
pub struct SerialLink {
    port: SerialPort,
    pending: Vec<u8>,
}

impl SerialLink {
    /// Opens `path` at `baud_rate`. Every read gives up after `read_timeout`,
    /// which bounds how long a single [`StageLink::read_line()`] can block.
    pub fn open(path: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self, StageError> {
        let mut port = SerialPort::open(path, baud_rate)
            .map_err(|e| StageError::Open(path.to_owned(), e))?;
        port.set_read_timeout(read_timeout)
            .map_err(|e| StageError::Open(path.to_owned(), e))?;
        Ok(Self {
            port,
            pending: Vec::new(),
        })
    }

    /// Serial ports present on this machine.
    pub fn available_ports() -> io::Result<Vec<PathBuf>> {
        SerialPort::available_ports()
    }

    // Splits one complete line off the front of `pending`, if there is one.
    fn split_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&c| c == b'\n')?;
        let raw: Vec<u8> = self.pending.drain(..=end).collect();
        match str::from_utf8(&raw) {
            Ok(s) => Some(s.trim_end_matches(['\r', '\n']).to_owned()),
            // Often happens right after the port opens while the device is
            // still flushing garbage from its reset.
            Err(e) => {
                warn!("Failed to decode utf-8 from stage: {:?}", e);
                Some(String::new())
            }
        }
    }
}

impl StageLink for SerialLink {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), StageError> {
        self.port.write_all(bytes)?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<Option<String>, StageError> {
        if let Some(line) = self.split_line() {
            return Ok(Some(line));
        }

        let mut buffer = [0; 256];
        loop {
            let read_len = match self.port.read(&mut buffer) {
                Ok(0) => return Ok(None),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            self.pending.extend_from_slice(&buffer[..read_len]);
            if let Some(line) = self.split_line() {
                debug!("stage -> {}", line);
                return Ok(Some(line));
            }
        }
    }

    fn discard_input(&mut self) -> Result<(), StageError> {
        self.pending.clear();
        self.port.discard_input_buffer()?;
        Ok(())
    }
}
