//! In-memory stand-ins for the serial transport used by unit tests

use crate::error::RigError;
use crate::serial_link::{LinkHandle, LinkSettings, PortOpener};
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;
use std::thread;

/// Records every byte written, optionally one byte per `write` call
#[derive(Clone, Default)]
pub struct CaptureBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
    trickle: bool,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a single byte per call and yield between calls, so an unguarded
    /// writer would interleave with another thread
    pub fn trickling() -> Self {
        Self {
            bytes: Arc::default(),
            trickle: true,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.contents()
            .split_inclusive(|&b| b == b'\n')
            .map(|frame| frame.to_vec())
            .collect()
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.trickle {
            self.bytes.lock().push(buf[0]);
            thread::yield_now();
            Ok(1)
        } else {
            self.bytes.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A link whose cable has been pulled
pub struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "device disconnected"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hands out a [`CaptureBuffer`] for every port, or refuses every port
pub struct MockOpener {
    buffer: Option<CaptureBuffer>,
}

impl MockOpener {
    pub fn capturing(buffer: CaptureBuffer) -> Self {
        Self {
            buffer: Some(buffer),
        }
    }

    pub fn refusing() -> Self {
        Self { buffer: None }
    }
}

impl PortOpener for MockOpener {
    fn open(&self, port: &str, _settings: &LinkSettings) -> Result<LinkHandle, RigError> {
        match &self.buffer {
            Some(buffer) => Ok(Box::new(buffer.clone())),
            None => Err(RigError::Connection {
                port: port.to_string(),
                source: serialport::Error::new(serialport::ErrorKind::NoDevice, "port busy"),
            }),
        }
    }
}
