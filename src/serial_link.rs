//! Serial connection to the servo controller.
//!
//! [`SerialLink`] owns one open handle and writes whole frames. [`SharedLink`]
//! holds the [`ConnectionState`] behind the single access lock that every
//! writer (streaming ticks and playback steps) goes through, so frames never
//! interleave and a handle is never used while it is being closed.

use crate::error::RigError;
use crate::protocol::{DEFAULT_BAUD_RATE, encode_frame};
use crate::types::Position;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

/// Byte sink behind an open link
pub type LinkHandle = Box<dyn Write + Send>;

/// Settings used when opening a port.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use servo_rig::LinkSettings;
///
/// // Skip the boot-reset wait for a controller that does not reset on open
/// let settings = LinkSettings {
///     settle_delay: Duration::ZERO,
///     ..LinkSettings::default()
/// };
/// assert_eq!(settings.baud_rate, 9600);
/// ```
#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub baud_rate: u32,
    /// Read/write timeout handed to the transport driver
    pub timeout: Duration,
    /// Wait after opening so the controller can finish its boot reset
    pub settle_delay: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_millis(1000),
            settle_delay: Duration::from_secs(2),
        }
    }
}

/// Opens the transport behind a link. Swapped out for an in-memory sink in tests.
pub trait PortOpener: Send + Sync {
    fn open(&self, port: &str, settings: &LinkSettings) -> Result<LinkHandle, RigError>;
}

/// Opens real serial ports through the `serialport` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialPortOpener;

impl PortOpener for SerialPortOpener {
    fn open(&self, port: &str, settings: &LinkSettings) -> Result<LinkHandle, RigError> {
        let handle = serialport::new(port, settings.baud_rate)
            .timeout(settings.timeout)
            .open()
            .map_err(|source| {
                warn!("Failed to open {port}: {source}");
                RigError::Connection {
                    port: port.to_string(),
                    source,
                }
            })?;
        Ok(Box::new(handle))
    }
}

/// Names of the serial ports the OS currently reports
pub fn list_ports() -> Vec<String> {
    serialport::available_ports()
        .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
        .unwrap_or_default()
}

/// One open connection to the controller
pub struct SerialLink {
    port_name: String,
    handle: LinkHandle,
}

impl SerialLink {
    /// Open `port` and wait out the settle delay before returning
    pub fn open(
        opener: &dyn PortOpener,
        port: &str,
        settings: &LinkSettings,
    ) -> Result<Self, RigError> {
        debug!("Opening {port} at {} baud", settings.baud_rate);
        let handle = opener.open(port, settings)?;

        if !settings.settle_delay.is_zero() {
            info!(
                "Port {port} opened, waiting {:?} for controller reset",
                settings.settle_delay
            );
            thread::sleep(settings.settle_delay);
        }

        Ok(Self::from_handle(port, handle))
    }

    /// Wrap an already open handle
    pub fn from_handle(port: &str, handle: LinkHandle) -> Self {
        Self {
            port_name: port.to_string(),
            handle,
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Encode and write exactly one frame
    pub fn send(&mut self, position: &Position) -> Result<(), RigError> {
        let frame = encode_frame(position);
        self.handle
            .write_all(&frame)
            .and_then(|_| self.handle.flush())
            .map_err(|source| RigError::Io {
                source,
                context: format!("Failed to write frame to {}", self.port_name),
            })
    }

    pub(crate) fn close(mut self) {
        if let Err(e) = self.handle.flush() {
            debug!("Flush on close of {} failed: {e}", self.port_name);
        }
        info!("Closed {}", self.port_name);
    }
}

/// Whether a link is currently open
pub enum ConnectionState {
    Disconnected,
    Connected(SerialLink),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }
}

/// Counters for frames written through a [`SharedLink`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub frames_sent: u64,
    pub write_failures: u64,
}

/// Connection state shared by the streaming loop and the command path
pub struct SharedLink {
    state: Mutex<ConnectionState>,
    frames_sent: AtomicU64,
    write_failures: AtomicU64,
}

impl SharedLink {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Disconnected),
            frames_sent: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
        }
    }

    /// Install an open link. Returns the port name of a link it replaced.
    pub fn attach(&self, link: SerialLink) -> Option<String> {
        let previous = {
            let mut state = self.state.lock();
            std::mem::replace(&mut *state, ConnectionState::Connected(link))
        };

        match previous {
            ConnectionState::Connected(old) => {
                let name = old.port_name().to_string();
                old.close();
                Some(name)
            }
            ConnectionState::Disconnected => None,
        }
    }

    /// Write one frame while holding the access lock
    pub fn send(&self, position: &Position) -> Result<(), RigError> {
        let result = match &mut *self.state.lock() {
            ConnectionState::Connected(link) => link.send(position),
            ConnectionState::Disconnected => return Err(RigError::NotConnected),
        };

        match &result {
            Ok(()) => {
                self.frames_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.write_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    /// Release the handle. Returns false if nothing was open.
    pub fn close(&self) -> bool {
        let previous = std::mem::replace(&mut *self.state.lock(), ConnectionState::Disconnected);
        match previous {
            ConnectionState::Connected(link) => {
                link.close();
                true
            }
            ConnectionState::Disconnected => false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().is_connected()
    }

    pub fn port_name(&self) -> Option<String> {
        match &*self.state.lock() {
            ConnectionState::Connected(link) => Some(link.port_name().to_string()),
            ConnectionState::Disconnected => None,
        }
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for SharedLink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CaptureBuffer, FailingWriter, MockOpener};

    fn connected(buffer: &CaptureBuffer) -> SharedLink {
        let link = SharedLink::new();
        link.attach(SerialLink::from_handle("SIM0", Box::new(buffer.clone())));
        link
    }

    #[test]
    fn test_send_writes_single_frame() {
        let buffer = CaptureBuffer::new();
        let link = connected(&buffer);

        link.send(&Position::new([90, 90, 90, 90]).unwrap()).unwrap();

        assert_eq!(buffer.contents(), b"090090090090\n");
        assert_eq!(link.stats().frames_sent, 1);
    }

    #[test]
    fn test_send_without_connection_touches_nothing() {
        let link = SharedLink::new();
        let result = link.send(&Position::default());
        assert!(matches!(result, Err(RigError::NotConnected)));
        assert_eq!(link.stats(), LinkStats::default());
    }

    #[test]
    fn test_write_failure_is_reported_as_io_error() {
        let link = SharedLink::new();
        link.attach(SerialLink::from_handle("SIM0", Box::new(FailingWriter)));

        let result = link.send(&Position::default());

        assert!(matches!(result, Err(RigError::Io { .. })));
        assert!(link.is_connected());
        assert_eq!(link.stats().write_failures, 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let buffer = CaptureBuffer::new();
        let link = connected(&buffer);

        assert!(link.close());
        assert!(!link.close());
        assert!(!link.is_connected());
        assert!(matches!(link.send(&Position::default()), Err(RigError::NotConnected)));
    }

    #[test]
    fn test_attach_replaces_previous_link() {
        let first = CaptureBuffer::new();
        let second = CaptureBuffer::new();
        let link = connected(&first);

        let replaced = link.attach(SerialLink::from_handle("SIM1", Box::new(second.clone())));
        link.send(&Position::default()).unwrap();

        assert_eq!(replaced.as_deref(), Some("SIM0"));
        assert_eq!(link.port_name().as_deref(), Some("SIM1"));
        assert!(first.contents().is_empty());
        assert_eq!(second.contents().len(), 13);
    }

    #[test]
    fn test_open_failure_maps_to_connection_error() {
        let opener = MockOpener::refusing();
        let result = SerialLink::open(&opener, "COM9", &LinkSettings::default());
        assert!(matches!(result, Err(RigError::Connection { ref port, .. }) if port == "COM9"));
    }
}
