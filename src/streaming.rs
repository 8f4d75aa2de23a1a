//! Background loop that keeps the controller following the live position.
//!
//! The loop runs on its own thread for the lifetime of the owning
//! [`Controller`](crate::Controller). Each tick it reads the
//! [`PositionSource`] and sends one frame if a link is open. Write failures
//! are logged and dropped; the next tick sends the latest position anyway.

use crate::config::StreamingConfig;
use crate::error::RigError;
use crate::position_source::PositionSource;
use crate::serial_link::SharedLink;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Repeat the failure warning once per this many consecutive failed ticks
const FAILURE_WARN_INTERVAL: u64 = 100;

pub struct StreamingLoop {
    /// Signal to shut down background thread
    shutdown_signal: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    ticks: Arc<AtomicU64>,
    period: Duration,
}

impl StreamingLoop {
    /// Start the loop.
    ///
    /// # Arguments
    /// * `link` - shared connection every frame is written through
    /// * `source` - live position read once per tick
    /// * `config` - tick period and playback yielding
    /// * `playback_active` - in-flight flag of the playback engine, consulted
    ///   only when `config.yield_to_playback` is set
    pub fn spawn(
        link: Arc<SharedLink>,
        source: Arc<dyn PositionSource>,
        config: &StreamingConfig,
        playback_active: Arc<AtomicBool>,
    ) -> Result<Self, RigError> {
        let shutdown_signal = Arc::new(AtomicBool::new(false));
        let ticks = Arc::new(AtomicU64::new(0));
        let period = config.period();
        let yield_to_playback = config.yield_to_playback;

        let worker = Worker {
            link,
            source,
            shutdown: shutdown_signal.clone(),
            ticks: ticks.clone(),
            period,
            playback_active: yield_to_playback.then_some(playback_active),
            consecutive_failures: 0,
        };

        let thread = thread::Builder::new()
            .name("servo-stream".to_string())
            .spawn(move || worker.run())
            .map_err(|source| RigError::Io {
                source,
                context: "Failed to spawn streaming thread".to_string(),
            })?;

        info!("Streaming loop started ({period:?} period)");

        Ok(Self {
            shutdown_signal,
            thread: Some(thread),
            ticks,
            period,
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Ticks completed so far
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Signal the loop and wait for it; returns within about one period
    pub fn stop(&mut self) {
        self.shutdown_signal.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("Streaming thread panicked");
            } else {
                info!("Streaming loop stopped after {} ticks", self.ticks());
            }
        }
    }
}

impl Drop for StreamingLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    link: Arc<SharedLink>,
    source: Arc<dyn PositionSource>,
    shutdown: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    period: Duration,
    playback_active: Option<Arc<AtomicBool>>,
    consecutive_failures: u64,
}

impl Worker {
    fn run(mut self) {
        while !self.shutdown.load(Ordering::Relaxed) {
            self.tick();
            self.ticks.fetch_add(1, Ordering::Relaxed);
            // No lock is held here
            thread::sleep(self.period);
        }
    }

    fn tick(&mut self) {
        if !self.link.is_connected() {
            return;
        }
        if let Some(active) = &self.playback_active {
            if active.load(Ordering::Relaxed) {
                return;
            }
        }

        let position = self.source.current();
        match self.link.send(&position) {
            Ok(()) => {
                if self.consecutive_failures > 0 {
                    info!(
                        "Streaming recovered after {} failed ticks",
                        self.consecutive_failures
                    );
                    self.consecutive_failures = 0;
                }
            }
            // Closed between the check and the send
            Err(RigError::NotConnected) => {}
            Err(e) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures % FAILURE_WARN_INTERVAL == 1 {
                    warn!(
                        "Error sending data ({} consecutive): {e}",
                        self.consecutive_failures
                    );
                } else {
                    debug!("Error sending data: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position_source::LivePosition;
    use crate::protocol::decode_frame;
    use crate::serial_link::SerialLink;
    use crate::testing::{CaptureBuffer, FailingWriter};
    use crate::types::{Axis, Position};
    use std::time::Instant;

    fn fast_config() -> StreamingConfig {
        StreamingConfig {
            enabled: true,
            period_ms: 5,
            yield_to_playback: false,
        }
    }

    fn wait_for(condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_streams_live_position_when_connected() {
        let buffer = CaptureBuffer::new();
        let link = Arc::new(SharedLink::new());
        let live = Arc::new(LivePosition::default());
        let mut stream =
            StreamingLoop::spawn(link.clone(), live.clone(), &fast_config(), Arc::default())
                .unwrap();

        link.attach(SerialLink::from_handle("SIM0", Box::new(buffer.clone())));
        live.set_axis(Axis::Base, 10);
        wait_for(|| {
            buffer
                .frames()
                .iter()
                .any(|f| decode_frame(f).ok() == Some(Position::default().with_axis(Axis::Base, 10)))
        });
        stream.stop();

        assert!(!stream.is_running());
        assert!(buffer.frames().iter().all(|f| f.len() == 13));
    }

    #[test]
    fn test_idle_while_disconnected() {
        let link = Arc::new(SharedLink::new());
        let mut stream = StreamingLoop::spawn(
            link.clone(),
            Arc::new(LivePosition::default()),
            &fast_config(),
            Arc::default(),
        )
        .unwrap();

        wait_for(|| stream.ticks() >= 3);
        stream.stop();

        assert_eq!(link.stats().frames_sent, 0);
        assert_eq!(link.stats().write_failures, 0);
    }

    #[test]
    fn test_survives_write_failures() {
        let link = Arc::new(SharedLink::new());
        link.attach(SerialLink::from_handle("SIM0", Box::new(FailingWriter)));
        let mut stream = StreamingLoop::spawn(
            link.clone(),
            Arc::new(LivePosition::default()),
            &fast_config(),
            Arc::default(),
        )
        .unwrap();

        wait_for(|| link.stats().write_failures >= 5);
        assert!(stream.is_running());
        stream.stop();
    }

    #[test]
    fn test_stop_returns_within_about_one_period() {
        let config = StreamingConfig {
            period_ms: 50,
            ..fast_config()
        };
        let mut stream = StreamingLoop::spawn(
            Arc::new(SharedLink::new()),
            Arc::new(LivePosition::default()),
            &config,
            Arc::default(),
        )
        .unwrap();

        let started = Instant::now();
        stream.stop();

        assert!(started.elapsed() < Duration::from_millis(500));
        stream.stop();
    }

    #[test]
    fn test_yields_while_playback_active() {
        let buffer = CaptureBuffer::new();
        let link = Arc::new(SharedLink::new());
        link.attach(SerialLink::from_handle("SIM0", Box::new(buffer.clone())));
        let playback_active = Arc::new(AtomicBool::new(true));
        let config = StreamingConfig {
            yield_to_playback: true,
            ..fast_config()
        };

        let mut stream = StreamingLoop::spawn(
            link.clone(),
            Arc::new(LivePosition::default()),
            &config,
            playback_active.clone(),
        )
        .unwrap();
        wait_for(|| stream.ticks() >= 3);
        assert!(buffer.contents().is_empty());

        playback_active.store(false, Ordering::Relaxed);
        wait_for(|| !buffer.contents().is_empty());
        stream.stop();
    }
}
