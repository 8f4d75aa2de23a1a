use crate::error::RigError;
use crate::serial_link::SharedLink;
use crate::types::Position;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Outcome of one completed playback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackReport {
    pub steps: usize,
    /// Steps whose frame could not be written
    pub failed_steps: usize,
    pub elapsed: Duration,
}

/// Replays a recorded sequence through the shared link, one step at a time.
///
/// Only one playback runs at once; a second call while one is in flight is
/// rejected with [`RigError::PlaybackInProgress`]. A started playback runs to
/// the end of the sequence.
pub struct PlaybackEngine {
    link: Arc<SharedLink>,
    step_delay: Duration,
    in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag however `play` exits
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl PlaybackEngine {
    pub fn new(link: Arc<SharedLink>, step_delay: Duration) -> Self {
        Self {
            link,
            step_delay,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Flag that is set for the duration of a playback
    pub fn in_flight_flag(&self) -> Arc<AtomicBool> {
        self.in_flight.clone()
    }

    /// Send every position in order, waiting the step delay after each.
    ///
    /// Fails before touching the link with [`RigError::NotConnected`] or
    /// [`RigError::EmptySequence`]. A write failure on one step is counted in
    /// the report and the sequence continues; if the link is closed midway the
    /// playback stops with [`RigError::NotConnected`].
    pub fn play(&self, sequence: &[Position]) -> Result<PlaybackReport, RigError> {
        if !self.link.is_connected() {
            return Err(RigError::NotConnected);
        }
        if sequence.is_empty() {
            return Err(RigError::EmptySequence);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RigError::PlaybackInProgress);
        }
        let _guard = InFlightGuard(&self.in_flight);

        let started = Instant::now();
        let mut failed_steps = 0;
        for (i, position) in sequence.iter().enumerate() {
            info!("Playing position {}: {}", i + 1, position);
            match self.link.send(position) {
                Ok(()) => {}
                Err(RigError::NotConnected) => {
                    warn!("Link closed during playback at step {}", i + 1);
                    return Err(RigError::NotConnected);
                }
                Err(e) => {
                    warn!("Step {} not delivered: {e}", i + 1);
                    failed_steps += 1;
                }
            }
            thread::sleep(self.step_delay);
        }

        info!("Finished playing all positions");
        Ok(PlaybackReport {
            steps: sequence.len(),
            failed_steps,
            elapsed: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode_frame;
    use crate::serial_link::SerialLink;
    use crate::testing::{CaptureBuffer, FailingWriter};

    fn sequence() -> Vec<Position> {
        vec![
            Position::new([90, 90, 90, 90]).unwrap(),
            Position::new([0, 90, 90, 90]).unwrap(),
            Position::new([180, 90, 0, 90]).unwrap(),
        ]
    }

    fn connected_engine(buffer: &CaptureBuffer, step_delay: Duration) -> PlaybackEngine {
        let link = Arc::new(SharedLink::new());
        link.attach(SerialLink::from_handle("SIM0", Box::new(buffer.clone())));
        PlaybackEngine::new(link, step_delay)
    }

    #[test]
    fn test_plays_sequence_in_order() {
        let buffer = CaptureBuffer::new();
        let engine = connected_engine(&buffer, Duration::ZERO);

        let report = engine.play(&sequence()).unwrap();

        let sent: Vec<Position> = buffer
            .frames()
            .iter()
            .map(|f| decode_frame(f).unwrap())
            .collect();
        assert_eq!(sent, sequence());
        assert_eq!(report.steps, 3);
        assert_eq!(report.failed_steps, 0);
        assert!(!engine.is_playing());
    }

    #[test]
    fn test_waits_step_delay_between_steps() {
        let buffer = CaptureBuffer::new();
        let engine = connected_engine(&buffer, Duration::from_millis(20));

        let report = engine.play(&sequence()).unwrap();

        assert!(report.elapsed >= Duration::from_millis(60));
    }

    #[test]
    fn test_empty_sequence_performs_no_writes() {
        let buffer = CaptureBuffer::new();
        let engine = connected_engine(&buffer, Duration::ZERO);

        let result = engine.play(&[]);

        assert!(matches!(result, Err(RigError::EmptySequence)));
        assert!(buffer.contents().is_empty());
    }

    #[test]
    fn test_not_connected_performs_no_writes() {
        let link = Arc::new(SharedLink::new());
        let engine = PlaybackEngine::new(link.clone(), Duration::ZERO);

        let result = engine.play(&sequence());

        assert!(matches!(result, Err(RigError::NotConnected)));
        assert_eq!(link.stats().frames_sent + link.stats().write_failures, 0);
    }

    #[test]
    fn test_second_play_is_rejected_while_first_runs() {
        let buffer = CaptureBuffer::new();
        let engine = Arc::new(connected_engine(&buffer, Duration::from_millis(100)));

        let first = {
            let engine = engine.clone();
            thread::spawn(move || engine.play(&sequence()))
        };
        while !engine.is_playing() {
            thread::yield_now();
        }

        let second = engine.play(&sequence());
        assert!(matches!(second, Err(RigError::PlaybackInProgress)));

        assert_eq!(first.join().unwrap().unwrap().steps, 3);
        assert_eq!(buffer.frames().len(), 3);
        assert!(!engine.is_playing());
    }

    #[test]
    fn test_write_failures_are_counted_not_fatal() {
        let link = Arc::new(SharedLink::new());
        link.attach(SerialLink::from_handle("SIM0", Box::new(FailingWriter)));
        let engine = PlaybackEngine::new(link, Duration::ZERO);

        let report = engine.play(&sequence()).unwrap();

        assert_eq!(report.failed_steps, 3);
    }
}
