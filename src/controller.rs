use crate::config::AppConfig;
use crate::error::RigError;
use crate::persistence;
use crate::playback::{PlaybackEngine, PlaybackReport};
use crate::position_source::PositionSource;
use crate::sequence::SequenceStore;
use crate::serial_link::{LinkSettings, LinkStats, PortOpener, SerialLink, SerialPortOpener, SharedLink};
use crate::streaming::StreamingLoop;
use crate::types::Position;
use log::{error, info, warn};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Operator commands accepted by [`Controller::execute`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect { port: String },
    Disconnect,
    RecordCurrent,
    Play,
    ClearLast,
    ClearAll,
    Save { path: PathBuf },
    Load { path: PathBuf },
    Shutdown,
}

/// Result of a command plus a line a front-end can show as-is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub message: String,
}

impl CommandOutcome {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Point-in-time view of a session for status displays
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerStatus {
    pub port: Option<String>,
    pub recorded: usize,
    pub playing: bool,
    pub streaming: bool,
    pub link: LinkStats,
}

/// Builder for [`Controller`]
pub struct ControllerBuilder {
    source: Arc<dyn PositionSource>,
    config: AppConfig,
    opener: Box<dyn PortOpener>,
}

impl ControllerBuilder {
    pub fn new(source: Arc<dyn PositionSource>) -> Self {
        Self {
            source,
            config: AppConfig::default(),
            opener: Box::new(SerialPortOpener),
        }
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the serial port opener, e.g. with a simulated transport
    pub fn with_opener(mut self, opener: Box<dyn PortOpener>) -> Self {
        self.opener = opener;
        self
    }

    /// Build the controller and start its streaming loop
    pub fn build(self) -> Result<Controller, RigError> {
        let link = Arc::new(SharedLink::new());
        let playback = PlaybackEngine::new(link.clone(), self.config.playback.step_delay());

        let streaming = if self.config.streaming.enabled {
            Some(StreamingLoop::spawn(
                link.clone(),
                self.source.clone(),
                &self.config.streaming,
                playback.in_flight_flag(),
            )?)
        } else {
            info!("Streaming disabled by configuration");
            None
        };

        Ok(Controller {
            link,
            source: self.source,
            store: SequenceStore::new(),
            playback,
            streaming: Mutex::new(streaming),
            opener: self.opener,
            link_settings: self.config.link.settings(),
            shut_down: AtomicBool::new(false),
            transition: Mutex::new(()),
        })
    }
}

/// Session facade owning the link, the streaming loop and the recorded sequence.
///
/// All commands take `&self`, so a front-end can share the controller across
/// threads and run [`Controller::play`] off its input thread.
pub struct Controller {
    link: Arc<SharedLink>,
    source: Arc<dyn PositionSource>,
    store: SequenceStore,
    playback: PlaybackEngine,
    streaming: Mutex<Option<StreamingLoop>>,
    opener: Box<dyn PortOpener>,
    link_settings: LinkSettings,
    shut_down: AtomicBool,
    /// Held while attaching a link or shutting down, so a connect that
    /// finishes settling after shutdown never installs its link
    transition: Mutex<()>,
}

impl Controller {
    pub fn builder(source: Arc<dyn PositionSource>) -> ControllerBuilder {
        ControllerBuilder::new(source)
    }

    fn ensure_running(&self) -> Result<(), RigError> {
        if self.shut_down.load(Ordering::Acquire) {
            Err(RigError::ShutDown)
        } else {
            Ok(())
        }
    }

    /// Open `port`, wait for the controller to settle, then start using it.
    /// An already open link is replaced once the new one is ready.
    pub fn connect(&self, port: &str) -> Result<(), RigError> {
        self.ensure_running()?;
        let link = SerialLink::open(self.opener.as_ref(), port, &self.link_settings)?;

        let _transition = self.transition.lock();
        if self.is_shut_down() {
            warn!("Shut down while opening {port}, closing it");
            link.close();
            return Err(RigError::ShutDown);
        }
        if let Some(previous) = self.link.attach(link) {
            info!("Replaced connection to {previous}");
        }
        info!("Connected to {port}");
        Ok(())
    }

    /// Close the link without ending the session
    pub fn disconnect(&self) -> bool {
        self.link.close()
    }

    /// Append the live position to the sequence
    pub fn record_current(&self) -> Result<(usize, Position), RigError> {
        self.ensure_running()?;
        let position = self.source.current();
        let index = self.store.append(position);
        info!("Recorded Pos {index}: {position}");
        Ok((index, position))
    }

    /// Replay the recorded sequence; blocks until the last step
    pub fn play(&self) -> Result<PlaybackReport, RigError> {
        self.ensure_running()?;
        let sequence = self.store.snapshot();
        self.playback.play(&sequence)
    }

    pub fn clear_last(&self) -> Option<Position> {
        self.store.remove_last()
    }

    pub fn clear_all(&self) -> usize {
        let dropped = self.store.clear();
        info!("Cleared all positions ({dropped})");
        dropped
    }

    /// Write the sequence to `path`, returning the path written
    pub fn save(&self, path: &Path) -> Result<PathBuf, RigError> {
        persistence::save_sequence(path, &self.store.snapshot())
    }

    /// Replace the sequence with the contents of `path`.
    /// On any error the current sequence is left as it was.
    pub fn load(&self, path: &Path) -> Result<usize, RigError> {
        let positions = persistence::load_sequence(path)?;
        let count = positions.len();
        self.store.replace(positions);
        Ok(count)
    }

    /// Stop streaming, then close the link. Safe to call more than once.
    pub fn shutdown(&self) {
        let _transition = self.transition.lock();
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down");
        if let Some(mut streaming) = self.streaming.lock().take() {
            streaming.stop();
        }
        self.link.close();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    pub fn sequence(&self) -> Vec<Position> {
        self.store.snapshot()
    }

    pub fn listing(&self) -> Vec<String> {
        self.store.listing()
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            port: self.link.port_name(),
            recorded: self.store.len(),
            playing: self.playback.is_playing(),
            streaming: self
                .streaming
                .lock()
                .as_ref()
                .is_some_and(StreamingLoop::is_running),
            link: self.link.stats(),
        }
    }

    /// Run a command and describe the result for display
    pub fn execute(&self, command: Command) -> CommandOutcome {
        let outcome = match command {
            Command::Connect { port } => match self.connect(&port) {
                Ok(()) => CommandOutcome::ok(format!("Connected to {port}")),
                Err(e) => CommandOutcome::failed(e.to_string()),
            },
            Command::Disconnect => {
                if self.disconnect() {
                    CommandOutcome::ok("Disconnected")
                } else {
                    CommandOutcome::failed("Not connected")
                }
            }
            Command::RecordCurrent => match self.record_current() {
                Ok((index, position)) => CommandOutcome::ok(format!("Pos {index}: {position}")),
                Err(e) => CommandOutcome::failed(e.to_string()),
            },
            Command::Play => match self.play() {
                Ok(report) if report.failed_steps == 0 => {
                    CommandOutcome::ok(format!("Finished playing {} positions", report.steps))
                }
                Ok(report) => CommandOutcome::failed(format!(
                    "Played {} positions, {} not delivered",
                    report.steps, report.failed_steps
                )),
                Err(e) => CommandOutcome::failed(e.to_string()),
            },
            Command::ClearLast => match self.clear_last() {
                Some(position) => CommandOutcome::ok(format!("Removed: {position}")),
                None => CommandOutcome::failed("No positions to remove"),
            },
            Command::ClearAll => {
                self.clear_all();
                CommandOutcome::ok("Cleared all positions")
            }
            Command::Save { path } => match self.save(&path) {
                Ok(written) => CommandOutcome::ok(format!("Saved {}", written.display())),
                Err(e) => CommandOutcome::failed(e.to_string()),
            },
            Command::Load { path } => match self.load(&path) {
                Ok(count) => {
                    CommandOutcome::ok(format!("Opened {} ({count} positions)", path.display()))
                }
                Err(e) => CommandOutcome::failed(format!("Cannot open file: {e}")),
            },
            Command::Shutdown => {
                self.shutdown();
                CommandOutcome::ok("Shut down")
            }
        };

        if !outcome.success {
            warn!("{}", outcome.message);
        }
        outcome
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if self.playback.is_playing() {
            error!("Controller dropped during playback");
        }
        self.shutdown();
    }
}
