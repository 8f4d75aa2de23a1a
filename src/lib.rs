pub mod config;
pub mod controller;
pub mod error;
pub mod persistence;
pub mod playback;
pub mod position_source;
pub mod protocol;
pub mod sequence;
pub mod serial_link;
pub mod streaming;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::{AppConfig, config_file, load_config, load_config_or_default};
pub use controller::{Command, CommandOutcome, Controller, ControllerBuilder, ControllerStatus};
pub use error::RigError;
pub use playback::{PlaybackEngine, PlaybackReport};
pub use position_source::{LivePosition, PositionSource};
pub use protocol::{FRAME_LEN, decode_frame, encode_frame};
pub use sequence::SequenceStore;
pub use serial_link::{
    ConnectionState, LinkSettings, LinkStats, PortOpener, SerialLink, SerialPortOpener,
    SharedLink, list_ports,
};
pub use streaming::StreamingLoop;
pub use types::{AXIS_COUNT, Axis, Position, SERVO_MAX_ANGLE};
