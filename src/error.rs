use thiserror::Error;

#[derive(Error, Debug)]
pub enum RigError {
    #[error("Cannot open port {port}: {source}")]
    Connection {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("IO error: {context}: {source}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },
    #[error("Not connected to the servo controller")]
    NotConnected,
    #[error("No positions recorded")]
    EmptySequence,
    #[error("Malformed sequence: {0}")]
    Format(String),
    #[error("Malformed frame: {0}")]
    Frame(String),
    #[error("Invalid position: {0}")]
    InvalidPosition(String),
    #[error("Playback already in progress")]
    PlaybackInProgress,
    #[error("Controller has been shut down")]
    ShutDown,
}
