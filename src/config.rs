use crate::protocol::DEFAULT_BAUD_RATE;
use crate::serial_link::LinkSettings;
use crate::types::{AXIS_COUNT, Axis, HOME_ANGLE, Position, SERVO_MAX_ANGLE};
use config::{Config, ConfigError, Environment, File};
#[cfg(test)]
use config::Map;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    pub link: LinkConfig,
    pub streaming: StreamingConfig,
    pub playback: PlaybackConfig,
    pub servo: ServoConfig,
    pub console: ConsoleConfig,
}

impl AppConfig {
    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.link.baud_rate == 0 {
            return Err(ConfigError::Message("link.baud_rate must be positive".into()));
        }
        if self.streaming.period_ms == 0 {
            return Err(ConfigError::Message(
                "streaming.period_ms must be positive".into(),
            ));
        }
        if self.servo.home.iter().any(|&angle| angle > SERVO_MAX_ANGLE) {
            return Err(ConfigError::Message(format!(
                "servo.home angles must be within 0..={SERVO_MAX_ANGLE}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LinkConfig {
    /// Port to connect to at startup, e.g. "COM3" or "/dev/ttyACM0"
    pub port: Option<String>,
    pub baud_rate: u32,
    pub timeout_ms: u64,
    /// Wait after opening for the controller's boot reset
    pub settle_delay_ms: u64,
}

impl LinkConfig {
    pub fn settings(&self) -> LinkSettings {
        LinkSettings {
            baud_rate: self.baud_rate,
            timeout: Duration::from_millis(self.timeout_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StreamingConfig {
    pub enabled: bool,
    pub period_ms: u64,
    /// Skip ticks while a playback is in flight
    pub yield_to_playback: bool,
}

impl StreamingConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlaybackConfig {
    pub step_delay_ms: u64,
}

impl PlaybackConfig {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServoConfig {
    pub home: [u16; AXIS_COUNT],
}

impl ServoConfig {
    pub fn home_position(&self) -> Position {
        Axis::ALL.iter().fold(Position::default(), |position, &axis| {
            position.with_axis(axis, self.home[axis.index()])
        })
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ConsoleConfig {
    pub verbosity: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: 1000,
            settle_delay_ms: 2000,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period_ms: 50,
            yield_to_playback: false,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: 1000,
        }
    }
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            home: [HOME_ANGLE; AXIS_COUNT],
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            verbosity: "info".to_string(),
        }
    }
}

/// Prefix of environment overrides, e.g. `SERVO_RIG_PLAYBACK__STEP_DELAY_MS=500`
pub const ENV_PREFIX: &str = "SERVO_RIG";

/// Config files tried in the working directory when none is given
const DEFAULT_CONFIG_FILES: [&str; 2] = ["servo_rig.toml", "rig_config.toml"];

/// Load configuration: defaults, then a config file, then `SERVO_RIG_*` variables
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    load_layered(config_path, environment())
}

/// `SERVO_RIG_<SECTION>__<KEY>`: one underscore after the prefix, two between levels
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// The file [`load_config`] reads: `config_path` if given, else the first
/// default file present in the working directory
pub fn config_file(config_path: Option<&Path>) -> Option<PathBuf> {
    match config_path {
        Some(path) => Some(path.to_path_buf()),
        None => DEFAULT_CONFIG_FILES
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists()),
    }
}

fn load_layered(config_path: Option<&Path>, env: Environment) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

    match config_file(config_path) {
        Some(path) if path.exists() => {
            log::info!("Using config file {}", path.display());
            builder = builder.add_source(File::from(path.as_path()));
        }
        Some(path) => {
            return Err(ConfigError::Message(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        None => log::debug!("No config file found, using defaults"),
    }

    builder = builder.add_source(env);

    let config = builder.build()?.try_deserialize::<AppConfig>()?;
    config.validate()?;
    Ok(config)
}

/// Load configuration, falling back to defaults on any error
pub fn load_config_or_default(config_path: Option<&Path>) -> AppConfig {
    match load_config(config_path) {
        Ok(config) => {
            log::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            log::warn!("Failed to load config ({}), using defaults", e);
            AppConfig::default()
        }
    }
}
