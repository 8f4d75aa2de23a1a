use crate::error::RigError;
use std::fmt;
use std::str::FromStr;

/// Number of independently driven servo axes
pub const AXIS_COUNT: usize = 4;

/// Largest value a three-digit wire field can carry
pub const MAX_WIRE_VALUE: u16 = 999;

/// Upper bound of the servo angle range in degrees
pub const SERVO_MAX_ANGLE: u16 = 180;

/// Angle every axis rests at before the operator moves it
pub const HOME_ANGLE: u16 = 90;

/// Servo axes in wire order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Base,
    Shoulder,
    Elbow,
    Gripper,
}

impl Axis {
    pub const ALL: [Axis; AXIS_COUNT] = [Axis::Base, Axis::Shoulder, Axis::Elbow, Axis::Gripper];

    /// Zero-based slot of this axis in a frame
    pub fn index(self) -> usize {
        match self {
            Axis::Base => 0,
            Axis::Shoulder => 1,
            Axis::Elbow => 2,
            Axis::Gripper => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Axis::Base => "base",
            Axis::Shoulder => "shoulder",
            Axis::Elbow => "elbow",
            Axis::Gripper => "gripper",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.index() + 1, self.name())
    }
}

impl FromStr for Axis {
    type Err = RigError;

    /// Accepts the 1-based servo number or the axis name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "base" => Ok(Axis::Base),
            "2" | "shoulder" => Ok(Axis::Shoulder),
            "3" | "elbow" => Ok(Axis::Elbow),
            "4" | "gripper" => Ok(Axis::Gripper),
            other => Err(RigError::InvalidPosition(format!("unknown axis '{other}'"))),
        }
    }
}

/// Snapshot of the target angle for every axis.
///
/// Each value fits a three-digit wire field (0..=999). Values captured from a
/// [`LivePosition`](crate::LivePosition) stay within the servo range 0..=180.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    axes: [u16; AXIS_COUNT],
}

impl Position {
    pub fn new(axes: [u16; AXIS_COUNT]) -> Result<Self, RigError> {
        if let Some(bad) = axes.iter().find(|&&v| v > MAX_WIRE_VALUE) {
            return Err(RigError::InvalidPosition(format!(
                "axis value {bad} exceeds {MAX_WIRE_VALUE}"
            )));
        }
        Ok(Self { axes })
    }

    /// Every axis at the same angle, clamped to the servo range
    pub fn uniform(angle: u16) -> Self {
        Self {
            axes: [angle.min(SERVO_MAX_ANGLE); AXIS_COUNT],
        }
    }

    pub fn axes(&self) -> [u16; AXIS_COUNT] {
        self.axes
    }

    pub fn axis(&self, axis: Axis) -> u16 {
        self.axes[axis.index()]
    }

    /// Copy with one axis replaced, clamped to the servo range
    pub fn with_axis(mut self, axis: Axis, angle: u16) -> Self {
        self.axes[axis.index()] = angle.min(SERVO_MAX_ANGLE);
        self
    }

    pub fn is_within_servo_range(&self) -> bool {
        self.axes.iter().all(|&v| v <= SERVO_MAX_ANGLE)
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::uniform(HOME_ANGLE)
    }
}

impl TryFrom<[u16; AXIS_COUNT]> for Position {
    type Error = RigError;

    fn try_from(axes: [u16; AXIS_COUNT]) -> Result<Self, Self::Error> {
        Position::new(axes)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.axes;
        write!(f, "[{a}, {b}, {c}, {d}]")
    }
}
