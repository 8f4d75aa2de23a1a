use crate::types::{Axis, Position};
use log::debug;
use parking_lot::RwLock;

/// Supplies the live target position the streaming loop sends each tick.
///
/// Implementations must return a whole snapshot: all four axes from the same
/// update, never a mix of old and new values.
pub trait PositionSource: Send + Sync {
    fn current(&self) -> Position;
}

/// Value holder updated by whatever front-end the operator drives
#[derive(Debug, Default)]
pub struct LivePosition {
    position: RwLock<Position>,
}

impl LivePosition {
    pub fn new(initial: Position) -> Self {
        Self {
            position: RwLock::new(initial),
        }
    }

    /// Replace the whole position in one update
    pub fn set(&self, position: Position) {
        *self.position.write() = position;
    }

    /// Move one axis, clamped to the servo range. Returns the stored position.
    pub fn set_axis(&self, axis: Axis, angle: u16) -> Position {
        let mut position = self.position.write();
        *position = position.with_axis(axis, angle);
        debug!("Axis {axis} set to {}", position.axis(axis));
        *position
    }
}

impl PositionSource for LivePosition {
    fn current(&self) -> Position {
        *self.position.read()
    }
}
