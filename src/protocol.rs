//! Wire format for the servo controller.
//!
//! One frame per update: four zero-padded three-digit ASCII fields in axis
//! order followed by a newline. There is no checksum, no start marker and no
//! acknowledgement. A dropped byte shifts the receiver's framing until the
//! controller is reset.

use crate::error::RigError;
use crate::types::{AXIS_COUNT, Position};

// Protocol constants
pub const FIELD_WIDTH: usize = 3;
pub const FRAME_TERMINATOR: u8 = b'\n';
pub const FRAME_LEN: usize = AXIS_COUNT * FIELD_WIDTH + 1;
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Encode a position into exactly [`FRAME_LEN`] bytes
pub fn encode_frame(position: &Position) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    for (slot, value) in position.axes().iter().enumerate() {
        let field = &mut frame[slot * FIELD_WIDTH..(slot + 1) * FIELD_WIDTH];
        field[0] = b'0' + (value / 100 % 10) as u8;
        field[1] = b'0' + (value / 10 % 10) as u8;
        field[2] = b'0' + (value % 10) as u8;
    }
    frame[FRAME_LEN - 1] = FRAME_TERMINATOR;
    frame
}

/// Decode one frame, splitting on three-character boundaries
pub fn decode_frame(frame: &[u8]) -> Result<Position, RigError> {
    if frame.len() != FRAME_LEN {
        return Err(RigError::Frame(format!(
            "expected {} bytes, got {}",
            FRAME_LEN,
            frame.len()
        )));
    }
    if frame[FRAME_LEN - 1] != FRAME_TERMINATOR {
        return Err(RigError::Frame("missing newline terminator".into()));
    }

    let mut axes = [0u16; AXIS_COUNT];
    for (slot, field) in frame[..FRAME_LEN - 1].chunks_exact(FIELD_WIDTH).enumerate() {
        let mut value = 0u16;
        for &digit in field {
            if !digit.is_ascii_digit() {
                return Err(RigError::Frame(format!(
                    "non-digit byte 0x{digit:02x} in field {}",
                    slot + 1
                )));
            }
            value = value * 10 + u16::from(digit - b'0');
        }
        axes[slot] = value;
    }
    Position::new(axes)
}
