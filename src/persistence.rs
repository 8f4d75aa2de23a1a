//! Text form of a recorded sequence.
//!
//! A sequence is stored as a bracketed list of four-integer lists, e.g.
//! `[[90, 90, 90, 90], [0, 90, 90, 90]]`. Files are parsed as JSON and every
//! entry is checked for shape and range before anything is returned.

use crate::error::RigError;
use crate::types::{AXIS_COUNT, MAX_WIRE_VALUE, Position, SERVO_MAX_ANGLE};
use log::{info, warn};
use serde::Serialize;
use serde_json::ser::Formatter;
use std::io;
use std::path::{Path, PathBuf};

/// Extension appended when a save path has none
pub const DEFAULT_EXTENSION: &str = "txt";

/// Compact JSON with a space after each list separator
struct ListFormatter;

impl Formatter for ListFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }
}

pub fn serialize(positions: &[Position]) -> Result<String, RigError> {
    let rows: Vec<[u16; AXIS_COUNT]> = positions.iter().map(Position::axes).collect();

    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, ListFormatter);
    rows.serialize(&mut serializer)
        .map_err(|e| RigError::Format(e.to_string()))?;

    String::from_utf8(out).map_err(|e| RigError::Format(e.to_string()))
}

pub fn deserialize(text: &str) -> Result<Vec<Position>, RigError> {
    let rows: Vec<Vec<i64>> = serde_json::from_str(text)
        .map_err(|e| RigError::Format(format!("expected a list of integer lists: {e}")))?;

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| parse_entry(i + 1, &row))
        .collect()
}

fn parse_entry(entry: usize, row: &[i64]) -> Result<Position, RigError> {
    if row.len() != AXIS_COUNT {
        return Err(RigError::Format(format!(
            "entry {entry} has {} values, expected {AXIS_COUNT}",
            row.len()
        )));
    }

    let mut axes = [0u16; AXIS_COUNT];
    for (slot, &value) in row.iter().enumerate() {
        axes[slot] = u16::try_from(value)
            .ok()
            .filter(|&v| v <= MAX_WIRE_VALUE)
            .ok_or_else(|| {
                RigError::Format(format!(
                    "entry {entry} axis {} value {value} outside 0..={MAX_WIRE_VALUE}",
                    slot + 1
                ))
            })?;
    }

    let position = Position::new(axes)?;
    if !position.is_within_servo_range() {
        warn!("Entry {entry} {position} exceeds the servo range 0..={SERVO_MAX_ANGLE}");
    }
    Ok(position)
}

/// Write a non-empty sequence to `path`, returning the path actually written
pub fn save_sequence(path: &Path, positions: &[Position]) -> Result<PathBuf, RigError> {
    if positions.is_empty() {
        return Err(RigError::EmptySequence);
    }

    let mut path = path.to_path_buf();
    if path.extension().is_none() {
        path.set_extension(DEFAULT_EXTENSION);
    }

    let text = serialize(positions)?;
    std::fs::write(&path, text).map_err(|source| RigError::Io {
        source,
        context: format!("Could not write sequence file at {}", path.display()),
    })?;

    info!("Saved {} positions to {}", positions.len(), path.display());
    Ok(path)
}

pub fn load_sequence(path: &Path) -> Result<Vec<Position>, RigError> {
    let text = std::fs::read_to_string(path).map_err(|source| RigError::Io {
        source,
        context: format!("Could not read sequence file at {}", path.display()),
    })?;

    let positions = deserialize(&text)?;
    info!("Opened {} ({} positions)", path.display(), positions.len());
    Ok(positions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Position> {
        vec![
            Position::new([90, 90, 90, 90]).unwrap(),
            Position::new([0, 90, 90, 90]).unwrap(),
            Position::new([180, 90, 0, 90]).unwrap(),
        ]
    }

    #[test]
    fn test_serialize_matches_legacy_layout() {
        let text = serialize(&sample()[..2]).unwrap();
        assert_eq!(text, "[[90, 90, 90, 90], [0, 90, 90, 90]]");
    }

    #[test]
    fn test_deserialize_recovers_serialized_sequence() {
        let positions = sample();
        assert_eq!(deserialize(&serialize(&positions).unwrap()).unwrap(), positions);
    }

    #[test]
    fn test_deserialize_accepts_whitespace_variants() {
        let parsed = deserialize("\n[ [90,90,90,90] ,[0, 90, 90, 90]]\n").unwrap();
        assert_eq!(parsed, sample()[..2].to_vec());
        assert!(deserialize("[]").unwrap().is_empty());
    }

    #[test]
    fn test_deserialize_rejects_malformed_input() {
        let cases = [
            "",
            "__import__('os').system('rm -rf /')",
            "[[90, 90, 90]]",
            "[[90, 90, 90, 90, 90]]",
            "[[90, 90, 90, -1]]",
            "[[90, 90, 90, 1000]]",
            "[[90, 90, 90, 90.5]]",
            "[[\"90\", 90, 90, 90]]",
            "[90, 90, 90, 90]",
            "{\"positions\": []}",
        ];
        for case in cases {
            assert!(
                matches!(deserialize(case), Err(RigError::Format(_))),
                "accepted {case:?}"
            );
        }
    }

    #[test]
    fn test_save_refuses_empty_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let result = save_sequence(&dir.path().join("empty.txt"), &[]);
        assert!(matches!(result, Err(RigError::EmptySequence)));
        assert!(!dir.path().join("empty.txt").exists());
    }

    #[test]
    fn test_save_appends_default_extension() {
        let dir = tempfile::tempdir().unwrap();
        let written = save_sequence(&dir.path().join("moves"), &sample()).unwrap();

        assert_eq!(written, dir.path().join("moves.txt"));
        assert_eq!(load_sequence(&written).unwrap(), sample());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_sequence(&dir.path().join("missing.txt"));
        assert!(matches!(result, Err(RigError::Io { .. })));
    }
}
