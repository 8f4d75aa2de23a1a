use crate::types::Position;
use log::info;
use parking_lot::RwLock;

/// Ordered list of recorded positions.
///
/// Every mutation takes the write lock for its whole duration, so readers
/// either see the sequence before or after an operation, never in between.
#[derive(Debug, Default)]
pub struct SequenceStore {
    entries: RwLock<Vec<Position>>,
}

impl SequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a position and return the new 1-based size
    pub fn append(&self, position: Position) -> usize {
        let mut entries = self.entries.write();
        entries.push(position);
        entries.len()
    }

    /// Remove the most recent entry, `None` if the sequence was already empty
    pub fn remove_last(&self) -> Option<Position> {
        let removed = self.entries.write().pop();
        match removed {
            Some(position) => info!("Removed: {position}"),
            None => info!("No positions to remove"),
        }
        removed
    }

    /// Empty the sequence, returning how many entries were dropped
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        let dropped = entries.len();
        entries.clear();
        dropped
    }

    /// Swap in a whole new sequence
    pub fn replace(&self, positions: Vec<Position>) {
        *self.entries.write() = positions;
    }

    /// Copy of the current sequence
    pub fn snapshot(&self) -> Vec<Position> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Display lines numbered from 1: `Pos 1: [90, 90, 90, 90]`
    pub fn listing(&self) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .enumerate()
            .map(|(i, position)| format!("Pos {}: {}", i + 1, position))
            .collect()
    }
}
