//! Change detection between snapshots.
//!
//! A file is changed when its published bytes differ. Metadata such as
//! fetch time or cache validators never count as a change.

use crate::models::{ChangeSet, Snapshot};

/// Calculator for computing diffs between snapshots.
#[derive(Debug, Clone, Default)]
pub struct DiffCalculator;

impl DiffCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Calculate the change set from `previous` to `current`.
    ///
    /// Each list is sorted by filename.
    pub fn calculate(&self, previous: &Snapshot, current: &Snapshot) -> ChangeSet {
        let mut changes = ChangeSet::default();

        for (filename, file) in current.iter() {
            match previous.get(filename) {
                None => changes.added.push(filename.clone()),
                Some(old) if old.content != file.content => changes.updated.push(filename.clone()),
                Some(_) => {}
            }
        }

        changes.removed = previous
            .iter()
            .filter(|(filename, _)| !current.contains(filename))
            .map(|(filename, _)| filename.clone())
            .collect();

        changes
    }
}

/// Convenience function to calculate diff.
pub fn calculate_diff(previous: &Snapshot, current: &Snapshot) -> ChangeSet {
    DiffCalculator::new().calculate(previous, current)
}
