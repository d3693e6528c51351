//! Change accumulation between ticks.

use std::collections::HashMap;
use std::path::PathBuf;

use devloop_core::{Change, ChangeKind};

/// Changes accumulated by one watch task since the last flush.
///
/// Owned by exactly one task; [`Batch::take`] drains it and leaves an empty
/// batch in its place.
#[derive(Debug, Default)]
pub struct Batch {
    changes: Vec<Change>,
}

impl Batch {
    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn take(&mut self) -> Vec<Change> {
        std::mem::take(&mut self.changes)
    }
}

/// Split changes into `(adds, removes)`.
///
/// The last change to a path decides which side it lands on; a path appears
/// at most once. Output keeps the order of each path's last change.
pub fn partition(changes: Vec<Change>) -> (Vec<Change>, Vec<Change>) {
    let mut last: HashMap<PathBuf, usize> = HashMap::with_capacity(changes.len());
    for (i, change) in changes.iter().enumerate() {
        last.insert(change.local_path(), i);
    }

    let mut adds = Vec::new();
    let mut removes = Vec::new();
    for (i, change) in changes.into_iter().enumerate() {
        if last.get(&change.local_path()) != Some(&i) {
            continue;
        }
        match change.kind {
            ChangeKind::Add => adds.push(change),
            ChangeKind::Remove => removes.push(change),
        }
    }
    (adds, removes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(changes: &[Change]) -> Vec<String> {
        changes.iter().map(Change::remote_relative).collect()
    }

    #[test]
    fn add_then_remove_lands_in_removes_only() {
        let (adds, removes) = partition(vec![
            Change::add("/src/", "a.rs"),
            Change::add("/src/", "b.rs"),
            Change::remove("/src/", "a.rs"),
        ]);
        assert_eq!(paths(&adds), ["b.rs"]);
        assert_eq!(paths(&removes), ["a.rs"]);
    }

    #[test]
    fn remove_then_add_lands_in_adds_only() {
        let (adds, removes) = partition(vec![
            Change::remove("/src/", "a.rs"),
            Change::add("/src/", "a.rs"),
        ]);
        assert_eq!(paths(&adds), ["a.rs"]);
        assert!(removes.is_empty());
    }

    #[test]
    fn repeated_adds_collapse_keeping_last_position() {
        let (adds, _) = partition(vec![
            Change::add("/src/", "a.rs"),
            Change::add("/src/", "b.rs"),
            Change::add("/src/", "a.rs"),
        ]);
        assert_eq!(paths(&adds), ["b.rs", "a.rs"]);
    }

    #[test]
    fn take_resets_batch() {
        let mut batch = Batch::default();
        batch.push(Change::add("/src/", "a.rs"));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.take().len(), 1);
        assert!(batch.is_empty());
    }
}
