//! Pending reconciliation work, keyed by project directory.

use crate::types::WorkKind;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Marks of one project. Each mark remembers the sequence number of the
/// newest event that set it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Marks {
    init: Option<u64>,
    fetch: Option<u64>,
}

impl Marks {
    fn is_empty(self) -> bool {
        self.init.is_none() && self.fetch.is_none()
    }
}

/// The pending-work sets.
///
/// Marks are additive: marking a directory that is already pending only
/// refreshes its stamp. A mark is removed by [`PendingWork::settle`] once an
/// attempt covering it has finished.
#[derive(Debug, Default)]
pub struct PendingWork {
    entries: BTreeMap<PathBuf, Marks>,
}

/// Snapshot of what an execution pass has to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkPlan {
    /// Projects needing `init`
    pub init: BTreeSet<PathBuf>,
    /// Projects needing only a module fetch
    pub fetch: BTreeSet<PathBuf>,
}

impl WorkPlan {
    /// Returns true if there is nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.init.is_empty() && self.fetch.is_empty()
    }

    /// Number of projects touched.
    #[must_use]
    pub fn len(&self) -> usize {
        self.init.len() + self.fetch.len()
    }
}

impl PendingWork {
    /// Create empty pending sets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `dir` needs `kind`, as decided by the event with `sequence`.
    pub fn mark(&mut self, dir: &Path, kind: WorkKind, sequence: u64) {
        let marks = self.entries.entry(dir.to_path_buf()).or_default();
        let slot = match kind {
            WorkKind::Init => &mut marks.init,
            WorkKind::ModuleFetch => &mut marks.fetch,
        };
        *slot = Some(slot.map_or(sequence, |s| s.max(sequence)));
    }

    /// Whether `dir` currently carries a mark of `kind`.
    #[must_use]
    pub fn contains(&self, dir: &Path, kind: WorkKind) -> bool {
        self.entries.get(dir).is_some_and(|m| match kind {
            WorkKind::Init => m.init.is_some(),
            WorkKind::ModuleFetch => m.fetch.is_some(),
        })
    }

    /// Returns true if no project is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of pending projects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Split the pending projects into init and fetch work.
    ///
    /// A project marked for both appears only under `init`.
    #[must_use]
    pub fn plan(&self) -> WorkPlan {
        let mut plan = WorkPlan::default();
        for (dir, marks) in &self.entries {
            if marks.init.is_some() {
                plan.init.insert(dir.clone());
            } else if marks.fetch.is_some() {
                plan.fetch.insert(dir.clone());
            }
        }
        plan
    }

    /// Remove the marks of `dir` that an attempt of `kind` covered.
    ///
    /// Only marks stamped at or before `sequence` are removed, so an event
    /// arriving while the attempt ran keeps its project pending. An init
    /// attempt also settles the module fetch it superseded.
    pub fn settle(&mut self, dir: &Path, kind: WorkKind, sequence: u64) {
        let Some(marks) = self.entries.get_mut(dir) else {
            return;
        };

        let covered = |slot: &mut Option<u64>| {
            if slot.is_some_and(|s| s <= sequence) {
                *slot = None;
            }
        };

        covered(&mut marks.fetch);
        if kind == WorkKind::Init {
            covered(&mut marks.init);
        }

        if marks.is_empty() {
            self.entries.remove(dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dirs(names: &[&str]) -> BTreeSet<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_init_supersedes_fetch_in_plan() {
        let mut pending = PendingWork::new();
        pending.mark(Path::new("/a"), WorkKind::ModuleFetch, 1);
        pending.mark(Path::new("/a"), WorkKind::Init, 2);
        pending.mark(Path::new("/b"), WorkKind::ModuleFetch, 3);

        let plan = pending.plan();
        assert_eq!(plan.init, dirs(&["/a"]));
        assert_eq!(plan.fetch, dirs(&["/b"]));
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_marks_are_additive() {
        let mut pending = PendingWork::new();
        pending.mark(Path::new("/a"), WorkKind::Init, 1);
        pending.mark(Path::new("/a"), WorkKind::Init, 2);
        pending.mark(Path::new("/b"), WorkKind::Init, 3);

        assert_eq!(pending.len(), 2);
        assert_eq!(pending.plan().init, dirs(&["/a", "/b"]));
    }

    #[test]
    fn test_settle_removes_attempted_work() {
        let mut pending = PendingWork::new();
        pending.mark(Path::new("/a"), WorkKind::Init, 1);
        pending.mark(Path::new("/a"), WorkKind::ModuleFetch, 1);
        pending.mark(Path::new("/b"), WorkKind::ModuleFetch, 1);

        pending.settle(Path::new("/a"), WorkKind::Init, 1);
        pending.settle(Path::new("/b"), WorkKind::ModuleFetch, 1);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_settle_keeps_newer_marks() {
        let mut pending = PendingWork::new();
        pending.mark(Path::new("/a"), WorkKind::Init, 1);
        // event arriving while the pass for sequence 1 runs
        pending.mark(Path::new("/a"), WorkKind::Init, 2);

        pending.settle(Path::new("/a"), WorkKind::Init, 1);
        assert!(pending.contains(Path::new("/a"), WorkKind::Init));

        pending.settle(Path::new("/a"), WorkKind::Init, 2);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_fetch_settle_leaves_init_mark() {
        let mut pending = PendingWork::new();
        pending.mark(Path::new("/a"), WorkKind::ModuleFetch, 1);
        pending.mark(Path::new("/a"), WorkKind::Init, 2);

        pending.settle(Path::new("/a"), WorkKind::ModuleFetch, 2);
        assert!(pending.contains(Path::new("/a"), WorkKind::Init));
        assert!(!pending.contains(Path::new("/a"), WorkKind::ModuleFetch));
    }

    #[test]
    fn test_settle_unknown_directory() {
        let mut pending = PendingWork::new();
        pending.settle(Path::new("/nowhere"), WorkKind::Init, 10);
        assert!(pending.is_empty());
        assert!(pending.plan().is_empty());
    }
}
