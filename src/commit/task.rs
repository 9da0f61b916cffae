//! One commit, as a small state machine
//!
//! ```text
//! Accumulating ──check()──▶ Checking ──┬─ into_record() ─▶ Committed
//!                                      └─ revert() ──────▶ Reverted
//! ```
//!
//! The task owns its working copies of the component sets from creation
//! until it either becomes a record or hands the sets back.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::alert::AlertCollection;
use super::checker::{ChangeChecker, CheckPhase};
use super::record::CommitRecord;
use crate::component::ComponentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    Accumulating,
    Checking,
    Committed,
    Reverted,
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommitState::Accumulating => "ACCUMULATING",
            CommitState::Checking => "CHECKING",
            CommitState::Committed => "COMMITTED",
            CommitState::Reverted => "REVERTED",
        };
        write!(f, "{}", name)
    }
}

/// Uncommitted sequences of one component kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UncommittedSets {
    /// Sequences committed without running checkers.
    pub unchecked: BTreeSet<u32>,
    /// Sequences every checker must see before commit.
    pub to_check: BTreeSet<u32>,
}

impl UncommittedSets {
    pub fn is_empty(&self) -> bool {
        self.unchecked.is_empty() && self.to_check.is_empty()
    }

    /// Every sequence this commit writes.
    pub fn to_commit(&self) -> BTreeSet<u32> {
        self.unchecked.union(&self.to_check).copied().collect()
    }
}

#[derive(Debug)]
pub struct CommitTask {
    comment: Option<String>,
    concepts: UncommittedSets,
    semantics: UncommittedSets,
    state: CommitState,
}

impl CommitTask {
    pub fn new(comment: Option<String>, concepts: UncommittedSets, semantics: UncommittedSets) -> Self {
        Self {
            comment,
            concepts,
            semantics,
            state: CommitState::Accumulating,
        }
    }

    pub fn state(&self) -> CommitState {
        self.state
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Runs every checker over every component that needs checking. Concept
    /// and semantic components are checked in parallel.
    pub fn check(
        &mut self,
        concepts: &ComponentStore,
        semantics: &ComponentStore,
        checkers: &[Arc<dyn ChangeChecker>],
    ) -> AlertCollection {
        assert_eq!(self.state, CommitState::Accumulating, "commit task checked twice");
        self.state = CommitState::Checking;

        let alerts = AlertCollection::new();
        if !checkers.is_empty() {
            rayon::join(
                || {
                    check_kind(
                        concepts,
                        &self.concepts.to_check,
                        checkers,
                        &alerts,
                        CheckPhase::Commit,
                    )
                },
                || {
                    check_kind(
                        semantics,
                        &self.semantics.to_check,
                        checkers,
                        &alerts,
                        CheckPhase::Commit,
                    )
                },
            );
        }
        alerts
    }

    /// Gives the working sets back for re-queuing.
    pub fn revert(mut self) -> (UncommittedSets, UncommittedSets) {
        self.state = CommitState::Reverted;
        (self.concepts, self.semantics)
    }

    /// Builds the record for a batch whose stamps were finalized.
    pub fn into_record(mut self, commit_time: DateTime<Utc>, stamps: BTreeSet<u32>) -> CommitRecord {
        assert_eq!(self.state, CommitState::Checking, "commit task was not checked");
        self.state = CommitState::Committed;
        CommitRecord::new(
            commit_time,
            stamps,
            self.concepts.to_commit(),
            self.semantics.to_commit(),
            self.comment.take(),
        )
    }
}

pub(super) fn check_kind(
    store: &ComponentStore,
    sequences: &BTreeSet<u32>,
    checkers: &[Arc<dyn ChangeChecker>],
    alerts: &AlertCollection,
    phase: CheckPhase,
) {
    for &sequence in sequences {
        // a sequence without stored bytes has nothing to check
        let component = match store.get(sequence) {
            Some(component) => component,
            None => continue,
        };
        for checker in checkers {
            checker.check(&component, alerts, phase);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::alert::{Alert, AlertSeverity};
    use crate::component::{Component, ComponentKind};
    use tempfile::TempDir;

    struct RejectEmpty;

    impl ChangeChecker for RejectEmpty {
        fn name(&self) -> &str {
            "reject-empty"
        }

        fn check(&self, component: &Component, alerts: &AlertCollection, _phase: CheckPhase) {
            if component.bytes.is_empty() {
                alerts.push(Alert::new(
                    AlertSeverity::Error,
                    component.kind,
                    component.sequence,
                    self.name(),
                    "empty component",
                ));
            }
        }
    }

    fn sets(unchecked: &[u32], to_check: &[u32]) -> UncommittedSets {
        UncommittedSets {
            unchecked: unchecked.iter().copied().collect(),
            to_check: to_check.iter().copied().collect(),
        }
    }

    #[test]
    fn test_only_checked_sequences_reach_checkers() {
        let temp_dir = TempDir::new().unwrap();
        let concepts = ComponentStore::open(temp_dir.path(), ComponentKind::Concept, 8).unwrap();
        let semantics = ComponentStore::open(temp_dir.path(), ComponentKind::Semantic, 8).unwrap();
        let unchecked = concepts.write(-1, Vec::new());
        let checked = concepts.write(-2, Vec::new());

        let mut task = CommitTask::new(None, sets(&[unchecked], &[checked]), sets(&[], &[]));
        let checkers: Vec<Arc<dyn ChangeChecker>> = vec![Arc::new(RejectEmpty)];
        let alerts = task.check(&concepts, &semantics, &checkers);
        assert_eq!(task.state(), CommitState::Checking);

        let alerts = alerts.into_sorted_vec();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].sequence, checked);
    }

    #[test]
    fn test_record_merges_sets() {
        let temp_dir = TempDir::new().unwrap();
        let concepts = ComponentStore::open(temp_dir.path(), ComponentKind::Concept, 8).unwrap();
        let semantics = ComponentStore::open(temp_dir.path(), ComponentKind::Semantic, 8).unwrap();

        let mut task = CommitTask::new(
            Some("init".into()),
            sets(&[0, 1], &[1, 2]),
            sets(&[], &[4]),
        );
        task.check(&concepts, &semantics, &[]);
        let record = task.into_record(Utc::now(), BTreeSet::from([7]));
        assert_eq!(record.concept_sequences(), &BTreeSet::from([0, 1, 2]));
        assert_eq!(record.semantic_sequences(), &BTreeSet::from([4]));
        assert_eq!(record.comment(), Some("init"));
    }

    #[test]
    fn test_revert_returns_sets() {
        let task = CommitTask::new(None, sets(&[3], &[4]), sets(&[], &[]));
        let (concepts, semantics) = task.revert();
        assert_eq!(concepts, sets(&[3], &[4]));
        assert!(semantics.is_empty());
    }
}
