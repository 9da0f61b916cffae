//! Change checkers and the phases they run in

use crate::component::Component;

use super::alert::AlertCollection;

/// When a checker is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckPhase {
    /// While an edit is being made, before it is queued for commit.
    Edit,
    /// During a commit, before anything is finalized.
    Commit,
}

/// Validates one component and records problems as alerts.
///
/// Checkers only append alerts; they never change the component. Concept and
/// semantic checks may run on different threads at the same time.
pub trait ChangeChecker: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self, component: &Component, alerts: &AlertCollection, phase: CheckPhase);
}
