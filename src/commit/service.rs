//! Commit service
//!
//! Holds the uncommitted component sets and the registered checkers and
//! listeners, and runs commits one at a time.
//!
//! # Outcomes
//!
//! - `Ok(Some(record))`: every pending stamp was finalized with one commit
//!   time and listeners were notified.
//! - `Ok(None)`: either a checker raised an ERROR alert and the batch was
//!   reverted, or nothing was pending.
//! - `Err(_)`: an unexpected failure. If it happened before finalization
//!   the batch was reverted first.
//!
//! Finalization itself cannot fail part-way: every stamp is built first and
//! then published under the stamp service's visibility gate.

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use super::alert::{Alert, AlertCollection};
use super::checker::{ChangeChecker, CheckPhase};
use super::errors::{CommitError, CommitResult};
use super::listener::CommitListener;
use super::record::CommitRecord;
use super::registry::ActiveTaskRegistry;
use super::task::{check_kind, CommitTask, UncommittedSets};
use crate::collections::ConcurrentIntSet;
use crate::component::{ComponentKind, ComponentStore};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry, Timer};
use crate::stamp::{StampService, MAX_COMMENT_BYTES};
use crate::worker::panic_message;

#[derive(Debug, Default)]
struct KindSets {
    unchecked: ConcurrentIntSet,
    to_check: ConcurrentIntSet,
}

impl KindSets {
    fn take(&self) -> UncommittedSets {
        UncommittedSets {
            unchecked: self.unchecked.take(),
            to_check: self.to_check.take(),
        }
    }

    fn restore(&self, sets: UncommittedSets) {
        self.unchecked.add_all(sets.unchecked);
        self.to_check.add_all(sets.to_check);
    }

    fn snapshot(&self) -> UncommittedSets {
        UncommittedSets {
            unchecked: self.unchecked.snapshot(),
            to_check: self.to_check.snapshot(),
        }
    }
}

pub struct CommitService {
    stamps: Arc<StampService>,
    concepts: Arc<ComponentStore>,
    semantics: Arc<ComponentStore>,
    concept_sets: KindSets,
    semantic_sets: KindSets,
    checkers: RwLock<Vec<Arc<dyn ChangeChecker>>>,
    listeners: RwLock<Vec<Arc<dyn CommitListener>>>,
    registry: Arc<ActiveTaskRegistry>,
    commit_lock: Mutex<()>,
    last_alerts: Mutex<Vec<Alert>>,
    metrics: Arc<MetricsRegistry>,
}

impl CommitService {
    pub fn new(
        stamps: Arc<StampService>,
        concepts: Arc<ComponentStore>,
        semantics: Arc<ComponentStore>,
        registry: Arc<ActiveTaskRegistry>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            stamps,
            concepts,
            semantics,
            concept_sets: KindSets::default(),
            semantic_sets: KindSets::default(),
            checkers: RwLock::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
            registry,
            commit_lock: Mutex::new(()),
            last_alerts: Mutex::new(Vec::new()),
            metrics,
        }
    }

    fn sets(&self, kind: ComponentKind) -> &KindSets {
        match kind {
            ComponentKind::Concept => &self.concept_sets,
            ComponentKind::Semantic => &self.semantic_sets,
        }
    }

    /// Queues `sequence` for the next commit.
    pub fn add_uncommitted(&self, kind: ComponentKind, sequence: u32, needs_check: bool) {
        let sets = self.sets(kind);
        if needs_check {
            sets.to_check.add(sequence);
        } else {
            sets.unchecked.add(sequence);
        }
    }

    /// The sequences currently queued for `kind`.
    pub fn uncommitted(&self, kind: ComponentKind) -> UncommittedSets {
        self.sets(kind).snapshot()
    }

    /// Appends a checker; checkers run in registration order.
    pub fn add_checker(&self, checker: Arc<dyn ChangeChecker>) {
        self.checkers.write().push(checker);
    }

    /// Removes every checker named `name`. Returns true if one was removed.
    pub fn remove_checker(&self, name: &str) -> bool {
        let mut checkers = self.checkers.write();
        let before = checkers.len();
        checkers.retain(|checker| checker.name() != name);
        checkers.len() != before
    }

    /// Registers a listener, replacing one with the same name.
    pub fn add_listener(&self, listener: Arc<dyn CommitListener>) {
        let mut listeners = self.listeners.write();
        listeners.retain(|existing| existing.name() != listener.name());
        listeners.push(listener);
    }

    pub fn remove_listener(&self, name: &str) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|listener| listener.name() != name);
        listeners.len() != before
    }

    /// Runs every checker over one stored component in the edit phase.
    /// Nothing is queued or committed. Returns the alerts, errors first.
    pub fn check_edit(&self, kind: ComponentKind, sequence: u32) -> CommitResult<Vec<Alert>> {
        let store = match kind {
            ComponentKind::Concept => &self.concepts,
            ComponentKind::Semantic => &self.semantics,
        };
        let checkers = self.checkers.read().clone();
        let alerts = AlertCollection::new();
        panic::catch_unwind(AssertUnwindSafe(|| {
            check_kind(
                store,
                &BTreeSet::from([sequence]),
                &checkers,
                &alerts,
                CheckPhase::Edit,
            )
        }))
        .map_err(|payload| CommitError::CheckerPanicked(panic_message(payload.as_ref())))?;
        Ok(alerts.into_sorted_vec())
    }

    /// Alerts raised by the most recent commit, errors first.
    pub fn last_alerts(&self) -> Vec<Alert> {
        self.last_alerts.lock().clone()
    }

    /// Commits every pending stamp and queued component.
    ///
    /// A comment longer than `MAX_COMMENT_BYTES` is rejected before anything
    /// is taken from the pending state.
    pub fn commit(&self, comment: Option<&str>) -> CommitResult<Option<CommitRecord>> {
        if let Some(comment) = comment {
            if comment.len() > MAX_COMMENT_BYTES {
                return Err(CommitError::CommentTooLong {
                    len: comment.len(),
                    max: MAX_COMMENT_BYTES,
                });
            }
        }

        let _serial = self.commit_lock.lock();
        let _active = self
            .registry
            .begin(format!("commit: {}", comment.unwrap_or("<no comment>")));
        let timer = Timer::new();

        let mut task = CommitTask::new(
            comment.map(str::to_string),
            self.concept_sets.take(),
            self.semantic_sets.take(),
        );
        let pending = self.stamps.begin_commit();

        let checkers = self.checkers.read().clone();
        let checked = panic::catch_unwind(AssertUnwindSafe(|| {
            task.check(&self.concepts, &self.semantics, &checkers)
        }));
        let alerts = match checked {
            Ok(alerts) => alerts,
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                self.revert(task, &[("reason", reason.as_str())]);
                return Err(CommitError::CheckerPanicked(reason));
            }
        };

        let blocked = alerts.has_errors();
        self.record_alerts(alerts);
        if blocked {
            let errors = self
                .last_alerts
                .lock()
                .iter()
                .filter(|alert| alert.is_error())
                .count();
            self.revert(task, &[("errors", errors.to_string().as_str())]);
            return Ok(None);
        }

        if pending.is_empty() {
            self.metrics.increment_commits_noop();
            log_event_with_fields(Event::CommitNoop, &[("elapsed_ms", &timer.elapsed_ms())]);
            return Ok(None);
        }

        let commit_time = Utc::now();
        let finalized = self
            .stamps
            .finalize(&pending, commit_time.timestamp_millis(), task.comment());
        let record = task.into_record(commit_time, finalized.into_iter().collect::<BTreeSet<_>>());

        self.metrics.increment_commits();
        self.metrics.add_stamps_finalized(record.stamp_sequences().len() as u64);
        log_event_with_fields(
            Event::CommitComplete,
            &[
                ("stamps", &record.stamp_sequences().len().to_string()),
                ("concepts", &record.concept_sequences().len().to_string()),
                ("semantics", &record.semantic_sequences().len().to_string()),
                ("elapsed_ms", &timer.elapsed_ms()),
            ],
        );

        self.notify(&record);
        Ok(Some(record))
    }

    fn record_alerts(&self, alerts: AlertCollection) {
        let alerts = alerts.into_sorted_vec();
        self.metrics.add_alerts_raised(alerts.len() as u64);
        *self.last_alerts.lock() = alerts;
    }

    fn revert(&self, task: CommitTask, fields: &[(&str, &str)]) {
        let (concepts, semantics) = task.revert();
        self.concept_sets.restore(concepts);
        self.semantic_sets.restore(semantics);
        self.stamps.revert_commit();
        self.metrics.increment_commits_reverted();
        log_event_with_fields(Event::CommitReverted, fields);
    }

    fn notify(&self, record: &CommitRecord) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| {
                listener.handle_commit_notification(record)
            }));
            if let Err(payload) = delivered {
                log_event_with_fields(
                    Event::ListenerFailed,
                    &[
                        ("listener", listener.name()),
                        ("reason", &panic_message(payload.as_ref())),
                    ],
                );
            }
        }
    }

    /// Discards every queued component and finalizes every pending stamp as
    /// cancelled. Returns the cancelled stamp sequences.
    pub fn cancel(&self) -> Vec<u32> {
        let _serial = self.commit_lock.lock();
        let _active = self.registry.begin("cancel");

        let concepts = self.concept_sets.take();
        let semantics = self.semantic_sets.take();
        let canceled = self.stamps.cancel_pending();

        self.metrics.add_stamps_canceled(canceled.len() as u64);
        log_event_with_fields(
            Event::CommitCanceled,
            &[
                ("stamps", &canceled.len().to_string()),
                (
                    "components",
                    &(concepts.to_commit().len() + semantics.to_commit().len()).to_string(),
                ),
            ],
        );
        canceled
    }
}

impl std::fmt::Debug for CommitService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitService")
            .field("checkers", &self.checkers.read().len())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}
