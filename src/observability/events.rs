//! Observable lifecycle events
//!
//! Every line the store logs names one of these events.

use std::fmt;

/// Observable events in termcore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Store lifecycle
    /// Store open begins
    StoreOpen,
    /// Store open complete, ready for use
    StoreReady,
    /// Store shut down
    StoreClosed,
    /// Store metadata missing, nid counter rebuilt from shard files
    NidCounterRecovered,

    // Identifier index
    /// A UUID shard was loaded (from disk or created empty)
    ShardLoaded,
    /// A dirty UUID shard was written to disk
    ShardFlushed,
    /// A UUID was offered a second, different nid and kept its first one
    UuidRemapRejected,

    // Sequence maps and segmented stores
    /// A sequence map was read from disk
    SequenceMapLoaded,
    /// A sequence map was written to disk
    SequenceMapWritten,
    /// Segments of an object store were written
    SegmentsWritten,
    /// Segments of an object store were read
    SegmentsRead,

    // Stamps
    /// An alias walk found a cycle in persisted alias data
    AliasCycleDetected,

    // Commits
    /// Commit finished and produced a record
    CommitComplete,
    /// Commit reverted because a checker raised an ERROR alert
    CommitReverted,
    /// Commit had nothing pending
    CommitNoop,
    /// Pending edits were cancelled
    CommitCanceled,
    /// A commit listener panicked while handling a record
    ListenerFailed,

    // Worker pool
    /// A submitted task failed
    TaskFailed,
    /// Worker pool shut down cleanly
    PoolShutdown,
    /// Worker pool did not terminate within its deadline (FATAL)
    PoolShutdownTimeout,
}

impl Event {
    /// Returns the event name as logged
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::StoreOpen => "STORE_OPEN",
            Event::StoreReady => "STORE_READY",
            Event::StoreClosed => "STORE_CLOSED",
            Event::NidCounterRecovered => "NID_COUNTER_RECOVERED",
            Event::ShardLoaded => "SHARD_LOADED",
            Event::ShardFlushed => "SHARD_FLUSHED",
            Event::UuidRemapRejected => "UUID_REMAP_REJECTED",
            Event::SequenceMapLoaded => "SEQUENCE_MAP_LOADED",
            Event::SequenceMapWritten => "SEQUENCE_MAP_WRITTEN",
            Event::SegmentsWritten => "SEGMENTS_WRITTEN",
            Event::SegmentsRead => "SEGMENTS_READ",
            Event::AliasCycleDetected => "ALIAS_CYCLE_DETECTED",
            Event::CommitComplete => "COMMIT_COMPLETE",
            Event::CommitReverted => "COMMIT_REVERTED",
            Event::CommitNoop => "COMMIT_NOOP",
            Event::CommitCanceled => "COMMIT_CANCELED",
            Event::ListenerFailed => "LISTENER_FAILED",
            Event::TaskFailed => "TASK_FAILED",
            Event::PoolShutdown => "POOL_SHUTDOWN",
            Event::PoolShutdownTimeout => "POOL_SHUTDOWN_TIMEOUT",
        }
    }

    /// Returns true if this event means the process cannot continue safely
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::PoolShutdownTimeout)
    }

    /// Returns true if this event reports a problem
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Event::NidCounterRecovered
                | Event::UuidRemapRejected
                | Event::AliasCycleDetected
                | Event::CommitReverted
        )
    }

    /// Returns true if this event reports a failure
    pub fn is_error(&self) -> bool {
        matches!(self, Event::ListenerFailed | Event::TaskFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
