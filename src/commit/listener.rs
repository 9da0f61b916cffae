use super::record::CommitRecord;

/// Receives every commit record, synchronously on the committing thread.
///
/// A listener must not panic; if it does, the panic is logged and the
/// remaining listeners still run.
pub trait CommitListener: Send + Sync {
    fn name(&self) -> &str;

    fn handle_commit_notification(&self, record: &CommitRecord);
}
