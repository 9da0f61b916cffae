//! Commit records

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable summary of one successful commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    commit_time: DateTime<Utc>,
    stamp_sequences: BTreeSet<u32>,
    concept_sequences: BTreeSet<u32>,
    semantic_sequences: BTreeSet<u32>,
    comment: Option<String>,
}

impl CommitRecord {
    pub fn new(
        commit_time: DateTime<Utc>,
        stamp_sequences: BTreeSet<u32>,
        concept_sequences: BTreeSet<u32>,
        semantic_sequences: BTreeSet<u32>,
        comment: Option<String>,
    ) -> Self {
        Self {
            commit_time,
            stamp_sequences,
            concept_sequences,
            semantic_sequences,
            comment,
        }
    }

    pub fn commit_time(&self) -> DateTime<Utc> {
        self.commit_time
    }

    /// Commit time as written into every stamp of the commit.
    pub fn commit_millis(&self) -> i64 {
        self.commit_time.timestamp_millis()
    }

    pub fn stamp_sequences(&self) -> &BTreeSet<u32> {
        &self.stamp_sequences
    }

    pub fn concept_sequences(&self) -> &BTreeSet<u32> {
        &self.concept_sequences
    }

    pub fn semantic_sequences(&self) -> &BTreeSet<u32> {
        &self.semantic_sequences
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let record = CommitRecord::new(
            Utc::now(),
            BTreeSet::from([0]),
            BTreeSet::from([0, 1]),
            BTreeSet::new(),
            Some("init".to_string()),
        );
        let value: serde_json::Value = serde_json::from_str(&record.to_json()).unwrap();
        assert_eq!(value["stamp_sequences"], serde_json::json!([0]));
        assert_eq!(value["concept_sequences"], serde_json::json!([0, 1]));
        assert_eq!(value["comment"], "init");
    }
}
