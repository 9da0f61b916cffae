//! The STAMP value
//!
//! A stamp records the provenance of one state change:
//! `(status, time, author, module, path)`. Author, module and path are
//! concept sequences and are never 0. Time is epoch milliseconds, or one of
//! two sentinels: `UNCOMMITTED_TIME` while the change is pending and
//! `CANCELED_TIME` once it was discarded.
//!
//! Encoded form (21 bytes): `u8 status | i64 time | i32 author | i32 module |
//! i32 path`.

use std::cmp::Ordering;
use std::fmt;
use std::io::Cursor;

use serde::{Deserialize, Serialize};

use super::status::Status;
use crate::store::codec::{read_i32, read_i64, StoreCodec};
use crate::store::{StoreError, StoreResult};

/// Time carried by a stamp that has not been committed.
pub const UNCOMMITTED_TIME: i64 = i64::MAX;

/// Time carried by a stamp whose pending change was cancelled.
pub const CANCELED_TIME: i64 = i64::MIN;

/// Encoded length of a stamp.
pub const ENCODED_LEN: usize = 21;

/// The part of a stamp that identifies a pending change: everything but time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StampKey {
    pub status: Status,
    pub author: u32,
    pub module: u32,
    pub path: u32,
}

impl StampKey {
    pub fn new(status: Status, author: u32, module: u32, path: u32) -> Self {
        Self {
            status,
            author,
            module,
            path,
        }
    }

    /// Builds the stamp this key produces at `time`.
    pub fn at(&self, time: i64) -> Stamp {
        Stamp::new(self.status, time, self.author, self.module, self.path)
    }
}

/// Largest author, module or path sequence; fields are stored as `i32`.
pub const MAX_FIELD_SEQUENCE: u32 = i32::MAX as u32;

fn check_field(name: &str, value: u32) {
    assert!(value > 0, "stamp {} sequence must be positive", name);
    assert!(
        value <= MAX_FIELD_SEQUENCE,
        "stamp {} sequence {} exceeds {}",
        name,
        value,
        MAX_FIELD_SEQUENCE
    );
}

/// An immutable provenance tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stamp {
    status: Status,
    time: i64,
    author: u32,
    module: u32,
    path: u32,
}

impl Stamp {
    /// # Panics
    ///
    /// Panics if `time` is 0 or any of `author`, `module`, `path` is outside
    /// `1..=MAX_FIELD_SEQUENCE`.
    pub fn new(status: Status, time: i64, author: u32, module: u32, path: u32) -> Self {
        assert!(time != 0, "stamp time must not be 0");
        check_field("author", author);
        check_field("module", module);
        check_field("path", path);
        Self {
            status,
            time,
            author,
            module,
            path,
        }
    }

    pub fn uncommitted(status: Status, author: u32, module: u32, path: u32) -> Self {
        Self::new(status, UNCOMMITTED_TIME, author, module, path)
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn author(&self) -> u32 {
        self.author
    }

    pub fn module(&self) -> u32 {
        self.module
    }

    pub fn path(&self) -> u32 {
        self.path
    }

    pub fn key(&self) -> StampKey {
        StampKey::new(self.status, self.author, self.module, self.path)
    }

    pub fn is_uncommitted(&self) -> bool {
        self.time == UNCOMMITTED_TIME
    }

    pub fn is_canceled(&self) -> bool {
        self.time == CANCELED_TIME
    }
}

impl Ord for Stamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.status.cmp(&other.status))
            .then_with(|| self.author.cmp(&other.author))
            .then_with(|| self.module.cmp(&other.module))
            .then_with(|| self.path.cmp(&other.path))
    }
}

impl PartialOrd for Stamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let time = match self.time {
            UNCOMMITTED_TIME => "uncommitted".to_string(),
            CANCELED_TIME => "canceled".to_string(),
            millis => match chrono::DateTime::from_timestamp_millis(millis) {
                Some(instant) => instant.to_rfc3339(),
                None => millis.to_string(),
            },
        };
        write!(
            f,
            "[{} {} a:{} m:{} p:{}]",
            self.status, time, self.author, self.module, self.path
        )
    }
}

impl StoreCodec for Stamp {
    fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(ENCODED_LEN);
        bytes.push(self.status.as_byte());
        bytes.extend_from_slice(&self.time.to_be_bytes());
        bytes.extend_from_slice(&(self.author as i32).to_be_bytes());
        bytes.extend_from_slice(&(self.module as i32).to_be_bytes());
        bytes.extend_from_slice(&(self.path as i32).to_be_bytes());
        bytes
    }

    fn decode(bytes: &[u8]) -> StoreResult<Self> {
        if bytes.len() != ENCODED_LEN {
            return Err(StoreError::data_corruption(format!(
                "stamp must be {} bytes, got {}",
                ENCODED_LEN,
                bytes.len()
            )));
        }
        let status = Status::from_byte(bytes[0]).ok_or_else(|| {
            StoreError::data_corruption(format!("unknown stamp status byte {}", bytes[0]))
        })?;

        let mut cursor = Cursor::new(&bytes[1..]);
        let fields = (|| -> std::io::Result<_> {
            Ok((
                read_i64(&mut cursor)?,
                read_i32(&mut cursor)?,
                read_i32(&mut cursor)?,
                read_i32(&mut cursor)?,
            ))
        })();
        let (time, author, module, path) = fields
            .map_err(|e| StoreError::data_corruption(format!("truncated stamp: {}", e)))?;

        if time == 0 || author <= 0 || module <= 0 || path <= 0 {
            return Err(StoreError::data_corruption(format!(
                "invalid stamp fields: time={} author={} module={} path={}",
                time, author, module, path
            )));
        }
        Ok(Self {
            status,
            time,
            author: author as u32,
            module: module as u32,
            path: path as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_stamp() {
        let stamp = Stamp::new(Status::Active, 1_000, 5, 6, 7);
        assert_eq!(stamp.status(), Status::Active);
        assert_eq!(stamp.time(), 1_000);
        assert!(!stamp.is_uncommitted());
    }

    #[test]
    #[should_panic(expected = "time must not be 0")]
    fn test_zero_time_panics() {
        Stamp::new(Status::Active, 0, 5, 6, 7);
    }

    #[test]
    #[should_panic(expected = "author sequence must be positive")]
    fn test_zero_author_panics() {
        Stamp::new(Status::Active, 1, 0, 6, 7);
    }

    #[test]
    #[should_panic(expected = "path sequence must be positive")]
    fn test_zero_path_panics() {
        Stamp::new(Status::Active, 1, 5, 6, 0);
    }

    #[test]
    #[should_panic(expected = "stamp author sequence 2147483648 exceeds 2147483647")]
    fn test_author_beyond_i32_panics() {
        Stamp::new(Status::Active, 1_000, MAX_FIELD_SEQUENCE + 1, 6, 7);
    }

    #[test]
    #[should_panic(expected = "stamp module sequence 4294967295 exceeds")]
    fn test_module_beyond_i32_panics() {
        Stamp::new(Status::Active, 1_000, 5, u32::MAX, 7);
    }

    #[test]
    #[should_panic(expected = "stamp path sequence 2147483648 exceeds")]
    fn test_uncommitted_path_beyond_i32_panics() {
        Stamp::uncommitted(Status::Active, 5, 6, MAX_FIELD_SEQUENCE + 1);
    }

    #[test]
    fn test_largest_fields_survive_encoding() {
        let stamp = Stamp::new(
            Status::Active,
            1_000,
            MAX_FIELD_SEQUENCE,
            MAX_FIELD_SEQUENCE,
            MAX_FIELD_SEQUENCE,
        );
        assert_eq!(Stamp::decode(&stamp.encode()).unwrap(), stamp);
    }

    #[test]
    fn test_order_is_time_then_status_then_sequences() {
        let early = Stamp::new(Status::Primordial, 10, 9, 9, 9);
        let late = Stamp::new(Status::Inactive, 20, 1, 1, 1);
        assert!(early < late);

        let inactive = Stamp::new(Status::Inactive, 10, 9, 9, 9);
        let active = Stamp::new(Status::Active, 10, 1, 1, 1);
        assert!(inactive < active);

        let a = Stamp::new(Status::Active, 10, 1, 2, 3);
        let b = Stamp::new(Status::Active, 10, 1, 2, 4);
        assert!(a < b);
        assert_eq!(a.cmp(&a), Ordering::Equal);
    }

    #[test]
    fn test_uncommitted_sorts_after_committed() {
        let committed = Stamp::new(Status::Active, 1_700_000_000_000, 5, 6, 7);
        let pending = Stamp::uncommitted(Status::Active, 5, 6, 7);
        assert!(pending.is_uncommitted());
        assert!(committed < pending);
    }

    #[test]
    fn test_encoding_is_fixed_width() {
        let stamp = Stamp::new(Status::Active, 1_234, 5, 6, 7);
        let bytes = stamp.encode();
        assert_eq!(bytes.len(), ENCODED_LEN);
        assert_eq!(Stamp::decode(&bytes).unwrap(), stamp);
    }

    #[test]
    fn test_decode_rejects_invalid_fields() {
        let mut bytes = Stamp::new(Status::Active, 1_234, 5, 6, 7).encode();
        bytes[13..17].copy_from_slice(&0i32.to_be_bytes());
        assert!(Stamp::decode(&bytes).is_err());
        assert!(Stamp::decode(&bytes[..10]).is_err());
    }

    #[test]
    fn test_key_rebuilds_stamp() {
        let key = StampKey::new(Status::Inactive, 1, 2, 3);
        let stamp = key.at(99);
        assert_eq!(stamp.key(), key);
        assert_eq!(stamp.time(), 99);
    }
}
