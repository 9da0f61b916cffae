use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status carried by a stamp.
///
/// Declaration order is the comparison order used when two stamps share a
/// commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Inactive,
    Active,
    Primordial,
    Canceled,
}

impl Status {
    /// Byte written to disk.
    pub fn as_byte(&self) -> u8 {
        match self {
            Status::Inactive => 0,
            Status::Active => 1,
            Status::Primordial => 2,
            Status::Canceled => 3,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Status::Inactive),
            1 => Some(Status::Active),
            2 => Some(Status::Primordial),
            3 => Some(Status::Canceled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Inactive => "INACTIVE",
            Status::Active => "ACTIVE",
            Status::Primordial => "PRIMORDIAL",
            Status::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
