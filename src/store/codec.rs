//! Binary encoding helpers shared by every persisted file
//!
//! All integers are big-endian. Strings are UTF-8 with a `u16` byte-length
//! prefix.

use std::io::{self, Read, Write};

use super::errors::{StoreError, StoreResult};

/// A value that can live in a `SegmentedObjectStore`.
pub trait StoreCodec: Sized {
    /// Serialize the value.
    fn encode(&self) -> Vec<u8>;

    /// Deserialize a value previously produced by `encode`.
    fn decode(bytes: &[u8]) -> StoreResult<Self>;
}

impl StoreCodec for Vec<u8> {
    fn encode(&self) -> Vec<u8> {
        self.clone()
    }

    fn decode(bytes: &[u8]) -> StoreResult<Self> {
        Ok(bytes.to_vec())
    }
}

pub fn write_i32<W: Write>(writer: &mut W, value: i32) -> io::Result<()> {
    writer.write_all(&value.to_be_bytes())
}

pub fn write_i64<W: Write>(writer: &mut W, value: i64) -> io::Result<()> {
    writer.write_all(&value.to_be_bytes())
}

pub fn read_i32<R: Read>(reader: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

pub fn read_i64<R: Read>(reader: &mut R) -> io::Result<i64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_be_bytes(buf))
}

/// Writes a length-prefixed UTF-8 string.
pub fn write_utf<W: Write>(writer: &mut W, value: &str) -> io::Result<()> {
    let bytes = value.as_bytes();
    let len = u16::try_from(bytes.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("string of {} bytes exceeds u16 length prefix", bytes.len()),
        )
    })?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(bytes)
}

/// Reads a length-prefixed UTF-8 string.
pub fn read_utf<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut len_buf = [0u8; 2];
    reader.read_exact(&mut len_buf)?;
    let mut bytes = vec![0u8; u16::from_be_bytes(len_buf) as usize];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Reads a non-negative entry count written as `i32`.
pub fn read_count<R: Read>(reader: &mut R, what: &str) -> StoreResult<usize> {
    let count = read_i32(reader)
        .map_err(|e| StoreError::data_corruption(format!("cannot read {} count: {}", what, e)))?;
    usize::try_from(count)
        .map_err(|_| StoreError::data_corruption(format!("negative {} count: {}", what, count)))
}

/// Converts a collection length to the `i32` written on disk.
pub fn count_to_i32(count: usize, what: &str) -> StoreResult<i32> {
    i32::try_from(count).map_err(|_| {
        StoreError::write_failed_no_source(format!("{} count {} exceeds i32", what, count))
    })
}
