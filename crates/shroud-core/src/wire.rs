//! Big-endian, length-prefixed wire codec
//!
//! Every Shroud message is built from the same handful of primitives:
//! signed 32-bit integers, single-byte booleans, `i32`-length byte strings
//! and `u16`-length UTF-8 strings. A length of `-1` marks an absent value.

use crate::error::{Error, Result};

/// Sentinel length for an absent byte string or list
pub const ABSENT: i32 = -1;

/// Growable output buffer
#[derive(Debug, Default, Clone)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a non-negative count or identifier as `i32`
    pub fn write_len(&mut self, len: usize) {
        debug_assert!(len <= i32::MAX as usize);
        self.write_i32(len as i32);
    }

    /// Write raw bytes with no length prefix
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write `i32 len` followed by the bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_len(bytes.len());
        self.write_raw(bytes);
    }

    /// Write `-1` for `None`, otherwise a length-prefixed byte string
    pub fn write_optional_bytes(&mut self, bytes: Option<&[u8]>) {
        match bytes {
            Some(bytes) => self.write_bytes(bytes),
            None => self.write_i32(ABSENT),
        }
    }

    /// Write a `u16`-length UTF-8 string
    pub fn write_utf(&mut self, value: &str) -> Result<()> {
        let len = u16::try_from(value.len())
            .map_err(|_| Error::Serialization(format!("string of {} bytes too long", value.len())))?;
        self.write_u16(len);
        self.write_raw(value.as_bytes());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over an input buffer
///
/// Reads never panic: short input yields [`Error::Truncated`].
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn read_raw(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Error::Truncated {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let out = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_raw(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::Serialization(format!("invalid boolean byte {other}"))),
        }
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    /// Read a non-negative `i32` (counts, identifiers)
    pub fn read_u32(&mut self) -> Result<u32> {
        let value = self.read_i32()?;
        u32::try_from(value).map_err(|_| Error::Serialization(format!("negative value {value}")))
    }

    /// Read an optional length: `-1` is `None`, other negatives are rejected
    pub fn read_len(&mut self) -> Result<Option<usize>> {
        match self.read_i32()? {
            ABSENT => Ok(None),
            len if len < 0 => Err(Error::Serialization(format!("invalid length {len}"))),
            len => Ok(Some(len as usize)),
        }
    }

    /// Read a mandatory length
    pub fn read_required_len(&mut self) -> Result<usize> {
        self.read_len()?
            .ok_or_else(|| Error::Serialization("unexpected absent length".into()))
    }

    /// Read an element count, bounded by the bytes left so a hostile count
    /// cannot force a large allocation
    pub fn read_count(&mut self, min_item_size: usize) -> Result<Option<usize>> {
        let count = self.read_len()?;
        if let Some(count) = count {
            let needed = count.saturating_mul(min_item_size.max(1));
            if needed > self.remaining() {
                return Err(Error::Truncated {
                    needed,
                    remaining: self.remaining(),
                });
            }
        }
        Ok(count)
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_required_len()?;
        Ok(self.read_raw(len)?.to_vec())
    }

    pub fn read_optional_bytes(&mut self) -> Result<Option<Vec<u8>>> {
        match self.read_len()? {
            Some(len) => Ok(Some(self.read_raw(len)?.to_vec())),
            None => Ok(None),
        }
    }

    pub fn read_utf(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        let raw = self.read_raw(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| Error::Serialization(format!("invalid UTF-8: {e}")))
    }

    /// Fail if any input is left over
    pub fn finish(&self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Serialization(format!(
                "{} trailing bytes",
                self.remaining()
            )))
        }
    }
}
