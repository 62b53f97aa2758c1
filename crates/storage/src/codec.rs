//! Binary encoding for spilled rows.
//!
//! Layout of one spilled tuple, all integers little-endian:
//!
//! ```text
//! hash: u32 | column count: u16 | per column: tag u8, payload
//! ```
//!
//! Payloads: Boolean 1 byte, Int32 4 bytes, Int64 8 bytes, Float64 8 bytes
//! (IEEE bits), String and Bytes a u32 length followed by the data. NULL has
//! no payload.

use alloc::string::String;
use alloc::vec::Vec;
use strata_core::{Error, Result, Row, Value};

mod tag {
    pub const NULL: u8 = 0;
    pub const BOOLEAN: u8 = 1;
    pub const INT32: u8 = 2;
    pub const INT64: u8 = 3;
    pub const FLOAT64: u8 = 4;
    pub const STRING: u8 = 5;
    pub const BYTES: u8 = 6;
}

/// Appends the encoding of `(hash, row)` to `buf`, returning the bytes written.
pub fn encode_tuple(hash: u32, row: &Row, buf: &mut Vec<u8>) -> Result<usize> {
    let start = buf.len();
    let columns = u16::try_from(row.len())
        .map_err(|_| Error::storage("row has too many columns to spill"))?;
    buf.extend_from_slice(&hash.to_le_bytes());
    buf.extend_from_slice(&columns.to_le_bytes());
    for value in row.values() {
        encode_value(value, buf)?;
    }
    Ok(buf.len() - start)
}

fn encode_value(value: &Value, buf: &mut Vec<u8>) -> Result<()> {
    match value {
        Value::Null => buf.push(tag::NULL),
        Value::Boolean(b) => {
            buf.push(tag::BOOLEAN);
            buf.push(*b as u8);
        }
        Value::Int32(i) => {
            buf.push(tag::INT32);
            buf.extend_from_slice(&i.to_le_bytes());
        }
        Value::Int64(i) => {
            buf.push(tag::INT64);
            buf.extend_from_slice(&i.to_le_bytes());
        }
        Value::Float64(f) => {
            buf.push(tag::FLOAT64);
            buf.extend_from_slice(&f.to_bits().to_le_bytes());
        }
        Value::String(s) => {
            buf.push(tag::STRING);
            encode_var(s.as_bytes(), buf)?;
        }
        Value::Bytes(b) => {
            buf.push(tag::BYTES);
            encode_var(b, buf)?;
        }
    }
    Ok(())
}

fn encode_var(data: &[u8], buf: &mut Vec<u8>) -> Result<()> {
    let len = u32::try_from(data.len()).map_err(|_| Error::storage("value too large to spill"))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(data);
    Ok(())
}

/// Sequential reader over encoded tuples.
pub struct TupleDecoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> TupleDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Returns true once every byte has been consumed.
    pub fn is_done(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Decodes the next `(hash, row)` pair.
    pub fn next_tuple(&mut self) -> Result<(u32, Row)> {
        let hash = u32::from_le_bytes(self.take_array()?);
        let columns = u16::from_le_bytes(self.take_array()?) as usize;
        let mut values = Vec::with_capacity(columns);
        for _ in 0..columns {
            values.push(self.next_value()?);
        }
        Ok((hash, Row::new(values)))
    }

    fn next_value(&mut self) -> Result<Value> {
        let [code] = self.take_array::<1>()?;
        Ok(match code {
            tag::NULL => Value::Null,
            tag::BOOLEAN => {
                let [b] = self.take_array::<1>()?;
                Value::Boolean(b != 0)
            }
            tag::INT32 => Value::Int32(i32::from_le_bytes(self.take_array()?)),
            tag::INT64 => Value::Int64(i64::from_le_bytes(self.take_array()?)),
            tag::FLOAT64 => Value::Float64(f64::from_bits(u64::from_le_bytes(self.take_array()?))),
            tag::STRING => {
                let bytes = self.take_var()?;
                let s = String::from_utf8(bytes.to_vec())
                    .map_err(|_| Error::storage("spilled string is not valid UTF-8"))?;
                Value::String(s)
            }
            tag::BYTES => Value::Bytes(self.take_var()?.to_vec()),
            other => {
                return Err(Error::storage(alloc::format!(
                    "unknown spilled value tag {}",
                    other
                )))
            }
        })
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| Error::storage("truncated spill data"))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn take_var(&mut self) -> Result<&'a [u8]> {
        let len = u32::from_le_bytes(self.take_array()?) as usize;
        self.take(len)
    }
}
