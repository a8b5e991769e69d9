//! Payload decoders registered in the default [`Registry`](crate::registry::Registry).
//!
//! Every decoder is a plain function reading through a [`PayloadReader`],
//! which records each named field with its absolute byte range.

pub mod fragments;
pub mod metadata;
pub mod movie;
pub mod random_access;
pub mod sample_tables;

use crate::boxes::{BoxHeader, FourCC};
use crate::payload::{Detail, Field, FieldValue, ParsedPayload};
use crate::source::ByteSource;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

pub(crate) struct PayloadReader {
    cur: Cursor<Vec<u8>>,
    base: u64,
    fields: Vec<Field>,
}

impl PayloadReader {
    pub fn new(hdr: &BoxHeader, src: &dyn ByteSource) -> anyhow::Result<Self> {
        let buf = src.read(hdr.payload.start, hdr.payload_len())?;
        Ok(Self::from_bytes(buf, hdr.payload.start))
    }

    /// Reader over at most the first `limit` payload bytes.
    pub fn prefix(hdr: &BoxHeader, src: &dyn ByteSource, limit: u64) -> anyhow::Result<Self> {
        let buf = src.read(hdr.payload.start, hdr.payload_len().min(limit))?;
        Ok(Self::from_bytes(buf, hdr.payload.start))
    }

    pub fn from_bytes(buf: Vec<u8>, base: u64) -> Self {
        Self {
            cur: Cursor::new(buf),
            base,
            fields: Vec::new(),
        }
    }

    /// Absolute source offset of the next unread byte.
    pub fn offset(&self) -> u64 {
        self.base + self.cur.position()
    }

    pub fn remaining(&self) -> u64 {
        (self.cur.get_ref().len() as u64).saturating_sub(self.cur.position())
    }

    pub fn skip(&mut self, n: u64) -> anyhow::Result<()> {
        if n > self.remaining() {
            anyhow::bail!(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
        }
        self.cur.set_position(self.cur.position() + n);
        Ok(())
    }

    pub fn push(&mut self, name: &str, value: impl Into<FieldValue>, start: u64) {
        let end = self.offset();
        self.fields.push(Field::new(name, value, Some(start..end)));
    }

    pub fn push_derived(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.fields.push(Field::new(name, value, None));
    }

    // Unrecorded reads, for table rows.

    pub fn read_u8(&mut self) -> anyhow::Result<u8> {
        Ok(self.cur.read_u8()?)
    }

    pub fn read_u16(&mut self) -> anyhow::Result<u16> {
        Ok(self.cur.read_u16::<BigEndian>()?)
    }

    pub fn read_i16(&mut self) -> anyhow::Result<i16> {
        Ok(self.cur.read_i16::<BigEndian>()?)
    }

    pub fn read_u24(&mut self) -> anyhow::Result<u32> {
        Ok(self.cur.read_u24::<BigEndian>()?)
    }

    pub fn read_u32(&mut self) -> anyhow::Result<u32> {
        Ok(self.cur.read_u32::<BigEndian>()?)
    }

    pub fn read_i32(&mut self) -> anyhow::Result<i32> {
        Ok(self.cur.read_i32::<BigEndian>()?)
    }

    pub fn read_u64(&mut self) -> anyhow::Result<u64> {
        Ok(self.cur.read_u64::<BigEndian>()?)
    }

    pub fn read_i64(&mut self) -> anyhow::Result<i64> {
        Ok(self.cur.read_i64::<BigEndian>()?)
    }

    pub fn read_fourcc(&mut self) -> anyhow::Result<FourCC> {
        let mut b = [0u8; 4];
        self.cur.read_exact(&mut b)?;
        Ok(FourCC(b))
    }

    pub fn read_bytes(&mut self, n: u64) -> anyhow::Result<Vec<u8>> {
        if n > self.remaining() {
            anyhow::bail!(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
        }
        let mut v = vec![0u8; n as usize];
        self.cur.read_exact(&mut v)?;
        Ok(v)
    }

    pub fn read_to_end(&mut self) -> Vec<u8> {
        let mut v = Vec::new();
        // Cursor reads are infallible.
        let _ = self.cur.read_to_end(&mut v);
        v
    }

    /// Unsigned value stored in 4 or 8 bytes depending on the box version.
    pub fn read_versioned(&mut self, version: u8) -> anyhow::Result<u64> {
        if version == 1 {
            self.read_u64()
        } else {
            Ok(self.read_u32()? as u64)
        }
    }

    // Recorded reads.

    pub fn u8(&mut self, name: &str) -> anyhow::Result<u8> {
        let start = self.offset();
        let v = self.read_u8()?;
        self.push(name, v, start);
        Ok(v)
    }

    pub fn u16(&mut self, name: &str) -> anyhow::Result<u16> {
        let start = self.offset();
        let v = self.read_u16()?;
        self.push(name, v, start);
        Ok(v)
    }

    pub fn u32(&mut self, name: &str) -> anyhow::Result<u32> {
        let start = self.offset();
        let v = self.read_u32()?;
        self.push(name, v, start);
        Ok(v)
    }

    pub fn i32(&mut self, name: &str) -> anyhow::Result<i32> {
        let start = self.offset();
        let v = self.read_i32()?;
        self.push(name, v, start);
        Ok(v)
    }

    pub fn u64(&mut self, name: &str) -> anyhow::Result<u64> {
        let start = self.offset();
        let v = self.read_u64()?;
        self.push(name, v, start);
        Ok(v)
    }

    pub fn versioned(&mut self, name: &str, version: u8) -> anyhow::Result<u64> {
        let start = self.offset();
        let v = self.read_versioned(version)?;
        self.push(name, v, start);
        Ok(v)
    }

    pub fn fourcc(&mut self, name: &str) -> anyhow::Result<FourCC> {
        let start = self.offset();
        let v = self.read_fourcc()?;
        self.push(name, v, start);
        Ok(v)
    }

    /// Version byte and 24-bit flags of a FullBox.
    pub fn full_box(&mut self) -> anyhow::Result<(u8, u32)> {
        let version = self.u8("version")?;
        let start = self.offset();
        let flags = self.read_u24()?;
        self.push("flags", format!("0x{:06x}", flags), start);
        Ok((version, flags))
    }

    pub fn finish(self, detail: Detail) -> ParsedPayload {
        ParsedPayload::new(self.fields, detail)
    }

    pub fn finish_fields(self) -> ParsedPayload {
        ParsedPayload {
            fields: self.fields,
            detail: None,
        }
    }
}

/// Fixed-point 16.16 to float.
pub(crate) fn fixed_16_16(v: u32) -> f64 {
    (v as i32) as f64 / 65536.0
}

pub(crate) fn fixed_8_8(v: u16) -> f64 {
    (v as i16) as f64 / 256.0
}

/// Packed ISO-639-2/T language code.
pub(crate) fn lang_from_u16(code: u16) -> String {
    if code == 0 {
        return "und".to_string();
    }
    let c1 = ((code >> 10) & 0x1F) as u8 + 0x60;
    let c2 = ((code >> 5) & 0x1F) as u8 + 0x60;
    let c3 = (code & 0x1F) as u8 + 0x60;
    format!("{}{}{}", c1 as char, c2 as char, c3 as char)
}

/// Null-terminated (or unterminated) UTF-8 string.
pub(crate) fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
