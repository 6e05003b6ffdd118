// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Compact binary codec.
//!
//! Integers are written as base-128 varints (7 data bits per byte, high bit
//! set on every byte but the last). Signed values go through a zigzag map
//! first so that small negative numbers stay short. Doubles are 8 bytes,
//! IEEE-754, little endian.

use crate::error::{Result, TraceError};
use byteorder::{ByteOrder, LittleEndian};
use std::io::{BufRead, Read, Seek, SeekFrom};

const MAX_VARINT32_BYTES: u32 = 5;
const MAX_VARINT64_BYTES: u32 = 10;

pub fn zigzag_encode32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

pub fn zigzag_decode32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

pub fn zigzag_encode64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

pub fn zigzag_decode64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

/// Growable output buffer. Encoding into memory never fails; the caller
/// decides when the bytes hit the disk.
#[derive(Debug, Default, Clone)]
pub struct CodedBuffer {
    buf: Vec<u8>,
}

impl CodedBuffer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn write_byte(&mut self, b: u8) {
        self.buf.push(b);
    }

    pub fn write_int(&mut self, v: u32) {
        self.write_varint(v as u64);
    }

    pub fn write_sint(&mut self, v: i32) {
        self.write_varint(zigzag_encode32(v) as u64);
    }

    pub fn write_long(&mut self, v: u64) {
        self.write_varint(v);
    }

    pub fn write_slong(&mut self, v: i64) {
        self.write_varint(zigzag_encode64(v));
    }

    pub fn write_double(&mut self, v: f64) {
        let mut raw = [0u8; 8];
        LittleEndian::write_f64(&mut raw, v);
        self.buf.extend_from_slice(&raw);
    }

    /// Length-prefixed raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_int(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_string(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    /// Appends bytes verbatim, without a length prefix.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn write_varint(&mut self, mut v: u64) {
        while v >= 0x80 {
            self.buf.push((v as u8) | 0x80);
            v >>= 7;
        }
        self.buf.push(v as u8);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Decoding side of the codec. Tracks the number of bytes consumed so that
/// readers know the offset of every group they decode.
pub struct CodedInputStream<R> {
    inner: R,
    position: u64,
}

impl<R: BufRead> CodedInputStream<R> {
    pub fn new(inner: R) -> Self {
        Self::at(inner, 0)
    }

    /// Wraps a reader that is already `position` bytes into its stream.
    pub fn at(inner: R, position: u64) -> Self {
        Self { inner, position }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// True when the underlying stream has no more bytes. A clean end of
    /// stream is only legal between values.
    pub fn is_at_end(&mut self) -> Result<bool> {
        Ok(self.inner.fill_buf()?.is_empty())
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.inner.read_exact(&mut b).map_err(TraceError::from_decode)?;
        self.position += 1;
        Ok(b[0])
    }

    pub fn read_int(&mut self) -> Result<u32> {
        let v = self.read_varint(MAX_VARINT32_BYTES)?;
        u32::try_from(v).map_err(|_| TraceError::CorruptStream(format!("varint {} overflows u32", v)))
    }

    pub fn read_sint(&mut self) -> Result<i32> {
        Ok(zigzag_decode32(self.read_int()?))
    }

    pub fn read_long(&mut self) -> Result<u64> {
        self.read_varint(MAX_VARINT64_BYTES)
    }

    pub fn read_slong(&mut self) -> Result<i64> {
        Ok(zigzag_decode64(self.read_long()?))
    }

    pub fn read_double(&mut self) -> Result<f64> {
        let mut raw = [0u8; 8];
        self.read_exact(&mut raw)?;
        Ok(LittleEndian::read_f64(&raw))
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_int()? as u64;
        let mut bytes = Vec::new();
        let n = (&mut self.inner).take(len).read_to_end(&mut bytes)?;
        self.position += n as u64;
        if n as u64 != len {
            return Err(TraceError::CorruptStream(format!(
                "expected {} bytes, stream ended after {}",
                len, n
            )));
        }
        Ok(bytes)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|e| TraceError::CorruptStream(format!("invalid UTF-8: {}", e)))
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf).map_err(TraceError::from_decode)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    fn read_varint(&mut self, max_bytes: u32) -> Result<u64> {
        let mut result: u64 = 0;
        for i in 0..max_bytes {
            let b = self.read_byte()?;
            let shift = 7 * i;
            // The tenth byte of a 64-bit varint only carries one bit.
            if shift == 63 && b > 1 {
                return Err(TraceError::CorruptStream("varint overflows u64".to_string()));
            }
            result |= ((b & 0x7f) as u64) << shift;
            if b & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(TraceError::CorruptStream(format!(
            "varint longer than {} bytes",
            max_bytes
        )))
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: BufRead + Seek> CodedInputStream<R> {
    /// Moves the underlying stream to an absolute byte offset.
    pub fn reposition(&mut self, offset: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        self.position = offset;
        Ok(())
    }
}
