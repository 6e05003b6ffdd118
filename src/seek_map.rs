// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Time to byte-offset side index.
//!
//! # File Format
//! ```text
//! [Magic "DSEK": 4][Version: u32 LE][Body][CRC64(Body): u64 LE]
//! ```
//! The body is codec encoded: start offset, entry count, then the entries
//! delta encoded (first time zigzag, every later field as an unsigned delta).

use crate::codec::{CodedBuffer, CodedInputStream};
use crate::config::{FORMAT_VERSION, SEEK_MAP_MAGIC};
use crate::error::{Result, TraceError};
use crate::Time;
use byteorder::{ByteOrder, LittleEndian};
use crc64fast::Digest;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

const HEADER_SIZE: usize = 8;
const TRAILER_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekEntry {
    pub time: Time,
    pub offset: u64,
}

/// Sorted (time, offset) pairs, strictly increasing in both fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeekMap {
    start: u64,
    entries: Vec<SeekEntry>,
}

impl SeekMap {
    /// `start` is the offset returned for times before the first entry.
    pub fn new(start: u64) -> Self {
        Self {
            start,
            entries: Vec::new(),
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub(crate) fn set_start(&mut self, start: u64) {
        debug_assert!(self.entries.is_empty(), "start moved after entries were recorded");
        self.start = start;
    }

    /// Records an entry. Callers guarantee that both `time` and `offset`
    /// grow strictly; a violation would silently break floor lookups.
    pub fn append(&mut self, time: Time, offset: u64) {
        if let Some(last) = self.entries.last() {
            debug_assert!(
                time > last.time && offset > last.offset,
                "seek entries must increase: ({}, {}) after ({}, {})",
                time,
                offset,
                last.time,
                last.offset
            );
        }
        self.entries.push(SeekEntry { time, offset });
    }

    /// Greatest entry with `entry.time <= time`.
    pub fn floor(&self, time: Time) -> Option<SeekEntry> {
        let idx = self.entries.partition_point(|e| e.time <= time);
        if idx == 0 {
            None
        } else {
            Some(self.entries[idx - 1])
        }
    }

    pub fn get_offset(&self, time: Time) -> u64 {
        self.floor(time).map(|e| e.offset).unwrap_or(self.start)
    }

    pub fn entries(&self) -> &[SeekEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<SeekEntry> {
        self.entries.last().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = CodedBuffer::with_capacity(16 + self.entries.len() * 4);
        body.write_long(self.start);
        body.write_int(self.entries.len() as u32);
        let mut prev: Option<SeekEntry> = None;
        for e in &self.entries {
            match prev {
                None => {
                    body.write_slong(e.time);
                    body.write_long(e.offset - self.start);
                }
                Some(p) => {
                    // Strictly increasing, so the true delta always fits a u64.
                    body.write_long(e.time.wrapping_sub(p.time) as u64);
                    body.write_long(e.offset - p.offset);
                }
            }
            prev = Some(*e);
        }

        let mut digest = Digest::new();
        digest.write(body.as_bytes());
        let checksum = digest.sum64();

        let mut out = Vec::with_capacity(HEADER_SIZE + body.len() + TRAILER_SIZE);
        out.extend_from_slice(&SEEK_MAP_MAGIC);
        let mut word = [0u8; 8];
        LittleEndian::write_u32(&mut word[..4], FORMAT_VERSION);
        out.extend_from_slice(&word[..4]);
        out.extend_from_slice(body.as_bytes());
        LittleEndian::write_u64(&mut word, checksum);
        out.extend_from_slice(&word);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE + TRAILER_SIZE {
            return Err(TraceError::CorruptStream(format!(
                "seek map too short: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0..4] != SEEK_MAP_MAGIC {
            return Err(TraceError::InvalidMagic);
        }
        let version = LittleEndian::read_u32(&bytes[4..8]);
        if version != FORMAT_VERSION {
            return Err(TraceError::UnsupportedVersion(version));
        }

        let body = &bytes[HEADER_SIZE..bytes.len() - TRAILER_SIZE];
        let expected = LittleEndian::read_u64(&bytes[bytes.len() - TRAILER_SIZE..]);
        let mut digest = Digest::new();
        digest.write(body);
        let found = digest.sum64();
        if found != expected {
            return Err(TraceError::ChecksumMismatch { expected, found });
        }

        let mut input = CodedInputStream::new(body);
        let start = input.read_long()?;
        let n = input.read_int()? as usize;
        let mut map = SeekMap::new(start);
        map.entries.reserve(n.min(body.len()));
        for i in 0..n {
            let entry = if i == 0 {
                let time = input.read_slong()?;
                let offset = start
                    .checked_add(input.read_long()?)
                    .ok_or_else(|| TraceError::CorruptStream("seek offset overflow".to_string()))?;
                SeekEntry { time, offset }
            } else {
                let prev = map.entries[i - 1];
                let dt = input.read_long()?;
                let doff = input.read_long()?;
                if dt == 0 || doff == 0 {
                    return Err(TraceError::CorruptStream(format!(
                        "seek entry {} does not increase",
                        i
                    )));
                }
                SeekEntry {
                    time: prev.time.wrapping_add(dt as i64),
                    offset: prev.offset.wrapping_add(doff),
                }
            };
            map.entries.push(entry);
        }
        if !input.is_at_end()? {
            return Err(TraceError::CorruptStream("trailing bytes after seek map".to_string()));
        }
        Ok(map)
    }

    pub fn write_to(&self, path: impl AsRef<Path>, sync: bool) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(&self.to_bytes())?;
        if sync {
            file.sync_data()?;
        }
        Ok(())
    }

    /// Loads the whole map into memory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SeekMap {
        let mut map = SeekMap::new(8);
        map.append(10, 8);
        map.append(20, 40);
        map.append(35, 90);
        map
    }

    #[test]
    fn test_floor_semantics() {
        let map = sample();
        assert_eq!(map.get_offset(-5), 8);
        assert_eq!(map.floor(9), None);
        assert_eq!(map.get_offset(10), 8);
        assert_eq!(map.get_offset(19), 8);
        assert_eq!(map.get_offset(20), 40);
        assert_eq!(map.get_offset(34), 40);
        assert_eq!(map.get_offset(35), 90);
        assert_eq!(map.get_offset(i64::MAX), 90);
    }

    #[test]
    fn test_empty_map_returns_start() {
        let map = SeekMap::new(123);
        assert_eq!(map.get_offset(0), 123);
        assert!(map.floor(i64::MAX).is_none());
    }

    #[test]
    fn test_persisted_map_reloads() {
        let mut map = SeekMap::new(8);
        map.append(-100, 8);
        map.append(5, 17);
        map.append(i64::MAX / 2, 1 << 40);
        let decoded = SeekMap::from_bytes(&map.to_bytes()).unwrap();
        assert_eq!(decoded, map);

        let mut wide = SeekMap::new(8);
        wide.append(i64::MIN + 1, 8);
        wide.append(0, 20);
        wide.append(i64::MAX, 33);
        let decoded = SeekMap::from_bytes(&wide.to_bytes()).unwrap();
        assert_eq!(decoded, wide);

        let mut widest = SeekMap::new(8);
        widest.append(i64::MIN + 1, 8);
        widest.append(i64::MAX, 20);
        let decoded = SeekMap::from_bytes(&widest.to_bytes()).unwrap();
        assert_eq!(decoded, widest);
        assert_eq!(decoded.get_offset(i64::MAX - 1), 8);
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let mut bytes = sample().to_bytes();
        bytes[HEADER_SIZE] ^= 0xFF;
        assert!(matches!(
            SeekMap::from_bytes(&bytes),
            Err(TraceError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = sample().to_bytes();
        bytes[0..4].copy_from_slice(b"BADM");
        assert!(matches!(SeekMap::from_bytes(&bytes), Err(TraceError::InvalidMagic)));
    }
}
