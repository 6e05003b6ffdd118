// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Framed group streams.
//!
//! # File Format
//! ```text
//! [Magic "DITL": 4][Version: u32 LE][Prelude?][Group][Group]...
//! ```
//! A group is `[time: slong][count: uint][item]*count`. The optional
//! prelude is one group written before anything else (the initial state of
//! a stateful trace); the seek map's start offset points just past it.
//!
//! Several physical groups may share a timestamp (a `flush(t)` followed by
//! more items queued at `t`). Readers merge them back into one logical
//! group, so callers always see strictly increasing times.

use crate::codec::{CodedBuffer, CodedInputStream};
use crate::config::{FORMAT_VERSION, STREAM_HEADER_SIZE, STREAM_MAGIC};
use crate::error::{Result, TraceError};
use crate::item::Item;
use crate::seek_map::SeekMap;
use crate::Time;
use byteorder::{ByteOrder, LittleEndian};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

pub(crate) fn encode_group<'a, I: Item + 'a>(
    time: Time,
    items: impl IntoIterator<Item = &'a I>,
) -> CodedBuffer {
    let mut body = CodedBuffer::new();
    let mut count: u32 = 0;
    for item in items {
        item.write_to(&mut body);
        count += 1;
    }
    let mut group = CodedBuffer::with_capacity(body.len() + 15);
    group.write_slong(time);
    group.write_int(count);
    group.write_raw(body.as_bytes());
    group
}

fn read_stream_header<R: Read>(reader: &mut R) -> Result<()> {
    let mut buf = [0u8; STREAM_HEADER_SIZE as usize];
    reader.read_exact(&mut buf).map_err(TraceError::from_decode)?;
    if buf[0..4] != STREAM_MAGIC {
        return Err(TraceError::InvalidMagic);
    }
    let version = LittleEndian::read_u32(&buf[4..8]);
    if version != FORMAT_VERSION {
        return Err(TraceError::UnsupportedVersion(version));
    }
    Ok(())
}

/// Appends groups to a stream and indexes the first group of every Nth
/// distinct timestamp.
pub struct GroupWriter {
    out: BufWriter<File>,
    offset: u64,
    seek_map: SeekMap,
    seek_interval: u32,
    distinct_times: u64,
    last_time: Option<Time>,
    groups: u64,
}

impl GroupWriter {
    pub fn create(path: impl AsRef<Path>, seek_interval: u32) -> Result<Self> {
        let file = File::create(path)?;
        let mut out = BufWriter::new(file);
        let mut header = [0u8; STREAM_HEADER_SIZE as usize];
        header[0..4].copy_from_slice(&STREAM_MAGIC);
        LittleEndian::write_u32(&mut header[4..8], FORMAT_VERSION);
        out.write_all(&header)?;

        Ok(Self {
            out,
            offset: STREAM_HEADER_SIZE,
            seek_map: SeekMap::new(STREAM_HEADER_SIZE),
            seek_interval: seek_interval.max(1),
            distinct_times: 0,
            last_time: None,
            groups: 0,
        })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn last_time(&self) -> Option<Time> {
        self.last_time
    }

    pub fn groups_written(&self) -> u64 {
        self.groups
    }

    /// Writes the unindexed block that precedes every group.
    pub fn write_prelude<'a, I: Item + 'a>(
        &mut self,
        time: Time,
        items: impl IntoIterator<Item = &'a I>,
    ) -> Result<()> {
        if self.groups > 0 || self.seek_map.start() != STREAM_HEADER_SIZE {
            return Err(TraceError::InvariantViolation(
                "prelude must be written once, before any group".to_string(),
            ));
        }
        let block = encode_group(time, items);
        self.out.write_all(block.as_bytes())?;
        self.offset += block.len() as u64;
        self.seek_map.set_start(self.offset);
        Ok(())
    }

    pub fn write_group<'a, I: Item + 'a>(
        &mut self,
        time: Time,
        items: impl IntoIterator<Item = &'a I>,
    ) -> Result<()> {
        if let Some(last) = self.last_time {
            if time < last {
                return Err(TraceError::InvariantViolation(format!(
                    "group at time {} written after time {}",
                    time, last
                )));
            }
        }
        // Only the first group of a timestamp may be indexed, otherwise a
        // seek could land past earlier groups sharing that time.
        if self.last_time != Some(time) {
            if self.distinct_times % self.seek_interval as u64 == 0 {
                self.seek_map.append(time, self.offset);
            }
            self.distinct_times += 1;
        }

        let group = encode_group(time, items);
        self.out.write_all(group.as_bytes())?;
        self.offset += group.len() as u64;
        self.last_time = Some(time);
        self.groups += 1;
        tracing::trace!(time, bytes = group.len(), "group written");
        Ok(())
    }

    /// Flushes the stream and persists its seek map.
    pub fn finish(mut self, index_path: impl AsRef<Path>, sync: bool) -> Result<SeekMap> {
        self.out.flush()?;
        if sync {
            self.out.get_ref().sync_all()?;
        }
        self.seek_map.write_to(index_path, sync)?;
        Ok(self.seek_map)
    }
}

/// Forward reader over the groups of a stream, with one group of lookahead.
pub struct GroupReader<I> {
    input: CodedInputStream<BufReader<File>>,
    seek_map: SeekMap,
    lookahead: Option<(Time, Vec<I>)>,
}

impl<I: Item> GroupReader<I> {
    pub fn open(path: impl AsRef<Path>, index_path: impl AsRef<Path>) -> Result<Self> {
        let seek_map = SeekMap::open(index_path)?;
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        read_stream_header(&mut reader)?;

        let mut group_reader = Self {
            input: CodedInputStream::at(reader, STREAM_HEADER_SIZE),
            seek_map,
            lookahead: None,
        };
        group_reader.rewind()?;
        Ok(group_reader)
    }

    pub fn seek_map(&self) -> &SeekMap {
        &self.seek_map
    }

    /// Decodes the prelude block of the stream.
    pub fn read_prelude<S: Item>(&mut self) -> Result<Option<(Time, Vec<S>)>> {
        if self.seek_map.start() <= STREAM_HEADER_SIZE {
            return Ok(None);
        }
        self.input.reposition(STREAM_HEADER_SIZE)?;
        let prelude = Self::read_raw_group::<S>(&mut self.input)?;
        self.rewind()?;
        Ok(prelude)
    }

    fn read_raw_group<T: Item>(
        input: &mut CodedInputStream<BufReader<File>>,
    ) -> Result<Option<(Time, Vec<T>)>> {
        if input.is_at_end()? {
            return Ok(None);
        }
        let time = input.read_slong()?;
        let count = input.read_int()?;
        let mut items = Vec::with_capacity(count.min(4096) as usize);
        for _ in 0..count {
            items.push(T::read_from(input)?);
        }
        Ok(Some((time, items)))
    }

    fn fill(&mut self) -> Result<()> {
        self.lookahead = Self::read_raw_group(&mut self.input)?;
        Ok(())
    }

    /// Back to the first group of the stream.
    pub fn rewind(&mut self) -> Result<()> {
        self.input.reposition(self.seek_map.start())?;
        self.fill()
    }

    /// Positions the reader at the group indexed at `offset`.
    pub fn reposition(&mut self, offset: u64) -> Result<()> {
        self.input.reposition(offset)?;
        self.fill()
    }

    /// Decodes the single physical group stored at `offset`. Leaves the
    /// reader unpositioned; call `seek` or `rewind` before iterating again.
    pub fn read_at(&mut self, offset: u64) -> Result<Option<(Time, Vec<I>)>> {
        self.input.reposition(offset)?;
        self.lookahead = None;
        Self::read_raw_group(&mut self.input)
    }

    pub fn has_next(&self) -> bool {
        self.lookahead.is_some()
    }

    pub fn next_time(&self) -> Option<Time> {
        self.lookahead.as_ref().map(|(t, _)| *t)
    }

    /// Next logical group, merging consecutive physical groups that share
    /// a timestamp.
    pub fn next(&mut self) -> Result<Option<(Time, Vec<I>)>> {
        let Some((time, mut items)) = self.lookahead.take() else {
            return Ok(None);
        };
        loop {
            match Self::read_raw_group(&mut self.input)? {
                Some((t, more)) if t == time => items.extend(more),
                other => {
                    self.lookahead = other;
                    break;
                }
            }
        }
        Ok(Some((time, items)))
    }

    /// Positions the reader so that the next group is the first one with a
    /// time at or after `time`.
    pub fn seek(&mut self, time: Time) -> Result<()> {
        let offset = self.seek_map.get_offset(time);
        self.reposition(offset)?;
        let mut skipped = 0usize;
        while matches!(self.next_time(), Some(t) if t < time) {
            self.next()?;
            skipped += 1;
        }
        tracing::trace!(time, offset, skipped, "group stream positioned");
        Ok(())
    }
}
