// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Append-only event trace writer.
//!
//! Items are queued under a time key and buffered until `flush`, which
//! writes them in increasing time order. `close` persists the seek map and
//! the property block; a trace is not readable before that.

use crate::config::TraceConfig;
use crate::error::{Result, TraceError};
use crate::item::Item;
use crate::log::GroupWriter;
use crate::trace::{
    Properties, TracePaths, MAX_TIME_KEY, MIN_TIME_KEY, SEEK_INTERVAL_KEY, TICS_PER_SECOND_KEY,
};
use crate::Time;
use std::collections::BTreeMap;
use std::path::Path;

pub struct Writer<I: Item> {
    paths: TracePaths,
    config: TraceConfig,
    stream: Option<GroupWriter>,
    buffer: BTreeMap<Time, Vec<I>>,
    properties: Properties,
    min_time: Option<Time>,
    max_time: Option<Time>,
}

impl<I: Item> Writer<I> {
    pub fn create(dir: impl AsRef<Path>, config: TraceConfig) -> Result<Self> {
        config.validate()?;
        let paths = TracePaths::new(dir);
        paths.create_dir()?;
        let stream = GroupWriter::create(&paths.events, config.seek_interval)?;
        tracing::debug!(dir = %paths.dir.display(), "trace created");

        Ok(Self {
            paths,
            config,
            stream: Some(stream),
            buffer: BTreeMap::new(),
            properties: Properties::new(),
            min_time: None,
            max_time: None,
        })
    }

    pub fn paths(&self) -> &TracePaths {
        &self.paths
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Time of the last group written to disk.
    pub fn last_time(&self) -> Option<Time> {
        self.stream.as_ref().and_then(GroupWriter::last_time)
    }

    /// Number of queued items not yet flushed.
    pub fn pending(&self) -> usize {
        self.buffer.values().map(Vec::len).sum()
    }

    pub fn queue(&mut self, time: Time, item: I) -> Result<()> {
        self.check_time(time)?;
        self.buffer.entry(time).or_default().push(item);
        Ok(())
    }

    pub fn queue_all(&mut self, time: Time, items: impl IntoIterator<Item = I>) -> Result<()> {
        self.check_time(time)?;
        self.buffer.entry(time).or_default().extend(items);
        Ok(())
    }

    fn check_time(&self, time: Time) -> Result<()> {
        match self.last_time() {
            Some(last) if time < last => Err(TraceError::InvariantViolation(format!(
                "item queued at time {} after time {} was flushed",
                time, last
            ))),
            _ => Ok(()),
        }
    }

    /// Writes every buffered group.
    pub fn flush(&mut self) -> Result<()> {
        for (time, items) in self.take_ready(None) {
            self.write_group(time, &items)?;
        }
        Ok(())
    }

    /// Writes the buffered groups with a time at or before `upto`.
    pub fn flush_upto(&mut self, upto: Time) -> Result<()> {
        for (time, items) in self.take_ready(Some(upto)) {
            self.write_group(time, &items)?;
        }
        Ok(())
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl ToString) {
        self.properties.set(key, value);
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Removes and returns the buffered groups due for writing, in time order.
    pub(crate) fn take_ready(&mut self, upto: Option<Time>) -> Vec<(Time, Vec<I>)> {
        let rest = match upto.and_then(|u| u.checked_add(1)) {
            Some(bound) => self.buffer.split_off(&bound),
            None => BTreeMap::new(),
        };
        std::mem::replace(&mut self.buffer, rest).into_iter().collect()
    }

    pub(crate) fn write_group(&mut self, time: Time, items: &[I]) -> Result<()> {
        self.stream_mut()?.write_group(time, items)?;
        self.note_time(time);
        Ok(())
    }

    pub(crate) fn stream_mut(&mut self) -> Result<&mut GroupWriter> {
        self.stream
            .as_mut()
            .ok_or_else(|| TraceError::InvariantViolation("writer already closed".to_string()))
    }

    pub(crate) fn has_written(&self) -> bool {
        self.stream
            .as_ref()
            .map(|s| s.groups_written() > 0)
            .unwrap_or(false)
            || !self.buffer.is_empty()
    }

    pub(crate) fn note_time(&mut self, time: Time) {
        self.min_time = Some(self.min_time.map_or(time, |m| m.min(time)));
        self.max_time = Some(self.max_time.map_or(time, |m| m.max(time)));
    }

    /// Flushes what is left, then persists the seek map and the property
    /// block. Explicitly set `min_time`/`max_time` properties win over the
    /// times observed while writing.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        let stream = self
            .stream
            .take()
            .ok_or_else(|| TraceError::InvariantViolation("writer already closed".to_string()))?;
        let seek_map = stream.finish(&self.paths.events_index, self.config.fsync_on_close)?;

        if !self.properties.contains(MIN_TIME_KEY) {
            self.properties.set(MIN_TIME_KEY, self.min_time.unwrap_or(0));
        }
        if !self.properties.contains(MAX_TIME_KEY) {
            self.properties.set(MAX_TIME_KEY, self.max_time.unwrap_or(0));
        }
        self.properties.set(TICS_PER_SECOND_KEY, self.config.tics_per_second);
        self.properties.set(SEEK_INTERVAL_KEY, self.config.seek_interval);
        self.properties
            .write_to(&self.paths.info, self.config.fsync_on_close)?;

        tracing::debug!(
            dir = %self.paths.dir.display(),
            seek_entries = seek_map.len(),
            min_time = ?self.min_time,
            max_time = ?self.max_time,
            "trace closed"
        );
        Ok(())
    }
}

impl<I: Item> Drop for Writer<I> {
    fn drop(&mut self) {
        if self.stream.is_some() {
            tracing::warn!(
                dir = %self.paths.dir.display(),
                "writer dropped without close(); trace is left unreadable"
            );
        }
    }
}
