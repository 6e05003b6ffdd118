// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Writer for stateful traces.
//!
//! The writer runs its own `StateUpdater` over exactly the events it
//! persists. Before writing a group at time `t` it emits a snapshot for the
//! last snapshot boundary `B < t` not yet covered, so a snapshot at `B`
//! always holds the initial state replayed through every event with time
//! `<= B`. Boundaries inside a quiet stretch share one snapshot: the state
//! cannot change where there are no events.

use crate::config::TraceConfig;
use crate::error::{Result, TraceError};
use crate::log::GroupWriter;
use crate::stateful::updater::{StateUpdater, StateUpdaterFactory};
use crate::trace::{TracePaths, SNAPSHOT_INTERVAL_KEY, STATEFUL_KEY};
use crate::writer::Writer;
use crate::Time;
use std::path::Path;

pub struct StatefulWriter<U: StateUpdater> {
    writer: Writer<U::Event>,
    snapshots: GroupWriter,
    updater: U,
    snapshot_interval: Time,
    init_time: Option<Time>,
    next_snapshot: Time,
}

impl<U: StateUpdater> StatefulWriter<U> {
    pub fn create(
        dir: impl AsRef<Path>,
        config: TraceConfig,
        factory: &impl StateUpdaterFactory<U>,
    ) -> Result<Self> {
        let snapshot_interval = config.snapshot_interval;
        let writer = Writer::create(dir, config)?;
        // Every snapshot gets its own seek entry.
        let snapshots = GroupWriter::create(&writer.paths().snapshots, 1)?;

        Ok(Self {
            writer,
            snapshots,
            updater: factory.get_new(),
            snapshot_interval,
            init_time: None,
            next_snapshot: Time::MIN,
        })
    }

    pub fn paths(&self) -> &TracePaths {
        self.writer.paths()
    }

    /// Establishes the state at the trace's minimum time. Must be called
    /// exactly once, before anything is queued.
    pub fn set_init_state(&mut self, time: Time, states: Vec<U::State>) -> Result<()> {
        if self.init_time.is_some() {
            return Err(TraceError::InvariantViolation(
                "initial state already set".to_string(),
            ));
        }
        if self.writer.has_written() {
            return Err(TraceError::InvariantViolation(
                "initial state must be set before queueing events".to_string(),
            ));
        }
        self.writer.stream_mut()?.write_prelude(time, &states)?;
        self.writer.note_time(time);
        self.updater.set_state(states);
        self.init_time = Some(time);
        self.next_snapshot = time.saturating_add(self.snapshot_interval);
        tracing::trace!(time, "initial state written");
        Ok(())
    }

    pub fn queue(&mut self, time: Time, event: U::Event) -> Result<()> {
        match self.init_time {
            None => Err(TraceError::InvariantViolation(
                "queue called before set_init_state".to_string(),
            )),
            Some(init) if time < init => Err(TraceError::InvariantViolation(format!(
                "event at time {} precedes the initial state at {}",
                time, init
            ))),
            Some(_) => self.writer.queue(time, event),
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        self.write_ready(None)
    }

    pub fn flush_upto(&mut self, upto: Time) -> Result<()> {
        self.write_ready(Some(upto))
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl ToString) {
        self.writer.set_property(key, value);
    }

    /// Live state after every flushed event.
    pub fn updater(&self) -> &U {
        &self.updater
    }

    fn write_ready(&mut self, upto: Option<Time>) -> Result<()> {
        for (time, events) in self.writer.take_ready(upto) {
            self.snapshot_before(time)?;
            for event in &events {
                self.updater.handle_event(time, event);
            }
            self.writer.write_group(time, &events)?;
        }
        Ok(())
    }

    fn snapshot_before(&mut self, time: Time) -> Result<()> {
        if self.next_snapshot >= time {
            return Ok(());
        }
        // Widened: the gap may span more than half the i64 range.
        let skipped =
            (time as i128 - 1 - self.next_snapshot as i128) / self.snapshot_interval as i128;
        let boundary =
            (self.next_snapshot as i128 + skipped * self.snapshot_interval as i128) as Time;
        self.snapshots.write_group(boundary, self.updater.states())?;
        self.next_snapshot = boundary.saturating_add(self.snapshot_interval);
        tracing::trace!(boundary, "snapshot written");
        Ok(())
    }

    /// Flushes the remaining events, then persists the snapshot index and
    /// closes the underlying event writer.
    pub fn close(mut self) -> Result<()> {
        if self.init_time.is_none() {
            tracing::warn!(
                dir = %self.writer.paths().dir.display(),
                "stateful trace closed without an initial state; writing an empty one"
            );
            self.set_init_state(0, Vec::new())?;
        }
        self.flush()?;

        let Self {
            mut writer,
            snapshots,
            snapshot_interval,
            ..
        } = self;
        let sync = writer.config().fsync_on_close;
        let snapshot_map = snapshots.finish(&writer.paths().snapshots_index, sync)?;
        writer.set_property(SNAPSHOT_INTERVAL_KEY, snapshot_interval);
        writer.set_property(STATEFUL_KEY, true);
        tracing::debug!(snapshots = snapshot_map.len(), "snapshots persisted");
        writer.close()
    }
}
