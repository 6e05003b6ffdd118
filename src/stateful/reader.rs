// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Reader for stateful traces.
//!
//! `seek(t)` rebuilds the state at `t` from the latest snapshot at or
//! before `t` (or from the initial state when there is none) and replays
//! only the events between that snapshot and `t`. The cost is bounded by
//! one snapshot plus one snapshot interval of events.

use crate::bus::{AnyBus, Bus};
use crate::error::{Result, TraceError};
use crate::log::GroupReader;
use crate::reader::Reader;
use crate::runner::Generator;
use crate::stateful::updater::{StateUpdater, StateUpdaterFactory};
use crate::trace::{Properties, TracePaths};
use crate::Time;
use std::path::Path;

pub struct StatefulReader<U: StateUpdater> {
    events: Reader<U::Event>,
    snapshots: GroupReader<U::State>,
    init_time: Time,
    init_state: Vec<U::State>,
    updater: U,
    state_bus: Bus<U::State>,
    snapshot_interval: Time,
    positioned: bool,
}

impl<U: StateUpdater> StatefulReader<U> {
    pub fn open(dir: impl AsRef<Path>, factory: &impl StateUpdaterFactory<U>) -> Result<Self> {
        let mut events = Reader::open(dir)?;
        if !events.properties().is_stateful()? {
            return Err(TraceError::InvariantViolation(format!(
                "trace at {} has no state",
                events.paths().dir.display()
            )));
        }
        let snapshot_interval = events.properties().snapshot_interval()?;
        let (init_time, init_state) = events
            .stream_mut()
            .read_prelude::<U::State>()?
            .ok_or_else(|| TraceError::CorruptStream("missing initial state block".to_string()))?;
        let paths = events.paths().clone();
        let snapshots = GroupReader::open(&paths.snapshots, &paths.snapshots_index)?;
        tracing::debug!(
            dir = %paths.dir.display(),
            init_time,
            snapshots = snapshots.seek_map().len(),
            "stateful trace opened"
        );

        Ok(Self {
            events,
            snapshots,
            init_time,
            init_state,
            updater: factory.get_new(),
            state_bus: Bus::new(),
            snapshot_interval,
            positioned: false,
        })
    }

    pub fn paths(&self) -> &TracePaths {
        self.events.paths()
    }

    pub fn properties(&self) -> &Properties {
        self.events.properties()
    }

    pub fn min_time(&self) -> Time {
        self.events.min_time()
    }

    pub fn max_time(&self) -> Time {
        self.events.max_time()
    }

    pub fn snapshot_interval(&self) -> Time {
        self.snapshot_interval
    }

    /// Rebuilds the state at `time`: every event with a time at or before
    /// `time` is applied, none after. Both busses are reset and the rebuilt
    /// state is queued on the state bus at `time`. On error the reader is
    /// left unpositioned.
    pub fn seek(&mut self, time: Time) -> Result<()> {
        self.positioned = false;
        let (min, max) = (self.min_time(), self.max_time());
        if time < min {
            return Err(TraceError::OutOfRange {
                requested: time,
                min,
                max,
            });
        }

        let replay_from = match self.snapshots.seek_map().floor(time) {
            Some(entry) => {
                let (snapshot_time, states) = self.snapshots.read_at(entry.offset)?.ok_or_else(|| {
                    TraceError::CorruptStream(format!("snapshot at offset {} is missing", entry.offset))
                })?;
                self.updater.set_state(states);
                // The snapshot already covers events at its own time.
                snapshot_time.saturating_add(1)
            }
            None => {
                self.updater.set_state(self.init_state.clone());
                self.init_time
            }
        };

        let stream = self.events.stream_mut();
        stream.seek(replay_from)?;
        let mut replayed = 0usize;
        while matches!(stream.next_time(), Some(t) if t <= time) {
            if let Some((t, events)) = stream.next()? {
                for event in &events {
                    self.updater.handle_event(t, event);
                }
                replayed += events.len();
            }
        }

        self.events.set_clock(time);
        self.events.bus_mut().reset();
        self.state_bus.reset();
        for state in self.updater.states() {
            self.state_bus.queue(time, state.clone());
        }
        self.positioned = true;
        tracing::trace!(time, replay_from, replayed, "state rebuilt");
        Ok(())
    }

    /// The live state at the last seek, advanced by any later `incr`.
    pub fn reference_state(&self) -> Result<Vec<U::State>> {
        if !self.positioned {
            return Err(TraceError::NotPositioned);
        }
        Ok(self.updater.states().cloned().collect())
    }

    pub fn updater(&self) -> Result<&U> {
        if !self.positioned {
            return Err(TraceError::NotPositioned);
        }
        Ok(&self.updater)
    }

    pub fn bus_mut(&mut self) -> &mut Bus<U::Event> {
        self.events.bus_mut()
    }

    pub fn set_bus(&mut self, bus: Bus<U::Event>) {
        self.events.set_bus(bus);
    }

    pub fn state_bus_mut(&mut self) -> &mut Bus<U::State> {
        &mut self.state_bus
    }

    pub fn set_state_bus(&mut self, bus: Bus<U::State>) {
        self.state_bus = bus;
    }

    pub fn close(self) -> Result<()> {
        self.events.close()
    }
}

impl<U: StateUpdater> Generator for StatefulReader<U> {
    fn incr(&mut self, dt: Time) -> Result<()> {
        if !self.positioned {
            let start = self.events.clock();
            Generator::seek(self, start)?;
        }
        let updater = &mut self.updater;
        self.events.advance(dt, |time, events, bus| {
            for event in events {
                updater.handle_event(time, &event);
                bus.queue(time, event);
            }
        })
    }

    /// A runner may start before the trace does. The initial state then
    /// waits on the state bus until the clock reaches `min_time`.
    fn seek(&mut self, time: Time) -> Result<()> {
        StatefulReader::seek(self, time.max(self.min_time()))?;
        self.events.set_clock(time);
        Ok(())
    }

    fn busses(&mut self) -> Vec<&mut dyn AnyBus> {
        let events: &mut dyn AnyBus = self.events.bus_mut();
        let states: &mut dyn AnyBus = &mut self.state_bus;
        vec![events, states]
    }
}
