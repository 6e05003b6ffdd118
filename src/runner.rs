// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Deterministic lockstep scheduler.
//!
//! One logical clock, advanced only by `incr`. Each tick every generator
//! does its unit of work in priority order, and only then are the busses
//! flushed up to the new clock time. Nothing runs concurrently, so nothing
//! needs locking.

use crate::bus::AnyBus;
use crate::error::{Result, TraceError};
use crate::item::Item;
use crate::reader::Reader;
use crate::Time;

pub const DEFAULT_PRIORITY: i32 = 0;

/// A component advanced in lockstep by a [`Runner`].
pub trait Generator {
    /// Advances the generator's own time by `dt` and queues whatever became
    /// due on its busses. Must not flush them.
    fn incr(&mut self, dt: Time) -> Result<()>;

    fn seek(&mut self, time: Time) -> Result<()>;

    fn busses(&mut self) -> Vec<&mut dyn AnyBus>;

    /// Higher priorities run first within a tick; equal priorities keep
    /// their registration order.
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeneratorId(u64);

pub struct Runner {
    dt: Time,
    min_time: Time,
    max_time: Time,
    time: Time,
    next_id: u64,
    generators: Vec<(GeneratorId, Box<dyn Generator>)>,
}

impl Runner {
    pub fn new(dt: Time, min_time: Time, max_time: Time) -> Result<Self> {
        if dt <= 0 {
            return Err(TraceError::InvariantViolation(format!(
                "runner step must be positive, got {}",
                dt
            )));
        }
        if max_time < min_time {
            return Err(TraceError::InvariantViolation(format!(
                "runner range [{}, {}] is empty",
                min_time, max_time
            )));
        }
        Ok(Self {
            dt,
            min_time,
            max_time,
            time: min_time,
            next_id: 0,
            generators: Vec::new(),
        })
    }

    /// Registers a generator and seeks it to the runner's clock, so that it
    /// steps the same window the runner flushes.
    pub fn add_generator(&mut self, mut generator: Box<dyn Generator>) -> Result<GeneratorId> {
        generator.seek(self.time)?;
        let id = GeneratorId(self.next_id);
        self.next_id += 1;
        let priority = generator.priority();
        let pos = self
            .generators
            .iter()
            .position(|(_, g)| g.priority() < priority)
            .unwrap_or(self.generators.len());
        self.generators.insert(pos, (id, generator));
        Ok(id)
    }

    pub fn remove_generator(&mut self, id: GeneratorId) -> Option<Box<dyn Generator>> {
        let pos = self.generators.iter().position(|(gid, _)| *gid == id)?;
        Some(self.generators.remove(pos).1)
    }

    pub fn generator_count(&self) -> usize {
        self.generators.len()
    }

    /// One tick: every generator steps, then every bus flushes.
    pub fn incr(&mut self) -> Result<()> {
        self.time = self.time.saturating_add(self.dt);
        for (_, generator) in self.generators.iter_mut() {
            generator.incr(self.dt)?;
        }
        self.flush_busses()
    }

    pub fn seek(&mut self, time: Time) -> Result<()> {
        self.time = time;
        for (_, generator) in self.generators.iter_mut() {
            generator.seek(time)?;
        }
        self.flush_busses()?;
        tracing::debug!(time, generators = self.generators.len(), "runner seeked");
        Ok(())
    }

    fn flush_busses(&mut self) -> Result<()> {
        let time = self.time;
        for (_, generator) in self.generators.iter_mut() {
            for bus in generator.busses() {
                bus.flush(time)?;
            }
        }
        Ok(())
    }

    /// Ticks until the clock reaches `max_time`. Returns the number of ticks.
    pub fn run(&mut self) -> Result<u64> {
        let mut ticks = 0;
        while self.time < self.max_time {
            self.incr()?;
            ticks += 1;
        }
        tracing::debug!(ticks, time = self.time, "runner finished");
        Ok(ticks)
    }

    pub fn time(&self) -> Time {
        self.time
    }

    pub fn dt(&self) -> Time {
        self.dt
    }

    pub fn min_time(&self) -> Time {
        self.min_time
    }

    pub fn max_time(&self) -> Time {
        self.max_time
    }
}

impl<I: Item> Generator for Reader<I> {
    fn incr(&mut self, dt: Time) -> Result<()> {
        self.advance(dt, |time, items, bus| {
            for item in items {
                bus.queue(time, item);
            }
        })
    }

    fn seek(&mut self, time: Time) -> Result<()> {
        Reader::seek(self, time)
    }

    fn busses(&mut self) -> Vec<&mut dyn AnyBus> {
        let bus: &mut dyn AnyBus = self.bus_mut();
        vec![bus]
    }
}
