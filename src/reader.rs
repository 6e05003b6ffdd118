// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Forward, seekable reader over a closed event trace.

use crate::bus::Bus;
use crate::error::Result;
use crate::item::Item;
use crate::log::GroupReader;
use crate::trace::{Properties, TracePaths};
use crate::Time;
use std::path::Path;

pub struct Reader<I: Item> {
    paths: TracePaths,
    stream: GroupReader<I>,
    properties: Properties,
    min_time: Time,
    max_time: Time,
    bus: Bus<I>,
    clock: Time,
}

impl<I: Item> Reader<I> {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let paths = TracePaths::new(dir);
        let properties = Properties::open(&paths.info)?;
        let min_time = properties.min_time()?;
        let max_time = properties.max_time()?;
        let stream = GroupReader::open(&paths.events, &paths.events_index)?;
        tracing::debug!(
            dir = %paths.dir.display(),
            min_time,
            max_time,
            seek_entries = stream.seek_map().len(),
            "trace opened"
        );

        Ok(Self {
            paths,
            stream,
            properties,
            min_time,
            max_time,
            bus: Bus::new(),
            clock: min_time,
        })
    }

    pub fn paths(&self) -> &TracePaths {
        &self.paths
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn min_time(&self) -> Time {
        self.min_time
    }

    pub fn max_time(&self) -> Time {
        self.max_time
    }

    pub fn tics_per_second(&self) -> Result<u64> {
        self.properties.tics_per_second()
    }

    pub fn has_next(&self) -> bool {
        self.stream.has_next()
    }

    pub fn next_time(&self) -> Option<Time> {
        self.stream.next_time()
    }

    /// The next group of items sharing a time, `None` once exhausted.
    pub fn next(&mut self) -> Result<Option<(Time, Vec<I>)>> {
        self.stream.next()
    }

    /// Positions the reader so that `next` yields the first group with a
    /// time at or after `time`. Seeking past the end leaves the reader
    /// exhausted. Pending bus deliveries are dropped.
    pub fn seek(&mut self, time: Time) -> Result<()> {
        self.stream.seek(time)?;
        self.bus.reset();
        self.clock = time;
        Ok(())
    }

    /// Back to the first group.
    pub fn rewind(&mut self) -> Result<()> {
        self.stream.rewind()?;
        self.bus.reset();
        self.clock = self.min_time;
        Ok(())
    }

    /// Iterator over the remaining groups.
    pub fn groups(&mut self) -> Groups<'_, I> {
        Groups { reader: self }
    }

    pub fn bus(&self) -> &Bus<I> {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut Bus<I> {
        &mut self.bus
    }

    /// Replaces the bus groups are published on when driven by a runner.
    pub fn set_bus(&mut self, bus: Bus<I>) {
        self.bus = bus;
    }

    /// Time the reader has been driven to by `incr`.
    pub fn clock(&self) -> Time {
        self.clock
    }

    pub(crate) fn set_clock(&mut self, time: Time) {
        self.clock = time;
    }

    pub(crate) fn stream_mut(&mut self) -> &mut GroupReader<I> {
        &mut self.stream
    }

    /// Advances the clock by `dt` and hands every group now due to `sink`.
    pub(crate) fn advance(
        &mut self,
        dt: Time,
        mut sink: impl FnMut(Time, Vec<I>, &mut Bus<I>),
    ) -> Result<()> {
        self.clock = self.clock.saturating_add(dt);
        while matches!(self.stream.next_time(), Some(t) if t <= self.clock) {
            if let Some((time, items)) = self.stream.next()? {
                sink(time, items, &mut self.bus);
            }
        }
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        tracing::debug!(dir = %self.paths.dir.display(), "trace reader closed");
        Ok(())
    }
}

pub struct Groups<'a, I: Item> {
    reader: &'a mut Reader<I>,
}

impl<I: Item> Iterator for Groups<'_, I> {
    type Item = Result<(Time, Vec<I>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TraceConfig;
    use crate::writer::Writer;
    use tempfile::tempdir;

    #[test]
    fn test_reader_yields_groups_in_order() {
        let dir = tempdir().unwrap();
        let mut writer = Writer::<u32>::create(dir.path(), TraceConfig::default()).unwrap();
        writer.queue(4, 40).unwrap();
        writer.queue(1, 10).unwrap();
        writer.queue(4, 41).unwrap();
        writer.close().unwrap();

        let mut reader = Reader::<u32>::open(dir.path()).unwrap();
        assert_eq!(reader.min_time(), 1);
        assert_eq!(reader.max_time(), 4);
        let groups: Vec<_> = reader.groups().collect::<Result<_>>().unwrap();
        assert_eq!(groups, vec![(1, vec![10]), (4, vec![40, 41])]);
        assert!(!reader.has_next());

        reader.rewind().unwrap();
        assert_eq!(reader.next_time(), Some(1));
        reader.close().unwrap();
    }

    #[test]
    fn test_unclosed_trace_is_not_readable() {
        let dir = tempdir().unwrap();
        {
            let mut writer = Writer::<u32>::create(dir.path(), TraceConfig::default()).unwrap();
            writer.queue(1, 1).unwrap();
        }
        assert!(Reader::<u32>::open(dir.path()).is_err());
    }
}
