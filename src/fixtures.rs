// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Presence schema and trace scenarios for tests.
//!
//! A node is either present or not; events bring it up or take it down.
//! Small enough to reason about by hand, rich enough to exercise snapshots
//! and replay.

use crate::codec::{CodedBuffer, CodedInputStream};
use crate::config::TraceConfig;
use crate::error::{Result, TraceError};
use crate::item::Item;
use crate::stateful::{StateUpdater, StatefulWriter};
use crate::trace::TracePaths;
use crate::Time;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::io::BufRead;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresenceKind {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PresenceEvent {
    pub id: u32,
    pub kind: PresenceKind,
}

impl PresenceEvent {
    pub fn up(id: u32) -> Self {
        Self {
            id,
            kind: PresenceKind::Up,
        }
    }

    pub fn down(id: u32) -> Self {
        Self {
            id,
            kind: PresenceKind::Down,
        }
    }
}

impl Item for PresenceEvent {
    fn write_to(&self, out: &mut CodedBuffer) {
        out.write_int(self.id);
        out.write_byte(match self.kind {
            PresenceKind::Up => 0,
            PresenceKind::Down => 1,
        });
    }

    fn read_from<R: BufRead>(input: &mut CodedInputStream<R>) -> Result<Self> {
        let id = input.read_int()?;
        let kind = match input.read_byte()? {
            0 => PresenceKind::Up,
            1 => PresenceKind::Down,
            other => {
                return Err(TraceError::CorruptStream(format!(
                    "unknown presence kind {}",
                    other
                )))
            }
        };
        Ok(Self { id, kind })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Presence {
    pub id: u32,
}

impl Item for Presence {
    fn write_to(&self, out: &mut CodedBuffer) {
        out.write_int(self.id);
    }

    fn read_from<R: BufRead>(input: &mut CodedInputStream<R>) -> Result<Self> {
        Ok(Self {
            id: input.read_int()?,
        })
    }
}

#[derive(Debug, Default)]
pub struct PresenceUpdater {
    present: FxHashMap<u32, Presence>,
}

impl PresenceUpdater {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateUpdater for PresenceUpdater {
    type Event = PresenceEvent;
    type State = Presence;

    fn set_state(&mut self, states: Vec<Presence>) {
        self.present.clear();
        self.present.extend(states.into_iter().map(|p| (p.id, p)));
    }

    fn handle_event(&mut self, _time: Time, event: &PresenceEvent) {
        match event.kind {
            PresenceKind::Up => {
                self.present.insert(event.id, Presence { id: event.id });
            }
            PresenceKind::Down => {
                self.present.remove(&event.id);
            }
        }
    }

    fn states(&self) -> impl Iterator<Item = &Presence> {
        self.present.values()
    }
}

/// Ids present in a set of states, for order-insensitive comparisons.
pub fn present_ids<'a>(states: impl IntoIterator<Item = &'a Presence>) -> BTreeSet<u32> {
    states.into_iter().map(|p| p.id).collect()
}

/// Brute-force reference: the initial state replayed through every event
/// with a time at or before `at`.
pub fn replay_presence(init: &[u32], events: &[(Time, PresenceEvent)], at: Time) -> BTreeSet<u32> {
    let mut present: BTreeSet<u32> = init.iter().copied().collect();
    for (time, event) in events {
        if *time > at {
            break;
        }
        match event.kind {
            PresenceKind::Up => {
                present.insert(event.id);
            }
            PresenceKind::Down => {
                present.remove(&event.id);
            }
        }
    }
    present
}

/// Writes a closed stateful presence trace. `events` must be sorted by time.
pub fn write_presence_trace(
    dir: &Path,
    config: TraceConfig,
    init_time: Time,
    init: &[u32],
    events: &[(Time, PresenceEvent)],
) -> Result<TracePaths> {
    let mut writer = StatefulWriter::create(dir, config, &PresenceUpdater::new)?;
    writer.set_init_state(init_time, init.iter().map(|&id| Presence { id }).collect())?;
    for (time, event) in events {
        writer.queue(*time, *event)?;
    }
    let paths = writer.paths().clone();
    writer.close()?;
    Ok(paths)
}

pub const NODE_A: u32 = 1;
pub const NODE_B: u32 = 2;

/// A comes up at 0 and leaves at 10 as B arrives; B leaves at 25.
pub fn handover_events() -> Vec<(Time, PresenceEvent)> {
    vec![
        (0, PresenceEvent::up(NODE_A)),
        (10, PresenceEvent::down(NODE_A)),
        (10, PresenceEvent::up(NODE_B)),
        (25, PresenceEvent::down(NODE_B)),
    ]
}

/// Deterministic churn over `nodes` ids: every few tics some node flips.
pub fn churn_events(nodes: u32, until: Time) -> Vec<(Time, PresenceEvent)> {
    let mut events = Vec::new();
    let mut present = BTreeSet::new();
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    let mut time: Time = 0;
    while time < until {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let id = ((state >> 33) % nodes as u64) as u32;
        let event = if present.remove(&id) {
            PresenceEvent::down(id)
        } else {
            present.insert(id);
            PresenceEvent::up(id)
        };
        events.push((time, event));
        time += ((state >> 17) % 4) as Time;
    }
    events
}
