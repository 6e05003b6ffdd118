// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.

//! ditl: time-ordered trace storage and deterministic lockstep replay.
//!
//! Traces are written once through a [`Writer`] (or [`StatefulWriter`]),
//! closed, then read back through a [`Reader`] (or [`StatefulReader`]) that
//! can seek to any time through a persisted [`SeekMap`]. A [`Runner`] drives
//! several readers on one logical clock and fans their events out through
//! typed [`Bus`]ses.

/// Trace time, in tics.
pub type Time = i64;

pub mod bus;
pub mod codec;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod item;
pub mod log;
pub mod reader;
pub mod runner;
pub mod seek_map;
pub mod stateful;
pub mod trace;
pub mod writer;

pub use bus::{AnyBus, Bus, Listener, ListenerId};
pub use codec::{CodedBuffer, CodedInputStream};
pub use config::TraceConfig;
pub use error::{Result, TraceError};
pub use item::Item;
pub use reader::Reader;
pub use runner::{Generator, GeneratorId, Runner};
pub use seek_map::{SeekEntry, SeekMap};
pub use stateful::{StateUpdater, StateUpdaterFactory, StatefulReader, StatefulWriter};
pub use trace::{Properties, TracePaths};
pub use writer::Writer;

#[cfg(test)]
mod tests;
