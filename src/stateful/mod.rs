// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Stateful traces: an event log plus an initial state and periodic
//! snapshots, so that the state at any time can be rebuilt from the
//! nearest snapshot instead of from the start of the trace.

pub mod reader;
pub mod updater;
pub mod writer;

pub use reader::StatefulReader;
pub use updater::{StateUpdater, StateUpdaterFactory};
pub use writer::StatefulWriter;
