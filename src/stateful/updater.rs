// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Pluggable state reconstruction.

use crate::item::Item;
use crate::Time;

/// Folds events into a live set of states.
///
/// Each trace schema brings its own updater; the stateful writer and reader
/// only ever talk to this trait.
pub trait StateUpdater {
    type Event: Item;
    type State: Item + Clone;

    /// Replaces the whole live state, e.g. when priming from a snapshot.
    fn set_state(&mut self, states: Vec<Self::State>);

    fn handle_event(&mut self, time: Time, event: &Self::Event);

    fn states(&self) -> impl Iterator<Item = &Self::State>;
}

/// Produces one fresh updater per writer or reader.
pub trait StateUpdaterFactory<U> {
    fn get_new(&self) -> U;
}

impl<U, F> StateUpdaterFactory<U> for F
where
    F: Fn() -> U,
{
    fn get_new(&self) -> U {
        self()
    }
}
