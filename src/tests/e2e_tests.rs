// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::config::TraceConfig;
use crate::error::Result;
use crate::fixtures::{
    handover_events, present_ids, write_presence_trace, Presence, PresenceEvent, PresenceUpdater,
    NODE_A, NODE_B,
};
use crate::reader::Reader;
use crate::runner::Runner;
use crate::stateful::StatefulReader;
use crate::writer::Writer;
use crate::Time;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use tempfile::tempdir;

type Deliveries<T> = Rc<RefCell<Vec<(Time, Vec<T>)>>>;

fn handover_config() -> TraceConfig {
    TraceConfig::default()
        .with_snapshot_interval(20)
        .with_fsync_on_close(false)
}

#[test]
fn handover_states_at_points_in_time() {
    let dir = tempdir().unwrap();
    write_presence_trace(dir.path(), handover_config(), 0, &[], &handover_events()).unwrap();
    let mut reader = StatefulReader::open(dir.path(), &PresenceUpdater::new).unwrap();
    assert_eq!(reader.max_time(), 25);

    reader.seek(5).unwrap();
    assert_eq!(present_ids(&reader.reference_state().unwrap()), BTreeSet::from([NODE_A]));
    reader.seek(12).unwrap();
    assert_eq!(present_ids(&reader.reference_state().unwrap()), BTreeSet::from([NODE_B]));
    reader.seek(30).unwrap();
    assert!(reader.reference_state().unwrap().is_empty());
    reader.close().unwrap();
}

#[test]
fn runner_replays_handover_through_busses() {
    let dir = tempdir().unwrap();
    write_presence_trace(dir.path(), handover_config(), 0, &[], &handover_events()).unwrap();
    let mut reader = StatefulReader::open(dir.path(), &PresenceUpdater::new).unwrap();

    let events: Deliveries<PresenceEvent> = Rc::new(RefCell::new(Vec::new()));
    let states: Deliveries<Presence> = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    reader
        .bus_mut()
        .add_listener(move |time: Time, items: &[PresenceEvent]| -> Result<()> {
            sink.borrow_mut().push((time, items.to_vec()));
            Ok(())
        });
    let sink = states.clone();
    reader
        .state_bus_mut()
        .add_listener(move |time: Time, items: &[Presence]| -> Result<()> {
            sink.borrow_mut().push((time, items.to_vec()));
            Ok(())
        });

    let mut runner = Runner::new(5, 0, 30).unwrap();
    runner.add_generator(Box::new(reader)).unwrap();
    runner.seek(0).unwrap();
    assert_eq!(*states.borrow(), vec![(0, vec![Presence { id: NODE_A }])]);

    assert_eq!(runner.run().unwrap(), 6);
    assert_eq!(runner.time(), 30);
    assert_eq!(
        *events.borrow(),
        vec![
            (10, vec![PresenceEvent::down(NODE_A), PresenceEvent::up(NODE_B)]),
            (25, vec![PresenceEvent::down(NODE_B)]),
        ]
    );
}

#[test]
fn runner_seek_backwards_resets_and_replays() {
    let dir = tempdir().unwrap();
    write_presence_trace(dir.path(), handover_config(), 0, &[], &handover_events()).unwrap();
    let mut reader = StatefulReader::open(dir.path(), &PresenceUpdater::new).unwrap();

    let states: Deliveries<Presence> = Rc::new(RefCell::new(Vec::new()));
    let sink = states.clone();
    reader
        .state_bus_mut()
        .add_listener(move |time: Time, items: &[Presence]| -> Result<()> {
            sink.borrow_mut().push((time, items.to_vec()));
            Ok(())
        });

    let mut runner = Runner::new(10, 0, 30).unwrap();
    runner.add_generator(Box::new(reader)).unwrap();
    runner.seek(20).unwrap();
    runner.seek(5).unwrap();
    assert_eq!(
        *states.borrow(),
        vec![
            (20, vec![Presence { id: NODE_B }]),
            (5, vec![Presence { id: NODE_A }]),
        ]
    );
}

#[test]
fn two_readers_advance_in_lockstep() {
    let dir_a = tempdir().unwrap();
    let dir_b = tempdir().unwrap();
    for (dir, times) in [(&dir_a, [1, 4, 9]), (&dir_b, [2, 4, 8])] {
        let mut writer = Writer::<u32>::create(dir.path(), TraceConfig::default()).unwrap();
        for t in times {
            writer.queue(t, t as u32).unwrap();
        }
        writer.close().unwrap();
    }

    let journal: Rc<RefCell<Vec<(&'static str, Time)>>> = Rc::new(RefCell::new(Vec::new()));
    let mut runner = Runner::new(3, 0, 9).unwrap();
    for (name, dir) in [("a", &dir_a), ("b", &dir_b)] {
        let mut reader = Reader::<u32>::open(dir.path()).unwrap();
        let sink = journal.clone();
        reader
            .bus_mut()
            .add_listener(move |time: Time, _items: &[u32]| -> Result<()> {
                sink.borrow_mut().push((name, time));
                Ok(())
            });
        runner.add_generator(Box::new(reader)).unwrap();
    }
    runner.seek(0).unwrap();
    runner.run().unwrap();

    assert_eq!(
        *journal.borrow(),
        vec![
            ("a", 1),
            ("b", 2),
            ("a", 4),
            ("b", 4),
            // Busses flush generator by generator, not merged by time.
            ("a", 9),
            ("b", 8),
        ]
    );
}

#[test]
fn runner_window_differs_from_trace_range() {
    let dir = tempdir().unwrap();
    let mut writer = Writer::<u32>::create(dir.path(), TraceConfig::default()).unwrap();
    writer.queue(0, 0).unwrap();
    writer.queue(102, 102).unwrap();
    writer.close().unwrap();

    let deliveries: Deliveries<u32> = Rc::new(RefCell::new(Vec::new()));
    let sink = deliveries.clone();
    let mut reader = Reader::<u32>::open(dir.path()).unwrap();
    reader
        .bus_mut()
        .add_listener(move |time: Time, items: &[u32]| -> Result<()> {
            sink.borrow_mut().push((time, items.to_vec()));
            Ok(())
        });

    let mut runner = Runner::new(5, 100, 110).unwrap();
    runner.add_generator(Box::new(reader)).unwrap();
    while runner.time() < runner.max_time() {
        runner.incr().unwrap();
    }
    assert_eq!(*deliveries.borrow(), vec![(102, vec![102])]);
}

#[test]
fn runner_starting_before_stateful_trace_waits_for_it() {
    let dir = tempdir().unwrap();
    let events = vec![(12, PresenceEvent::up(NODE_B))];
    write_presence_trace(dir.path(), handover_config(), 10, &[NODE_A], &events).unwrap();
    let mut reader = StatefulReader::open(dir.path(), &PresenceUpdater::new).unwrap();

    let states: Deliveries<Presence> = Rc::new(RefCell::new(Vec::new()));
    let sink = states.clone();
    reader
        .state_bus_mut()
        .add_listener(move |time: Time, items: &[Presence]| -> Result<()> {
            sink.borrow_mut().push((time, items.to_vec()));
            Ok(())
        });
    let events_seen: Deliveries<PresenceEvent> = Rc::new(RefCell::new(Vec::new()));
    let sink = events_seen.clone();
    reader
        .bus_mut()
        .add_listener(move |time: Time, items: &[PresenceEvent]| -> Result<()> {
            sink.borrow_mut().push((time, items.to_vec()));
            Ok(())
        });

    let mut runner = Runner::new(4, 0, 16).unwrap();
    runner.add_generator(Box::new(reader)).unwrap();
    runner.incr().unwrap();
    runner.incr().unwrap();
    assert!(states.borrow().is_empty());

    runner.run().unwrap();
    assert_eq!(*states.borrow(), vec![(10, vec![Presence { id: NODE_A }])]);
    assert_eq!(*events_seen.borrow(), vec![(12, vec![PresenceEvent::up(NODE_B)])]);
}
