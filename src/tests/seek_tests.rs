// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::config::TraceConfig;
use crate::reader::Reader;
use crate::writer::Writer;
use crate::Time;
use std::path::Path;
use tempfile::tempdir;

/// Groups at irregular times, some of them split across several flushes.
fn groups() -> Vec<(Time, Vec<u32>)> {
    vec![
        (-7, vec![1]),
        (0, vec![2, 3]),
        (1, vec![4]),
        (9, vec![5, 6, 7]),
        (10, vec![8]),
        (40, vec![9]),
        (41, vec![10, 11]),
        (100, vec![12]),
    ]
}

fn write_trace(dir: &Path, seek_interval: u32) {
    let cfg = TraceConfig::default()
        .with_seek_interval(seek_interval)
        .with_fsync_on_close(false);
    let mut writer = Writer::<u32>::create(dir, cfg).unwrap();
    for (time, items) in groups() {
        for item in items {
            writer.queue(time, item).unwrap();
            // Split same-time groups on disk to exercise merging.
            if item % 2 == 0 {
                writer.flush_upto(time).unwrap();
            }
        }
    }
    writer.close().unwrap();
}

#[test]
fn seek_lands_on_first_group_at_or_after_time() {
    for seek_interval in [1, 2, 3, 16] {
        let dir = tempdir().unwrap();
        write_trace(dir.path(), seek_interval);
        let expected = groups();
        let mut reader = Reader::<u32>::open(dir.path()).unwrap();

        for t in -10..=105 {
            reader.seek(t).unwrap();
            let want = expected.iter().find(|(gt, _)| *gt >= t).cloned();
            assert_eq!(
                reader.next().unwrap(),
                want,
                "seek({}) with seek_interval {}",
                t,
                seek_interval
            );
        }
    }
}

#[test]
fn seek_past_end_exhausts_reader() {
    let dir = tempdir().unwrap();
    write_trace(dir.path(), 2);
    let mut reader = Reader::<u32>::open(dir.path()).unwrap();
    reader.seek(101).unwrap();
    assert!(!reader.has_next());
    assert_eq!(reader.next_time(), None);
    assert_eq!(reader.next().unwrap(), None);
}

#[test]
fn seek_backwards_then_stream_forward() {
    let dir = tempdir().unwrap();
    write_trace(dir.path(), 2);
    let mut reader = Reader::<u32>::open(dir.path()).unwrap();
    reader.seek(41).unwrap();
    reader.seek(2).unwrap();

    let times: Vec<Time> = reader
        .groups()
        .map(|g| g.unwrap().0)
        .collect();
    assert_eq!(times, vec![9, 10, 40, 41, 100]);
}

#[test]
fn seek_map_is_sparse_with_larger_interval() {
    let dir = tempdir().unwrap();
    write_trace(dir.path(), 3);
    let reader = Reader::<u32>::open(dir.path()).unwrap();
    let map = crate::seek_map::SeekMap::open(&reader.paths().events_index).unwrap();
    let times: Vec<Time> = map.entries().iter().map(|e| e.time).collect();
    assert_eq!(times, vec![-7, 9, 41]);
}

#[test]
fn trace_spanning_the_whole_time_range_closes_and_seeks() {
    let dir = tempdir().unwrap();
    let cfg = TraceConfig::default()
        .with_seek_interval(1)
        .with_fsync_on_close(false);
    let mut writer = Writer::<u32>::create(dir.path(), cfg).unwrap();
    writer.queue(Time::MIN + 5, 1).unwrap();
    writer.queue(1 << 62, 2).unwrap();
    writer.queue(Time::MAX, 3).unwrap();
    writer.close().unwrap();

    let mut reader = Reader::<u32>::open(dir.path()).unwrap();
    assert_eq!(reader.min_time(), Time::MIN + 5);
    assert_eq!(reader.max_time(), Time::MAX);
    reader.seek(0).unwrap();
    assert_eq!(reader.next().unwrap(), Some((1 << 62, vec![2])));
    reader.seek(Time::MAX).unwrap();
    assert_eq!(reader.next().unwrap(), Some((Time::MAX, vec![3])));
}
