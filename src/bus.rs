// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Typed, time-ordered publish/subscribe channel with deferred delivery.
//!
//! Items are queued under a time and held until a `flush` reaches that
//! time. Pending items live in a min-heap keyed by `(time, sequence)`, so
//! items sharing a time come out in enqueue order. Cancelled items are
//! tombstoned and skipped when they reach the top of the heap.

use crate::error::Result;
use crate::Time;
use rustc_hash::FxHashSet;
use std::cmp::Ordering;
use std::collections::binary_heap::PeekMut;
use std::collections::BinaryHeap;

/// Receives the batches delivered by a [`Bus`].
pub trait Listener<T> {
    /// Called once per distinct time with every item queued at that time.
    fn handle(&mut self, time: Time, items: &[T]) -> Result<()>;

    /// Discard accumulated state, e.g. after the source seeked backwards.
    fn reset(&mut self) {}
}

impl<T, F> Listener<T> for F
where
    F: FnMut(Time, &[T]) -> Result<()>,
{
    fn handle(&mut self, time: Time, items: &[T]) -> Result<()> {
        self(time, items)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

struct Pending<T> {
    time: Time,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Pending<T> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl<T> Eq for Pending<T> {}

impl<T> PartialOrd for Pending<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Pending<T> {
    // Reversed so that BinaryHeap pops the earliest (time, seq) first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Object-safe view of a bus, used by the runner to drive busses of
/// different item types.
pub trait AnyBus {
    fn flush(&mut self, upto: Time) -> Result<()>;
    fn reset(&mut self);
}

pub struct Bus<T> {
    listeners: Vec<(ListenerId, Box<dyn Listener<T>>)>,
    next_listener: u64,
    queue: BinaryHeap<Pending<T>>,
    cancelled: FxHashSet<u64>,
    next_seq: u64,
    last_flushed: Option<Time>,
}

impl<T> Default for Bus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Bus<T> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_listener: 0,
            queue: BinaryHeap::new(),
            cancelled: FxHashSet::default(),
            next_seq: 0,
            last_flushed: None,
        }
    }

    pub fn add_listener(&mut self, listener: impl Listener<T> + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Defers `item` until a flush reaches `time`.
    pub fn queue(&mut self, time: Time, item: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Pending { time, seq, item });
    }

    /// Number of queued items still due for delivery.
    pub fn pending(&self) -> usize {
        self.queue.len() - self.cancelled.len()
    }

    pub fn last_flushed(&self) -> Option<Time> {
        self.last_flushed
    }

    /// Delivers every pending item with `time <= upto`, one batch per
    /// distinct time, in increasing time order.
    ///
    /// A batch is taken off the queue right before it is handed to the
    /// listeners. If a listener fails, that batch is consumed and every
    /// later batch stays queued for the next flush.
    pub fn flush(&mut self, upto: Time) -> Result<()> {
        while let Some(time) = self.next_due(upto) {
            let batch = self.take_batch(time);
            if !batch.is_empty() {
                self.deliver(time, &batch)?;
            }
        }
        self.last_flushed = Some(self.last_flushed.map_or(upto, |l| l.max(upto)));
        Ok(())
    }

    fn next_due(&self, upto: Time) -> Option<Time> {
        self.queue
            .peek()
            .map(|top| top.time)
            .filter(|&time| time <= upto)
    }

    /// Pops every item queued at `time`, skipping cancelled ones.
    fn take_batch(&mut self, time: Time) -> Vec<T> {
        let mut batch = Vec::new();
        while let Some(top) = self.queue.peek_mut() {
            if top.time != time {
                break;
            }
            let pending = PeekMut::pop(top);
            if !self.cancelled.remove(&pending.seq) {
                batch.push(pending.item);
            }
        }
        batch
    }

    fn deliver(&mut self, time: Time, items: &[T]) -> Result<()> {
        for (_, listener) in self.listeners.iter_mut() {
            listener.handle(time, items)?;
        }
        Ok(())
    }

    /// Drops everything still queued and tells listeners to start over.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.cancelled.clear();
        self.last_flushed = None;
        for (_, listener) in self.listeners.iter_mut() {
            listener.reset();
        }
    }

    /// Cancels pending items scheduled strictly after `time` that match
    /// `predicate`. Returns how many were cancelled.
    pub fn remove_from_queue_after_time(
        &mut self,
        time: Time,
        predicate: impl Fn(&T) -> bool,
    ) -> usize {
        let mut removed = 0;
        for pending in self.queue.iter() {
            if pending.time > time
                && !self.cancelled.contains(&pending.seq)
                && predicate(&pending.item)
            {
                self.cancelled.insert(pending.seq);
                removed += 1;
            }
        }
        // Compact once tombstones dominate the heap.
        if self.cancelled.len() > 64 && self.cancelled.len() * 2 > self.queue.len() {
            let cancelled = std::mem::take(&mut self.cancelled);
            self.queue.retain(|p| !cancelled.contains(&p.seq));
        }
        removed
    }
}

impl<T> AnyBus for Bus<T> {
    fn flush(&mut self, upto: Time) -> Result<()> {
        Bus::flush(self, upto)
    }

    fn reset(&mut self) {
        Bus::reset(self)
    }
}
