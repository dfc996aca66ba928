//! Timestamp-based joins over independently arriving message streams.
//!
//! Both synchronizers invoke their registered callback synchronously from the `add_*`
//! call that completes a tuple. Tuples are delivered in increasing timestamp order.

use frame_transport::Stamped;
use std::collections::{BTreeMap, VecDeque};
use time::{Duration, OffsetDateTime};
use tracing::debug;

type Callback2<A, B> = Box<dyn FnMut(A, B) + Send>;
type Callback3<A, B, C> = Box<dyn FnMut(A, B, C) + Send>;

/// Two-channel join on identical timestamps.
pub struct ExactTimeSync<A, B> {
    queue_size: usize,
    slots: BTreeMap<OffsetDateTime, (Option<A>, Option<B>)>,
    last_emitted: Option<OffsetDateTime>,
    callback: Option<Callback2<A, B>>,
    dropped: u64,
}

impl<A: Stamped, B: Stamped> ExactTimeSync<A, B> {
    /// At most `queue_size` incomplete timestamps are held; the oldest goes first.
    pub fn new(queue_size: usize) -> Self {
        Self {
            queue_size: queue_size.max(1),
            slots: BTreeMap::new(),
            last_emitted: None,
            callback: None,
            dropped: 0,
        }
    }

    pub fn register_callback<F>(&mut self, callback: F)
    where
        F: FnMut(A, B) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    /// Returns `true` when this message completed a tuple.
    pub fn add_first(&mut self, msg: A) -> bool {
        let stamp = msg.stamp();
        if self.is_late(stamp) {
            return false;
        }
        let slot = self.slots.entry(stamp).or_insert((None, None));
        if slot.0.replace(msg).is_some() {
            self.dropped += 1;
        }
        self.complete(stamp)
    }

    /// Returns `true` when this message completed a tuple.
    pub fn add_second(&mut self, msg: B) -> bool {
        let stamp = msg.stamp();
        if self.is_late(stamp) {
            return false;
        }
        let slot = self.slots.entry(stamp).or_insert((None, None));
        if slot.1.replace(msg).is_some() {
            self.dropped += 1;
        }
        self.complete(stamp)
    }

    /// Incomplete timestamps currently held.
    pub fn pending(&self) -> usize {
        self.slots.len()
    }

    /// Messages discarded so far (overflow, duplicates, late arrivals).
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Drop everything pending and forget the last emitted stamp.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.last_emitted = None;
    }

    fn is_late(&mut self, stamp: OffsetDateTime) -> bool {
        if self.last_emitted.is_some_and(|last| stamp <= last) {
            debug!("dropping message older than last synchronized tuple");
            self.dropped += 1;
            return true;
        }
        false
    }

    fn complete(&mut self, stamp: OffsetDateTime) -> bool {
        let ready = matches!(self.slots.get(&stamp), Some((Some(_), Some(_))));
        if !ready {
            while self.slots.len() > self.queue_size {
                if let Some((_, (a, b))) = self.slots.pop_first() {
                    self.dropped += u64::from(a.is_some()) + u64::from(b.is_some());
                }
            }
            return false;
        }

        // Everything older than the completed stamp can no longer fire.
        let newer = self.slots.split_off(&stamp);
        for (_, (a, b)) in std::mem::replace(&mut self.slots, newer) {
            self.dropped += u64::from(a.is_some()) + u64::from(b.is_some());
        }
        self.last_emitted = Some(stamp);
        if let Some((Some(a), Some(b))) = self.slots.remove(&stamp) {
            if let Some(cb) = self.callback.as_mut() {
                cb(a, b);
            }
        }
        true
    }
}

/// Three-channel join keyed on the first channel: each message of the first channel
/// is paired with the closest messages of the other two that lie within `window`.
pub struct ApproximateTimeSync<A, B, C> {
    queue_size: usize,
    window: Duration,
    first: VecDeque<A>,
    second: VecDeque<B>,
    third: VecDeque<C>,
    last_emitted: Option<OffsetDateTime>,
    callback: Option<Callback3<A, B, C>>,
    dropped: u64,
}

impl<A: Stamped, B: Stamped, C: Stamped> ApproximateTimeSync<A, B, C> {
    pub fn new(queue_size: usize, window: Duration) -> Self {
        Self {
            queue_size: queue_size.max(1),
            window: window.abs(),
            first: VecDeque::new(),
            second: VecDeque::new(),
            third: VecDeque::new(),
            last_emitted: None,
            callback: None,
            dropped: 0,
        }
    }

    pub fn register_callback<F>(&mut self, callback: F)
    where
        F: FnMut(A, B, C) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns the number of tuples fired by this call.
    pub fn add_first(&mut self, msg: A) -> usize {
        if self.last_emitted.is_some_and(|last| msg.stamp() <= last) {
            self.dropped += 1;
            return 0;
        }
        self.dropped += insert_bounded(&mut self.first, msg, self.queue_size);
        self.process()
    }

    pub fn add_second(&mut self, msg: B) -> usize {
        self.dropped += insert_bounded(&mut self.second, msg, self.queue_size);
        self.process()
    }

    pub fn add_third(&mut self, msg: C) -> usize {
        self.dropped += insert_bounded(&mut self.third, msg, self.queue_size);
        self.process()
    }

    /// Queued message count per channel.
    pub fn pending(&self) -> (usize, usize, usize) {
        (self.first.len(), self.second.len(), self.third.len())
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.first.clear();
        self.second.clear();
        self.third.clear();
        self.last_emitted = None;
    }

    fn process(&mut self) -> usize {
        let mut fired = 0;
        while let Some(pivot) = self.first.front().map(Stamped::stamp) {
            if self.last_emitted.is_some_and(|last| pivot <= last) {
                debug!("depth message at {pivot} already synchronized, discarding");
                self.first.pop_front();
                self.dropped += 1;
                continue;
            }
            let lo = pivot.checked_sub(self.window).unwrap_or(pivot);
            let hi = pivot.checked_add(self.window).unwrap_or(pivot);
            self.dropped += evict_before(&mut self.second, lo);
            self.dropped += evict_before(&mut self.third, lo);

            let second = closest(&self.second, pivot, hi);
            let third = closest(&self.third, pivot, hi);
            if let (Some(i), Some(j)) = (second, third) {
                self.dropped += i as u64 + j as u64;
                let a = self.first.pop_front();
                let b = self.second.drain(..=i).last();
                let c = self.third.drain(..=j).last();
                if let (Some(a), Some(b), Some(c)) = (a, b, c) {
                    self.last_emitted = Some(pivot);
                    fired += 1;
                    if let Some(cb) = self.callback.as_mut() {
                        cb(a, b, c);
                    }
                }
                continue;
            }

            // Channels arrive in order, so once a channel holds something past the
            // window without a candidate inside it, this pivot can never match.
            let hopeless = (second.is_none() && newest(&self.second).is_some_and(|s| s > hi))
                || (third.is_none() && newest(&self.third).is_some_and(|s| s > hi));
            if !hopeless {
                break;
            }
            debug!("no partner within window for message at {pivot}, discarding");
            self.first.pop_front();
            self.dropped += 1;
        }
        fired
    }
}

fn insert_bounded<T: Stamped>(queue: &mut VecDeque<T>, msg: T, limit: usize) -> u64 {
    let stamp = msg.stamp();
    let pos = queue
        .iter()
        .rposition(|m| m.stamp() <= stamp)
        .map_or(0, |p| p + 1);
    queue.insert(pos, msg);
    let mut dropped = 0;
    while queue.len() > limit {
        queue.pop_front();
        dropped += 1;
    }
    dropped
}

fn evict_before<T: Stamped>(queue: &mut VecDeque<T>, lo: OffsetDateTime) -> u64 {
    let mut dropped = 0;
    while queue.front().is_some_and(|m| m.stamp() < lo) {
        queue.pop_front();
        dropped += 1;
    }
    dropped
}

fn closest<T: Stamped>(
    queue: &VecDeque<T>,
    pivot: OffsetDateTime,
    hi: OffsetDateTime,
) -> Option<usize> {
    queue
        .iter()
        .enumerate()
        .take_while(|(_, m)| m.stamp() <= hi)
        .min_by_key(|(_, m)| (m.stamp() - pivot).abs())
        .map(|(i, _)| i)
}

fn newest<T: Stamped>(queue: &VecDeque<T>) -> Option<OffsetDateTime> {
    queue.back().map(Stamped::stamp)
}
