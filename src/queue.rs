//! Bounded handoff queue
//!
//! Fixed capacity, fixed item size, FIFO. Blocking calls wait on a
//! condition variable until space (or data) appears or their relative
//! timeout in ticks expires. A timeout of 0 tests once and returns.
//!
//! Insert and remove happen entirely under the queue mutex, so an item is
//! either fully in a slot or not in the queue at all.
//!
//! Author: Moroya Sakamoto

use log::{debug, trace};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::ring::SlotRing;
use crate::timer::{Deadline, SysTimer};

/// Outcome of `send`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Item copied into the queue
    Accepted,
    /// Queue stayed full for the whole timeout; item not enqueued
    TimedOut,
}

/// Outcome of `receive`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvStatus {
    /// Oldest item copied into the caller's buffer
    Received,
    /// Queue stayed empty for the whole timeout
    TimedOut,
}

/// Occupancy class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Empty,
    Partial,
    Full,
}

/// Cumulative counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub sent: u64,
    pub received: u64,
    pub send_timeouts: u64,
    pub receive_timeouts: u64,
    /// Highest occupancy ever observed
    pub high_water: usize,
}

/// How long the queue had been full when a send gave up
///
/// Captured under the queue lock at the moment of the timeout. The queue
/// stayed full from `full_since` through `gave_up`; a receive in between
/// would have reset `full_since`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullWindow {
    /// Tick at which the queue last became full
    pub full_since: u64,
    /// Tick at which the send began waiting
    pub started: u64,
    /// Tick at which the send gave up
    pub gave_up: u64,
    /// Items queued at `gave_up`
    pub occupancy: usize,
}

impl FullWindow {
    /// Was the queue full for the whole `timeout` the send waited?
    pub fn covers(&self, timeout: u64) -> bool {
        self.full_since <= self.started && self.gave_up.saturating_sub(self.started) >= timeout
    }
}

struct Inner {
    ring: SlotRing,
    stats: QueueStats,
    /// Tick of the push that filled the ring; cleared by any receive
    full_since: Option<u64>,
}

/// Fixed-capacity FIFO between one producer and one consumer
pub struct HandoffQueue {
    inner: Mutex<Inner>,
    not_empty: Condvar,
    not_full: Condvar,
    timer: SysTimer,
    capacity: usize,
    item_size: usize,
}

impl HandoffQueue {
    /// Allocate a queue of `capacity` items, `item_size` bytes each
    pub fn new(capacity: usize, item_size: usize, timer: SysTimer) -> Result<Self> {
        let ring = SlotRing::new(capacity, item_size)?;
        debug!("HandoffQueue::new: capacity={} item_size={}", capacity, item_size);
        Ok(Self {
            inner: Mutex::new(Inner {
                ring,
                stats: QueueStats::default(),
                full_since: None,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            timer,
            capacity,
            item_size,
        })
    }

    /// Enqueue a copy of `item`, waiting up to `timeout` ticks for space
    pub fn send(&self, item: &[u8], timeout: u64) -> Result<SendStatus> {
        self.send_traced(item, timeout).map(|(status, _)| status)
    }

    /// `send`, also returning the full window behind a timeout
    pub fn send_traced(&self, item: &[u8], timeout: u64) -> Result<(SendStatus, Option<FullWindow>)> {
        self.check_len(item.len())?;
        let deadline = self.timer.deadline(timeout);

        let mut inner = self.inner.lock();
        if !self.wait_while(&mut inner, &self.not_full, deadline, |i| i.ring.is_full()) {
            inner.stats.send_timeouts += 1;
            let gave_up = self.timer.now();
            let window = FullWindow {
                full_since: inner.full_since.unwrap_or(gave_up),
                started: deadline.start(),
                gave_up,
                occupancy: inner.ring.len(),
            };
            trace!("send: timed out after {} ticks, {:?}", timeout, window);
            return Ok((SendStatus::TimedOut, Some(window)));
        }

        inner.ring.push(item);
        if inner.ring.is_full() {
            inner.full_since = Some(self.timer.now());
        }
        inner.stats.sent += 1;
        inner.stats.high_water = inner.stats.high_water.max(inner.ring.len());
        drop(inner);

        self.not_empty.notify_one();
        Ok((SendStatus::Accepted, None))
    }

    /// Dequeue the oldest item into `out`, waiting up to `timeout` ticks for one
    pub fn receive(&self, out: &mut [u8], timeout: u64) -> Result<RecvStatus> {
        self.check_len(out.len())?;
        let deadline = self.timer.deadline(timeout);

        let mut inner = self.inner.lock();
        if !self.wait_while(&mut inner, &self.not_empty, deadline, |i| i.ring.is_empty()) {
            inner.stats.receive_timeouts += 1;
            trace!("receive: timed out after {} ticks", timeout);
            return Ok(RecvStatus::TimedOut);
        }

        inner.ring.pop_into(out);
        inner.full_since = None;
        inner.stats.received += 1;
        drop(inner);

        self.not_full.notify_one();
        Ok(RecvStatus::Received)
    }

    /// Block on `cv` while `blocked` holds, until `deadline`
    ///
    /// Returns true once `blocked` is false. The condition is re-checked
    /// under the lock after the final wakeup, so a slot freed right at the
    /// deadline still counts.
    fn wait_while<F>(
        &self,
        inner: &mut MutexGuard<'_, Inner>,
        cv: &Condvar,
        deadline: Deadline,
        blocked: F,
    ) -> bool
    where
        F: Fn(&Inner) -> bool,
    {
        let until = self.timer.instant_at(deadline.at());
        while blocked(&**inner) {
            if deadline.is_expired(self.timer.now()) {
                return false;
            }
            if cv.wait_until(inner, until).timed_out() {
                return !blocked(&**inner);
            }
        }
        true
    }

    fn check_len(&self, actual: usize) -> Result<()> {
        if actual != self.item_size {
            return Err(Error::ItemSize {
                expected: self.item_size,
                actual,
            });
        }
        Ok(())
    }

    /// Items currently queued
    pub fn len(&self) -> usize {
        self.inner.lock().ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn item_size(&self) -> usize {
        self.item_size
    }

    pub fn state(&self) -> QueueState {
        match self.len() {
            0 => QueueState::Empty,
            n if n == self.capacity => QueueState::Full,
            _ => QueueState::Partial,
        }
    }

    pub fn stats(&self) -> QueueStats {
        self.inner.lock().stats
    }
}

/// Encode `text` as a zero-padded item of `item_size` bytes
///
/// At most `item_size - 1` bytes of text are kept so the item always ends
/// in a NUL.
pub fn encode_text(text: &str, item_size: usize) -> Vec<u8> {
    let mut item = vec![0u8; item_size];
    let mut end = text.len().min(item_size.saturating_sub(1));
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    item[..end].copy_from_slice(&text.as_bytes()[..end]);
    item
}

/// Decode the text of an item up to its first NUL
pub fn decode_text(item: &[u8]) -> &str {
    let end = item.iter().position(|&b| b == 0).unwrap_or(item.len());
    std::str::from_utf8(&item[..end]).unwrap_or_default()
}
