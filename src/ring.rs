//! Fixed-slot ring buffer of fixed-size byte items
//!
//! Storage is reserved once at creation and never grows. Unlike a lock-free
//! SPSC ring this one tracks occupancy explicitly, so all `capacity` slots
//! are usable. It carries no synchronization of its own: `HandoffQueue`
//! wraps it in a mutex.
//!
//! Author: Moroya Sakamoto

use crate::error::{Error, Result};

/// Ring of `capacity` slots, each exactly `item_size` bytes
#[derive(Debug)]
pub struct SlotRing {
    /// Flat storage, `capacity * item_size` bytes
    storage: Vec<u8>,
    /// Slot holding the oldest item
    head: usize,
    /// Occupied slots
    len: usize,
    capacity: usize,
    item_size: usize,
}

impl SlotRing {
    /// Reserve storage for `capacity` items of `item_size` bytes
    pub fn new(capacity: usize, item_size: usize) -> Result<Self> {
        if capacity == 0 || item_size == 0 {
            return Err(Error::InvalidConfig(format!(
                "queue needs nonzero capacity and item size (got {capacity} x {item_size})"
            )));
        }
        let alloc_err = || Error::QueueAllocation { capacity, item_size };
        let bytes = capacity.checked_mul(item_size).ok_or_else(alloc_err)?;

        let mut storage = Vec::new();
        storage.try_reserve_exact(bytes).map_err(|_| alloc_err())?;
        storage.resize(bytes, 0);

        Ok(Self {
            storage,
            head: 0,
            len: 0,
            capacity,
            item_size,
        })
    }

    /// Copy `item` into the tail slot
    ///
    /// Returns false if the ring is full. `item` must be `item_size` bytes.
    pub fn push(&mut self, item: &[u8]) -> bool {
        debug_assert_eq!(item.len(), self.item_size);
        if self.is_full() {
            return false;
        }
        let tail = (self.head + self.len) % self.capacity;
        self.slot_mut(tail).copy_from_slice(item);
        self.len += 1;
        true
    }

    /// Copy the oldest item into `out` and free its slot
    ///
    /// Returns false if the ring is empty. `out` must be `item_size` bytes.
    pub fn pop_into(&mut self, out: &mut [u8]) -> bool {
        debug_assert_eq!(out.len(), self.item_size);
        if self.is_empty() {
            return false;
        }
        let head = self.head;
        out.copy_from_slice(self.slot(head));
        self.head = (head + 1) % self.capacity;
        self.len -= 1;
        true
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn item_size(&self) -> usize {
        self.item_size
    }

    fn slot(&self, idx: usize) -> &[u8] {
        let start = idx * self.item_size;
        &self.storage[start..start + self.item_size]
    }

    fn slot_mut(&mut self, idx: usize) -> &mut [u8] {
        let start = idx * self.item_size;
        &mut self.storage[start..start + self.item_size]
    }
}
