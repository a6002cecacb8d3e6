//! Fixed-capacity message pool and the slot-index queues threaded over it.
//!
//! The pool is a slab of [`TX_POOL_LEN`] slots; a vacant slot is `None`.
//! Queues hold slot indices, never messages, so moving a message between
//! ready/wait/timer is an index shuffle. A slot is a member of at most one
//! queue at a time.

use serde::{Deserialize, Serialize};

use crate::types::{Message, TimeSec, TX_POOL_LEN};

// ============================================================================
// Pool Entry
// ============================================================================

/// An occupied pool slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Entry {
    /// The message record
    pub body: Message,
    /// Absolute deadline; meaning depends on the queue holding the slot
    pub expiry: TimeSec,
    /// Transmissions made for this slot so far
    pub attempts: u32,
}

impl Entry {
    pub(crate) fn new(body: Message) -> Self {
        Self {
            body,
            expiry: 0,
            attempts: 0,
        }
    }
}

// ============================================================================
// Pool
// ============================================================================

#[derive(Debug, Default)]
pub(crate) struct MessagePool {
    slots: [Option<Entry>; TX_POOL_LEN],
}

impl MessagePool {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Claim the first vacant slot. On exhaustion the message is handed
    /// back so the caller can retry after eviction.
    pub(crate) fn alloc(&mut self, body: Message) -> Result<usize, Message> {
        match self.slots.iter().position(Option::is_none) {
            Some(idx) => {
                self.slots[idx] = Some(Entry::new(body));
                Ok(idx)
            }
            None => Err(body),
        }
    }

    /// Vacate a slot
    pub(crate) fn clear(&mut self, idx: usize) {
        self.slots[idx] = None;
    }

    pub(crate) fn get(&self, idx: usize) -> Option<&Entry> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, idx: usize) -> Option<&mut Entry> {
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }

    /// Snapshot view of every slot
    pub(crate) fn slots(&self) -> &[Option<Entry>; TX_POOL_LEN] {
        &self.slots
    }

    /// Rebuild the pool from snapshot state
    pub(crate) fn from_slots(slots: [Option<Entry>; TX_POOL_LEN]) -> Self {
        Self { slots }
    }
}

// ============================================================================
// Slot Queue
// ============================================================================

/// Ordered list of slot indices with head and tail insertion
#[derive(Debug, Default)]
pub(crate) struct SlotQueue {
    order: heapless::Vec<usize, TX_POOL_LEN>,
}

impl SlotQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append at the tail. Cannot overflow: a slot lives in at most one
    /// queue, and indices are pool-bounded.
    pub(crate) fn push_back(&mut self, idx: usize) {
        let _ = self.order.push(idx);
    }

    /// Insert at the head; retries jump the queue this way
    pub(crate) fn push_front(&mut self, idx: usize) {
        let _ = self.order.insert(0, idx);
    }

    pub(crate) fn pop_front(&mut self) -> Option<usize> {
        if self.order.is_empty() {
            None
        } else {
            Some(self.order.remove(0))
        }
    }

    /// Remove the given slot index wherever it sits. Returns whether it
    /// was present.
    pub(crate) fn remove(&mut self, idx: usize) -> bool {
        match self.order.iter().position(|&i| i == idx) {
            Some(pos) => {
                self.order.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(crate) fn iter(&self) -> core::slice::Iter<'_, usize> {
        self.order.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.order.clear();
    }
}
