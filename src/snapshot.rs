//! Whole-engine state capture and restore.
//!
//! The snapshot is a self-describing byte blob: a magic/version pair up
//! front, then the pool, queue order, timestamps, tuning and configuration.
//! Restoring replaces session construction entirely, so a charge point can
//! persist its queue across a power cycle without losing a StartTransaction
//! it never managed to deliver.

use serde::{Deserialize, Serialize};

use crate::config::Configuration;
use crate::error::Error;
use crate::hal::Hal;
use crate::pool::{Entry, MessagePool, SlotQueue};
use crate::session::{Session, Tuning};
use crate::types::{Role, TimeSec, TX_POOL_LEN};

/// Identifies a byte blob as a session snapshot
const SNAPSHOT_MAGIC: u32 = 0x4f43_5050;

/// Bumped whenever the snapshot layout changes
const SNAPSHOT_VERSION: u16 = 1;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    magic: u32,
    version: u16,
    tuning: Tuning,
    config: Configuration,
    slots: [Option<Entry>; TX_POOL_LEN],
    ready: Vec<usize>,
    wait: Vec<usize>,
    timer: Vec<usize>,
    last_tx: TimeSec,
    last_rx: TimeSec,
}

impl Snapshot {
    /// Queue indices must point at occupied slots and no slot may appear
    /// in more than one queue.
    fn validate(&self) -> Result<(), Error> {
        let mut seen = [false; TX_POOL_LEN];
        for &idx in self.ready.iter().chain(&self.wait).chain(&self.timer) {
            let occupied = idx < TX_POOL_LEN && self.slots[idx].is_some();
            if !occupied || seen[idx] {
                return Err(Error::BadSnapshot);
            }
            seen[idx] = true;
        }
        // Deferred release only ever holds requests; wait may transiently
        // hold a response whose transmission failed.
        for &idx in &self.timer {
            if self.slots[idx]
                .as_ref()
                .is_some_and(|e| e.body.role != Role::Call)
            {
                return Err(Error::BadSnapshot);
            }
        }
        Ok(())
    }
}

impl<H: Hal> Session<H> {
    fn encode_snapshot(&self) -> Result<Vec<u8>, Error> {
        let snapshot = Snapshot {
            magic: SNAPSHOT_MAGIC,
            version: SNAPSHOT_VERSION,
            tuning: self.tuning(),
            config: self.config.clone(),
            slots: self.pool.slots().clone(),
            ready: self.ready.iter().copied().collect(),
            wait: self.wait.iter().copied().collect(),
            timer: self.timer.iter().copied().collect(),
            last_tx: self.last_tx,
            last_rx: self.last_rx,
        };
        Ok(serde_json::to_vec(&snapshot)?)
    }

    /// Bytes a snapshot of the current state occupies
    pub fn snapshot_size(&self) -> Result<usize, Error> {
        Ok(self.encode_snapshot()?.len())
    }

    /// Capture the engine state into `buf`. Returns the number of bytes
    /// written; fails without touching `buf` when it is too small.
    pub fn save_snapshot(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let bytes = self.encode_snapshot()?;
        if buf.len() < bytes.len() {
            return Err(Error::BufferTooSmall {
                needed: bytes.len(),
            });
        }
        buf[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    /// Rebuild a session from a snapshot, replacing [`Session::new`].
    /// A blob whose header does not match this implementation is rejected.
    pub fn restore_snapshot(hal: H, bytes: &[u8]) -> Result<Self, Error> {
        let snapshot: Snapshot = serde_json::from_slice(bytes)?;
        if snapshot.magic != SNAPSHOT_MAGIC || snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::BadSnapshot);
        }
        snapshot.validate()?;

        let mut session = Session::with_tuning(hal, snapshot.tuning);
        session.config = snapshot.config;
        session.pool = MessagePool::from_slots(snapshot.slots);
        session.ready = rebuild_queue(&snapshot.ready);
        session.wait = rebuild_queue(&snapshot.wait);
        session.timer = rebuild_queue(&snapshot.timer);
        session.last_tx = snapshot.last_tx;
        session.last_rx = snapshot.last_rx;
        Ok(session)
    }
}

fn rebuild_queue(order: &[usize]) -> SlotQueue {
    let mut queue = SlotQueue::new();
    for &idx in order {
        queue.push_back(idx);
    }
    queue
}
