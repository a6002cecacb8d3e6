//! The message-lifecycle engine.
//!
//! # Design Philosophy
//!
//! The session owns a bounded pool of message slots and threads three
//! queues over it:
//! - `ready`: requests and responses awaiting transmission
//! - `wait`: transmitted requests awaiting a correlated response
//! - `timer`: deferred requests awaiting release into `ready`
//!
//! **There is no background task.** The host drives the engine by calling
//! [`Session::step`] at whatever cadence suits it (once per second is
//! typical); the engine assumes only that the host clock never runs
//! backwards between calls. Each step drains wait timeouts, transmits at
//! most one message, polls the transport once, synthesizes a keep-alive if
//! the link has been idle, and releases due timers.
//!
//! At most one request is in flight at any instant. This serializes the
//! conversation with the central system and keeps a slow server from being
//! flooded by the client.

use tracing::{debug, error, info, warn};

use crate::config::Configuration;
use crate::error::Error;
use crate::hal::{Hal, RecvError};
use crate::pool::{MessagePool, SlotQueue};
use crate::types::{Action, Event, Message, Role, TimeSec};
use crate::types::{DEFAULT_TX_RETRIES, DEFAULT_TX_TIMEOUT_SEC, TX_POOL_LEN};

// ============================================================================
// Tuning
// ============================================================================

/// Retry policy knobs, fixed for the lifetime of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Tuning {
    /// Seconds a transmitted request may sit in the wait queue before it is
    /// retried
    pub tx_timeout_sec: u32,
    /// Retries after the first transmission. A droppable message is given
    /// `tx_retries + 1` transmissions in total before it is freed.
    pub tx_retries: u32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            tx_timeout_sec: DEFAULT_TX_TIMEOUT_SEC,
            tx_retries: DEFAULT_TX_RETRIES,
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Client-side session core of an OCPP 1.6 charge point
pub struct Session<H: Hal> {
    hal: H,
    tuning: Tuning,
    pub(crate) config: Configuration,
    pub(crate) pool: MessagePool,
    pub(crate) ready: SlotQueue,
    pub(crate) wait: SlotQueue,
    pub(crate) timer: SlotQueue,
    /// Last completed request/response round-trip
    pub(crate) last_tx: TimeSec,
    /// Last successfully received message
    pub(crate) last_rx: TimeSec,
}

impl<H: Hal> Session<H> {
    /// Create a session with default tuning. Timestamps are seeded from the
    /// host clock and the configuration store holds its defaults.
    pub fn new(hal: H) -> Self {
        Self::with_tuning(hal, Tuning::default())
    }

    /// Create a session with explicit retry tuning
    pub fn with_tuning(hal: H, tuning: Tuning) -> Self {
        let now = hal.now();
        Self {
            hal,
            tuning,
            config: Configuration::default(),
            pool: MessagePool::new(),
            ready: SlotQueue::new(),
            wait: SlotQueue::new(),
            timer: SlotQueue::new(),
            last_tx: now,
            last_rx: now,
        }
    }

    /// Drop all queued state and restore configuration defaults, as if the
    /// session had just been created
    pub fn reset(&mut self) {
        let now = self.hal.now();
        self.pool = MessagePool::new();
        self.ready.clear();
        self.wait.clear();
        self.timer.clear();
        self.last_tx = now;
        self.last_rx = now;
        self.config.reset();
    }

    /// Host abstraction, shared
    pub fn hal(&self) -> &H {
        &self.hal
    }

    /// Host abstraction, exclusive
    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    /// Configuration store, shared
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Configuration store, exclusive
    pub fn config_mut(&mut self) -> &mut Configuration {
        &mut self.config
    }

    /// Retry tuning in effect
    pub fn tuning(&self) -> Tuning {
        self.tuning
    }

    // ========================================================================
    // Public Operations
    // ========================================================================

    /// Queue a request for transmission.
    ///
    /// With `force`, pool exhaustion evicts the oldest evictable ready
    /// message and the push is retried once; BootNotification,
    /// StartTransaction and StopTransaction are never evicted.
    pub fn push_request(
        &mut self,
        action: Action,
        payload: Vec<u8>,
        force: bool,
    ) -> Result<(), Error> {
        let id = self.hal.next_message_id();
        let msg = Message::call(id, action, payload);

        let msg = match self.pool.alloc(msg) {
            Ok(idx) => {
                self.push_ready(idx);
                return Ok(());
            }
            Err(msg) => msg,
        };

        if !force {
            return Err(Error::OutOfMemory);
        }

        self.remove_oldest()?;
        match self.pool.alloc(msg) {
            Ok(idx) => {
                self.push_ready(idx);
                Ok(())
            }
            Err(_) => Err(Error::OutOfMemory),
        }
    }

    /// Queue a request to be released into the ready queue after
    /// `delay_sec` seconds. A zero delay queues it immediately.
    pub fn push_request_deferred(
        &mut self,
        action: Action,
        payload: Vec<u8>,
        delay_sec: u32,
    ) -> Result<(), Error> {
        let now = self.hal.now();
        let id = self.hal.next_message_id();
        let msg = Message::call(id, action, payload);
        let idx = self.pool.alloc(msg).map_err(|_| Error::OutOfMemory)?;

        if delay_sec == 0 {
            self.push_ready(idx);
        } else if let Some(entry) = self.pool.get_mut(idx) {
            entry.expiry = now + TimeSec::from(delay_sec);
            self.timer.push_back(idx);
            debug!("{} pushed to timer list", entry.body.action);
        }
        Ok(())
    }

    /// Queue a response to a previously received request. The response
    /// inherits the request's identifier and type; `is_error` selects
    /// CALLERROR over CALLRESULT.
    pub fn push_response(
        &mut self,
        req: &Message,
        payload: Vec<u8>,
        is_error: bool,
    ) -> Result<(), Error> {
        let msg = Message::response(req, payload, is_error);
        let idx = self.pool.alloc(msg).map_err(|_| Error::OutOfMemory)?;
        self.push_ready(idx);
        Ok(())
    }

    /// Messages currently queued in any of the three lists
    pub fn pending_requests(&self) -> usize {
        self.ready.len() + self.wait.len() + self.timer.len()
    }

    /// Free every queued message of the given type, across all three
    /// lists. Useful for clearing stale StatusNotifications after a
    /// reconnect. Returns the number of messages dropped.
    pub fn drop_pending(&mut self, action: Action) -> usize {
        let victims: heapless::Vec<usize, TX_POOL_LEN> = self
            .ready
            .iter()
            .chain(self.wait.iter())
            .chain(self.timer.iter())
            .copied()
            .filter(|&idx| {
                self.pool
                    .get(idx)
                    .is_some_and(|e| e.body.action == action)
            })
            .collect();

        for &idx in &victims {
            self.ready.remove(idx);
            self.wait.remove(idx);
            self.timer.remove(idx);
            self.free_slot(idx);
        }
        victims.len()
    }

    /// Type of the in-flight request the given response identifier would
    /// correlate with, if any
    pub fn pending_action(&self, id: &str) -> Option<Action> {
        self.find_in_wait(id)
            .and_then(|idx| self.pool.get(idx))
            .map(|e| e.body.action)
    }

    // ========================================================================
    // Step Engine
    // ========================================================================

    /// Advance the engine by one scheduling step:
    ///
    /// 1. Requeue or drop requests whose response deadline passed
    /// 2. Transmit at most one ready message
    /// 3. Poll the transport once and correlate the result
    /// 4. Synthesize a heartbeat if the link has been idle
    /// 5. Release due deferred requests into the ready queue
    ///
    /// A transport receive failure or a heartbeat allocation failure is
    /// returned after the remaining phases have run; retry-policy outcomes
    /// (requeues, drops) are reported through events, not errors.
    pub fn step(&mut self) -> Result<(), Error> {
        let now = self.hal.now();
        let mut first_err = None;

        self.process_wait_timeouts(now);
        self.transmit_ready(now);
        if let Err(e) = self.process_incoming(now) {
            first_err.get_or_insert(e);
        }
        if let Err(e) = self.process_heartbeat(now) {
            first_err.get_or_insert(e);
        }
        self.promote_timers(now);

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Phase 1: sweep the wait queue for expired requests. Exhausted
    /// droppable messages are freed; everything else goes back to the head
    /// of the ready queue so the retry preempts fresh pushes.
    fn process_wait_timeouts(&mut self, now: TimeSec) {
        let expired: heapless::Vec<usize, TX_POOL_LEN> = self
            .wait
            .iter()
            .copied()
            .filter(|&idx| self.pool.get(idx).is_some_and(|e| e.expiry <= now))
            .collect();

        for idx in expired {
            self.wait.remove(idx);
            let Some(entry) = self.pool.get(idx) else {
                continue;
            };
            if self.should_drop(entry.body.action, entry.attempts) {
                info!("dropping message {}", entry.body.action);
                self.free_slot(idx);
            } else {
                info!("retrying message {}", entry.body.action);
                self.ready.push_front(idx);
            }
        }
    }

    /// Phase 2: transmit the head of the ready queue, unless a request is
    /// already in flight
    fn transmit_ready(&mut self, now: TimeSec) {
        if !self.wait.is_empty() {
            return;
        }
        let Some(idx) = self.ready.pop_front() else {
            return;
        };

        let (role, action, attempts) = {
            let Some(entry) = self.pool.get_mut(idx) else {
                return;
            };
            entry.attempts += 1;
            entry.expiry = now + TimeSec::from(self.tuning.tx_timeout_sec);
            (entry.body.role, entry.body.action, entry.attempts)
        };

        info!(
            "tx: {} ({}/{}) waiting up to {}s",
            action,
            attempts,
            self.tuning.tx_retries + 1,
            self.tuning.tx_timeout_sec
        );

        let sent = match self.pool.get(idx) {
            Some(entry) => self.hal.send(&entry.body),
            None => return,
        };

        match sent {
            Ok(()) if role == Role::Call => self.wait.push_back(idx),
            Ok(()) => {
                // Response delivered, nothing to correlate
                self.free_slot(idx);
            }
            Err(_) => {
                if attempts <= self.tuning.tx_retries || !action.is_droppable() {
                    self.wait.push_back(idx);
                } else {
                    self.free_slot(idx);
                }
            }
        }
    }

    /// Phase 3: poll the transport once and route the result
    fn process_incoming(&mut self, now: TimeSec) -> Result<(), Error> {
        let (received, unsupported) = match self.hal.recv() {
            Ok(Some(msg)) => (msg, false),
            Ok(None) => return Ok(()),
            Err(RecvError::Unsupported(msg)) => (msg, true),
            Err(RecvError::Transport(code)) => {
                warn!("receive failed ({code})");
                return Err(Error::Transport(code));
            }
        };

        self.last_rx = now;

        match received.role {
            Role::Call => {
                info!("rx: {}.req", received.action);
                if unsupported {
                    // The host could not decode the request; answer with a
                    // CALLERROR instead of surfacing it.
                    if self.push_response(&received, Vec::new(), true).is_err() {
                        warn!("no room to answer unsupported {}", received.action);
                    }
                } else {
                    self.hal.on_event(Event::Incoming(&received));
                }
            }
            Role::CallResult | Role::CallError => {
                self.process_response(received, now);
            }
        }
        Ok(())
    }

    /// Correlate a response against the wait queue and settle the request
    fn process_response(&mut self, received: Message, now: TimeSec) {
        let Some(idx) = self.find_in_wait(received.id.as_str()) else {
            error!("no matching request for response {}", received.action);
            self.hal.on_event(Event::Failed {
                message: &received,
                error: Error::NoCorrelation,
            });
            return;
        };

        self.wait.remove(idx);
        if let Some(entry) = self.pool.get(idx) {
            info!("rx: {}.conf", entry.body.action);
        }

        // The round-trip completes on the response, not on the send.
        self.last_tx = now;

        let free_req = match received.role {
            Role::CallError => self.handle_call_error(idx, now),
            _ => true,
        };
        if free_req {
            self.free_slot(idx);
        }

        self.hal.on_event(Event::Incoming(&received));
    }

    /// The server rejected the request. Transaction-related requests go
    /// back into the wait queue with an arithmetic backoff until their
    /// configured attempt budget runs out; everything else is settled.
    /// Returns whether the request slot should be freed.
    fn handle_call_error(&mut self, idx: usize, now: TimeSec) -> bool {
        let Some(entry) = self.pool.get(idx) else {
            return false;
        };
        if !entry.body.action.is_transaction_related() {
            return true;
        }

        let max_attempts = self.config.transaction_message_attempts();
        if entry.attempts >= max_attempts {
            return true;
        }

        let expiry = self.next_period(entry.body.action, entry.attempts, now);
        let action = entry.body.action;
        let attempts = entry.attempts;
        if let Some(entry) = self.pool.get_mut(idx) {
            entry.expiry = expiry;
        }
        self.wait.push_back(idx);
        info!(
            "{} will be sent again at {} ({}/{})",
            action, expiry, attempts, max_attempts
        );
        false
    }

    /// Phase 4: synthesize a keep-alive when the link is idle. The
    /// heartbeat goes through the normal ready queue and an extra transmit
    /// pass, so it obeys the one-in-flight rule like any other request.
    fn process_heartbeat(&mut self, now: TimeSec) -> Result<(), Error> {
        if !self.should_send_heartbeat(now) {
            return Ok(());
        }

        let id = self.hal.next_message_id();
        let msg = Message::call(id, Action::Heartbeat, Vec::new());
        let idx = self.pool.alloc(msg).map_err(|_| Error::OutOfMemory)?;
        self.push_ready(idx);
        self.transmit_ready(now);
        Ok(())
    }

    /// Keep-alive is due when heartbeats are enabled, no outbound work is
    /// pending and no round-trip completed within the interval.
    fn should_send_heartbeat(&self, now: TimeSec) -> bool {
        let interval = TimeSec::from(self.config.heartbeat_interval());
        if interval == 0 || !self.ready.is_empty() || !self.wait.is_empty() {
            return false;
        }
        now.saturating_sub(self.last_tx) >= interval
    }

    /// Phase 5: release due deferred requests into the ready queue
    fn promote_timers(&mut self, now: TimeSec) {
        let due: heapless::Vec<usize, TX_POOL_LEN> = self
            .timer
            .iter()
            .copied()
            .filter(|&idx| self.pool.get(idx).is_some_and(|e| e.expiry <= now))
            .collect();

        for idx in due {
            self.timer.remove(idx);
            self.push_ready(idx);
        }
    }

    // ========================================================================
    // Policy
    // ========================================================================

    /// A droppable message is freed once it has used up its
    /// `tx_retries + 1` transmissions without a response
    fn should_drop(&self, action: Action, attempts: u32) -> bool {
        action.is_droppable() && attempts > self.tuning.tx_retries
    }

    /// Deadline for the next delivery attempt of a request the server has
    /// seen but not accepted: transaction messages back off linearly in
    /// their attempt count, keep-alive-class messages wait one heartbeat
    /// interval, everything else retries on the transmission timeout.
    fn next_period(&self, action: Action, attempts: u32, now: TimeSec) -> TimeSec {
        let interval = if action.is_transaction_related() {
            self.config.transaction_message_retry_interval() * attempts
        } else if matches!(action, Action::BootNotification | Action::Heartbeat) {
            self.config.heartbeat_interval()
        } else {
            self.tuning.tx_timeout_sec
        };
        now + TimeSec::from(interval)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn push_ready(&mut self, idx: usize) {
        if let Some(entry) = self.pool.get(idx) {
            debug!("{} pushed to ready list", entry.body.action);
        }
        self.ready.push_back(idx);
    }

    /// Scan the wait queue for the request the given response identifier
    /// belongs to. Compared by prefix: the stored identifier must start
    /// with the received one, so the id generator has to keep identifiers
    /// prefix-free.
    fn find_in_wait(&self, id: &str) -> Option<usize> {
        self.wait
            .iter()
            .copied()
            .find(|&idx| {
                self.pool
                    .get(idx)
                    .is_some_and(|e| e.body.id.as_str().starts_with(id))
            })
    }

    /// Walk the ready queue from its head and free the first message not
    /// protected from eviction. Fails when every ready message is
    /// protected.
    fn remove_oldest(&mut self) -> Result<(), Error> {
        let victim = self
            .ready
            .iter()
            .copied()
            .find(|&idx| {
                self.pool
                    .get(idx)
                    .is_some_and(|e| e.body.action.is_evictable())
            });

        match victim {
            Some(idx) => {
                if let Some(entry) = self.pool.get(idx) {
                    warn!("removing the oldest message: {}", entry.body.action);
                }
                self.ready.remove(idx);
                self.free_slot(idx);
                Ok(())
            }
            None => Err(Error::OutOfMemory),
        }
    }

    /// Release a slot, notifying the host first so it can drop whatever it
    /// associates with the message
    fn free_slot(&mut self, idx: usize) {
        if let Some(entry) = self.pool.get(idx) {
            self.hal.on_event(Event::Free(&entry.body));
        }
        self.pool.clear(idx);
    }
}
