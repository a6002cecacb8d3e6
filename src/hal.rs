//! Host abstraction layer.
//!
//! Everything the engine needs from its surroundings comes through the
//! [`Hal`] trait: wall time, the wire transport, identifier generation and
//! the lifecycle-event callback. Wire framing (JSON, WebSocket) lives
//! entirely on the host side; the engine only sees typed [`Message`]
//! records.
//!
//! # Implementing a HAL
//!
//! ```ignore
//! struct MyHal { /* socket, rng, ... */ }
//!
//! impl Hal for MyHal {
//!     fn now(&self) -> TimeSec {
//!         // Read the RTC, whole seconds, non-decreasing
//!     }
//!
//!     fn send(&mut self, msg: &Message) -> Result<(), Error> {
//!         // Frame and hand to the WebSocket; may block
//!     }
//!
//!     // ... implement other methods
//! }
//! ```
//!
//! Callbacks run while the engine is mutably borrowed, so an event handler
//! cannot call back into the session. A host that wants to answer an
//! incoming CALL records it from [`Hal::on_event`] and pushes the response
//! once the `step` call has returned.

use crate::error::Error;
use crate::types::{Event, Message, MessageId, TimeSec};

// ============================================================================
// Receive Outcome
// ============================================================================

/// Failure modes of [`Hal::recv`]
#[derive(Debug)]
pub enum RecvError {
    /// The transport failed with a host-specific code
    Transport(i32),
    /// The host decoded a CALL it cannot handle; the engine answers it with
    /// a CALLERROR on the host's behalf
    Unsupported(Message),
}

// ============================================================================
// HAL Trait
// ============================================================================

/// Host-provided primitives
pub trait Hal {
    /// Current wall time in whole seconds.
    ///
    /// Must be non-decreasing across calls.
    fn now(&self) -> TimeSec;

    /// Produce a fresh message identifier.
    ///
    /// Identifiers must be unique among requests awaiting a response;
    /// correlation depends on it.
    fn next_message_id(&mut self) -> MessageId;

    /// Hand a message to the transport. May block.
    fn send(&mut self, msg: &Message) -> Result<(), Error>;

    /// Try to fetch one inbound message. `Ok(None)` means nothing is
    /// pending. May block briefly.
    fn recv(&mut self) -> Result<Option<Message>, RecvError>;

    /// Message lifecycle notification, see [`Event`].
    fn on_event(&mut self, event: Event<'_>);
}

// ============================================================================
// Mock HAL (for testing)
// ============================================================================

/// Scripted in-memory HAL used by the test suites
pub mod mock {
    use super::*;
    use core::fmt::Write;
    use std::collections::VecDeque;

    /// Owned record of a dispatched [`Event`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum EventKind {
        /// [`Event::Incoming`]
        Incoming,
        /// [`Event::Outgoing`]
        Outgoing,
        /// [`Event::Free`]
        Free,
        /// [`Event::Failed`]
        Failed,
    }

    /// HAL double with a scripted clock, a scripted inbound queue and
    /// recording of everything the engine sends or reports
    #[derive(Debug, Default)]
    pub struct MockHal {
        now: TimeSec,
        next_id: u32,
        inbound: VecDeque<Result<Option<Message>, RecvError>>,
        /// When set, `send` records the frame and fails with this code
        pub send_error: Option<i32>,
        /// Every frame handed to `send`, in order
        pub sent: Vec<Message>,
        /// Every dispatched event, in order
        pub events: Vec<(EventKind, Message)>,
    }

    impl MockHal {
        /// Fresh mock at t=0
        pub fn new() -> Self {
            Self::default()
        }

        /// Move the scripted clock to `t`
        pub fn set_now(&mut self, t: TimeSec) {
            self.now = t;
        }

        /// Advance the scripted clock by `dt` seconds
        pub fn advance(&mut self, dt: TimeSec) {
            self.now += dt;
        }

        /// Queue a message for the next `recv`
        pub fn push_incoming(&mut self, msg: Message) {
            self.inbound.push_back(Ok(Some(msg)));
        }

        /// Queue a receive failure for the next `recv`
        pub fn push_recv_error(&mut self, err: RecvError) {
            self.inbound.push_back(Err(err));
        }

        /// Most recently sent frame, if any
        pub fn last_sent(&self) -> Option<&Message> {
            self.sent.last()
        }

        /// Drain the recorded events
        pub fn take_events(&mut self) -> Vec<(EventKind, Message)> {
            core::mem::take(&mut self.events)
        }

        /// Build a bounded message id from a literal, truncating at the
        /// capacity bound
        pub fn message_id(text: &str) -> MessageId {
            let mut id = MessageId::new();
            for c in text.chars() {
                if id.push(c).is_err() {
                    break;
                }
            }
            id
        }
    }

    impl Hal for MockHal {
        fn now(&self) -> TimeSec {
            self.now
        }

        fn next_message_id(&mut self) -> MessageId {
            self.next_id += 1;
            let mut id = MessageId::new();
            let _ = write!(id, "m-{:08x}", self.next_id);
            id
        }

        fn send(&mut self, msg: &Message) -> Result<(), Error> {
            self.sent.push(msg.clone());
            match self.send_error {
                Some(code) => Err(Error::Transport(code)),
                None => Ok(()),
            }
        }

        fn recv(&mut self) -> Result<Option<Message>, RecvError> {
            self.inbound.pop_front().unwrap_or(Ok(None))
        }

        fn on_event(&mut self, event: Event<'_>) {
            let record = match event {
                Event::Incoming(msg) => (EventKind::Incoming, msg.clone()),
                Event::Outgoing(msg) => (EventKind::Outgoing, msg.clone()),
                Event::Free(msg) => (EventKind::Free, msg.clone()),
                Event::Failed { message, .. } => (EventKind::Failed, message.clone()),
            };
            self.events.push(record);
        }
    }

}
