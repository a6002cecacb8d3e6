//! # ocpp-core: charge-point session core for OCPP 1.6
//!
//! The message-lifecycle engine sitting between a charging station's local
//! logic and the Central System. It owns a bounded pool of outbound
//! messages, delivers them one at a time over a host-provided transport,
//! correlates responses by identifier, retries with class-dependent policy
//! and keeps the link alive with periodic heartbeats.
//!
//! What it deliberately does **not** do: wire framing, socket I/O, payload
//! interpretation, multi-connector state. Those stay on the host side of
//! the [`Hal`] trait; the engine treats payloads as opaque bytes.
//!
//! ## Message classes
//!
//! The retry policy is class-aware:
//! - **BootNotification** is never dropped; a charge point that cannot
//!   register has nothing better to do than keep trying.
//! - **StartTransaction / StopTransaction / MeterValues** are tied to a
//!   billing session and are never dropped by retry exhaustion. MeterValues
//!   alone may be evicted under pool overflow.
//! - Everything else gets a bounded attempt budget and is freed silently
//!   once it runs out.
//!
//! ## Quick start
//!
//! ```ignore
//! use ocpp_core::{Action, Session};
//!
//! let mut session = Session::new(my_hal);
//! session.push_request(Action::BootNotification, boot_payload, false)?;
//!
//! loop {
//!     session.step()?; // once per second, or on wake
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod hal;
mod pool;
pub mod session;
mod snapshot;
pub mod types;

pub use config::{ConfigKey, ConfigValue, Configuration};
pub use error::Error;
pub use hal::{Hal, RecvError};
pub use session::{Session, Tuning};
pub use types::{Action, Event, Message, MessageId, Role, TimeSec};
pub use types::{DEFAULT_TX_RETRIES, DEFAULT_TX_TIMEOUT_SEC, MESSAGE_ID_MAXLEN, TX_POOL_LEN};
