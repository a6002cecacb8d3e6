//! Crate-level error type.

use thiserror::Error;

/// Errors surfaced by the session engine
#[derive(Debug, Error)]
pub enum Error {
    /// The message pool has no free slot
    #[error("message pool exhausted")]
    OutOfMemory,

    /// An inbound response matched no pending request
    #[error("no pending request matches the response id")]
    NoCorrelation,

    /// The host transport failed with the given code
    #[error("transport failure ({0})")]
    Transport(i32),

    /// A message type name was not part of the OCPP 1.6 set
    #[error("unknown message type: {0}")]
    UnknownAction(String),

    /// A configuration key name was not recognized
    #[error("unknown configuration key: {0}")]
    UnknownKey(String),

    /// Attempted write to a read-only configuration key
    #[error("configuration key {0} is read-only")]
    ReadOnlyKey(&'static str),

    /// The supplied value does not match the key's type
    #[error("configuration value type does not match key {0}")]
    ValueType(&'static str),

    /// The snapshot buffer cannot hold the serialized state
    #[error("snapshot buffer too small, {needed} bytes required")]
    BufferTooSmall {
        /// Bytes required for the full snapshot
        needed: usize,
    },

    /// The snapshot header failed validation
    #[error("snapshot header mismatch")]
    BadSnapshot,

    /// Snapshot serialization failed
    #[error("snapshot codec: {0}")]
    Codec(#[from] serde_json::Error),
}
