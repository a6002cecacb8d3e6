//! Configuration store.
//!
//! A keyed map of OCPP 1.6 core-profile options with typed read/write and
//! per-key write protection. The session engine consumes
//! `HeartbeatInterval`, `TransactionMessageRetryInterval` and
//! `TransactionMessageAttempts`; the remaining keys exist for the host's
//! GetConfiguration/ChangeConfiguration handling.

use serde::{Deserialize, Serialize};

use crate::error::Error;

// ============================================================================
// Keys
// ============================================================================

/// Recognized configuration keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigKey {
    /// Seconds between keep-alive requests; 0 disables heartbeats
    HeartbeatInterval,
    /// Base seconds for transaction-message backoff
    TransactionMessageRetryInterval,
    /// Delivery attempts allowed for a transaction-related message
    TransactionMessageAttempts,
    /// Seconds before an idle authorization is abandoned
    ConnectionTimeOut,
    /// Seconds between periodic meter samples; 0 disables sampling
    MeterValueSampleInterval,
    /// Attempts for a requested reset before giving up
    ResetRetries,
    /// Whether remote start requests carry an authorization step
    AuthorizeRemoteTxRequests,
    /// Connector count of this charge point (read-only)
    NumberOfConnectors,
    /// Feature profiles this implementation announces (read-only)
    SupportedFeatureProfiles,
}

const CONFIG_KEY_COUNT: usize = 9;

impl ConfigKey {
    /// All keys, in storage order
    pub const ALL: [ConfigKey; CONFIG_KEY_COUNT] = [
        ConfigKey::HeartbeatInterval,
        ConfigKey::TransactionMessageRetryInterval,
        ConfigKey::TransactionMessageAttempts,
        ConfigKey::ConnectionTimeOut,
        ConfigKey::MeterValueSampleInterval,
        ConfigKey::ResetRetries,
        ConfigKey::AuthorizeRemoteTxRequests,
        ConfigKey::NumberOfConnectors,
        ConfigKey::SupportedFeatureProfiles,
    ];

    /// Key name as it appears on the wire
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::HeartbeatInterval => "HeartbeatInterval",
            ConfigKey::TransactionMessageRetryInterval => "TransactionMessageRetryInterval",
            ConfigKey::TransactionMessageAttempts => "TransactionMessageAttempts",
            ConfigKey::ConnectionTimeOut => "ConnectionTimeOut",
            ConfigKey::MeterValueSampleInterval => "MeterValueSampleInterval",
            ConfigKey::ResetRetries => "ResetRetries",
            ConfigKey::AuthorizeRemoteTxRequests => "AuthorizeRemoteTxRequests",
            ConfigKey::NumberOfConnectors => "NumberOfConnectors",
            ConfigKey::SupportedFeatureProfiles => "SupportedFeatureProfiles",
        }
    }

    /// Whether the central system may rewrite the key
    pub fn read_only(self) -> bool {
        matches!(
            self,
            ConfigKey::NumberOfConnectors | ConfigKey::SupportedFeatureProfiles
        )
    }

    fn default_value(self) -> ConfigValue {
        match self {
            ConfigKey::HeartbeatInterval => ConfigValue::Int(300),
            ConfigKey::TransactionMessageRetryInterval => ConfigValue::Int(60),
            ConfigKey::TransactionMessageAttempts => ConfigValue::Int(3),
            ConfigKey::ConnectionTimeOut => ConfigValue::Int(60),
            ConfigKey::MeterValueSampleInterval => ConfigValue::Int(0),
            ConfigKey::ResetRetries => ConfigValue::Int(1),
            ConfigKey::AuthorizeRemoteTxRequests => ConfigValue::Bool(false),
            ConfigKey::NumberOfConnectors => ConfigValue::Int(1),
            ConfigKey::SupportedFeatureProfiles => {
                ConfigValue::Text("Core,FirmwareManagement,Reservation,SmartCharging".to_string())
            }
        }
    }
}

impl core::fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for ConfigKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::UnknownKey(s.to_string()))
    }
}

// ============================================================================
// Values
// ============================================================================

/// Typed configuration value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigValue {
    /// Unsigned integer option
    Int(u32),
    /// Boolean option
    Bool(bool),
    /// Free-text option
    Text(String),
}

// ============================================================================
// Store
// ============================================================================

/// The option store. Created with defaults; [`Configuration::reset`]
/// restores them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    values: [ConfigValue; CONFIG_KEY_COUNT],
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            values: core::array::from_fn(|i| ConfigKey::ALL[i].default_value()),
        }
    }
}

impl Configuration {
    /// Read a value
    pub fn get(&self, key: ConfigKey) -> &ConfigValue {
        &self.values[key as usize]
    }

    /// Write a value. Fails on read-only keys and on values whose type does
    /// not match the key's.
    pub fn set(&mut self, key: ConfigKey, value: ConfigValue) -> Result<(), Error> {
        if key.read_only() {
            return Err(Error::ReadOnlyKey(key.as_str()));
        }
        let slot = &mut self.values[key as usize];
        if core::mem::discriminant(slot) != core::mem::discriminant(&value) {
            return Err(Error::ValueType(key.as_str()));
        }
        *slot = value;
        Ok(())
    }

    /// Restore every key to its default
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn int(&self, key: ConfigKey) -> u32 {
        match self.get(key) {
            ConfigValue::Int(v) => *v,
            _ => 0,
        }
    }

    /// Seconds between keep-alives; 0 disables them
    pub fn heartbeat_interval(&self) -> u32 {
        self.int(ConfigKey::HeartbeatInterval)
    }

    /// Base seconds for transaction-message backoff
    pub fn transaction_message_retry_interval(&self) -> u32 {
        self.int(ConfigKey::TransactionMessageRetryInterval)
    }

    /// Delivery attempts allowed for a transaction-related message
    pub fn transaction_message_attempts(&self) -> u32 {
        self.int(ConfigKey::TransactionMessageAttempts)
    }
}
