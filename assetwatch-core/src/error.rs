//! Error types for the discovery and monitoring core.
//!
//! Probe failures are deliberately absent here: an unreachable device is data
//! (see [`crate::probe::ProbeFailure`]), not an error.

use crate::model::DeviceId;

/// Malformed input rejected at the boundary, before any probing begins.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("invalid CIDR block '{input}': {reason}")]
    InvalidCidr { input: String, reason: String },
    #[error("block {cidr} is wider than the allowed /{min_prefix}")]
    BlockTooWide { cidr: String, min_prefix: u8 },
    #[error("invalid IPv4 address '{0}'")]
    InvalidAddress(String),
    #[error("invalid hardware address '{0}'")]
    InvalidHardwareAddress(String),
}

/// Failure of the external bulk-sweep capability itself.
///
/// Distinct from a successful sweep that found nothing.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("failed to launch sweep tool '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("sweep tool exited with status {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },
    #[error("sweep output could not be parsed: {0}")]
    Parse(String),
    #[error("sweep did not finish within {0:?}")]
    Timeout(std::time::Duration),
}

/// Error reported by a discovery run.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("sweep of {cidr} failed: {source}")]
    Sweep {
        cidr: String,
        #[source]
        source: SweepError,
    },
}

/// Which uniqueness key a conflicting write collided on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKey {
    Address,
    HardwareAddress,
}

impl std::fmt::Display for ClaimKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimKey::Address => f.write_str("address"),
            ClaimKey::HardwareAddress => f.write_str("hardware address"),
        }
    }
}

/// Errors raised by an inventory store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{key} {value} is already claimed by device {existing}")]
    Conflict {
        key: ClaimKey,
        value: String,
        existing: DeviceId,
    },
    #[error("device {0} not found")]
    DeviceNotFound(DeviceId),
    #[error("subnet {0} not found")]
    SubnetNotFound(u64),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the reachability monitor outside of probe outcomes.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("device {0} has no address to probe")]
    NoAddress(DeviceId),
    #[error("device {0} is not registered")]
    UnknownDevice(DeviceId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure to publish an event to the outside world.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("event transport failed: {0}")]
    Transport(String),
}
