//! Error types for the relay layer.

use matchlink_protocol::{AllocationId, JoinCode};

/// Errors a relay service can return.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The join code is unknown or its allocation was released.
    #[error("join code {0} is invalid or expired")]
    InvalidCode(JoinCode),

    /// No more allocations can be created right now.
    #[error("relay allocation quota exceeded")]
    QuotaExceeded,

    /// The host allocation already has `max_connections` peers.
    #[error("allocation {0} has no free connection")]
    Full(AllocationId),

    /// The relay service could not be reached.
    #[error("relay service unreachable: {0}")]
    Unreachable(String),

    /// The allocation id is unknown.
    #[error("allocation {0} not found")]
    AllocationNotFound(AllocationId),
}
