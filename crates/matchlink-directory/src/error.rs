//! Error types for the directory layer.

use matchlink_protocol::{PlayerId, SessionId};

/// Errors a session directory can return.
///
/// Each variant maps to a rejection the real lobby service can send back.
/// Callers usually only care whether the failure was "not found" (see
/// [`DirectoryError::is_not_found`]) because that drives the user-facing
/// "Cannot find a lobby" message.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The session does not exist (never did, was deleted, or expired
    /// because nobody sent a heartbeat).
    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    /// Quick-join found no session matching the criteria.
    #[error("no session matches the quick-join criteria")]
    NoMatchingSession,

    /// The session has no open slot.
    #[error("session {0} is full")]
    Full(SessionId),

    /// The player is already a member of this session.
    #[error("player {0} is already in session {1}")]
    AlreadyMember(PlayerId, SessionId),

    /// The service rejected the request as malformed (bad name, bad
    /// capacity, etc.).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The caller has too many sessions or the service is at capacity.
    #[error("session quota exceeded")]
    QuotaExceeded,

    /// The service could not be reached.
    #[error("directory service unavailable: {0}")]
    Unavailable(String),

    /// Signing in failed.
    #[error("authentication failed: {0}")]
    AuthFailed(String),
}

impl DirectoryError {
    /// `true` for both "no such session" and "nothing to quick-join".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SessionNotFound(_) | Self::NoMatchingSession)
    }
}
