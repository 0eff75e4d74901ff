//! Unified error type for Matchlink.

use std::fmt;
use std::time::Duration;

use matchlink_directory::DirectoryError;
use matchlink_protocol::SessionId;
use matchlink_relay::RelayError;
use matchlink_transport::TransportError;

use crate::OrchestratorState;

/// Input rejected before any network call.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("lobby name is required")]
    EmptyLobbyName,

    /// `max_players` must leave room for at least one remote player, and
    /// the relay must not admit more peers than the lobby can hold.
    #[error("invalid capacity: max_players {max_players}, max_connections {max_connections}")]
    InvalidCapacity {
        max_players: usize,
        max_connections: usize,
    },

    #[error("heartbeat interval {0:?} is below the one second minimum")]
    HeartbeatInterval(Duration),

    /// Beats would arrive too late to keep the session listed.
    #[error("heartbeat interval {interval:?} is not shorter than session expiry {expiry:?}")]
    HeartbeatTooSlow { interval: Duration, expiry: Duration },
}

/// The external call a flow was making.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    SignIn,
    CreateAllocation,
    GetJoinCode,
    CreateSession,
    QuickJoin,
    JoinSession,
    QuerySessions,
    JoinAllocation,
    BindTransport,
    Heartbeat,
    LeaveSession,
    DeleteSession,
    ShutdownTransport,
    ReleaseAllocation,
    ReleaseJoin,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SignIn => "sign in",
            Self::CreateAllocation => "create allocation",
            Self::GetJoinCode => "get join code",
            Self::CreateSession => "create session",
            Self::QuickJoin => "quick join",
            Self::JoinSession => "join session",
            Self::QuerySessions => "query sessions",
            Self::JoinAllocation => "join allocation",
            Self::BindTransport => "bind transport",
            Self::Heartbeat => "heartbeat",
            Self::LeaveSession => "leave session",
            Self::DeleteSession => "delete session",
            Self::ShutdownTransport => "shutdown transport",
            Self::ReleaseAllocation => "release allocation",
            Self::ReleaseJoin => "release join allocation",
        };
        f.write_str(name)
    }
}

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each wrapped variant generates the `From`
/// impl, so `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum MatchlinkError {
    /// The lobby service rejected a call.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// The relay rejected a call.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// The transport failed to bind or shut down.
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Another flow is running or a session is already active.
    #[error("orchestrator busy ({0})")]
    Busy(OrchestratorState),

    /// An external call did not answer within `call_timeout`.
    #[error("{step} timed out")]
    Timeout { step: Step },

    /// The joined session carries no relay join code.
    #[error("session {0} has no join code")]
    MissingJoinCode(SessionId),
}

impl MatchlinkError {
    /// `true` when the directory had no such session (or nothing to
    /// quick-join).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Directory(e) if e.is_not_found())
    }
}
