//! Orchestrator lifecycle and the status messages presentation code shows.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// OrchestratorState
// ---------------------------------------------------------------------------

/// Where the orchestrator is in its lifecycle.
///
/// ```text
///            create_lobby                       first peer
/// Idle ──→ Searching ──→ HostingWaitingForPlayers ──→ HostingInSession
///   │                                   ↑                  │
///   │                                   └── last peer left ┘
///   │   quick_join / join_lobby
///   └──→ Searching ──→ Joining ──→ Joined
/// ```
///
/// Every failed flow and every `leave()` returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrchestratorState {
    #[default]
    Idle,
    /// A create or join flow is talking to the directory or relay.
    Searching,
    HostingWaitingForPlayers,
    HostingInSession,
    /// Directory join done, relay join and transport bind in progress.
    Joining,
    Joined,
}

impl OrchestratorState {
    /// `true` while a session is active (hosted or joined).
    pub fn has_session(&self) -> bool {
        matches!(
            self,
            Self::HostingWaitingForPlayers | Self::HostingInSession | Self::Joined
        )
    }

    pub fn is_hosting(&self) -> bool {
        matches!(self, Self::HostingWaitingForPlayers | Self::HostingInSession)
    }

    /// `true` while a create or join flow is in flight.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Searching | Self::Joining)
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Searching => write!(f, "Searching"),
            Self::HostingWaitingForPlayers => write!(f, "HostingWaitingForPlayers"),
            Self::HostingInSession => write!(f, "HostingInSession"),
            Self::Joining => write!(f, "Joining"),
            Self::Joined => write!(f, "Joined"),
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// User-facing status lines, delivered as
/// [`Notification::StateChanged`](crate::Notification::StateChanged).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    LookingForMatch,
    CreatingMatch,
    MatchFound,
    WaitingForPlayers,
    LobbyNotFound,
    PlayerFound,
    CreateFailed,
    JoinFailed,
    NameRequired,
    LeftMatch,
}

impl Status {
    pub fn message(&self) -> &'static str {
        match self {
            Self::LookingForMatch => "Looking for a match...",
            Self::CreatingMatch => "Creating a new match...",
            Self::MatchFound => "Match found!",
            Self::WaitingForPlayers => "Waiting for players...",
            Self::LobbyNotFound => "Cannot find a lobby",
            Self::PlayerFound => "Player found!",
            Self::CreateFailed => "Could not create a match",
            Self::JoinFailed => "Could not join the match",
            Self::NameRequired => "Lobby name is required",
            Self::LeftMatch => "Left the match",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}
