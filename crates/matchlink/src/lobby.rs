//! Lobby list entries handed to presentation code.

use matchlink_protocol::{Session, SessionId};
use serde::{Deserialize, Serialize};

/// One row of the lobby browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyListing {
    /// Pass this to `join_lobby`.
    pub id: SessionId,
    pub name: String,
    pub player_count: usize,
    pub max_players: usize,
    pub available_slots: usize,
}

impl From<&Session> for LobbyListing {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            name: session.name.clone(),
            player_count: session.player_count(),
            max_players: session.max_players,
            available_slots: session.available_slots(),
        }
    }
}
