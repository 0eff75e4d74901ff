//! Core session types shared by the directory, the orchestrator, and
//! presentation code.
//!
//! A "session" is what players see as a lobby: a discoverable record in
//! the directory service that says "there's a match here, and this is how
//! to reach it". It never carries network addresses. The only routing
//! information it holds is the relay join code, stored as metadata.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Metadata key under which the host publishes its relay join code.
pub const JOIN_CODE_KEY: &str = "joinCode";

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A player's identity as issued by the sign-in provider.
///
/// Directory services hand these out as opaque strings, so that's what we
/// store. The newtype keeps a `PlayerId` from being passed where a
/// `SessionId` is expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Creates a player id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The directory's identifier for a session (lobby).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Creates a session id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` for the empty id, which no directory ever issues.
    pub fn is_unset(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Visibility
// ---------------------------------------------------------------------------

/// Whether a session shows up in queries and quick-join.
///
/// Private sessions can only be joined by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

/// Who may read a metadata entry.
///
/// - **Public**: anyone who can see the session (including queries).
/// - **Member**: only players who joined the session. This is where the
///   join code lives, so browsing the list alone never leaks it.
/// - **Private**: only the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataVisibility {
    Public,
    Member,
    Private,
}

/// A single metadata value with its visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataObject {
    pub visibility: DataVisibility,
    pub value: String,
}

impl DataObject {
    pub fn new(visibility: DataVisibility, value: impl Into<String>) -> Self {
        Self {
            visibility,
            value: value.into(),
        }
    }

    /// Shorthand for a member-only entry.
    pub fn member(value: impl Into<String>) -> Self {
        Self::new(DataVisibility::Member, value)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A lobby as the directory describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    /// The player currently hosting. Always the first entry of `players`.
    pub host_id: PlayerId,
    pub max_players: usize,
    pub visibility: Visibility,
    pub data: BTreeMap<String, DataObject>,
    pub players: Vec<PlayerId>,
    /// Creation time in milliseconds since the directory's epoch.
    pub created_at: u64,
}

impl Session {
    /// Number of players currently in the session.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Open slots left. Saturates at zero.
    pub fn available_slots(&self) -> usize {
        self.max_players.saturating_sub(self.players.len())
    }

    pub fn is_member(&self, player: &PlayerId) -> bool {
        self.players.iter().any(|p| p == player)
    }

    /// Looks up a metadata value regardless of its visibility.
    pub fn data_value(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(|d| d.value.as_str())
    }

    /// The relay join code published by the host, if visible.
    pub fn join_code(&self) -> Option<&str> {
        self.data_value(JOIN_CODE_KEY)
    }

    /// Returns a copy with the metadata `viewer` is not allowed to see
    /// removed. `None` means an anonymous viewer (e.g. a list query).
    pub fn redacted_for(&self, viewer: Option<&PlayerId>) -> Session {
        let is_member = viewer.is_some_and(|v| self.is_member(v));
        let is_host = viewer.is_some_and(|v| *v == self.host_id);

        let mut copy = self.clone();
        copy.data.retain(|_, d| match d.visibility {
            DataVisibility::Public => true,
            DataVisibility::Member => is_member,
            DataVisibility::Private => is_host,
        });
        copy
    }
}

/// Parameters for publishing a new session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub name: String,
    pub max_players: usize,
    pub visibility: Visibility,
    pub data: BTreeMap<String, DataObject>,
}

impl CreateSessionRequest {
    /// A public session with no metadata.
    pub fn new(name: impl Into<String>, max_players: usize) -> Self {
        Self {
            name: name.into(),
            max_players,
            visibility: Visibility::Public,
            data: BTreeMap::new(),
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: DataObject) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_code() -> Session {
        let mut data = BTreeMap::new();
        data.insert(JOIN_CODE_KEY.to_string(), DataObject::member("ABC123"));
        data.insert(
            "mode".to_string(),
            DataObject::new(DataVisibility::Public, "ffa"),
        );
        data.insert(
            "secret".to_string(),
            DataObject::new(DataVisibility::Private, "s3cr3t"),
        );
        Session {
            id: SessionId::new("lobby-1"),
            name: "Arena".into(),
            host_id: PlayerId::new("host"),
            max_players: 8,
            visibility: Visibility::Public,
            data,
            players: vec![PlayerId::new("host"), PlayerId::new("guest")],
            created_at: 0,
        }
    }

    #[test]
    fn test_available_slots_counts_open_seats() {
        let s = session_with_code();
        assert_eq!(s.player_count(), 2);
        assert_eq!(s.available_slots(), 6);
    }

    #[test]
    fn test_available_slots_saturates_when_overfull() {
        let mut s = session_with_code();
        s.max_players = 1;
        assert_eq!(s.available_slots(), 0);
    }

    #[test]
    fn test_redacted_for_anonymous_hides_member_and_private() {
        let s = session_with_code().redacted_for(None);
        assert_eq!(s.join_code(), None);
        assert_eq!(s.data_value("secret"), None);
        assert_eq!(s.data_value("mode"), Some("ffa"));
    }

    #[test]
    fn test_redacted_for_member_shows_join_code() {
        let s = session_with_code().redacted_for(Some(&PlayerId::new("guest")));
        assert_eq!(s.join_code(), Some("ABC123"));
        assert_eq!(s.data_value("secret"), None);
    }

    #[test]
    fn test_redacted_for_host_shows_everything() {
        let s = session_with_code().redacted_for(Some(&PlayerId::new("host")));
        assert_eq!(s.join_code(), Some("ABC123"));
        assert_eq!(s.data_value("secret"), Some("s3cr3t"));
    }

    #[test]
    fn test_session_id_unset() {
        assert!(SessionId::new("").is_unset());
        assert!(!SessionId::new("x").is_unset());
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let json = serde_json::to_string(&PlayerId::new("p-1")).unwrap();
        assert_eq!(json, "\"p-1\"");
        let sid: SessionId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(sid, SessionId::new("abc"));
    }
}
