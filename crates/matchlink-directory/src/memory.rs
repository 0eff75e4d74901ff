//! In-process session directory.
//!
//! Behaves like a hosted lobby service closely enough to test the
//! orchestrator against it:
//! - sessions expire when the host stops sending heartbeats
//! - member-only metadata is hidden from list queries
//! - the host role migrates when the host leaves, and the session goes
//!   away when the last player leaves
//!
//! # Time
//!
//! Expiry uses `tokio::time::Instant`, so tests running with a paused
//! clock (`#[tokio::test(start_paused = true)]`) can fast-forward past the
//! expiry window without sleeping for real.
//!
//! # Concurrency
//!
//! `InMemoryDirectory` is a cheap handle around shared state. Clone it to
//! give the same directory to several orchestrators (a host and its
//! clients, say).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use matchlink_protocol::{
    CreateSessionRequest, PlayerId, QuickJoinCriteria, Session, SessionId, SessionQuery,
    Visibility,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::auth::random_hex;
use crate::{DirectoryError, SessionDirectory};

// ---------------------------------------------------------------------------
// DirectoryConfig
// ---------------------------------------------------------------------------

/// Limits and timeouts for the in-memory directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// How long a session survives without a heartbeat.
    ///
    /// Default: 30 seconds, the usual lobby-service inactivity window.
    pub session_expiry: Duration,

    /// Maximum number of live sessions. `None` = unlimited.
    pub max_sessions: Option<usize>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            session_expiry: Duration::from_secs(30),
            max_sessions: None,
        }
    }
}

/// Longest session name the directory accepts.
pub const MAX_NAME_LEN: usize = 100;

/// Largest capacity the directory accepts.
pub const MAX_PLAYERS_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// InMemoryDirectory
// ---------------------------------------------------------------------------

struct Entry {
    session: Session,
    last_heartbeat: Instant,
}

struct State {
    sessions: HashMap<SessionId, Entry>,
}

/// A session directory that lives in process memory.
#[derive(Clone)]
pub struct InMemoryDirectory {
    state: Arc<Mutex<State>>,
    config: DirectoryConfig,
    epoch: Instant,
}

impl InMemoryDirectory {
    /// Creates an empty directory with the given config.
    pub fn new(config: DirectoryConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                sessions: HashMap::new(),
            })),
            config,
            epoch: Instant::now(),
        }
    }

    /// The config this directory was built with.
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Removes every session whose last heartbeat is older than the expiry
    /// window. Returns the ids that were removed.
    ///
    /// Every directory call runs this first, so callers never observe an
    /// expired session. It's public so tests can force a sweep.
    pub async fn expire_stale(&self) -> Vec<SessionId> {
        let mut state = self.state.lock().await;
        self.expire_locked(&mut state)
    }

    /// Looks up a session without redacting anything.
    pub async fn get(&self, id: &SessionId) -> Option<Session> {
        let mut state = self.state.lock().await;
        self.expire_locked(&mut state);
        state.sessions.get(id).map(|e| e.session.clone())
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        let mut state = self.state.lock().await;
        self.expire_locked(&mut state);
        state.sessions.len()
    }

    /// `true` if there are no live sessions.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn expire_locked(&self, state: &mut State) -> Vec<SessionId> {
        let expiry = self.config.session_expiry;
        let mut expired = Vec::new();

        state.sessions.retain(|id, entry| {
            if entry.last_heartbeat.elapsed() > expiry {
                tracing::info!(session_id = %id, "session expired (no heartbeat)");
                expired.push(id.clone());
                false
            } else {
                true
            }
        });

        expired
    }

    fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn validate(&self, request: &CreateSessionRequest) -> Result<(), DirectoryError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(DirectoryError::InvalidRequest("session name is empty".into()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(DirectoryError::InvalidRequest(format!(
                "session name longer than {MAX_NAME_LEN} characters"
            )));
        }
        if request.max_players == 0 || request.max_players > MAX_PLAYERS_LIMIT {
            return Err(DirectoryError::InvalidRequest(format!(
                "max_players must be 1..={MAX_PLAYERS_LIMIT}, got {}",
                request.max_players
            )));
        }
        Ok(())
    }
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new(DirectoryConfig::default())
    }
}

impl SessionDirectory for InMemoryDirectory {
    async fn create_session(
        &self,
        host: &PlayerId,
        request: CreateSessionRequest,
    ) -> Result<Session, DirectoryError> {
        self.validate(&request)?;

        let mut state = self.state.lock().await;
        self.expire_locked(&mut state);

        if let Some(max) = self.config.max_sessions {
            if state.sessions.len() >= max {
                return Err(DirectoryError::QuotaExceeded);
            }
        }

        let id = SessionId::new(random_hex(11));
        let session = Session {
            id: id.clone(),
            name: request.name,
            host_id: host.clone(),
            max_players: request.max_players,
            visibility: request.visibility,
            data: request.data,
            players: vec![host.clone()],
            created_at: self.now_millis(),
        };

        state.sessions.insert(
            id.clone(),
            Entry {
                session: session.clone(),
                last_heartbeat: Instant::now(),
            },
        );

        tracing::info!(session_id = %id, %host, name = %session.name, "session created");
        Ok(session)
    }

    async fn quick_join(
        &self,
        player: &PlayerId,
        criteria: QuickJoinCriteria,
    ) -> Result<Session, DirectoryError> {
        let mut state = self.state.lock().await;
        self.expire_locked(&mut state);

        // Fill the fullest lobby first, oldest on ties, so players cluster
        // instead of spreading one per lobby.
        let picked = state
            .sessions
            .values()
            .map(|e| &e.session)
            .filter(|s| s.visibility == Visibility::Public)
            .filter(|s| !s.is_member(player))
            .filter(|s| s.available_slots() > 0)
            .filter(|s| criteria.matches(s))
            .min_by_key(|s| (s.available_slots(), s.created_at))
            .map(|s| s.id.clone())
            .ok_or(DirectoryError::NoMatchingSession)?;

        let entry = state
            .sessions
            .get_mut(&picked)
            .ok_or(DirectoryError::NoMatchingSession)?;
        entry.session.players.push(player.clone());

        tracing::info!(session_id = %picked, %player, "player quick-joined session");
        Ok(entry.session.redacted_for(Some(player)))
    }

    async fn query_sessions(&self, query: SessionQuery) -> Result<Vec<Session>, DirectoryError> {
        let mut state = self.state.lock().await;
        self.expire_locked(&mut state);

        let public = state
            .sessions
            .values()
            .filter(|e| e.session.visibility == Visibility::Public)
            .map(|e| e.session.redacted_for(None));

        Ok(query.apply(public))
    }

    async fn join_session_by_id(
        &self,
        player: &PlayerId,
        id: &SessionId,
    ) -> Result<Session, DirectoryError> {
        let mut state = self.state.lock().await;
        self.expire_locked(&mut state);

        let entry = state
            .sessions
            .get_mut(id)
            .ok_or_else(|| DirectoryError::SessionNotFound(id.clone()))?;

        if entry.session.is_member(player) {
            return Err(DirectoryError::AlreadyMember(player.clone(), id.clone()));
        }
        if entry.session.available_slots() == 0 {
            return Err(DirectoryError::Full(id.clone()));
        }

        entry.session.players.push(player.clone());
        tracing::info!(
            session_id = %id,
            %player,
            players = entry.session.player_count(),
            "player joined session"
        );
        Ok(entry.session.redacted_for(Some(player)))
    }

    async fn heartbeat(&self, id: &SessionId) -> Result<(), DirectoryError> {
        let mut state = self.state.lock().await;
        self.expire_locked(&mut state);

        let entry = state
            .sessions
            .get_mut(id)
            .ok_or_else(|| DirectoryError::SessionNotFound(id.clone()))?;
        entry.last_heartbeat = Instant::now();
        tracing::trace!(session_id = %id, "heartbeat received");
        Ok(())
    }

    async fn leave_session(&self, id: &SessionId, player: &PlayerId) -> Result<(), DirectoryError> {
        let mut state = self.state.lock().await;
        self.expire_locked(&mut state);

        let entry = state
            .sessions
            .get_mut(id)
            .ok_or_else(|| DirectoryError::SessionNotFound(id.clone()))?;

        let before = entry.session.players.len();
        entry.session.players.retain(|p| p != player);
        if entry.session.players.len() == before {
            tracing::debug!(session_id = %id, %player, "leave ignored, not a member");
            return Ok(());
        }

        tracing::info!(session_id = %id, %player, "player left session");

        match entry.session.players.first().cloned() {
            None => {
                state.sessions.remove(id);
                tracing::info!(session_id = %id, "last player left, session removed");
            }
            Some(next) if entry.session.host_id == *player => {
                tracing::info!(session_id = %id, new_host = %next, "host migrated");
                entry.session.host_id = next;
            }
            Some(_) => {}
        }
        Ok(())
    }

    async fn delete_session(&self, id: &SessionId) -> Result<(), DirectoryError> {
        let mut state = self.state.lock().await;
        self.expire_locked(&mut state);

        state
            .sessions
            .remove(id)
            .ok_or_else(|| DirectoryError::SessionNotFound(id.clone()))?;
        tracing::info!(session_id = %id, "session deleted");
        Ok(())
    }

    fn session_expiry(&self) -> Option<Duration> {
        Some(self.config.session_expiry)
    }
}

// =========================================================================
// Tests
// =========================================================================
