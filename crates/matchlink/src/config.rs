//! Orchestrator configuration.

use std::time::Duration;

use matchlink_heartbeat::HeartbeatConfig;
use matchlink_protocol::Visibility;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ValidationError;

/// What a host does with its directory session on `leave()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HostLeavePolicy {
    /// Delete the session. Everyone in it loses the lobby.
    #[default]
    Delete,
    /// Leave like any other member. The directory hands the host role to
    /// the next player.
    Leave,
}

/// Settings for a [`SessionOrchestrator`](crate::SessionOrchestrator).
///
/// Defaults fit a small lobby: eight players, seven of them remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Remote peers the relay admits. Default: 7.
    pub max_connections: usize,

    /// Lobby capacity including the host. Default: 8.
    pub max_players: usize,

    /// Whether hosted lobbies are listed. Default: public.
    pub visibility: Visibility,

    /// Time between directory heartbeats while hosting. Default: 15 s.
    pub heartbeat_interval: Duration,

    /// Limit on every directory, relay, and transport call. `None` waits
    /// forever. Default: 10 s.
    pub call_timeout: Option<Duration>,

    /// Most lobbies `refresh_list` returns. Default: 20.
    pub query_limit: usize,

    pub host_leave_policy: HostLeavePolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_connections: 7,
            max_players: 8,
            visibility: Visibility::Public,
            heartbeat_interval: HeartbeatConfig::DEFAULT_INTERVAL,
            call_timeout: Some(Duration::from_secs(10)),
            query_limit: 20,
            host_leave_policy: HostLeavePolicy::Delete,
        }
    }
}

impl OrchestratorConfig {
    /// Largest `query_limit` honored.
    pub const MAX_QUERY_LIMIT: usize = 100;

    /// Clamps soft limits into range. Rules:
    /// - `query_limit` forced into `1..=MAX_QUERY_LIMIT`.
    /// - A zero `call_timeout` becomes `None`.
    pub fn validated(mut self) -> Self {
        let limit = self.query_limit.clamp(1, Self::MAX_QUERY_LIMIT);
        if limit != self.query_limit {
            warn!(requested = self.query_limit, using = limit, "query_limit out of range, clamping");
            self.query_limit = limit;
        }
        if self.call_timeout == Some(Duration::ZERO) {
            warn!("call_timeout of zero disables timeouts");
            self.call_timeout = None;
        }
        self
    }

    /// Checks the hard rules. `session_expiry` is the directory's
    /// inactivity window, if it reports one.
    pub fn validate(&self, session_expiry: Option<Duration>) -> Result<(), ValidationError> {
        if self.max_players < 2
            || self.max_connections == 0
            || self.max_connections >= self.max_players
        {
            return Err(ValidationError::InvalidCapacity {
                max_players: self.max_players,
                max_connections: self.max_connections,
            });
        }

        if self.heartbeat_interval < HeartbeatConfig::MIN_INTERVAL {
            return Err(ValidationError::HeartbeatInterval(self.heartbeat_interval));
        }

        if let Some(expiry) = session_expiry {
            if !self.heartbeat().keeps_alive(expiry) {
                return Err(ValidationError::HeartbeatTooSlow {
                    interval: self.heartbeat_interval,
                    expiry,
                });
            }
        }

        Ok(())
    }

    pub(crate) fn heartbeat(&self) -> HeartbeatConfig {
        HeartbeatConfig::with_interval(self.heartbeat_interval)
    }
}
