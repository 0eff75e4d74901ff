//! In-process relay.
//!
//! Hands out allocations with random UUID ids, random keys and random
//! connection data, plus short uppercase join codes. The loopback
//! transport routes on the connection data, so a client's
//! `host_connection_data` leads back to the host that created the
//! allocation.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use matchlink_protocol::{AllocationId, HostAllocation, JoinAllocation, JoinCode, RelayServer};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::{RelayError, RelayService};

// ---------------------------------------------------------------------------
// RelayConfig
// ---------------------------------------------------------------------------

/// Settings for the in-memory relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Server address reported in every allocation.
    pub server: RelayServer,

    /// Maximum live host allocations. `None` = unlimited.
    pub max_allocations: Option<usize>,

    /// Join code length. Default: 6.
    pub join_code_len: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            server: RelayServer {
                ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
                port: 7777,
            },
            max_allocations: None,
            join_code_len: 6,
        }
    }
}

impl RelayConfig {
    pub const MIN_JOIN_CODE_LEN: usize = 4;
    pub const MAX_JOIN_CODE_LEN: usize = 12;

    /// Clamps out-of-range values.
    pub fn validated(mut self) -> Self {
        let clamped = self
            .join_code_len
            .clamp(Self::MIN_JOIN_CODE_LEN, Self::MAX_JOIN_CODE_LEN);
        if clamped != self.join_code_len {
            warn!(
                requested = self.join_code_len,
                using = clamped,
                "join_code_len out of range, clamping"
            );
            self.join_code_len = clamped;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// InMemoryRelay
// ---------------------------------------------------------------------------

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const KEY_LEN: usize = 64;
const CONNECTION_DATA_LEN: usize = 16;

struct Allocation {
    host: HostAllocation,
    max_connections: usize,
    /// Live join allocations routed to this host.
    joined: HashSet<AllocationId>,
    join_code: Option<JoinCode>,
}

#[derive(Default)]
struct State {
    allocations: HashMap<AllocationId, Allocation>,
    codes: HashMap<JoinCode, AllocationId>,
    /// Join allocation → host allocation.
    joins: HashMap<AllocationId, AllocationId>,
}

/// A relay that lives in process memory. Clone to share.
#[derive(Clone)]
pub struct InMemoryRelay {
    state: Arc<Mutex<State>>,
    config: RelayConfig,
}

impl InMemoryRelay {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            config: config.validated(),
        }
    }

    /// Number of live host allocations.
    pub async fn allocation_count(&self) -> usize {
        self.state.lock().await.allocations.len()
    }

    /// Whether `id` is still allocated.
    pub async fn is_allocated(&self, id: &AllocationId) -> bool {
        self.state.lock().await.allocations.contains_key(id)
    }

    /// How many clients currently hold a join allocation on the host
    /// allocation `id`.
    pub async fn joined_count(&self, id: &AllocationId) -> Option<usize> {
        self.state
            .lock()
            .await
            .allocations
            .get(id)
            .map(|a| a.joined.len())
    }

    fn fresh_code(&self, taken: &HashMap<JoinCode, AllocationId>) -> JoinCode {
        let mut rng = rand::rng();
        loop {
            let code: String = (0..self.config.join_code_len)
                .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
                .collect();
            let code = JoinCode::new(code);
            if !taken.contains_key(&code) {
                return code;
            }
        }
    }
}

impl Default for InMemoryRelay {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    (0..len).map(|_| rng.random::<u8>()).collect()
}

impl RelayService for InMemoryRelay {
    async fn create_allocation(&self, max_connections: usize) -> Result<HostAllocation, RelayError> {
        let mut state = self.state.lock().await;

        if let Some(max) = self.config.max_allocations {
            if state.allocations.len() >= max {
                return Err(RelayError::QuotaExceeded);
            }
        }

        let host = HostAllocation {
            allocation_id: AllocationId::new_v4(),
            key: random_bytes(KEY_LEN),
            connection_data: random_bytes(CONNECTION_DATA_LEN),
            server: self.config.server,
        };

        state.allocations.insert(
            host.allocation_id,
            Allocation {
                host: host.clone(),
                max_connections,
                joined: HashSet::new(),
                join_code: None,
            },
        );

        tracing::info!(allocation_id = %host.allocation_id, max_connections, "allocation created");
        Ok(host)
    }

    async fn get_join_code(&self, allocation_id: &AllocationId) -> Result<JoinCode, RelayError> {
        let mut state = self.state.lock().await;

        let existing = state
            .allocations
            .get(allocation_id)
            .ok_or(RelayError::AllocationNotFound(*allocation_id))?
            .join_code
            .clone();
        if let Some(code) = existing {
            return Ok(code);
        }

        let code = self.fresh_code(&state.codes);
        state.codes.insert(code.clone(), *allocation_id);
        if let Some(alloc) = state.allocations.get_mut(allocation_id) {
            alloc.join_code = Some(code.clone());
        }

        tracing::info!(%allocation_id, join_code = %code, "join code issued");
        Ok(code)
    }

    async fn join_allocation(&self, code: &JoinCode) -> Result<JoinAllocation, RelayError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let host_id = *state
            .codes
            .get(code)
            .ok_or_else(|| RelayError::InvalidCode(code.clone()))?;
        let alloc = state
            .allocations
            .get_mut(&host_id)
            .ok_or_else(|| RelayError::InvalidCode(code.clone()))?;

        if alloc.joined.len() >= alloc.max_connections {
            return Err(RelayError::Full(host_id));
        }

        let join = JoinAllocation {
            allocation_id: AllocationId::new_v4(),
            key: random_bytes(KEY_LEN),
            connection_data: random_bytes(CONNECTION_DATA_LEN),
            host_connection_data: alloc.host.connection_data.clone(),
            server: alloc.host.server,
        };
        alloc.joined.insert(join.allocation_id);
        state.joins.insert(join.allocation_id, host_id);

        tracing::info!(
            join_code = %code,
            host_allocation = %host_id,
            joined = alloc.joined.len(),
            "joined allocation"
        );
        Ok(join)
    }

    async fn release_join(&self, allocation_id: &AllocationId) -> Result<(), RelayError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let Some(host_id) = state.joins.remove(allocation_id) else {
            tracing::debug!(%allocation_id, "release of unknown join allocation ignored");
            return Ok(());
        };
        if let Some(alloc) = state.allocations.get_mut(&host_id) {
            alloc.joined.remove(allocation_id);
            tracing::info!(
                %allocation_id,
                host_allocation = %host_id,
                joined = alloc.joined.len(),
                "join allocation released"
            );
        }
        Ok(())
    }

    async fn release_allocation(&self, allocation_id: &AllocationId) -> Result<(), RelayError> {
        let mut state = self.state.lock().await;

        match state.allocations.remove(allocation_id) {
            Some(alloc) => {
                if let Some(code) = alloc.join_code {
                    state.codes.remove(&code);
                }
                for join in &alloc.joined {
                    state.joins.remove(join);
                }
                tracing::info!(%allocation_id, "allocation released");
            }
            None => {
                tracing::debug!(%allocation_id, "release of unknown allocation ignored");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_allocation_fills_fields() {
        let relay = InMemoryRelay::default();

        let alloc = relay.create_allocation(7).await.unwrap();

        assert_eq!(alloc.key.len(), KEY_LEN);
        assert_eq!(alloc.connection_data.len(), CONNECTION_DATA_LEN);
        assert_eq!(alloc.server, RelayConfig::default().server);
        assert!(relay.is_allocated(&alloc.allocation_id).await);
    }

    #[tokio::test]
    async fn test_create_allocation_ids_never_repeat() {
        let relay = InMemoryRelay::default();
        let a = relay.create_allocation(1).await.unwrap();
        let b = relay.create_allocation(1).await.unwrap();
        assert_ne!(a.allocation_id, b.allocation_id);
    }

    #[tokio::test]
    async fn test_create_allocation_over_quota_rejected() {
        let relay = InMemoryRelay::new(RelayConfig {
            max_allocations: Some(1),
            ..RelayConfig::default()
        });
        relay.create_allocation(1).await.unwrap();

        let result = relay.create_allocation(1).await;

        assert!(matches!(result, Err(RelayError::QuotaExceeded)));
    }

    #[tokio::test]
    async fn test_get_join_code_is_six_uppercase_alphanumerics() {
        let relay = InMemoryRelay::default();
        let alloc = relay.create_allocation(7).await.unwrap();

        let code = relay.get_join_code(&alloc.allocation_id).await.unwrap();

        assert_eq!(code.as_str().len(), 6);
        assert!(code
            .as_str()
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_get_join_code_twice_returns_same_code() {
        let relay = InMemoryRelay::default();
        let alloc = relay.create_allocation(7).await.unwrap();

        let first = relay.get_join_code(&alloc.allocation_id).await.unwrap();
        let second = relay.get_join_code(&alloc.allocation_id).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_get_join_code_unknown_allocation_not_found() {
        let relay = InMemoryRelay::default();
        let result = relay.get_join_code(&AllocationId::new_v4()).await;
        assert!(matches!(result, Err(RelayError::AllocationNotFound(_))));
    }

    #[tokio::test]
    async fn test_join_allocation_routes_to_host() {
        let relay = InMemoryRelay::default();
        let host = relay.create_allocation(7).await.unwrap();
        let code = relay.get_join_code(&host.allocation_id).await.unwrap();

        let join = relay.join_allocation(&code).await.unwrap();

        assert_eq!(join.host_connection_data, host.connection_data);
        assert_ne!(join.allocation_id, host.allocation_id);
        assert_eq!(relay.joined_count(&host.allocation_id).await, Some(1));
    }

    #[tokio::test]
    async fn test_join_allocation_unknown_code_invalid() {
        let relay = InMemoryRelay::default();
        let result = relay.join_allocation(&JoinCode::new("NOPE00")).await;
        assert!(matches!(result, Err(RelayError::InvalidCode(_))));
    }

    #[tokio::test]
    async fn test_join_allocation_past_max_connections_full() {
        let relay = InMemoryRelay::default();
        let host = relay.create_allocation(1).await.unwrap();
        let code = relay.get_join_code(&host.allocation_id).await.unwrap();
        relay.join_allocation(&code).await.unwrap();

        let result = relay.join_allocation(&code).await;

        assert!(matches!(result, Err(RelayError::Full(_))));
    }

    #[tokio::test]
    async fn test_release_join_frees_connection_for_next_client() {
        let relay = InMemoryRelay::default();
        let host = relay.create_allocation(1).await.unwrap();
        let code = relay.get_join_code(&host.allocation_id).await.unwrap();
        let first = relay.join_allocation(&code).await.unwrap();

        relay.release_join(&first.allocation_id).await.unwrap();

        assert_eq!(relay.joined_count(&host.allocation_id).await, Some(0));
        let second = relay.join_allocation(&code).await.expect("slot should be free again");
        assert_ne!(second.allocation_id, first.allocation_id);
        assert_eq!(relay.joined_count(&host.allocation_id).await, Some(1));
    }

    #[tokio::test]
    async fn test_release_join_twice_is_ok() {
        let relay = InMemoryRelay::default();
        let host = relay.create_allocation(2).await.unwrap();
        let code = relay.get_join_code(&host.allocation_id).await.unwrap();
        let join = relay.join_allocation(&code).await.unwrap();

        relay.release_join(&join.allocation_id).await.unwrap();
        relay
            .release_join(&join.allocation_id)
            .await
            .expect("second release should be a no-op");

        assert_eq!(relay.joined_count(&host.allocation_id).await, Some(0));
    }

    #[tokio::test]
    async fn test_release_join_after_host_released_is_ok() {
        let relay = InMemoryRelay::default();
        let host = relay.create_allocation(2).await.unwrap();
        let code = relay.get_join_code(&host.allocation_id).await.unwrap();
        let join = relay.join_allocation(&code).await.unwrap();

        relay.release_allocation(&host.allocation_id).await.unwrap();

        relay
            .release_join(&join.allocation_id)
            .await
            .expect("join of a released host should be a no-op");
    }

    #[tokio::test]
    async fn test_release_allocation_invalidates_code() {
        let relay = InMemoryRelay::default();
        let host = relay.create_allocation(7).await.unwrap();
        let code = relay.get_join_code(&host.allocation_id).await.unwrap();

        relay.release_allocation(&host.allocation_id).await.unwrap();

        assert!(!relay.is_allocated(&host.allocation_id).await);
        let result = relay.join_allocation(&code).await;
        assert!(matches!(result, Err(RelayError::InvalidCode(_))));
    }

    #[tokio::test]
    async fn test_release_allocation_unknown_is_ok() {
        let relay = InMemoryRelay::default();
        relay
            .release_allocation(&AllocationId::new_v4())
            .await
            .expect("unknown release should be a no-op");
    }

    #[test]
    fn test_relay_config_validated_clamps_code_len() {
        let config = RelayConfig {
            join_code_len: 40,
            ..RelayConfig::default()
        }
        .validated();
        assert_eq!(config.join_code_len, RelayConfig::MAX_JOIN_CODE_LEN);
    }
}
