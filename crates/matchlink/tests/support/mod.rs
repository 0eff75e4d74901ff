//! Shared helpers and test doubles for the orchestrator tests.
//!
//! The doubles wrap the in-memory backends and fail (or hang) on the calls
//! a test switches on.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use matchlink::prelude::*;
use matchlink::directory::DirectoryError;
use matchlink::protocol::{
    AllocationId, CreateSessionRequest, HostAllocation, JoinAllocation, QuickJoinCriteria,
    Session, SessionQuery,
};
use matchlink::relay::RelayError;
use matchlink::transport::{RelayServerData, TransportError, TransportEvent};
use matchlink::{Notification, SessionOrchestrator};
use tokio::sync::{broadcast, mpsc};

// =========================================================================
// Fault switches
// =========================================================================

#[derive(Default)]
pub struct Switch(AtomicBool);

impl Switch {
    pub fn on(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn off(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_on(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// =========================================================================
// FlakyDirectory
// =========================================================================

#[derive(Default)]
pub struct DirectoryFaults {
    pub create_session: Switch,
    pub hang_create_session: Switch,
    pub heartbeat: Switch,
    pub leave_session: Switch,
    pub hang_quick_join: Switch,
}

#[derive(Clone)]
pub struct FlakyDirectory {
    pub inner: InMemoryDirectory,
    pub faults: Arc<DirectoryFaults>,
}

impl FlakyDirectory {
    pub fn new(inner: InMemoryDirectory) -> Self {
        Self {
            inner,
            faults: Arc::new(DirectoryFaults::default()),
        }
    }
}

fn unavailable() -> DirectoryError {
    DirectoryError::Unavailable("injected".into())
}

impl SessionDirectory for FlakyDirectory {
    async fn create_session(
        &self,
        host: &PlayerId,
        request: CreateSessionRequest,
    ) -> Result<Session, DirectoryError> {
        if self.faults.create_session.is_on() {
            return Err(DirectoryError::QuotaExceeded);
        }
        if self.faults.hang_create_session.is_on() {
            std::future::pending::<()>().await;
        }
        self.inner.create_session(host, request).await
    }

    async fn quick_join(
        &self,
        player: &PlayerId,
        criteria: QuickJoinCriteria,
    ) -> Result<Session, DirectoryError> {
        if self.faults.hang_quick_join.is_on() {
            std::future::pending::<()>().await;
        }
        self.inner.quick_join(player, criteria).await
    }

    async fn query_sessions(&self, query: SessionQuery) -> Result<Vec<Session>, DirectoryError> {
        self.inner.query_sessions(query).await
    }

    async fn join_session_by_id(
        &self,
        player: &PlayerId,
        id: &SessionId,
    ) -> Result<Session, DirectoryError> {
        self.inner.join_session_by_id(player, id).await
    }

    async fn heartbeat(&self, id: &SessionId) -> Result<(), DirectoryError> {
        if self.faults.heartbeat.is_on() {
            return Err(unavailable());
        }
        self.inner.heartbeat(id).await
    }

    async fn leave_session(&self, id: &SessionId, player: &PlayerId) -> Result<(), DirectoryError> {
        if self.faults.leave_session.is_on() {
            return Err(unavailable());
        }
        self.inner.leave_session(id, player).await
    }

    async fn delete_session(&self, id: &SessionId) -> Result<(), DirectoryError> {
        self.inner.delete_session(id).await
    }

    fn session_expiry(&self) -> Option<Duration> {
        self.inner.session_expiry()
    }
}

// =========================================================================
// FlakyRelay
// =========================================================================

#[derive(Default)]
pub struct RelayFaults {
    pub join_allocation: Switch,
    pub hang_join_allocation: Switch,
    pub hang_create_allocation: Switch,
}

#[derive(Clone)]
pub struct FlakyRelay {
    pub inner: InMemoryRelay,
    pub faults: Arc<RelayFaults>,
}

impl FlakyRelay {
    pub fn new(inner: InMemoryRelay) -> Self {
        Self {
            inner,
            faults: Arc::new(RelayFaults::default()),
        }
    }
}

impl RelayService for FlakyRelay {
    async fn create_allocation(&self, max_connections: usize) -> Result<HostAllocation, RelayError> {
        if self.faults.hang_create_allocation.is_on() {
            std::future::pending::<()>().await;
        }
        self.inner.create_allocation(max_connections).await
    }

    async fn get_join_code(&self, allocation_id: &AllocationId) -> Result<JoinCode, RelayError> {
        self.inner.get_join_code(allocation_id).await
    }

    async fn join_allocation(&self, code: &JoinCode) -> Result<JoinAllocation, RelayError> {
        if self.faults.join_allocation.is_on() {
            return Err(RelayError::Unreachable("injected".into()));
        }
        if self.faults.hang_join_allocation.is_on() {
            std::future::pending::<()>().await;
        }
        self.inner.join_allocation(code).await
    }

    async fn release_join(&self, allocation_id: &AllocationId) -> Result<(), RelayError> {
        self.inner.release_join(allocation_id).await
    }

    async fn release_allocation(&self, allocation_id: &AllocationId) -> Result<(), RelayError> {
        self.inner.release_allocation(allocation_id).await
    }
}

// =========================================================================
// FlakyTransport
// =========================================================================

#[derive(Clone)]
pub struct FlakyTransport {
    pub inner: LoopbackTransport,
    pub fail_start_host: Arc<Switch>,
}

impl FlakyTransport {
    pub fn new(inner: LoopbackTransport) -> Self {
        Self {
            inner,
            fail_start_host: Arc::new(Switch::default()),
        }
    }
}

impl Transport for FlakyTransport {
    async fn set_relay_server_data(&self, data: RelayServerData) -> Result<(), TransportError> {
        self.inner.set_relay_server_data(data).await
    }

    async fn start_host(&self) -> Result<(), TransportError> {
        if self.fail_start_host.is_on() {
            return Err(TransportError::ConnectFailed("injected".into()));
        }
        self.inner.start_host().await
    }

    async fn start_client(&self) -> Result<(), TransportError> {
        self.inner.start_client().await
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.inner.shutdown().await
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.inner.subscribe()
    }
}

// =========================================================================
// Worlds
// =========================================================================

/// One shared directory, relay, and network, as several players see them.
#[derive(Clone, Default)]
pub struct World {
    pub directory: InMemoryDirectory,
    pub relay: InMemoryRelay,
    pub network: LoopbackNetwork,
}

pub type Player = SessionOrchestrator<InMemoryDirectory, InMemoryRelay, LoopbackTransport>;

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn player(&self) -> Player {
        self.player_with(OrchestratorConfig::default()).await
    }

    pub async fn player_with(&self, config: OrchestratorConfig) -> Player {
        OrchestratorBuilder::new()
            .config(config)
            .build(
                self.directory.clone(),
                self.relay.clone(),
                self.network.transport(),
                &AnonymousAuthenticator,
            )
            .await
            .expect("orchestrator should build")
    }
}

// =========================================================================
// Notification helpers
// =========================================================================

/// Drains every notification already delivered.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}

/// Status lines only.
pub fn statuses(notifications: &[Notification]) -> Vec<String> {
    notifications
        .iter()
        .filter_map(|n| match n {
            Notification::StateChanged(s) => Some(s.clone()),
            Notification::MatchFound => None,
        })
        .collect()
}

pub fn match_found_count(notifications: &[Notification]) -> usize {
    notifications
        .iter()
        .filter(|n| **n == Notification::MatchFound)
        .count()
}

/// Waits (up to a second) for a notification matching `pred`, collecting
/// everything seen on the way.
pub async fn wait_for(
    rx: &mut mpsc::UnboundedReceiver<Notification>,
    seen: &mut Vec<Notification>,
    pred: impl Fn(&Notification) -> bool,
) {
    let found = tokio::time::timeout(Duration::from_secs(1), async {
        while let Some(n) = rx.recv().await {
            let hit = pred(&n);
            seen.push(n);
            if hit {
                return;
            }
        }
    })
    .await;
    assert!(found.is_ok(), "timed out waiting for notification; saw {seen:?}");
}

/// Polls until `player` is back in `Idle`, for rollbacks that finish on a
/// spawned task.
pub async fn wait_until_idle<D, R, T>(player: &SessionOrchestrator<D, R, T>)
where
    D: SessionDirectory,
    R: RelayService,
    T: Transport,
{
    let idle = tokio::time::timeout(Duration::from_secs(5), async {
        while player.state().await != OrchestratorState::Idle {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(idle.is_ok(), "orchestrator never returned to Idle");
}

pub fn status(s: &str) -> Notification {
    Notification::StateChanged(s.to_string())
}
