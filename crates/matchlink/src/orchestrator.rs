//! `SessionOrchestrator` builder and state machine.
//!
//! This is the entry point presentation code talks to. It ties together
//! all the layers: directory → relay → transport → notifications.
//!
//! # Flows
//!
//! Hosting (`create_lobby`):
//!   1. Reserve a relay allocation and fetch its join code
//!   2. Publish a directory session carrying the join code (member-only)
//!   3. Bind the transport as host
//!   4. Start the heartbeat and the peer watcher
//!
//! Joining (`quick_join` / `join_lobby`):
//!   1. Join a directory session (picked by the service, or by id)
//!   2. Read the join code and trade it for a relay join allocation
//!   3. Bind the transport as client
//!
//! Any step failing rolls back what the flow already did and returns the
//! orchestrator to `Idle`. So does dropping a flow's future before it
//! finishes (see `FlowGuard`).
//!
//! Leaving releases the client's join allocation, so the host's relay
//! connections track who is connected now, not who ever joined.
//!
//! # Locking
//!
//! The state lives behind one async mutex. It is never held across a
//! directory, relay, or transport call. Flows claim the orchestrator by
//! moving it out of `Idle` first, so a second flow fails fast with
//! [`MatchlinkError::Busy`] instead of waiting.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use matchlink_directory::{Authenticator, SessionDirectory};
use matchlink_heartbeat::{HeartbeatHandle, HeartbeatStats};
use matchlink_protocol::{
    AllocationId, CreateSessionRequest, DataObject, HostAllocation, JOIN_CODE_KEY, JoinCode,
    PlayerId, QuickJoinCriteria, Session, SessionId, SessionQuery,
};
use matchlink_relay::RelayService;
use matchlink_transport::{PeerId, Transport, TransportBinder, TransportEvent};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    HostLeavePolicy, LobbyListing, MatchlinkError, Notification, NotificationBus,
    OrchestratorConfig, OrchestratorState, Status, Step, SubscriptionId, ValidationError,
};

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

/// Runs one external call under the configured timeout.
async fn bounded<F, V, E>(step: Step, limit: Option<Duration>, call: F) -> Result<V, MatchlinkError>
where
    F: Future<Output = Result<V, E>>,
    MatchlinkError: From<E>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result.map_err(MatchlinkError::from),
            Err(_) => Err(MatchlinkError::Timeout { step }),
        },
        None => call.await.map_err(MatchlinkError::from),
    }
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

enum Role {
    Host {
        allocation: AllocationId,
        peers: HashSet<PeerId>,
        match_found: bool,
    },
    Client {
        join: AllocationId,
    },
}

/// The one session this orchestrator owns.
struct ActiveSession {
    id: SessionId,
    join_code: JoinCode,
    role: Role,
    heartbeat: Option<HeartbeatHandle>,
    watcher: Option<JoinHandle<()>>,
    /// Set once teardown has claimed the session.
    leaving: bool,
}

impl ActiveSession {
    fn host_allocation(&self) -> Option<AllocationId> {
        match self.role {
            Role::Host { allocation, .. } => Some(allocation),
            Role::Client { .. } => None,
        }
    }

    fn join_allocation(&self) -> Option<AllocationId> {
        match self.role {
            Role::Host { .. } => None,
            Role::Client { join } => Some(join),
        }
    }
}

#[derive(Default)]
struct Inner {
    state: OrchestratorState,
    active: Option<ActiveSession>,
}

/// What a flow has done so far, for rollback.
#[derive(Default)]
struct Undo {
    hosting: bool,
    /// Published (host) or joined (client) directory session.
    session: Option<SessionId>,
    transport: bool,
    allocation: Option<AllocationId>,
    join: Option<AllocationId>,
}

impl Undo {
    fn host() -> Self {
        Self {
            hosting: true,
            ..Self::default()
        }
    }

    fn client() -> Self {
        Self::default()
    }

    fn is_empty(&self) -> bool {
        self.session.is_none()
            && !self.transport
            && self.allocation.is_none()
            && self.join.is_none()
    }

    fn failure_status(&self) -> Status {
        if self.hosting {
            Status::CreateFailed
        } else {
            Status::JoinFailed
        }
    }
}

/// Owns an in-flight flow's [`Undo`] record.
///
/// A flow future can be dropped at any await (the caller cancels it, or it
/// loses a `select!`). While armed, dropping the guard returns the
/// orchestrator to `Idle`: at once when nothing needs undoing, otherwise
/// from a spawned task that rolls back first.
struct FlowGuard<D: SessionDirectory, R: RelayService, T: Transport> {
    shared: Arc<Shared<D, R, T>>,
    undo: Undo,
    armed: bool,
}

impl<D, R, T> FlowGuard<D, R, T>
where
    D: SessionDirectory,
    R: RelayService,
    T: Transport,
{
    fn new(shared: &Arc<Shared<D, R, T>>, undo: Undo) -> Self {
        Self {
            shared: Arc::clone(shared),
            undo,
            armed: true,
        }
    }

    /// The flow is installed. Nothing to undo.
    fn complete(mut self) {
        self.armed = false;
    }

    /// Rolls back and returns to `Idle` with `status`.
    async fn abort(mut self, status: Status) {
        self.shared.rollback(&self.undo).await;
        self.shared.fail_flow(status).await;
        self.armed = false;
    }
}

impl<D, R, T> Drop for FlowGuard<D, R, T>
where
    D: SessionDirectory,
    R: RelayService,
    T: Transport,
{
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let undo = std::mem::take(&mut self.undo);
        let status = undo.failure_status();

        if undo.is_empty() {
            if let Ok(mut inner) = self.shared.inner.try_lock() {
                warn!(state = %inner.state, "flow cancelled");
                inner.state = OrchestratorState::Idle;
                inner.active = None;
                self.shared.bus.emit(status);
                return;
            }
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("flow cancelled outside a runtime, orchestrator left busy");
            return;
        };
        warn!(hosting = undo.hosting, "flow cancelled, rolling back");
        let shared = Arc::clone(&self.shared);
        runtime.spawn(async move {
            shared.rollback(&undo).await;
            shared.fail_flow(status).await;
        });
    }
}

/// A finished host flow, not yet installed.
struct Hosted {
    session: Session,
    allocation: HostAllocation,
    join_code: JoinCode,
    events: broadcast::Receiver<TransportEvent>,
}

/// Everything the orchestrator's tasks share.
///
/// Wrapped in `Arc` so the heartbeat, the peer watcher, and drop cleanup
/// can reach it from their own tasks.
struct Shared<D: SessionDirectory, R: RelayService, T: Transport> {
    directory: Arc<D>,
    relay: R,
    binder: TransportBinder<T>,
    bus: NotificationBus,
    config: OrchestratorConfig,
    player: PlayerId,
    inner: Mutex<Inner>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and creating a [`SessionOrchestrator`].
///
/// # Example
///
/// ```rust,no_run
/// use matchlink::prelude::*;
///
/// # async fn demo() -> Result<(), MatchlinkError> {
/// let network = LoopbackNetwork::new();
/// let orchestrator = OrchestratorBuilder::new()
///     .config(OrchestratorConfig::default())
///     .build(
///         InMemoryDirectory::default(),
///         InMemoryRelay::default(),
///         network.transport(),
///         &AnonymousAuthenticator,
///     )
///     .await?;
/// # let _ = orchestrator;
/// # Ok(())
/// # }
/// ```
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    bus: NotificationBus,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            bus: NotificationBus::new(),
        }
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses an existing bus, so subscribers can be attached before the
    /// orchestrator exists.
    pub fn notifications(mut self, bus: NotificationBus) -> Self {
        self.bus = bus;
        self
    }

    /// Validates the config, signs in, and creates the orchestrator.
    ///
    /// # Errors
    /// [`ValidationError`] when the config is unusable (including a
    /// heartbeat too slow for the directory's expiry window), or the
    /// authenticator's error.
    pub async fn build<D, R, T, A>(
        self,
        directory: D,
        relay: R,
        transport: T,
        auth: &A,
    ) -> Result<SessionOrchestrator<D, R, T>, MatchlinkError>
    where
        D: SessionDirectory,
        R: RelayService,
        T: Transport,
        A: Authenticator,
    {
        let config = self.config.validated();
        config.validate(directory.session_expiry())?;

        let player = bounded(Step::SignIn, config.call_timeout, auth.sign_in()).await?;
        info!(%player, "orchestrator ready");

        Ok(SessionOrchestrator {
            shared: Arc::new(Shared {
                directory: Arc::new(directory),
                relay,
                binder: TransportBinder::new(transport),
                bus: self.bus,
                config,
                player,
                inner: Mutex::new(Inner::default()),
            }),
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// SessionOrchestrator
// ---------------------------------------------------------------------------

/// Drives one player's lobby lifecycle.
///
/// All actions take `&self`. Share it with presentation code via `Arc`.
/// At most one session is active at a time.
///
/// Dropping the orchestrator with a session active spawns a best-effort
/// teardown on the current Tokio runtime. Call [`shutdown`](Self::shutdown)
/// to tear down deterministically.
pub struct SessionOrchestrator<D: SessionDirectory, R: RelayService, T: Transport> {
    shared: Arc<Shared<D, R, T>>,
}

impl<D, R, T> SessionOrchestrator<D, R, T>
where
    D: SessionDirectory,
    R: RelayService,
    T: Transport,
{
    // -- Flows --------------------------------------------------------------

    /// Hosts a new lobby named `name`.
    ///
    /// On success the orchestrator is `HostingWaitingForPlayers` and the
    /// returned id is the published session.
    ///
    /// # Errors
    /// - [`ValidationError::EmptyLobbyName`] for a blank name. No state
    ///   change, but "Lobby name is required" is still emitted.
    /// - [`MatchlinkError::Busy`] unless `Idle`.
    /// - Any directory, relay, transport, or timeout error. Partial work
    ///   is rolled back and the orchestrator returns to `Idle`.
    pub async fn create_lobby(&self, name: &str) -> Result<SessionId, MatchlinkError> {
        let shared = &self.shared;
        let name = name.trim();
        if name.is_empty() {
            shared.bus.emit(Status::NameRequired);
            return Err(ValidationError::EmptyLobbyName.into());
        }

        shared.begin_flow(Status::CreatingMatch).await?;
        let mut guard = FlowGuard::new(shared, Undo::host());
        info!(lobby = name, player = %shared.player, "creating lobby");

        match shared.host_flow(name, &mut guard.undo).await {
            Ok(hosted) => {
                let id = shared.install_host(hosted).await;
                guard.complete();
                Ok(id)
            }
            Err(e) => {
                error!(lobby = name, error = %e, "could not create lobby");
                guard.abort(Status::CreateFailed).await;
                Err(e)
            }
        }
    }

    /// Joins whichever lobby the directory picks.
    ///
    /// # Errors
    /// A not-found directory error when no lobby has room ("Cannot find a
    /// lobby"). Other failures emit "Could not join the match".
    pub async fn quick_join(&self) -> Result<SessionId, MatchlinkError> {
        let shared = &self.shared;
        shared.begin_flow(Status::LookingForMatch).await?;
        let guard = FlowGuard::new(shared, Undo::client());
        info!(player = %shared.player, "quick join");

        let joined = bounded(
            Step::QuickJoin,
            shared.config.call_timeout,
            shared
                .directory
                .quick_join(&shared.player, QuickJoinCriteria::default()),
        )
        .await;
        shared.complete_join(guard, joined).await
    }

    /// Joins a lobby picked from [`refresh_list`](Self::refresh_list).
    pub async fn join_lobby(&self, id: &SessionId) -> Result<SessionId, MatchlinkError> {
        let shared = &self.shared;
        shared.begin_flow(Status::LookingForMatch).await?;
        let guard = FlowGuard::new(shared, Undo::client());
        info!(session_id = %id, player = %shared.player, "joining lobby");

        let joined = bounded(
            Step::JoinSession,
            shared.config.call_timeout,
            shared.directory.join_session_by_id(&shared.player, id),
        )
        .await;
        shared.complete_join(guard, joined).await
    }

    /// Lists joinable lobbies: open slots only, fullest first, then newest,
    /// then by name descending. Allowed in any state.
    pub async fn refresh_list(&self) -> Result<Vec<LobbyListing>, MatchlinkError> {
        let shared = &self.shared;
        let query = SessionQuery::open_lobbies(shared.config.query_limit);

        let sessions = bounded(
            Step::QuerySessions,
            shared.config.call_timeout,
            shared.directory.query_sessions(query),
        )
        .await
        .inspect_err(|e| warn!(error = %e, "lobby query failed"))?;

        let listings: Vec<LobbyListing> = sessions.iter().map(LobbyListing::from).collect();
        debug!(
            count = listings.len(),
            lobbies = %serde_json::to_string(&listings).unwrap_or_default(),
            "lobby list refreshed"
        );
        Ok(listings)
    }

    /// Leaves the active session and returns to `Idle`.
    ///
    /// Stops the heartbeat (waiting for it), leaves or deletes the
    /// directory session, shuts the transport down, and releases the
    /// host's relay allocation. Every step runs even if an earlier one
    /// fails. The first failure is returned.
    ///
    /// Without an active session this is a no-op returning `Ok(())`.
    pub async fn leave(&self) -> Result<(), MatchlinkError> {
        if !self.shared.teardown().await? {
            debug!("leave with no active session");
        }
        Ok(())
    }

    /// Like [`leave`](Self::leave), but failures are only logged.
    pub async fn shutdown(&self) {
        match self.shared.teardown().await {
            Ok(true) => info!("orchestrator shut down"),
            Ok(false) => debug!("shutdown with no active session"),
            Err(e) => warn!(error = %e, "teardown during shutdown failed"),
        }
    }

    // -- Notifications ------------------------------------------------------

    pub fn notifications(&self) -> &NotificationBus {
        &self.shared.bus
    }

    /// Shorthand for `notifications().subscribe(handler)`.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.shared.bus.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.bus.unsubscribe(id)
    }

    // -- Accessors ----------------------------------------------------------

    pub async fn state(&self) -> OrchestratorState {
        self.shared.inner.lock().await.state
    }

    /// The active session, if hosting or joined.
    pub async fn session_id(&self) -> Option<SessionId> {
        let inner = self.shared.inner.lock().await;
        inner.active.as_ref().map(|a| a.id.clone())
    }

    pub async fn join_code(&self) -> Option<JoinCode> {
        let inner = self.shared.inner.lock().await;
        inner.active.as_ref().map(|a| a.join_code.clone())
    }

    /// The relay allocation backing the hosted session.
    pub async fn host_allocation(&self) -> Option<AllocationId> {
        let inner = self.shared.inner.lock().await;
        inner.active.as_ref().and_then(ActiveSession::host_allocation)
    }

    /// Remote peers currently connected to this host.
    pub async fn connected_peers(&self) -> usize {
        let inner = self.shared.inner.lock().await;
        match inner.active.as_ref().map(|a| &a.role) {
            Some(Role::Host { peers, .. }) => peers.len(),
            _ => 0,
        }
    }

    /// Heartbeat counters for the hosted session.
    pub async fn heartbeat_stats(&self) -> Option<HeartbeatStats> {
        let inner = self.shared.inner.lock().await;
        inner
            .active
            .as_ref()
            .and_then(|a| a.heartbeat.as_ref())
            .map(HeartbeatHandle::stats)
    }

    pub fn local_player(&self) -> &PlayerId {
        &self.shared.player
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.shared.config
    }

    pub fn directory(&self) -> &D {
        &self.shared.directory
    }

    pub fn relay(&self) -> &R {
        &self.shared.relay
    }

    pub fn transport(&self) -> &T {
        self.shared.binder.transport()
    }
}

impl<D, R, T> Drop for SessionOrchestrator<D, R, T>
where
    D: SessionDirectory,
    R: RelayService,
    T: Transport,
{
    fn drop(&mut self) {
        let has_session = match self.shared.inner.try_lock() {
            Ok(inner) => inner.active.is_some(),
            Err(_) => true,
        };
        if !has_session {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("orchestrator dropped outside a runtime, session left to expire");
            return;
        };
        let shared = Arc::clone(&self.shared);
        runtime.spawn(async move {
            if let Err(e) = shared.teardown().await {
                warn!(error = %e, "teardown on drop failed");
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Flow internals
// ---------------------------------------------------------------------------

impl<D, R, T> Shared<D, R, T>
where
    D: SessionDirectory,
    R: RelayService,
    T: Transport,
{
    /// Claims the orchestrator for a flow: `Idle → Searching`.
    async fn begin_flow(&self, status: Status) -> Result<(), MatchlinkError> {
        let mut inner = self.inner.lock().await;
        if inner.state != OrchestratorState::Idle {
            debug!(state = %inner.state, "flow rejected, orchestrator busy");
            return Err(MatchlinkError::Busy(inner.state));
        }
        inner.state = OrchestratorState::Searching;
        self.bus.emit(status);
        Ok(())
    }

    /// Returns a failed flow to `Idle`.
    async fn fail_flow(&self, status: Status) {
        let mut inner = self.inner.lock().await;
        inner.state = OrchestratorState::Idle;
        inner.active = None;
        self.bus.emit(status);
    }

    async fn host_flow(&self, name: &str, undo: &mut Undo) -> Result<Hosted, MatchlinkError> {
        let limit = self.config.call_timeout;

        let allocation = bounded(
            Step::CreateAllocation,
            limit,
            self.relay.create_allocation(self.config.max_connections),
        )
        .await?;
        undo.allocation = Some(allocation.allocation_id);

        let join_code = bounded(
            Step::GetJoinCode,
            limit,
            self.relay.get_join_code(&allocation.allocation_id),
        )
        .await?;
        info!(allocation_id = %allocation.allocation_id, %join_code, "relay allocation ready");

        let request = CreateSessionRequest::new(name, self.config.max_players)
            .with_visibility(self.config.visibility)
            .with_data(JOIN_CODE_KEY, DataObject::member(join_code.as_str()));
        let session = bounded(
            Step::CreateSession,
            limit,
            self.directory.create_session(&self.player, request),
        )
        .await?;
        undo.session = Some(session.id.clone());

        // Subscribe before binding so no peer event is missed.
        let events = self.binder.subscribe();
        undo.transport = true;
        bounded(Step::BindTransport, limit, self.binder.bind_as_host(&allocation)).await?;

        Ok(Hosted {
            session,
            allocation,
            join_code,
            events,
        })
    }

    async fn install_host(self: &Arc<Self>, hosted: Hosted) -> SessionId {
        let Hosted {
            session,
            allocation,
            join_code,
            events,
        } = hosted;

        let heartbeat = self.spawn_heartbeat(&session.id);

        let mut inner = self.inner.lock().await;
        let watcher = tokio::spawn(watch_peers(
            Arc::downgrade(self),
            events,
            session.id.clone(),
        ));
        inner.active = Some(ActiveSession {
            id: session.id.clone(),
            join_code: join_code.clone(),
            role: Role::Host {
                allocation: allocation.allocation_id,
                peers: HashSet::new(),
                match_found: false,
            },
            heartbeat: Some(heartbeat),
            watcher: Some(watcher),
            leaving: false,
        });
        inner.state = OrchestratorState::HostingWaitingForPlayers;
        info!(session_id = %session.id, %join_code, name = %session.name, "hosting lobby");
        self.bus.emit(Status::WaitingForPlayers);

        session.id
    }

    fn spawn_heartbeat(&self, id: &SessionId) -> HeartbeatHandle {
        let directory = Arc::clone(&self.directory);
        let limit = self.config.call_timeout;
        let session_id = id.clone();

        matchlink_heartbeat::spawn(id.to_string(), self.config.heartbeat(), move || {
            let directory = Arc::clone(&directory);
            let session_id = session_id.clone();
            async move { bounded(Step::Heartbeat, limit, directory.heartbeat(&session_id)).await }
        })
    }

    /// Second half of both join flows, after the directory call returned.
    async fn complete_join(
        &self,
        mut guard: FlowGuard<D, R, T>,
        joined: Result<Session, MatchlinkError>,
    ) -> Result<SessionId, MatchlinkError> {
        let session = match joined {
            Ok(session) => session,
            Err(e) if e.is_not_found() => {
                info!(error = %e, "no lobby to join");
                guard.abort(Status::LobbyNotFound).await;
                return Err(e);
            }
            Err(e) => {
                error!(error = %e, "could not join lobby");
                guard.abort(Status::JoinFailed).await;
                return Err(e);
            }
        };
        guard.undo.session = Some(session.id.clone());

        self.inner.lock().await.state = OrchestratorState::Joining;

        match self.client_flow(&session, &mut guard.undo).await {
            Ok((join_code, join)) => {
                let id = self.install_client(session, join_code, join).await;
                guard.complete();
                Ok(id)
            }
            Err(e) => {
                error!(session_id = %session.id, error = %e, "could not connect to lobby");
                guard.abort(Status::JoinFailed).await;
                Err(e)
            }
        }
    }

    async fn client_flow(
        &self,
        session: &Session,
        undo: &mut Undo,
    ) -> Result<(JoinCode, AllocationId), MatchlinkError> {
        let limit = self.config.call_timeout;

        let join_code = session
            .join_code()
            .map(JoinCode::new)
            .ok_or_else(|| MatchlinkError::MissingJoinCode(session.id.clone()))?;

        let allocation = bounded(
            Step::JoinAllocation,
            limit,
            self.relay.join_allocation(&join_code),
        )
        .await?;
        undo.join = Some(allocation.allocation_id);

        undo.transport = true;
        bounded(Step::BindTransport, limit, self.binder.bind_as_client(&allocation)).await?;

        Ok((join_code, allocation.allocation_id))
    }

    async fn install_client(
        &self,
        session: Session,
        join_code: JoinCode,
        join: AllocationId,
    ) -> SessionId {
        let mut inner = self.inner.lock().await;
        inner.active = Some(ActiveSession {
            id: session.id.clone(),
            join_code,
            role: Role::Client { join },
            heartbeat: None,
            watcher: None,
            leaving: false,
        });
        inner.state = OrchestratorState::Joined;
        info!(
            session_id = %session.id,
            name = %session.name,
            players = session.player_count(),
            "joined lobby"
        );
        self.bus.emit(Status::MatchFound);
        self.bus.emit(Notification::MatchFound);

        session.id
    }

    // -- Rollback and teardown ----------------------------------------------

    /// Runs one cleanup call. A missing session counts as done. Failures
    /// are logged and returned.
    async fn attempt<F, E>(&self, step: Step, call: F) -> Option<MatchlinkError>
    where
        F: Future<Output = Result<(), E>>,
        MatchlinkError: From<E>,
    {
        match bounded(step, self.config.call_timeout, call).await {
            Ok(()) => None,
            Err(e) if e.is_not_found() => {
                debug!(%step, "already gone");
                None
            }
            Err(e) => {
                warn!(%step, error = %e, "cleanup step failed");
                Some(e)
            }
        }
    }

    async fn rollback(&self, undo: &Undo) {
        if let Some(id) = &undo.session {
            if undo.hosting {
                self.attempt(Step::DeleteSession, self.directory.delete_session(id))
                    .await;
            } else {
                self.attempt(
                    Step::LeaveSession,
                    self.directory.leave_session(id, &self.player),
                )
                .await;
            }
        }
        if undo.transport {
            self.attempt(Step::ShutdownTransport, self.binder.shutdown())
                .await;
        }
        if let Some(join) = &undo.join {
            self.attempt(Step::ReleaseJoin, self.relay.release_join(join))
                .await;
        }
        if let Some(allocation) = &undo.allocation {
            self.attempt(
                Step::ReleaseAllocation,
                self.relay.release_allocation(allocation),
            )
            .await;
        }
    }

    /// Tears down the active session. Returns `Ok(false)` when there was
    /// nothing to tear down (or another teardown already claimed it).
    async fn teardown(&self) -> Result<bool, MatchlinkError> {
        let (id, allocation, join, heartbeat, watcher) = {
            let mut inner = self.inner.lock().await;
            let Some(active) = inner.active.as_mut() else {
                return Ok(false);
            };
            if active.leaving {
                return Ok(false);
            }
            active.leaving = true;
            (
                active.id.clone(),
                active.host_allocation(),
                active.join_allocation(),
                active.heartbeat.take(),
                active.watcher.take(),
            )
        };
        info!(session_id = %id, host = allocation.is_some(), "leaving session");

        if let Some(watcher) = watcher {
            watcher.abort();
        }
        if let Some(heartbeat) = heartbeat {
            let stats = heartbeat.stop().await;
            debug!(
                session_id = %id,
                beats_sent = stats.beats_sent,
                failures = stats.failures,
                "heartbeat stopped"
            );
        }

        let mut first_error = None;

        if !id.is_unset() {
            let failure = match (allocation, self.config.host_leave_policy) {
                (Some(_), HostLeavePolicy::Delete) => {
                    self.attempt(Step::DeleteSession, self.directory.delete_session(&id))
                        .await
                }
                _ => {
                    self.attempt(
                        Step::LeaveSession,
                        self.directory.leave_session(&id, &self.player),
                    )
                    .await
                }
            };
            first_error = first_error.or(failure);
        }

        let failure = self
            .attempt(Step::ShutdownTransport, self.binder.shutdown())
            .await;
        first_error = first_error.or(failure);

        if let Some(join) = join {
            let failure = self
                .attempt(Step::ReleaseJoin, self.relay.release_join(&join))
                .await;
            first_error = first_error.or(failure);
        }

        if let Some(allocation) = allocation {
            let failure = self
                .attempt(
                    Step::ReleaseAllocation,
                    self.relay.release_allocation(&allocation),
                )
                .await;
            first_error = first_error.or(failure);
        }

        {
            let mut inner = self.inner.lock().await;
            inner.active = None;
            inner.state = OrchestratorState::Idle;
            self.bus.emit(Status::LeftMatch);
        }
        info!(session_id = %id, "left session");

        match first_error {
            Some(e) => Err(e),
            None => Ok(true),
        }
    }

    // -- Peer events --------------------------------------------------------

    async fn on_transport_event(&self, session_id: &SessionId, event: TransportEvent) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let Some(active) = inner
            .active
            .as_mut()
            .filter(|a| a.id == *session_id && !a.leaving)
        else {
            return;
        };
        let Role::Host {
            peers, match_found, ..
        } = &mut active.role
        else {
            return;
        };

        match event {
            TransportEvent::Connected => {
                debug!(%session_id, "host transport listening");
            }
            TransportEvent::PeerConnected(peer) => {
                if !peers.insert(peer) {
                    return;
                }
                let first = !*match_found;
                *match_found = true;
                info!(%session_id, %peer, peers = peers.len(), "player connected");

                inner.state = OrchestratorState::HostingInSession;
                self.bus.emit(Status::PlayerFound);
                if first {
                    self.bus.emit(Notification::MatchFound);
                }
            }
            TransportEvent::PeerDisconnected(peer) => {
                if !peers.remove(&peer) {
                    return;
                }
                info!(%session_id, %peer, peers = peers.len(), "player disconnected");

                if peers.is_empty() && inner.state == OrchestratorState::HostingInSession {
                    inner.state = OrchestratorState::HostingWaitingForPlayers;
                    self.bus.emit(Status::WaitingForPlayers);
                }
            }
        }
    }
}

/// Feeds transport events to the orchestrator while it is alive.
async fn watch_peers<D, R, T>(
    shared: Weak<Shared<D, R, T>>,
    mut events: broadcast::Receiver<TransportEvent>,
    session_id: SessionId,
) where
    D: SessionDirectory,
    R: RelayService,
    T: Transport,
{
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(%session_id, missed, "transport events dropped");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.on_transport_event(&session_id, event).await;
    }
    debug!(%session_id, "peer watcher stopped");
}
