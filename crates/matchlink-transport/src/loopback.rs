//! In-process transport.
//!
//! A [`LoopbackNetwork`] stands in for the relay's routing table: hosts
//! register under their connection data, clients look the host up by the
//! `host_connection_data` in their join allocation. No bytes move. The
//! point is the connection events, which are what the orchestrator
//! reacts to.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use tokio::sync::{Mutex, broadcast};

use crate::{PeerId, RelayServerData, Transport, TransportError, TransportEvent};

const EVENT_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// LoopbackNetwork
// ---------------------------------------------------------------------------

#[derive(Default)]
struct NetworkInner {
    hosts: StdMutex<HashMap<Vec<u8>, broadcast::Sender<TransportEvent>>>,
    next_peer: AtomicU64,
    closed: AtomicBool,
}

/// Shared routing table for loopback transports. Clone to share.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    inner: Arc<NetworkInner>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport attached to this network.
    pub fn transport(&self) -> LoopbackTransport {
        LoopbackTransport::new(self.clone())
    }

    /// Number of hosts currently listening.
    pub fn host_count(&self) -> usize {
        self.hosts().len()
    }

    /// Closes the network. Every later start fails with
    /// [`TransportError::Shutdown`].
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.hosts().clear();
        tracing::info!("loopback network closed");
    }

    fn hosts(&self) -> MutexGuard<'_, HashMap<Vec<u8>, broadcast::Sender<TransportEvent>>> {
        self.inner
            .hosts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Shutdown);
        }
        Ok(())
    }

    fn register_host(
        &self,
        connection_data: &[u8],
        events: broadcast::Sender<TransportEvent>,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        let mut hosts = self.hosts();
        if hosts.contains_key(connection_data) {
            return Err(TransportError::ConnectFailed(
                "a host is already listening on this allocation".into(),
            ));
        }
        hosts.insert(connection_data.to_vec(), events);
        Ok(())
    }

    fn unregister_host(&self, connection_data: &[u8]) {
        self.hosts().remove(connection_data);
    }

    fn connect(
        &self,
        host_connection_data: &[u8],
    ) -> Result<(PeerId, broadcast::Sender<TransportEvent>), TransportError> {
        self.ensure_open()?;
        let host = self
            .hosts()
            .get(host_connection_data)
            .cloned()
            .ok_or_else(|| TransportError::ConnectFailed("no host listening".into()))?;
        let peer = PeerId::new(self.inner.next_peer.fetch_add(1, Ordering::Relaxed) + 1);
        Ok((peer, host))
    }
}

// ---------------------------------------------------------------------------
// LoopbackTransport
// ---------------------------------------------------------------------------

enum Mode {
    Stopped,
    Host {
        connection_data: Vec<u8>,
    },
    Client {
        peer: PeerId,
        host: broadcast::Sender<TransportEvent>,
    },
}

struct TransportState {
    relay_data: Option<RelayServerData>,
    mode: Mode,
}

/// A transport that connects through a [`LoopbackNetwork`]. Clone to keep
/// a handle (for inspection) after giving one to a binder.
#[derive(Clone)]
pub struct LoopbackTransport {
    network: LoopbackNetwork,
    events: broadcast::Sender<TransportEvent>,
    state: Arc<Mutex<TransportState>>,
}

impl LoopbackTransport {
    pub fn new(network: LoopbackNetwork) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            network,
            events,
            state: Arc::new(Mutex::new(TransportState {
                relay_data: None,
                mode: Mode::Stopped,
            })),
        }
    }

    /// `true` while started as host or client.
    pub async fn is_running(&self) -> bool {
        !matches!(self.state.lock().await.mode, Mode::Stopped)
    }

    /// The relay data set for the next (or current) start.
    pub async fn relay_data(&self) -> Option<RelayServerData> {
        self.state.lock().await.relay_data.clone()
    }

    fn emit(&self, event: TransportEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Transport for LoopbackTransport {
    async fn set_relay_server_data(&self, data: RelayServerData) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        if !matches!(state.mode, Mode::Stopped) {
            return Err(TransportError::AlreadyStarted);
        }
        state.relay_data = Some(data);
        Ok(())
    }

    async fn start_host(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        if !matches!(state.mode, Mode::Stopped) {
            return Err(TransportError::AlreadyStarted);
        }
        let data = state
            .relay_data
            .as_ref()
            .ok_or(TransportError::NotConfigured("relay server data not set"))?;

        let connection_data = data.connection_data.clone();
        self.network
            .register_host(&connection_data, self.events.clone())?;
        state.mode = Mode::Host { connection_data };

        tracing::debug!("loopback host listening");
        self.emit(TransportEvent::Connected);
        Ok(())
    }

    async fn start_client(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        if !matches!(state.mode, Mode::Stopped) {
            return Err(TransportError::AlreadyStarted);
        }
        let host_connection_data = state
            .relay_data
            .as_ref()
            .ok_or(TransportError::NotConfigured("relay server data not set"))?
            .host_connection_data
            .clone()
            .ok_or(TransportError::NotConfigured("host connection data not set"))?;

        let (peer, host) = self.network.connect(&host_connection_data)?;
        let _ = host.send(TransportEvent::PeerConnected(peer));
        state.mode = Mode::Client { peer, host };

        tracing::debug!(%peer, "loopback client connected");
        self.emit(TransportEvent::Connected);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut state.mode, Mode::Stopped) {
            Mode::Stopped => {}
            Mode::Host { connection_data } => {
                self.network.unregister_host(&connection_data);
                tracing::debug!("loopback host stopped");
            }
            Mode::Client { peer, host } => {
                let _ = host.send(TransportEvent::PeerDisconnected(peer));
                tracing::debug!(%peer, "loopback client disconnected");
            }
        }
        state.relay_data = None;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}
