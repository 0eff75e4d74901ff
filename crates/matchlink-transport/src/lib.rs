//! Transport binding for Matchlink.
//!
//! Packet framing and delivery belong to an external reliable transport.
//! This crate only covers the part Matchlink drives: handing the transport
//! its relay parameters, starting it as host or client, shutting it down,
//! and reporting connection events back.
//!
//! - [`Transport`] is the seam to the real networking stack.
//! - [`TransportBinder`] turns relay allocations into the right
//!   configure-then-start sequence and refuses to bind twice.
//! - [`LoopbackTransport`] (feature `loopback`, on by default) connects
//!   peers in process through a shared [`LoopbackNetwork`].
//!
//! # Feature Flags
//!
//! - `loopback` (default) - in-process transport for tests and demos

#![allow(async_fn_in_trait)]

mod binder;
mod error;
#[cfg(feature = "loopback")]
mod loopback;

pub use binder::{BindRole, TransportBinder};
pub use error::TransportError;
#[cfg(feature = "loopback")]
pub use loopback::{LoopbackNetwork, LoopbackTransport};

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;

use matchlink_protocol::{HostAllocation, JoinAllocation};
use tokio::sync::broadcast;

/// Opaque identifier for a remote peer, as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(u64);

impl PeerId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Connection events a transport reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// The local side is up: a host is listening, or a client reached its
    /// host. This never counts as a remote peer.
    Connected,
    /// A remote peer connected to this host.
    PeerConnected(PeerId),
    /// A remote peer went away.
    PeerDisconnected(PeerId),
}

/// Everything the transport needs to route through the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayServerData {
    pub endpoint: SocketAddr,
    pub allocation_id: [u8; 16],
    pub key: Vec<u8>,
    pub connection_data: Vec<u8>,
    /// Set for clients only.
    pub host_connection_data: Option<Vec<u8>>,
}

impl RelayServerData {
    pub fn for_host(allocation: &HostAllocation) -> Self {
        Self {
            endpoint: allocation.server.endpoint(),
            allocation_id: allocation.allocation_id.to_bytes(),
            key: allocation.key.clone(),
            connection_data: allocation.connection_data.clone(),
            host_connection_data: None,
        }
    }

    pub fn for_client(allocation: &JoinAllocation) -> Self {
        Self {
            endpoint: allocation.server.endpoint(),
            allocation_id: allocation.allocation_id.to_bytes(),
            key: allocation.key.clone(),
            connection_data: allocation.connection_data.clone(),
            host_connection_data: Some(allocation.host_connection_data.clone()),
        }
    }
}

/// The networking stack Matchlink configures and starts.
pub trait Transport: Send + Sync + 'static {
    /// Stores the relay parameters used by the next start.
    fn set_relay_server_data(
        &self,
        data: RelayServerData,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Starts as host. Requires relay data.
    fn start_host(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Starts as client. Requires relay data with host connection data.
    fn start_client(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Stops networking. Stopping a stopped transport is `Ok(())`.
    fn shutdown(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Subscribes to connection events. Only events sent after the call
    /// are received.
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;
}
