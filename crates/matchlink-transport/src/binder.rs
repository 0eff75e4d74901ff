//! Relay allocation → transport startup.

use std::fmt;

use matchlink_protocol::{HostAllocation, JoinAllocation};
use tokio::sync::{Mutex, broadcast};

use crate::{RelayServerData, Transport, TransportError, TransportEvent};

/// Which side the binder started the transport as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindRole {
    Host,
    Client,
}

impl fmt::Display for BindRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Client => write!(f, "client"),
        }
    }
}

/// Configures and starts a [`Transport`] from relay allocations.
///
/// Holds at most one binding. A second bind without [`shutdown`] in
/// between fails with [`TransportError::AlreadyBound`].
///
/// [`shutdown`]: TransportBinder::shutdown
pub struct TransportBinder<T: Transport> {
    transport: T,
    role: Mutex<Option<BindRole>>,
}

impl<T: Transport> TransportBinder<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            role: Mutex::new(None),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The current binding, if any.
    pub async fn role(&self) -> Option<BindRole> {
        *self.role.lock().await
    }

    /// Sets the host's relay data, then starts as host.
    pub async fn bind_as_host(&self, allocation: &HostAllocation) -> Result<(), TransportError> {
        let mut role = self.role.lock().await;
        if let Some(current) = *role {
            return Err(TransportError::AlreadyBound(current));
        }

        self.transport
            .set_relay_server_data(RelayServerData::for_host(allocation))
            .await?;
        self.transport.start_host().await?;

        *role = Some(BindRole::Host);
        tracing::info!(allocation_id = %allocation.allocation_id, "transport bound as host");
        Ok(())
    }

    /// Sets the client's relay data (including the host's connection
    /// data), then starts as client.
    pub async fn bind_as_client(&self, allocation: &JoinAllocation) -> Result<(), TransportError> {
        let mut role = self.role.lock().await;
        if let Some(current) = *role {
            return Err(TransportError::AlreadyBound(current));
        }

        self.transport
            .set_relay_server_data(RelayServerData::for_client(allocation))
            .await?;
        self.transport.start_client().await?;

        *role = Some(BindRole::Client);
        tracing::info!(allocation_id = %allocation.allocation_id, "transport bound as client");
        Ok(())
    }

    /// Stops the transport and clears the binding. Idempotent.
    ///
    /// Always forwards to the transport, so a half-finished bind (relay
    /// data set, start failed) is reset too.
    pub async fn shutdown(&self) -> Result<(), TransportError> {
        let mut role = self.role.lock().await;
        self.transport.shutdown().await?;
        if let Some(previous) = role.take() {
            tracing::info!(role = %previous, "transport shut down");
        }
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.transport.subscribe()
    }
}
