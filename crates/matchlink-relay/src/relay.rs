//! The [`RelayService`] contract.

use std::future::Future;

use matchlink_protocol::{AllocationId, HostAllocation, JoinAllocation, JoinCode};

use crate::RelayError;

/// Client for an external relay service.
///
/// A host reserves an allocation, asks for its join code and shares the
/// code out of band (the directory metadata). Joiners trade the code for a
/// join allocation routed to the host. Nobody ever sees another peer's IP.
pub trait RelayService: Send + Sync + 'static {
    /// Reserves relay capacity for a host expecting up to
    /// `max_connections` remote peers.
    fn create_allocation(
        &self,
        max_connections: usize,
    ) -> impl Future<Output = Result<HostAllocation, RelayError>> + Send;

    /// Returns the join code for a host allocation.
    fn get_join_code(
        &self,
        allocation_id: &AllocationId,
    ) -> impl Future<Output = Result<JoinCode, RelayError>> + Send;

    /// Trades a join code for a join allocation.
    ///
    /// Each live join allocation holds one of the host's connections until
    /// [`release_join`](Self::release_join) frees it.
    ///
    /// # Errors
    /// [`RelayError::InvalidCode`] for an unknown code,
    /// [`RelayError::Full`] once the host's connections are used up.
    fn join_allocation(
        &self,
        code: &JoinCode,
    ) -> impl Future<Output = Result<JoinAllocation, RelayError>> + Send;

    /// Frees a client's join allocation and gives its connection back to
    /// the host. Releasing an unknown id is `Ok(())`.
    fn release_join(
        &self,
        allocation_id: &AllocationId,
    ) -> impl Future<Output = Result<(), RelayError>> + Send;

    /// Frees a host allocation and every join allocation routed to it.
    /// Releasing an unknown id is `Ok(())`.
    fn release_allocation(
        &self,
        allocation_id: &AllocationId,
    ) -> impl Future<Output = Result<(), RelayError>> + Send;
}
