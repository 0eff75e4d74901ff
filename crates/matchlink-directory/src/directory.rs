//! The [`SessionDirectory`] contract.
//!
//! This is the client side of an external lobby service. Every method is
//! one network call. Implementations wrap a real service SDK or HTTP API;
//! [`InMemoryDirectory`](crate::InMemoryDirectory) is the in-process
//! stand-in used by tests and demos.

use std::future::Future;
use std::time::Duration;

use matchlink_protocol::{
    CreateSessionRequest, PlayerId, QuickJoinCriteria, Session, SessionId, SessionQuery,
};

use crate::DirectoryError;

/// Client for an external session (lobby) directory.
///
/// The futures are `Send` so callers can drive them from spawned tasks
/// (the heartbeat loop runs on its own task).
pub trait SessionDirectory: Send + Sync + 'static {
    /// Publishes a new session hosted by `host`.
    ///
    /// The caller validates the name before calling. The service may still
    /// reject it ([`DirectoryError::InvalidRequest`]) or refuse because of
    /// a quota ([`DirectoryError::QuotaExceeded`]).
    fn create_session(
        &self,
        host: &PlayerId,
        request: CreateSessionRequest,
    ) -> impl Future<Output = Result<Session, DirectoryError>> + Send;

    /// Lets the service pick any eligible session and joins `player` to it.
    ///
    /// # Errors
    /// [`DirectoryError::NoMatchingSession`] when nothing satisfies
    /// `criteria`.
    fn quick_join(
        &self,
        player: &PlayerId,
        criteria: QuickJoinCriteria,
    ) -> impl Future<Output = Result<Session, DirectoryError>> + Send;

    /// Lists public sessions. An empty list is a normal result.
    fn query_sessions(
        &self,
        query: SessionQuery,
    ) -> impl Future<Output = Result<Vec<Session>, DirectoryError>> + Send;

    /// Joins `player` to a specific session.
    ///
    /// # Errors
    /// [`DirectoryError::SessionNotFound`] or [`DirectoryError::Full`].
    fn join_session_by_id(
        &self,
        player: &PlayerId,
        id: &SessionId,
    ) -> impl Future<Output = Result<Session, DirectoryError>> + Send;

    /// Keeps a hosted session alive.
    fn heartbeat(&self, id: &SessionId) -> impl Future<Output = Result<(), DirectoryError>> + Send;

    /// Removes `player` from the session. Leaving a session you're not a
    /// member of is `Ok(())`.
    fn leave_session(
        &self,
        id: &SessionId,
        player: &PlayerId,
    ) -> impl Future<Output = Result<(), DirectoryError>> + Send;

    /// Deletes a session outright (host teardown).
    fn delete_session(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<(), DirectoryError>> + Send;

    /// How long the service keeps a session without a heartbeat, if known.
    fn session_expiry(&self) -> Option<Duration> {
        None
    }
}
