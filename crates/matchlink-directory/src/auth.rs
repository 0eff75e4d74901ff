//! Sign-in hook for obtaining the local player's identity.
//!
//! The directory service identifies callers by the player id their auth
//! provider issued. Matchlink doesn't do authentication itself. It asks an
//! [`Authenticator`] once, when the orchestrator is built, and uses the
//! returned [`PlayerId`] for every membership call afterwards.

use matchlink_protocol::PlayerId;
use rand::Rng;

use crate::DirectoryError;

/// Signs the local player in and returns their identity.
///
/// # Example
///
/// ```rust
/// use matchlink_directory::{Authenticator, DirectoryError};
/// use matchlink_protocol::PlayerId;
///
/// /// Signs in as a fixed, configured player.
/// struct ConfiguredPlayer(String);
///
/// impl Authenticator for ConfiguredPlayer {
///     async fn sign_in(&self) -> Result<PlayerId, DirectoryError> {
///         if self.0.is_empty() {
///             return Err(DirectoryError::AuthFailed("no player configured".into()));
///         }
///         Ok(PlayerId::new(self.0.clone()))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Signs in and returns the player's id.
    ///
    /// # Errors
    /// [`DirectoryError::AuthFailed`] if the provider rejects the sign-in.
    fn sign_in(
        &self,
    ) -> impl std::future::Future<Output = Result<PlayerId, DirectoryError>> + Send;
}

/// Anonymous sign-in: every call issues a fresh random player id.
///
/// Good enough for development and for the in-memory directory, which
/// doesn't verify identities anyway.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnonymousAuthenticator;

impl Authenticator for AnonymousAuthenticator {
    async fn sign_in(&self) -> Result<PlayerId, DirectoryError> {
        let player_id = PlayerId::new(format!("anon-{}", random_hex(8)));
        tracing::info!(%player_id, "signed in anonymously");
        Ok(player_id)
    }
}

/// Random lowercase hex string made of `bytes` random bytes.
pub(crate) fn random_hex(bytes: usize) -> String {
    let mut rng = rand::rng();
    (0..bytes)
        .map(|_| format!("{:02x}", rng.random::<u8>()))
        .collect()
}
