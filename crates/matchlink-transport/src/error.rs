/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Start was requested before relay server data was set, or a client
    /// start was requested without the host's connection data.
    #[error("transport not configured: {0}")]
    NotConfigured(&'static str),

    /// The binder is already bound. Shut down before binding again.
    #[error("transport already bound as {0}")]
    AlreadyBound(crate::BindRole),

    /// The transport is already running.
    #[error("transport already started")]
    AlreadyStarted,

    /// Connecting to the host (or registering as host) failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The transport was shut down for good.
    #[error("transport shut down")]
    Shutdown,
}
