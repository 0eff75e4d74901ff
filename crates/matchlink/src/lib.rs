//! # Matchlink
//!
//! Client-side session orchestration for multiplayer games.
//!
//! A host publishes a lobby in an external directory service and routes
//! traffic through an external relay. Other players find the lobby (by
//! quick-join or by browsing), read the relay join code from its metadata,
//! and connect through the relay. Nobody exchanges IP addresses.
//!
//! [`SessionOrchestrator`] drives all of that as one state machine and
//! reports progress on a [`NotificationBus`]. The backends sit behind
//! traits from the sub-crates:
//!
//! - [`SessionDirectory`](matchlink_directory::SessionDirectory) for the lobby service
//! - [`RelayService`](matchlink_relay::RelayService) for relay allocations
//! - [`Transport`](matchlink_transport::Transport) for the networking stack
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use matchlink::prelude::*;
//!
//! # async fn demo() -> Result<(), MatchlinkError> {
//! let network = LoopbackNetwork::new();
//! let host = OrchestratorBuilder::new()
//!     .build(
//!         InMemoryDirectory::default(),
//!         InMemoryRelay::default(),
//!         network.transport(),
//!         &AnonymousAuthenticator,
//!     )
//!     .await?;
//!
//! host.subscribe(|n| println!("{n:?}"));
//! let lobby = host.create_lobby("Arena").await?;
//! # let _ = lobby;
//! # Ok(())
//! # }
//! ```

#![allow(async_fn_in_trait)]

mod config;
mod error;
mod lobby;
mod notify;
mod orchestrator;
mod state;

pub use config::{HostLeavePolicy, OrchestratorConfig};
pub use error::{MatchlinkError, Step, ValidationError};
pub use lobby::LobbyListing;
pub use notify::{Notification, NotificationBus, SubscriptionId};
pub use orchestrator::{OrchestratorBuilder, SessionOrchestrator};
pub use state::{OrchestratorState, Status};

pub use matchlink_directory as directory;
pub use matchlink_heartbeat as heartbeat;
pub use matchlink_protocol as protocol;
pub use matchlink_relay as relay;
pub use matchlink_transport as transport;

/// Everything a presentation layer usually needs.
pub mod prelude {
    pub use crate::{
        HostLeavePolicy, LobbyListing, MatchlinkError, Notification, NotificationBus,
        OrchestratorBuilder, OrchestratorConfig, OrchestratorState, SessionOrchestrator,
    };
    pub use matchlink_directory::{
        AnonymousAuthenticator, Authenticator, DirectoryConfig, InMemoryDirectory,
        SessionDirectory,
    };
    pub use matchlink_protocol::{JoinCode, PlayerId, SessionId, Visibility};
    pub use matchlink_relay::{InMemoryRelay, RelayConfig, RelayService};
    pub use matchlink_transport::{LoopbackNetwork, LoopbackTransport, Transport};
}
