//! Session directory client for Matchlink.
//!
//! A directory is the external lobby service: hosts publish sessions,
//! clients list, quick-join or join them by id, and hosts keep them alive
//! with heartbeats. This crate defines:
//!
//! - [`SessionDirectory`], the client contract every backend implements
//! - [`Authenticator`], the sign-in hook that yields the local player id
//! - [`InMemoryDirectory`], an in-process directory for tests and demos

#![allow(async_fn_in_trait)]

mod auth;
mod directory;
mod error;
mod memory;

pub use auth::{AnonymousAuthenticator, Authenticator};
pub use directory::SessionDirectory;
pub use error::DirectoryError;
pub use memory::{DirectoryConfig, InMemoryDirectory, MAX_NAME_LEN, MAX_PLAYERS_LIMIT};
