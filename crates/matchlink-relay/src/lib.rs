//! Relay client for Matchlink.
//!
//! The relay carries all game traffic between host and clients so players
//! never exchange addresses directly. [`RelayService`] is the client
//! contract; [`InMemoryRelay`] is an in-process stand-in that hands out
//! real-looking allocations for tests and demos.

#![allow(async_fn_in_trait)]

mod error;
mod memory;
mod relay;

pub use error::RelayError;
pub use memory::{InMemoryRelay, RelayConfig};
pub use relay::RelayService;
