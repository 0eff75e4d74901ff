//! Shared data model for Matchlink.
//!
//! Every other crate speaks in these types:
//!
//! - **Sessions** ([`Session`], [`SessionId`], [`PlayerId`], metadata):
//!   what the directory service stores and returns.
//! - **Queries** ([`SessionQuery`], [`QueryFilter`], [`QueryOrder`]): how
//!   presentation code asks for a lobby list.
//! - **Relay allocations** ([`HostAllocation`], [`JoinAllocation`],
//!   [`JoinCode`]): what the relay hands out and the transport consumes.
//!
//! ```text
//! Directory ─┐
//! Relay ─────┼─→ Protocol types ←─ Orchestrator
//! Transport ─┘
//! ```

mod query;
mod relay;
mod types;

pub use query::{
    FilterField, FilterOp, QueryFilter, QueryOrder, QuickJoinCriteria, SessionQuery, SortField,
    compare_sessions,
};
pub use relay::{AllocationId, HostAllocation, JoinAllocation, JoinCode, RelayServer};
pub use types::{
    CreateSessionRequest, DataObject, DataVisibility, JOIN_CODE_KEY, PlayerId, Session, SessionId,
    Visibility,
};
