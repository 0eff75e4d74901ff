//! Relay allocation types.
//!
//! An allocation is a temporary reservation on a relay server. The host
//! gets one and shares a short join code; each joining player trades that
//! code for a join allocation that routes to the host through the relay.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies an allocation on the relay service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationId(pub Uuid);

impl AllocationId {
    /// Generates a fresh random id.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// The 16-byte form the transport expects.
    pub fn to_bytes(&self) -> [u8; 16] {
        *self.0.as_bytes()
    }
}

impl fmt::Display for AllocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Short code that resolves to a host allocation on the relay.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JoinCode(pub String);

impl JoinCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JoinCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address of the relay server an allocation lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayServer {
    pub ip: IpAddr,
    pub port: u16,
}

impl RelayServer {
    pub fn endpoint(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

/// What the host receives when it reserves relay capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostAllocation {
    pub allocation_id: AllocationId,
    /// HMAC key the transport signs its relay traffic with.
    pub key: Vec<u8>,
    /// Opaque blob identifying this peer's route on the relay.
    pub connection_data: Vec<u8>,
    pub server: RelayServer,
}

/// What a joining player receives in exchange for a join code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinAllocation {
    pub allocation_id: AllocationId,
    pub key: Vec<u8>,
    pub connection_data: Vec<u8>,
    /// The host's `connection_data`, so the relay knows where to route us.
    pub host_connection_data: Vec<u8>,
    pub server: RelayServer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_id_bytes_match_uuid() {
        let id = AllocationId::new_v4();
        assert_eq!(&id.to_bytes(), id.0.as_bytes());
    }

    #[test]
    fn test_allocation_ids_are_unique() {
        assert_ne!(AllocationId::new_v4(), AllocationId::new_v4());
    }

    #[test]
    fn test_relay_server_endpoint() {
        let server = RelayServer {
            ip: "10.0.0.1".parse().unwrap(),
            port: 7777,
        };
        assert_eq!(server.endpoint().to_string(), "10.0.0.1:7777");
    }

    #[test]
    fn test_join_code_display() {
        assert_eq!(JoinCode::new("ABC123").to_string(), "ABC123");
    }
}
