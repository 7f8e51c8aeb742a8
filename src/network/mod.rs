//! Network Module
//!
//! HTTP clients for the master directory and for peer volume servers.

mod directory;
mod transport;

pub use directory::{MasterClient, ReplicaDirectory};
pub use transport::{HttpPeerTransport, PeerTransport, ReplicaDelete, ReplicaWrite};
pub use transport::{FILENAME_HEADER, PAIR_HEADER_PREFIX};

use serde::{Deserialize, Serialize};

/// Network location of a volume server holding a replica
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// `ip:port` used for node-to-node traffic
    pub url: String,
    /// Address advertised to clients
    #[serde(rename = "publicUrl", default)]
    pub public_url: String,
}

impl Location {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            public_url: url.clone(),
            url,
        }
    }
}

/// Opaque authorization token forwarded to peers verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
