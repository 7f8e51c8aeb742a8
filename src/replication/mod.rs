//! Replication Module
//!
//! Replicated write/delete coordination: resolve the replica set of a
//! volume, commit locally, then fan the mutation out to every peer.

mod coordinator;
mod fanout;
mod resolver;

pub use coordinator::ReplicationCoordinator;
pub use fanout::{fan_out, AggregatedResult, PeerResult};
pub use resolver::{ReplicaResolver, ReplicaSet};

use crate::needle::{Needle, VolumeId};
use crate::network::AuthToken;

/// A validated mutation handed to the coordinator by the request layer
#[derive(Debug, Clone)]
pub struct ReplicationRequest {
    pub volume_id: VolumeId,
    pub needle: Needle,
    /// Set when this request is itself a replica of another node's request
    pub forwarded_hop: bool,
    /// Caller's token, passed to peers untouched
    pub auth: Option<AuthToken>,
}
