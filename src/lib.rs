//! WolfBlob - Replicated Blob Volume Server
//!
//! A volume server for a distributed blob store. Files ("needles") live in
//! numbered volumes, and each volume may be replicated across several
//! volume servers.
//!
//! # Architecture
//!
//! Any replica may receive an upload or delete. It commits the mutation
//! locally, looks up the volume's other replicas in the master directory,
//! and forwards the mutation to all of them concurrently. Forwarded
//! requests are applied locally only, so replication never recurses.
//!
//! # Features
//!
//! - Replica placement in the `xyz` notation (data center, rack, server)
//! - Fail-closed replication when the directory reports too few replicas
//! - Concurrent fan-out with per-peer error aggregation
//! - Chunk manifest deletes that remove every chunk first
//! - HTTP API for needle upload, read and delete

pub mod config;
pub mod error;
pub mod needle;
pub mod storage;
pub mod network;
pub mod replication;
pub mod api;

#[cfg(test)]
mod testing;

pub use config::WolfBlobConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::WolfBlobConfig;
    pub use crate::error::{Error, Result};
    pub use crate::needle::{FileId, Needle, NeedleId, VolumeId};
    pub use crate::storage::{ReplicaPlacement, VolumeStore};
    pub use crate::replication::{ReplicationCoordinator, ReplicationRequest};
}
