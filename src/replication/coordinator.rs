//! Replication Coordinator
//!
//! Commits a write or delete locally, then pushes it to every peer replica.
//! The local mutation always happens first and is never rolled back: when a
//! peer fails, the caller gets an aggregated error and the replicas are left
//! for out-of-band repair.

use std::sync::Arc;

use super::fanout::fan_out;
use super::resolver::ReplicaResolver;
use super::ReplicationRequest;
use crate::error::{Error, Result};
use crate::network::{PeerTransport, ReplicaDelete, ReplicaDirectory, ReplicaWrite};
use crate::storage::{CommitOutcome, VolumeStore};

/// Orchestrates replicated writes and deletes for one volume server
pub struct ReplicationCoordinator {
    store: Arc<dyn VolumeStore>,
    resolver: ReplicaResolver,
    transport: Arc<dyn PeerTransport>,
}

impl ReplicationCoordinator {
    pub fn new(
        store: Arc<dyn VolumeStore>,
        directory: Arc<dyn ReplicaDirectory>,
        transport: Arc<dyn PeerTransport>,
    ) -> Self {
        Self {
            resolver: ReplicaResolver::new(Arc::clone(&store), directory),
            store,
            transport,
        }
    }

    /// Write a needle locally and to every peer replica.
    ///
    /// Returns the local commit outcome. Any failure, including one that
    /// happens after the local commit succeeded, is returned as an error.
    pub async fn write_replicated(&self, master: &str, request: ReplicationRequest) -> Result<CommitOutcome> {
        let ReplicationRequest {
            volume_id,
            needle,
            forwarded_hop,
            auth,
        } = request;

        let replicas = self
            .resolver
            .resolve(volume_id, master, forwarded_hop)
            .await
            .map_err(|e| {
                tracing::warn!("Write to volume {} rejected: {}", volume_id, e);
                e
            })?;

        let outcome = self
            .store
            .commit_needle(volume_id, &needle)
            .await
            .map_err(|e| {
                let e = Error::LocalCommit(Box::new(e));
                tracing::warn!("{}", e);
                e
            })?;

        if replicas.is_empty() {
            return Ok(outcome);
        }

        let op = Arc::new(ReplicaWrite {
            file_id: needle.file_id(volume_id),
            needle: Arc::new(needle),
            forwarded_hop: true,
            auth,
        });
        let transport = Arc::clone(&self.transport);

        let result = fan_out(&replicas, move |location| {
            let transport = Arc::clone(&transport);
            let op = Arc::clone(&op);
            async move { transport.replicate_write(&location, &op).await }
        })
        .await;

        if let Some(failures) = result.failures() {
            let e = Error::ReplicaWrite { volume_id, failures };
            tracing::warn!("{}", e);
            return Err(e);
        }

        tracing::debug!("Replicated needle to {} peers of volume {}", replicas.len(), volume_id);
        Ok(outcome)
    }

    /// Delete a needle locally and from every peer replica, returning the
    /// locally reclaimed size.
    ///
    /// The caller must already have checked the cookie and, for a chunk
    /// manifest, deleted every chunk it references.
    pub async fn delete_replicated(&self, master: &str, request: ReplicationRequest) -> Result<u64> {
        let ReplicationRequest {
            volume_id,
            needle,
            forwarded_hop,
            auth,
        } = request;

        let replicas = self
            .resolver
            .resolve(volume_id, master, forwarded_hop)
            .await
            .map_err(|e| {
                tracing::warn!("Delete from volume {} rejected: {}", volume_id, e);
                e
            })?;

        let size = self
            .store
            .delete_needle(volume_id, &needle)
            .await
            .map_err(|e| {
                let e = Error::LocalDelete(Box::new(e));
                tracing::warn!("{}", e);
                e
            })?;

        if replicas.is_empty() {
            return Ok(size);
        }

        let op = Arc::new(ReplicaDelete {
            file_id: needle.file_id(volume_id),
            last_modified: needle.last_modified,
            chunk_manifest: needle.chunk_manifest,
            forwarded_hop: true,
            auth,
        });
        let transport = Arc::clone(&self.transport);

        let result = fan_out(&replicas, move |location| {
            let transport = Arc::clone(&transport);
            let op = Arc::clone(&op);
            async move { transport.replicate_delete(&location, &op).await }
        })
        .await;

        if let Some(failures) = result.failures() {
            let e = Error::ReplicaDelete { volume_id, failures };
            tracing::warn!("{}", e);
            return Err(e);
        }

        Ok(size)
    }
}
