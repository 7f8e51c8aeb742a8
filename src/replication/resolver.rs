//! Replica Location Resolver
//!
//! Works out which peers a mutation must be pushed to.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::needle::VolumeId;
use crate::network::{Location, ReplicaDirectory};
use crate::storage::VolumeStore;

/// Peer locations of a volume, never including this node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicaSet(Vec<Location>);

impl ReplicaSet {
    pub fn new(locations: Vec<Location>) -> Self {
        Self(locations)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Location> {
        self.0.iter()
    }
}

/// Resolves the replica set for a volume, fresh on every call
pub struct ReplicaResolver {
    store: Arc<dyn VolumeStore>,
    directory: Arc<dyn ReplicaDirectory>,
}

impl ReplicaResolver {
    pub fn new(store: Arc<dyn VolumeStore>, directory: Arc<dyn ReplicaDirectory>) -> Self {
        Self { store, directory }
    }

    /// Peers that must receive a mutation of `volume_id`.
    ///
    /// A forwarded hop never fans out again, and a volume with a single copy
    /// has no peers; neither case contacts the master. When the master knows
    /// fewer locations than the placement requires the call fails, so no
    /// mutation is attempted at all.
    pub async fn resolve(
        &self,
        volume_id: VolumeId,
        master: &str,
        forwarded_hop: bool,
    ) -> Result<ReplicaSet> {
        if forwarded_hop {
            return Ok(ReplicaSet::default());
        }

        let copy_count = self.store.replica_placement(volume_id).await?.copy_count();
        if copy_count <= 1 {
            return Ok(ReplicaSet::default());
        }

        let locations = self
            .directory
            .lookup(master, volume_id)
            .await
            .map_err(|e| Error::Lookup {
                volume_id,
                reason: e.to_string(),
            })?;

        if locations.len() < copy_count {
            return Err(Error::InsufficientReplicas {
                volume_id,
                observed: locations.len(),
                required: copy_count,
            });
        }

        let self_url = self.store.self_url();
        let peers: Vec<Location> = locations
            .into_iter()
            .filter(|loc| loc.url != self_url)
            .collect();

        tracing::debug!("Volume {} replicates to {} peers", volume_id, peers.len());
        Ok(ReplicaSet(peers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryVolumeStore;
    use crate::testing::FakeDirectory;

    const SELF_URL: &str = "10.0.0.1:8080";

    async fn setup(placement: &str) -> (Arc<MemoryVolumeStore>, Arc<FakeDirectory>, ReplicaResolver) {
        let store = Arc::new(MemoryVolumeStore::new(SELF_URL));
        store.add_volume(VolumeId(7), placement.parse().unwrap(), false).await;
        let directory = Arc::new(FakeDirectory::new());
        let resolver = ReplicaResolver::new(store.clone(), directory.clone());
        (store, directory, resolver)
    }

    #[tokio::test]
    async fn test_single_copy_skips_directory() {
        let (_store, directory, resolver) = setup("000").await;
        directory.set(VolumeId(7), &[SELF_URL, "10.0.0.2:8080"]);

        let set = resolver.resolve(VolumeId(7), "master:9333", false).await.unwrap();
        assert!(set.is_empty());
        assert_eq!(directory.calls(), 0);
    }

    #[tokio::test]
    async fn test_forwarded_hop_never_resolves() {
        let (_store, directory, resolver) = setup("002").await;
        directory.set(VolumeId(7), &[SELF_URL, "10.0.0.2:8080", "10.0.0.3:8080"]);

        let set = resolver.resolve(VolumeId(7), "master:9333", true).await.unwrap();
        assert!(set.is_empty());
        assert_eq!(directory.calls(), 0);
    }

    #[tokio::test]
    async fn test_excludes_self() {
        let (_store, directory, resolver) = setup("002").await;
        directory.set(VolumeId(7), &["10.0.0.2:8080", SELF_URL, "10.0.0.3:8080"]);

        let set = resolver.resolve(VolumeId(7), "master:9333", false).await.unwrap();
        let urls: Vec<&str> = set.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(urls, vec!["10.0.0.2:8080", "10.0.0.3:8080"]);
        assert_eq!(directory.calls(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_replicas() {
        let (_store, directory, resolver) = setup("002").await;
        directory.set(VolumeId(7), &[SELF_URL, "10.0.0.2:8080"]);

        let err = resolver.resolve(VolumeId(7), "master:9333", false).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientReplicas { observed: 2, required: 3, .. }
        ));
        let text = err.to_string();
        assert!(text.contains('2') && text.contains('3'));
    }

    #[tokio::test]
    async fn test_directory_error_propagates() {
        let (_store, directory, resolver) = setup("001").await;
        directory.fail(VolumeId(7), "master unreachable");

        let err = resolver.resolve(VolumeId(7), "master:9333", false).await.unwrap_err();
        assert!(matches!(err, Error::Lookup { .. }));
        assert!(err.to_string().contains("master unreachable"));
    }

    #[tokio::test]
    async fn test_unknown_volume_fails_closed() {
        let (_store, directory, resolver) = setup("001").await;
        let err = resolver.resolve(VolumeId(99), "master:9333", false).await.unwrap_err();
        assert!(matches!(err, Error::VolumeNotFound(VolumeId(99))));
        assert_eq!(directory.calls(), 0);
    }
}
