//! In-memory volume store

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use super::{CommitOutcome, ReplicaPlacement, VolumeInfo, VolumeStore};
use crate::error::{Error, Result};
use crate::needle::{Needle, NeedleId, VolumeId};

/// A single local volume
struct Volume {
    placement: ReplicaPlacement,
    read_only: bool,
    needles: HashMap<NeedleId, Needle>,
}

/// Volume store keeping all needles in memory
pub struct MemoryVolumeStore {
    /// This node's `ip:port`
    self_url: String,
    volumes: RwLock<HashMap<VolumeId, Volume>>,
    /// Commit and delete attempts, successful or not
    mutations: AtomicU64,
}

impl MemoryVolumeStore {
    /// Create an empty store for the node reachable at `self_url`
    pub fn new(self_url: impl Into<String>) -> Self {
        Self {
            self_url: self_url.into(),
            volumes: RwLock::new(HashMap::new()),
            mutations: AtomicU64::new(0),
        }
    }

    /// Add (or replace) a volume
    pub async fn add_volume(&self, id: VolumeId, placement: ReplicaPlacement, read_only: bool) {
        let mut volumes = self.volumes.write().await;
        volumes.insert(id, Volume {
            placement,
            read_only,
            needles: HashMap::new(),
        });
        tracing::info!("Added volume {} (replication {}, read_only={})", id, placement, read_only);
    }

    /// Toggle the read-only flag of a volume
    pub async fn set_read_only(&self, id: VolumeId, read_only: bool) -> Result<()> {
        let mut volumes = self.volumes.write().await;
        let volume = volumes.get_mut(&id).ok_or(Error::VolumeNotFound(id))?;
        volume.read_only = read_only;
        Ok(())
    }

    /// Number of commit/delete attempts seen so far
    pub fn mutations(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl VolumeStore for MemoryVolumeStore {
    async fn commit_needle(&self, volume_id: VolumeId, needle: &Needle) -> Result<CommitOutcome> {
        self.mutations.fetch_add(1, Ordering::SeqCst);

        let mut volumes = self.volumes.write().await;
        let volume = volumes.get_mut(&volume_id).ok_or(Error::VolumeNotFound(volume_id))?;
        if volume.read_only {
            return Err(Error::VolumeReadOnly(volume_id));
        }

        if let Some(existing) = volume.needles.get(&needle.id) {
            if existing.cookie != needle.cookie {
                return Err(Error::CookieMismatch {
                    needle_id: needle.id,
                    expected: existing.cookie,
                    actual: needle.cookie,
                });
            }
            if existing.same_content(needle) {
                tracing::debug!("Needle {} unchanged in volume {}", needle.id, volume_id);
                return Ok(CommitOutcome { size: existing.size(), is_unchanged: true });
            }
        }

        let size = needle.size();
        volume.needles.insert(needle.id, needle.clone());
        Ok(CommitOutcome { size, is_unchanged: false })
    }

    async fn delete_needle(&self, volume_id: VolumeId, needle: &Needle) -> Result<u64> {
        self.mutations.fetch_add(1, Ordering::SeqCst);

        let mut volumes = self.volumes.write().await;
        let volume = volumes.get_mut(&volume_id).ok_or(Error::VolumeNotFound(volume_id))?;
        if volume.read_only {
            return Err(Error::VolumeReadOnly(volume_id));
        }

        Ok(volume.needles.remove(&needle.id).map(|n| n.size()).unwrap_or(0))
    }

    async fn read_needle(&self, volume_id: VolumeId, key: NeedleId) -> Result<Needle> {
        let volumes = self.volumes.read().await;
        let volume = volumes.get(&volume_id).ok_or(Error::VolumeNotFound(volume_id))?;
        volume
            .needles
            .get(&key)
            .cloned()
            .ok_or(Error::NeedleNotFound { volume_id, needle_id: key })
    }

    async fn replica_placement(&self, volume_id: VolumeId) -> Result<ReplicaPlacement> {
        let volumes = self.volumes.read().await;
        volumes
            .get(&volume_id)
            .map(|v| v.placement)
            .ok_or(Error::VolumeNotFound(volume_id))
    }

    fn self_url(&self) -> &str {
        &self.self_url
    }

    async fn volumes(&self) -> Vec<VolumeInfo> {
        let volumes = self.volumes.read().await;
        let mut infos: Vec<VolumeInfo> = volumes
            .iter()
            .map(|(id, v)| VolumeInfo {
                id: *id,
                replication: v.placement.to_string(),
                read_only: v.read_only,
                file_count: v.needles.len(),
                size: v.needles.values().map(Needle::size).sum(),
            })
            .collect();
        infos.sort_by_key(|v| v.id);
        infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::needle::Cookie;

    async fn store_with_volume() -> MemoryVolumeStore {
        let store = MemoryVolumeStore::new("127.0.0.1:8080");
        store.add_volume(VolumeId(1), "001".parse().unwrap(), false).await;
        store
    }

    #[tokio::test]
    async fn test_commit_and_read() {
        let store = store_with_volume().await;
        let needle = Needle::new(NeedleId(10), Cookie(0xabc), &b"payload"[..]);

        let outcome = store.commit_needle(VolumeId(1), &needle).await.unwrap();
        assert_eq!(outcome, CommitOutcome { size: 7, is_unchanged: false });

        let read = store.read_needle(VolumeId(1), NeedleId(10)).await.unwrap();
        assert_eq!(read, needle);
        assert_eq!(store.mutations(), 1);
    }

    #[tokio::test]
    async fn test_identical_commit_is_unchanged() {
        let store = store_with_volume().await;
        let needle = Needle::new(NeedleId(10), Cookie(0xabc), &b"payload"[..]);

        store.commit_needle(VolumeId(1), &needle).await.unwrap();
        let again = store.commit_needle(VolumeId(1), &needle).await.unwrap();
        assert!(again.is_unchanged);
        assert_eq!(again.size, 7);

        let mut changed = needle.clone();
        changed.data = bytes::Bytes::from_static(b"other payload");
        let outcome = store.commit_needle(VolumeId(1), &changed).await.unwrap();
        assert!(!outcome.is_unchanged);
        assert_eq!(outcome.size, 13);
    }

    #[tokio::test]
    async fn test_overwrite_with_other_cookie_rejected() {
        let store = store_with_volume().await;
        store
            .commit_needle(VolumeId(1), &Needle::new(NeedleId(10), Cookie(1), &b"a"[..]))
            .await
            .unwrap();

        let err = store
            .commit_needle(VolumeId(1), &Needle::new(NeedleId(10), Cookie(2), &b"b"[..]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CookieMismatch { .. }));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = store_with_volume().await;
        let needle = Needle::new(NeedleId(10), Cookie(1), &b"12345"[..]);
        store.commit_needle(VolumeId(1), &needle).await.unwrap();

        assert_eq!(store.delete_needle(VolumeId(1), &needle).await.unwrap(), 5);
        assert_eq!(store.delete_needle(VolumeId(1), &needle).await.unwrap(), 0);
        assert!(store.read_needle(VolumeId(1), NeedleId(10)).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_read_only_and_missing_volume() {
        let store = store_with_volume().await;
        store.set_read_only(VolumeId(1), true).await.unwrap();
        let needle = Needle::new(NeedleId(10), Cookie(1), &b"x"[..]);

        assert!(matches!(
            store.commit_needle(VolumeId(1), &needle).await,
            Err(Error::VolumeReadOnly(_))
        ));
        assert!(matches!(
            store.commit_needle(VolumeId(9), &needle).await,
            Err(Error::VolumeNotFound(VolumeId(9)))
        ));
        assert!(store.replica_placement(VolumeId(9)).await.is_err());
        assert_eq!(store.replica_placement(VolumeId(1)).await.unwrap().copy_count(), 2);
    }
}
