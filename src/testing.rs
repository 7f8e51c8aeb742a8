//! Test doubles for the directory and peer transport

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::needle::{FileId, Needle, VolumeId};
use crate::network::{AuthToken, Location, PeerTransport, ReplicaDelete, ReplicaDirectory, ReplicaWrite};
use crate::storage::{MemoryVolumeStore, VolumeStore};

/// Directory answering from a fixed table
#[derive(Default)]
pub struct FakeDirectory {
    entries: Mutex<HashMap<VolumeId, std::result::Result<Vec<Location>, String>>>,
    calls: AtomicUsize,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, volume_id: VolumeId, urls: &[&str]) {
        let locations = urls.iter().map(|u| Location::new(*u)).collect();
        self.entries.lock().unwrap().insert(volume_id, Ok(locations));
    }

    pub fn fail(&self, volume_id: VolumeId, reason: &str) {
        self.entries.lock().unwrap().insert(volume_id, Err(reason.to_string()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ReplicaDirectory for FakeDirectory {
    async fn lookup(&self, _master: &str, volume_id: VolumeId) -> Result<Vec<Location>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.entries.lock().unwrap().get(&volume_id) {
            Some(Ok(locations)) => Ok(locations.clone()),
            Some(Err(reason)) => Err(Error::Network(reason.clone())),
            None => Err(Error::Network(format!("volume {} not found", volume_id))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Write,
    Delete,
}

/// One call observed by [`RecordingTransport`]
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub host: String,
    pub kind: CallKind,
    pub file_id: FileId,
    pub forwarded_hop: bool,
    pub auth: Option<AuthToken>,
    pub needle: Option<Arc<Needle>>,
    /// Whether the needle was in the local store when the call went out
    pub local_present: Option<bool>,
}

/// Transport recording every call, failing or delaying chosen hosts
#[derive(Default)]
pub struct RecordingTransport {
    failures: Mutex<HashMap<String, String>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<RecordedCall>>,
    local: Option<Arc<MemoryVolumeStore>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also record whether the needle is present in `store` at call time
    pub fn observing(store: Arc<MemoryVolumeStore>) -> Self {
        Self {
            local: Some(store),
            ..Self::default()
        }
    }

    pub fn fail_host(&self, host: &str, message: &str) {
        self.failures.lock().unwrap().insert(host.to_string(), message.to_string());
    }

    pub fn delay_host(&self, host: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(host.to_string(), delay);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    async fn record(
        &self,
        target: &Location,
        kind: CallKind,
        file_id: FileId,
        forwarded_hop: bool,
        auth: Option<AuthToken>,
        needle: Option<Arc<Needle>>,
    ) -> Result<()> {
        let local_present = match &self.local {
            Some(store) => Some(store.read_needle(file_id.volume_id, file_id.key).await.is_ok()),
            None => None,
        };
        self.calls.lock().unwrap().push(RecordedCall {
            host: target.url.clone(),
            kind,
            file_id,
            forwarded_hop,
            auth,
            needle,
            local_present,
        });

        let delay = self.delays.lock().unwrap().get(&target.url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failures.lock().unwrap().get(&target.url).cloned();
        match failure {
            Some(message) => Err(Error::Network(message)),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl PeerTransport for RecordingTransport {
    async fn replicate_write(&self, target: &Location, op: &ReplicaWrite) -> Result<()> {
        self.record(
            target,
            CallKind::Write,
            op.file_id,
            op.forwarded_hop,
            op.auth.clone(),
            Some(Arc::clone(&op.needle)),
        )
        .await
    }

    async fn replicate_delete(&self, target: &Location, op: &ReplicaDelete) -> Result<()> {
        self.record(target, CallKind::Delete, op.file_id, op.forwarded_hop, op.auth.clone(), None)
            .await
    }
}
