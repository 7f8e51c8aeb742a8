//! Chunk manifests
//!
//! A large file is stored as many chunk needles plus one manifest needle
//! listing them. Deleting the manifest must come after its chunks.

use flate2::read::GzDecoder;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use super::FileId;
use crate::error::{Error, Result};
use crate::network::{AuthToken, PeerTransport, ReplicaDelete, ReplicaDirectory};

/// One chunk of a large file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub fid: String,
    pub offset: u64,
    pub size: u64,
}

/// Payload of a chunk manifest needle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkManifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime: String,
    /// Logical size of the whole file
    pub size: u64,
    pub chunks: Vec<ChunkInfo>,
}

impl ChunkManifest {
    /// Decode a manifest from a needle payload, chunks ordered by offset
    pub fn load(data: &[u8], gzipped: bool) -> Result<Self> {
        let decoded = if gzipped {
            serde_json::from_reader(GzDecoder::new(data))
        } else {
            serde_json::from_slice(data)
        };
        let mut manifest: ChunkManifest = decoded.map_err(|e| Error::ChunkManifest(e.to_string()))?;
        manifest.chunks.sort_by_key(|c| c.offset);
        Ok(manifest)
    }

    /// Delete every chunk through one of its volume's locations.
    ///
    /// Chunks are deleted concurrently as ordinary (non-forwarded) deletes,
    /// so each receiving node replicates its own chunk. Fails if any chunk
    /// could not be deleted.
    pub async fn delete_chunks(
        &self,
        master: &str,
        directory: &dyn ReplicaDirectory,
        transport: &dyn PeerTransport,
        auth: Option<&AuthToken>,
    ) -> Result<()> {
        let deletes = self.chunks.iter().map(|chunk| async move {
            delete_chunk(chunk, master, directory, transport, auth)
                .await
                .map_err(|e| format!("[{}]: {}", chunk.fid, e))
        });

        let failures: Vec<String> = join_all(deletes)
            .await
            .into_iter()
            .filter_map(|r| r.err())
            .collect();

        if failures.is_empty() {
            tracing::debug!("Deleted {} chunks of manifest {:?}", self.chunks.len(), self.name);
            Ok(())
        } else {
            Err(Error::ChunkDelete(failures.join("\n")))
        }
    }
}

async fn delete_chunk(
    chunk: &ChunkInfo,
    master: &str,
    directory: &dyn ReplicaDirectory,
    transport: &dyn PeerTransport,
    auth: Option<&AuthToken>,
) -> Result<()> {
    let file_id: FileId = chunk.fid.parse()?;
    let locations = directory.lookup(master, file_id.volume_id).await?;
    let target = locations
        .first()
        .ok_or_else(|| Error::Network(format!("no locations for volume {}", file_id.volume_id)))?;
    let op = ReplicaDelete {
        file_id,
        last_modified: 0,
        chunk_manifest: false,
        forwarded_hop: false,
        auth: auth.cloned(),
    };
    transport.replicate_delete(target, &op).await
}
