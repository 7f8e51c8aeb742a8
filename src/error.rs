//! WolfBlob Error Types

use thiserror::Error;

use crate::needle::{Cookie, NeedleId, VolumeId};

/// Result type alias for WolfBlob operations
pub type Result<T> = std::result::Result<T, Error>;

/// Per-peer failures collected by a replication fan-out.
///
/// Rendered as one `[host]: message` line per failing peer, in the order the
/// peers reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerFailures(Vec<(String, String)>);

impl PeerFailures {
    /// Build from `(host, message)` pairs
    pub fn new(failures: Vec<(String, String)>) -> Self {
        Self(failures)
    }

    /// Number of failing peers
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Hosts that failed, in arrival order
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(host, _)| host.as_str())
    }
}

impl std::fmt::Display for PeerFailures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (host, message)) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "[{}]: {}", host, message)?;
        }
        Ok(())
    }
}

/// WolfBlob error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Configuration serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    // Client errors
    #[error("Invalid file id: {0}")]
    InvalidFileId(String),

    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),

    #[error("Invalid replica placement: {0}")]
    InvalidPlacement(String),

    #[error("Needle {needle_id} not found in volume {volume_id}")]
    NeedleNotFound { volume_id: VolumeId, needle_id: NeedleId },

    #[error("Cookie mismatch for needle {needle_id}: expected {expected}, got {actual}")]
    CookieMismatch { needle_id: NeedleId, expected: Cookie, actual: Cookie },

    // Topology errors
    #[error("Volume {0} not found")]
    VolumeNotFound(VolumeId),

    #[error("failed to lookup volume {volume_id}: {reason}")]
    Lookup { volume_id: VolumeId, reason: String },

    #[error("volume {volume_id} has {observed} replica locations, fewer than its replication copy count {required}")]
    InsufficientReplicas { volume_id: VolumeId, observed: usize, required: usize },

    // Local storage errors
    #[error("Volume {0} is read only")]
    VolumeReadOnly(VolumeId),

    #[error("failed to write to local disk: {0}")]
    LocalCommit(#[source] Box<Error>),

    #[error("failed to delete from local disk: {0}")]
    LocalDelete(#[source] Box<Error>),

    // Replication errors
    #[error("failed to write to replicas for volume {volume_id}: {failures}")]
    ReplicaWrite { volume_id: VolumeId, failures: PeerFailures },

    #[error("failed to delete from replicas for volume {volume_id}: {failures}")]
    ReplicaDelete { volume_id: VolumeId, failures: PeerFailures },

    #[error("Replication task for {0} ended without reporting")]
    TaskAborted(String),

    // Chunk manifest errors
    #[error("Load chunks manifest error: {0}")]
    ChunkManifest(String),

    #[error("Delete chunks error: {0}")]
    ChunkDelete(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("{url} returned {status}: {body}")]
    PeerStatus { url: String, status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error was caused by a malformed or mismatched request
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidFileId(_)
                | Error::InvalidTtl(_)
                | Error::CookieMismatch { .. }
                | Error::NeedleNotFound { .. }
        )
    }

    /// Check if this error blocked the operation before any mutation
    pub fn is_topology_error(&self) -> bool {
        matches!(
            self,
            Error::Lookup { .. }
                | Error::InsufficientReplicas { .. }
                | Error::VolumeNotFound(_)
        )
    }

    /// Check if the local mutation succeeded but one or more replicas did not
    pub fn is_replication_error(&self) -> bool {
        matches!(
            self,
            Error::ReplicaWrite { .. } | Error::ReplicaDelete { .. }
        )
    }

    /// Check if this error means the target does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NeedleNotFound { .. } | Error::VolumeNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_failures_display() {
        let failures = PeerFailures::new(vec![
            ("10.0.0.2:8080".to_string(), "conn refused".to_string()),
            ("10.0.0.3:8080".to_string(), "timeout".to_string()),
        ]);

        assert_eq!(failures.len(), 2);
        assert_eq!(
            failures.to_string(),
            "[10.0.0.2:8080]: conn refused\n[10.0.0.3:8080]: timeout"
        );
    }

    #[test]
    fn test_error_classification() {
        let err = Error::InsufficientReplicas {
            volume_id: VolumeId(7),
            observed: 2,
            required: 3,
        };
        assert!(err.is_topology_error());
        assert!(!err.is_client_error());

        let err = Error::CookieMismatch {
            needle_id: NeedleId(1),
            expected: Cookie(1),
            actual: Cookie(2),
        };
        assert!(err.is_client_error());
    }
}
