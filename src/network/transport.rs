//! Peer transport
//!
//! Sends replicated writes and deletes to other volume servers over HTTP.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;

use super::{AuthToken, Location};
use crate::error::{Error, Result};
use crate::needle::{FileId, Needle};

/// Header carrying the needle's file name
pub const FILENAME_HEADER: &str = "Wolf-Filename";

/// Prefix of headers carrying needle key/value pairs.
/// Pair keys are stored in canonical header case (`Owner`, `X-Trace-Id`).
pub const PAIR_HEADER_PREFIX: &str = "Wolf-Pair-";

/// A write forwarded to one replica
#[derive(Debug, Clone)]
pub struct ReplicaWrite {
    pub file_id: FileId,
    pub needle: Arc<Needle>,
    /// Marks the call as a replica of another request so the peer does not fan out again
    pub forwarded_hop: bool,
    pub auth: Option<AuthToken>,
}

/// A delete forwarded to one replica
#[derive(Debug, Clone)]
pub struct ReplicaDelete {
    pub file_id: FileId,
    pub last_modified: u64,
    pub chunk_manifest: bool,
    pub forwarded_hop: bool,
    pub auth: Option<AuthToken>,
}

/// Network calls to peer volume servers
#[async_trait::async_trait]
pub trait PeerTransport: Send + Sync {
    async fn replicate_write(&self, target: &Location, op: &ReplicaWrite) -> Result<()>;

    async fn replicate_delete(&self, target: &Location, op: &ReplicaDelete) -> Result<()>;
}

/// reqwest-backed peer transport
pub struct HttpPeerTransport {
    client: reqwest::Client,
}

impl HttpPeerTransport {
    /// Create a transport whose calls give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

fn write_query(op: &ReplicaWrite) -> Vec<(&'static str, String)> {
    let needle = &op.needle;
    let mut query = Vec::new();
    if op.forwarded_hop {
        query.push(("type", "replicate".to_string()));
    }
    if !needle.ttl.is_empty() {
        query.push(("ttl", needle.ttl.to_string()));
    }
    if needle.last_modified > 0 {
        query.push(("ts", needle.last_modified.to_string()));
    }
    if needle.chunk_manifest {
        query.push(("cm", "true".to_string()));
    }
    query
}

fn delete_query(op: &ReplicaDelete) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if op.forwarded_hop {
        query.push(("type", "replicate".to_string()));
    }
    if op.last_modified > 0 {
        query.push(("ts", op.last_modified.to_string()));
    }
    if op.chunk_manifest {
        query.push(("cm", "true".to_string()));
    }
    query
}

/// Turn a non-accepted status into an error carrying the response body
async fn expect_status(url: &str, response: reqwest::Response, accepted: &[StatusCode]) -> Result<()> {
    let status = response.status();
    if status.is_success() || accepted.contains(&status) {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::PeerStatus {
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}

#[async_trait::async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn replicate_write(&self, target: &Location, op: &ReplicaWrite) -> Result<()> {
        let url = format!("http://{}/{}", target.url, op.file_id);
        let needle = &op.needle;

        let mut request = self
            .client
            .post(&url)
            .query(&write_query(op))
            .body(needle.data.clone());

        if let Some(mime) = &needle.mime {
            request = request.header(CONTENT_TYPE, mime.as_str());
        }
        if needle.gzipped {
            request = request.header(CONTENT_ENCODING, "gzip");
        }
        if let Some(name) = &needle.name {
            request = request.header(FILENAME_HEADER, name.as_str());
        }
        for (key, value) in &needle.pairs {
            request = request.header(format!("{}{}", PAIR_HEADER_PREFIX, key), value.as_str());
        }
        if let Some(token) = &op.auth {
            request = request.bearer_auth(token.as_str());
        }

        let response = request.send().await?;
        // An identical needle already on the peer comes back as 304
        expect_status(&url, response, &[StatusCode::NOT_MODIFIED]).await
    }

    async fn replicate_delete(&self, target: &Location, op: &ReplicaDelete) -> Result<()> {
        let url = format!("http://{}/{}", target.url, op.file_id);

        let mut request = self.client.delete(&url).query(&delete_query(op));
        if let Some(token) = &op.auth {
            request = request.bearer_auth(token.as_str());
        }

        let response = request.send().await?;
        expect_status(&url, response, &[StatusCode::NOT_FOUND]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::needle::{Cookie, NeedleId, Ttl, VolumeId};

    fn sample_write(forwarded_hop: bool) -> ReplicaWrite {
        let mut needle = Needle::new(NeedleId(1), Cookie(2), &b"data"[..]);
        needle.ttl = "3d".parse::<Ttl>().unwrap();
        needle.last_modified = 1_700_000_000;
        needle.chunk_manifest = true;
        ReplicaWrite {
            file_id: needle.file_id(VolumeId(5)),
            needle: Arc::new(needle),
            forwarded_hop,
            auth: None,
        }
    }

    #[test]
    fn test_write_query_carries_metadata() {
        let query = write_query(&sample_write(true));
        assert_eq!(
            query,
            vec![
                ("type", "replicate".to_string()),
                ("ttl", "3d".to_string()),
                ("ts", "1700000000".to_string()),
                ("cm", "true".to_string()),
            ]
        );

        let query = write_query(&sample_write(false));
        assert!(!query.iter().any(|(k, _)| *k == "type"));
    }

    #[test]
    fn test_delete_query() {
        let op = ReplicaDelete {
            file_id: FileId::new(VolumeId(5), NeedleId(1), Cookie(2)),
            last_modified: 0,
            chunk_manifest: false,
            forwarded_hop: true,
            auth: Some(AuthToken::new("token")),
        };
        assert_eq!(delete_query(&op), vec![("type", "replicate".to_string())]);
    }

    #[tokio::test]
    async fn test_unreachable_peer_fails() {
        let transport = HttpPeerTransport::new(Duration::from_millis(500)).unwrap();
        let result = transport
            .replicate_write(&Location::new("127.0.0.1:1"), &sample_write(true))
            .await;
        assert!(result.is_err());
    }
}
