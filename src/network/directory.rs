//! Master directory client
//!
//! Resolves a volume id to the volume servers currently holding it.

use std::time::Duration;

use serde::Deserialize;

use super::Location;
use crate::error::{Error, Result};
use crate::needle::VolumeId;

/// Source of replica locations for a volume
#[async_trait::async_trait]
pub trait ReplicaDirectory: Send + Sync {
    /// Current locations of `volume_id`, as known by the master at `master`
    async fn lookup(&self, master: &str, volume_id: VolumeId) -> Result<Vec<Location>>;
}

/// Master lookup response body
#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(rename = "volumeId", default)]
    #[allow(dead_code)]
    volume_id: String,
    #[serde(default)]
    locations: Vec<Location>,
    #[serde(default)]
    error: String,
}

/// HTTP client for the master's `/dir/lookup` endpoint.
/// Results are never cached: every call asks the master.
pub struct MasterClient {
    client: reqwest::Client,
}

impl MasterClient {
    /// Create a client whose lookups give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl ReplicaDirectory for MasterClient {
    async fn lookup(&self, master: &str, volume_id: VolumeId) -> Result<Vec<Location>> {
        let url = format!("http://{}/dir/lookup", master);
        tracing::debug!("Looking up volume {} at {}", volume_id, url);

        let response = self
            .client
            .get(&url)
            .query(&[("volumeId", volume_id.to_string())])
            .send()
            .await?;

        let status = response.status();
        let body: LookupResponse = response.json().await.map_err(|e| {
            Error::Network(format!("bad lookup response from {} ({}): {}", master, status, e))
        })?;

        if !body.error.is_empty() {
            return Err(Error::Network(body.error));
        }

        Ok(body.locations)
    }
}
