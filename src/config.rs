//! WolfBlob Configuration
//!
//! This module provides configuration structures for a WolfBlob
//! volume server.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::needle::VolumeId;
use crate::storage::ReplicaPlacement;

/// Main WolfBlob configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WolfBlobConfig {
    /// Node-specific configuration
    pub node: NodeConfig,

    /// Master directory configuration
    pub master: MasterConfig,

    /// Replication configuration
    #[serde(default)]
    pub replication: ReplicationConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Volumes served by this node
    #[serde(default)]
    pub volumes: Vec<VolumeConfig>,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique node identifier
    pub id: String,

    /// IP other volume servers and the master know this node by
    pub ip: String,

    /// Port other volume servers and the master know this node by
    #[serde(default = "default_port")]
    pub port: u16,

    /// Address advertised to clients (defaults to ip:port)
    #[serde(default)]
    pub public_url: Option<String>,
}

/// Master directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Master address (host:port)
    pub address: String,

    /// Lookup timeout in milliseconds
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,
}

/// Replication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Timeout of a single call to a peer volume server, in milliseconds
    #[serde(default = "default_peer_timeout_ms")]
    pub peer_timeout_ms: u64,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// HTTP API bind address
    #[serde(default = "default_api_address")]
    pub bind_address: String,

    /// Enable CORS
    #[serde(default)]
    pub cors_enabled: bool,

    /// Largest accepted upload in megabytes
    #[serde(default = "default_file_size_limit_mb")]
    pub file_size_limit_mb: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// A volume served by this node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Volume id
    pub id: VolumeId,

    /// Replica placement, e.g. "001"
    #[serde(default)]
    pub replication: ReplicaPlacement,

    /// Reject writes and deletes
    #[serde(default)]
    pub read_only: bool,
}

// Default value functions
fn default_port() -> u16 {
    8080
}

fn default_lookup_timeout_ms() -> u64 {
    5000
}

fn default_peer_timeout_ms() -> u64 {
    30000
}

fn default_api_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_file_size_limit_mb() -> u64 {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            peer_timeout_ms: default_peer_timeout_ms(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_api_address(),
            cors_enabled: false,
            file_size_limit_mb: default_file_size_limit_mb(),
        }
    }
}

impl ApiConfig {
    /// Largest accepted upload in bytes, clamped to the address space
    pub fn file_size_limit(&self) -> usize {
        let bytes = self.file_size_limit_mb.saturating_mul(1024 * 1024);
        usize::try_from(bytes).unwrap_or(usize::MAX)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl WolfBlobConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WolfBlobConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// A starting configuration for `wolfblob init`
    pub fn sample(node_id: &str) -> Self {
        Self {
            node: NodeConfig {
                id: node_id.to_string(),
                ip: "127.0.0.1".to_string(),
                port: default_port(),
                public_url: None,
            },
            master: MasterConfig {
                address: "127.0.0.1:9333".to_string(),
                lookup_timeout_ms: default_lookup_timeout_ms(),
            },
            replication: ReplicationConfig::default(),
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
            volumes: vec![VolumeConfig {
                id: VolumeId(1),
                replication: ReplicaPlacement::default(),
                read_only: false,
            }],
        }
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.node.id.is_empty() {
            return Err(crate::Error::Config("node.id cannot be empty".into()));
        }

        if self.node.ip.is_empty() {
            return Err(crate::Error::Config("node.ip cannot be empty".into()));
        }

        if self.master.address.is_empty() {
            return Err(crate::Error::Config("master.address cannot be empty".into()));
        }

        if self.api.bind_address.is_empty() {
            return Err(crate::Error::Config("api.bind_address cannot be empty".into()));
        }

        let mut seen = std::collections::HashSet::new();
        for volume in &self.volumes {
            if !seen.insert(volume.id) {
                return Err(crate::Error::Config(format!("volume {} configured twice", volume.id)));
            }
        }

        Ok(())
    }

    /// This node's `ip:port`, used to exclude itself from replica sets
    pub fn self_url(&self) -> String {
        format!("{}:{}", self.node.ip, self.node.port)
    }

    /// Address advertised to clients
    pub fn public_url(&self) -> String {
        self.node.public_url.clone().unwrap_or_else(|| self.self_url())
    }

    /// Get lookup timeout as Duration
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.master.lookup_timeout_ms)
    }

    /// Get peer call timeout as Duration
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.replication.peer_timeout_ms)
    }

}
