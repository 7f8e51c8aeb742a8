//! Local Volume Storage
//!
//! The replication core talks to local volumes only through [`VolumeStore`].
//! The on-disk needle format lives outside this crate; [`MemoryVolumeStore`]
//! keeps volumes in memory.

mod memory;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::needle::{Needle, NeedleId, VolumeId};

pub use memory::MemoryVolumeStore;

/// Replica placement of a volume, written as three digits `xyz`:
/// copies on other data centers, other racks, and the same rack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReplicaPlacement {
    pub diff_data_center: u8,
    pub diff_rack: u8,
    pub same_rack: u8,
}

impl ReplicaPlacement {
    /// Total number of copies, counting the local one
    pub fn copy_count(&self) -> usize {
        usize::from(self.diff_data_center) + usize::from(self.diff_rack) + usize::from(self.same_rack) + 1
    }
}

impl FromStr for ReplicaPlacement {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(ReplicaPlacement::default());
        }
        let digits: Vec<u8> = s
            .chars()
            .map(|c| c.to_digit(10).map(|d| d as u8))
            .collect::<Option<_>>()
            .ok_or_else(|| Error::InvalidPlacement(s.to_string()))?;
        if digits.len() != 3 {
            return Err(Error::InvalidPlacement(s.to_string()));
        }
        Ok(ReplicaPlacement {
            diff_data_center: digits[0],
            diff_rack: digits[1],
            same_rack: digits[2],
        })
    }
}

impl TryFrom<String> for ReplicaPlacement {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<ReplicaPlacement> for String {
    fn from(p: ReplicaPlacement) -> String {
        p.to_string()
    }
}

impl std::fmt::Display for ReplicaPlacement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.diff_data_center, self.diff_rack, self.same_rack)
    }
}

/// Result of committing a needle locally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Bytes written
    pub size: u64,
    /// The incoming content was identical to what was already stored
    pub is_unchanged: bool,
}

/// Summary of a local volume, for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct VolumeInfo {
    pub id: VolumeId,
    pub replication: String,
    pub read_only: bool,
    pub file_count: usize,
    pub size: u64,
}

/// Local volume store consumed by the replication core
#[async_trait::async_trait]
pub trait VolumeStore: Send + Sync {
    /// Write a needle into a local volume
    async fn commit_needle(&self, volume_id: VolumeId, needle: &Needle) -> Result<CommitOutcome>;

    /// Delete a needle, returning the reclaimed size (0 if it was absent)
    async fn delete_needle(&self, volume_id: VolumeId, needle: &Needle) -> Result<u64>;

    /// Read a needle by key
    async fn read_needle(&self, volume_id: VolumeId, key: NeedleId) -> Result<Needle>;

    /// Configured replica placement of a local volume
    async fn replica_placement(&self, volume_id: VolumeId) -> Result<ReplicaPlacement>;

    /// This node's `ip:port`, as the directory reports it
    fn self_url(&self) -> &str;

    /// Summaries of all local volumes, ordered by id
    async fn volumes(&self) -> Vec<VolumeInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replica_placement() {
        let p: ReplicaPlacement = "001".parse().unwrap();
        assert_eq!(p.copy_count(), 2);
        assert_eq!("000".parse::<ReplicaPlacement>().unwrap().copy_count(), 1);
        assert_eq!("110".parse::<ReplicaPlacement>().unwrap().copy_count(), 3);
        assert_eq!("".parse::<ReplicaPlacement>().unwrap().copy_count(), 1);
        assert_eq!(p.to_string(), "001");

        assert!("01".parse::<ReplicaPlacement>().is_err());
        assert!("0a1".parse::<ReplicaPlacement>().is_err());
    }
}
