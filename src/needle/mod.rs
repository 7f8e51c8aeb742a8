//! Needle Types
//!
//! A needle is a stored blob plus its metadata. Needles live inside volumes,
//! addressed on the wire by a file id of the form `<volume>,<key><cookie>`.

pub mod manifest;

use std::collections::BTreeMap;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use manifest::{ChunkInfo, ChunkManifest};

/// Identifier of a volume (one replica group)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeId(pub u32);

impl std::fmt::Display for VolumeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VolumeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<u32>()
            .map(VolumeId)
            .map_err(|_| Error::InvalidFileId(format!("bad volume id {:?}", s)))
    }
}

/// Key of a needle within its volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NeedleId(pub u64);

impl std::fmt::Display for NeedleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// Random token bound to a needle key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cookie(pub u32);

impl std::fmt::Display for Cookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Fully qualified needle address: volume, key and cookie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    pub volume_id: VolumeId,
    pub key: NeedleId,
    pub cookie: Cookie,
}

impl FileId {
    pub fn new(volume_id: VolumeId, key: NeedleId, cookie: Cookie) -> Self {
        Self { volume_id, key, cookie }
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}{}", self.volume_id, self.key, self.cookie)
    }
}

impl FromStr for FileId {
    type Err = Error;

    /// Parse `3,01637037d6`, ignoring any trailing `.ext`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim_start_matches('/');
        let (vid, rest) = s
            .split_once(',')
            .ok_or_else(|| Error::InvalidFileId(format!("missing ',' in {:?}", s)))?;
        let key_cookie = rest.split('.').next().unwrap_or(rest);

        if !key_cookie.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidFileId(format!("non-hex key hash in {:?}", s)));
        }
        if key_cookie.len() <= 8 {
            return Err(Error::InvalidFileId(format!("key hash too short in {:?}", s)));
        }
        if key_cookie.len() > 24 {
            return Err(Error::InvalidFileId(format!("key hash too long in {:?}", s)));
        }

        let split = key_cookie.len() - 8;
        let key = u64::from_str_radix(&key_cookie[..split], 16)
            .map_err(|e| Error::InvalidFileId(format!("bad key in {:?}: {}", s, e)))?;
        let cookie = u32::from_str_radix(&key_cookie[split..], 16)
            .map_err(|e| Error::InvalidFileId(format!("bad cookie in {:?}: {}", s, e)))?;

        Ok(FileId {
            volume_id: vid.parse()?,
            key: NeedleId(key),
            cookie: Cookie(cookie),
        })
    }
}

/// Time-to-live unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TtlUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl TtlUnit {
    fn symbol(&self) -> char {
        match self {
            TtlUnit::Minute => 'm',
            TtlUnit::Hour => 'h',
            TtlUnit::Day => 'd',
            TtlUnit::Week => 'w',
            TtlUnit::Month => 'M',
            TtlUnit::Year => 'y',
        }
    }

    fn minutes(&self) -> u64 {
        match self {
            TtlUnit::Minute => 1,
            TtlUnit::Hour => 60,
            TtlUnit::Day => 24 * 60,
            TtlUnit::Week => 7 * 24 * 60,
            TtlUnit::Month => 30 * 24 * 60,
            TtlUnit::Year => 365 * 24 * 60,
        }
    }
}

/// Needle time-to-live, e.g. `3d`. A zero count means no expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ttl {
    pub count: u8,
    pub unit: TtlUnit,
}

impl Ttl {
    pub const EMPTY: Ttl = Ttl { count: 0, unit: TtlUnit::Minute };

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Length of the TTL in seconds (0 when empty)
    pub fn as_secs(&self) -> u64 {
        u64::from(self.count) * self.unit.minutes() * 60
    }
}

impl Default for Ttl {
    fn default() -> Self {
        Ttl::EMPTY
    }
}

impl std::fmt::Display for Ttl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        write!(f, "{}{}", self.count, self.unit.symbol())
    }
}

impl FromStr for Ttl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(Ttl::EMPTY);
        }

        let last = s.chars().last().unwrap_or('m');
        let (digits, unit) = if last.is_ascii_digit() {
            (s, TtlUnit::Minute)
        } else {
            let unit = match last {
                'm' => TtlUnit::Minute,
                'h' => TtlUnit::Hour,
                'd' => TtlUnit::Day,
                'w' => TtlUnit::Week,
                'M' => TtlUnit::Month,
                'y' => TtlUnit::Year,
                other => return Err(Error::InvalidTtl(format!("unknown unit {:?} in {:?}", other, s))),
            };
            (&s[..s.len() - last.len_utf8()], unit)
        };

        let count = digits
            .parse::<u8>()
            .map_err(|e| Error::InvalidTtl(format!("{:?}: {}", s, e)))?;
        Ok(Ttl { count, unit })
    }
}

/// A blob and the metadata stored with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Needle {
    pub id: NeedleId,
    pub cookie: Cookie,
    pub data: Bytes,
    pub name: Option<String>,
    pub mime: Option<String>,
    pub ttl: Ttl,
    /// Unix seconds, 0 when unknown
    pub last_modified: u64,
    pub gzipped: bool,
    pub chunk_manifest: bool,
    pub pairs: BTreeMap<String, String>,
}

impl Needle {
    /// Create a needle holding `data` with no extra metadata
    pub fn new(id: NeedleId, cookie: Cookie, data: impl Into<Bytes>) -> Self {
        Self {
            id,
            cookie,
            data: data.into(),
            name: None,
            mime: None,
            ttl: Ttl::EMPTY,
            last_modified: 0,
            gzipped: false,
            chunk_manifest: false,
            pairs: BTreeMap::new(),
        }
    }

    /// File id of this needle within `volume_id`
    pub fn file_id(&self, volume_id: VolumeId) -> FileId {
        FileId::new(volume_id, self.id, self.cookie)
    }

    /// Payload size in bytes
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// CRC32 of the payload, hex encoded
    pub fn etag(&self) -> String {
        format!("{:08x}", crc32fast::hash(&self.data))
    }

    /// True when the stored content (payload and flags) matches `other`
    pub fn same_content(&self, other: &Needle) -> bool {
        self.cookie == other.cookie
            && self.data == other.data
            && self.gzipped == other.gzipped
            && self.chunk_manifest == other.chunk_manifest
    }
}
