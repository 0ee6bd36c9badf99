use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, IoContext, Result};

/// identifier of a stored object: the SHA-256 of its canonical bytes
///
/// rendered as 64 lowercase hex characters everywhere it leaves the
/// process (ref files, the metadata index, wire records, the CLI).
/// bytes on disk must hash back to their identifier; reads that fail
/// this check surface `CorruptObject`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; 32]);

impl Hash {
    /// the all-zero id; never produced by hashing real content
    pub const ZERO: Hash = Hash([0; 32]);

    /// wrap a finished SHA-256 digest
    pub fn from_bytes(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    /// parse a full 64-char hex id; case-insensitive on input
    pub fn from_hex(hex: &str) -> Result<Self> {
        let mut digest = [0u8; 32];
        hex::decode_to_slice(hex, &mut digest)
            .map_err(|_| Error::InvalidHashHex(hex.to_string()))?;
        Ok(Self(digest))
    }

    /// the canonical lowercase 64-char form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// abbreviated form for listings (first 12 hex chars)
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }

    /// fan-out location under an object kind directory: the first two
    /// hex chars name the subdirectory, the remaining 62 the file
    pub fn to_path_components(&self) -> (String, String) {
        let hex = self.to_hex();
        let (dir, file) = hex.split_at(2);
        (dir.to_string(), file.to_string())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({}..)", self.short())
    }
}

impl Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

/// hash a byte slice in one shot
pub fn hash_bytes(bytes: &[u8]) -> Hash {
    Hash(Sha256::digest(bytes).into())
}

/// streaming hasher: feed chunks as they arrive, finalize once
///
/// the scanner and the blob store use this to avoid holding whole
/// files in memory.
pub struct Hasher {
    inner: Sha256,
}

impl Hasher {
    pub fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    /// feed a chunk
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// consume the hasher, producing the final id
    pub fn finalize(self) -> Hash {
        Hash(self.inner.finalize().into())
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// hash a file's content by streaming in 64 KiB chunks; returns (hash, size)
pub fn hash_file(path: &Path) -> Result<(Hash, u64)> {
    let mut file = File::open(path).with_path(path)?;
    let mut hasher = Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf).with_path(path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((hasher.finalize(), size))
}
