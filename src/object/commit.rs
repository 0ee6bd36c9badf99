use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::hash::Hash;
use crate::object::{self, ObjectKind};
use crate::repo::Repo;

/// whether a commit covers the whole working set or only a mesh subtree
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitType {
    Project,
    MeshOnly,
}

impl CommitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitType::Project => "project",
            CommitType::MeshOnly => "mesh_only",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "project" => Some(CommitType::Project),
            "mesh_only" => Some(CommitType::MeshOnly),
            _ => None,
        }
    }
}

/// an immutable snapshot record
///
/// commits and stashes share this shape; a stash has `parent = None` and
/// is never referenced by a branch. the record's hash is taken over its
/// canonical JSON bytes, parent included.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub author: String,
    /// branch the record was created on
    pub branch: String,
    pub commit_type: CommitType,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Hash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<Hash>,
    /// unix timestamp, seconds
    pub timestamp: i64,
    pub tree: Hash,
}

impl CommitRecord {
    /// canonical JSON bytes (keys sorted ascending)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        object::canonical_json(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// is this a first commit on its branch
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// current unix time in seconds
pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// write a commit record to the object store
pub fn write_commit(repo: &Repo, record: &CommitRecord) -> Result<Hash> {
    object::write_object(repo, ObjectKind::Commit, &record.to_bytes()?)
}

/// read a commit record from the object store
pub fn read_commit(repo: &Repo, hash: &Hash) -> Result<CommitRecord> {
    let bytes = object::read_object(repo, ObjectKind::Commit, hash)?;
    CommitRecord::from_bytes(&bytes)
}

/// write a stash record; same byte format as commits, separate kind
pub fn write_stash(repo: &Repo, record: &CommitRecord) -> Result<Hash> {
    object::write_object(repo, ObjectKind::Stash, &record.to_bytes()?)
}

/// read a stash record
pub fn read_stash(repo: &Repo, hash: &Hash) -> Result<CommitRecord> {
    let bytes = object::read_object(repo, ObjectKind::Stash, hash)?;
    CommitRecord::from_bytes(&bytes)
}
