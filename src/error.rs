use std::path::{Path, PathBuf};

use crate::Hash;

/// error type for forester operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not a forester repository (no .DFM found at or above {0})")]
    NotARepo(PathBuf),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("no changes to record")]
    NoChanges,

    #[error("unknown ref: {0}")]
    UnknownRef(String),

    #[error("working directory has uncommitted changes (use force to override)")]
    UncommittedChanges,

    #[error("files locked by another user: {}", .0.join(", "))]
    LockedFiles(Vec<String>),

    #[error("{hook} hook rejected the operation: {detail}")]
    HookRejected { hook: String, detail: String },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("corrupt object: hash mismatch for {0}")]
    CorruptObject(Hash),

    #[error("corrupt object: {0}")]
    CorruptObjectData(String),

    #[error("object not found: {0}")]
    ObjectNotFound(Hash),

    #[error("ambiguous hash prefix: {0}")]
    AmbiguousPrefix(String),

    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid hash hex: {0}")]
    InvalidHashHex(String),

    #[error("invalid tree entry name: {0}")]
    InvalidEntryName(String),

    #[error("duplicate tree entry name: {0}")]
    DuplicateEntryName(String),

    #[error("HEAD is detached; switch to a branch first")]
    DetachedHead,

    #[error("branch is in use: {0}")]
    BranchInUse(String),

    #[error("another operation holds the repository lock")]
    LockContention,

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("metadata index error: {0}")]
    Index(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// short machine-readable kind name, stable across messages
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotARepo(_) => "not_a_repo",
            Error::AlreadyExists(_)
            | Error::BranchInUse(_)
            | Error::InvalidBranchName(_)
            | Error::InvalidEntryName(_)
            | Error::DuplicateEntryName(_) => "already_exists",
            Error::NoChanges => "no_changes",
            Error::UnknownRef(_) | Error::AmbiguousPrefix(_) | Error::DetachedHead => "unknown_ref",
            Error::UncommittedChanges => "uncommitted_changes",
            Error::LockedFiles(_) | Error::LockContention => "locked_files",
            Error::HookRejected { .. } => "hook_rejected",
            Error::Timeout(_) => "timeout",
            Error::CorruptObject(_)
            | Error::CorruptObjectData(_)
            | Error::ObjectNotFound(_)
            | Error::InvalidHashHex(_) => "corrupt_object",
            Error::Io { .. } | Error::Index(_) | Error::Json(_) => "io_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// attaches the offending path to raw io errors
pub trait IoContext<T> {
    fn with_path(self, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn with_path(self, path: &Path) -> Result<T> {
        match self {
            Ok(value) => Ok(value),
            Err(source) => Err(Error::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}
