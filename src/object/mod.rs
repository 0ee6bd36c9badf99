//! content-addressed object store
//!
//! every object kind lives in its own two-level hex fan-out directory.
//! writes stage to .DFM/tmp and rename into place; a second write of the
//! same bytes is a no-op. reads verify that the stored bytes still hash
//! back to their identifier.

pub mod blob;
pub mod commit;
pub mod mesh;
pub mod texture;
pub mod tree;

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{Error, IoContext, Result};
use crate::hash::{hash_bytes, Hash};
use crate::repo::Repo;

pub use blob::{blob_exists, blob_path, read_blob, write_blob, write_blob_from_file};
pub use commit::{
    read_commit, read_stash, write_commit, write_stash, CommitRecord, CommitType,
};
pub use mesh::{ingest_mesh, looks_like_mesh, read_mesh, write_mesh, Mesh, MeshIngest};
pub use texture::{read_texture, sniff_texture_info, write_texture, TextureInfo};
pub use tree::{flatten_tree, read_tree, write_tree, EntryKind, Tree, TreeEntry};

/// the kinds of stored objects
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
    Mesh,
    Texture,
    Stash,
}

impl ObjectKind {
    /// all kinds, in sweep order
    pub const ALL: [ObjectKind; 6] = [
        ObjectKind::Blob,
        ObjectKind::Tree,
        ObjectKind::Commit,
        ObjectKind::Mesh,
        ObjectKind::Texture,
        ObjectKind::Stash,
    ];

    /// root directory for this kind
    pub fn dir(&self, repo: &Repo) -> PathBuf {
        match self {
            ObjectKind::Blob => repo.objects_path().join("blobs"),
            ObjectKind::Tree => repo.objects_path().join("trees"),
            ObjectKind::Commit => repo.objects_path().join("commits"),
            ObjectKind::Mesh => repo.objects_path().join("meshes"),
            ObjectKind::Texture => repo.objects_path().join("textures"),
            ObjectKind::Stash => repo.stash_path(),
        }
    }
}

/// filesystem path of an object
pub fn object_path(repo: &Repo, kind: ObjectKind, hash: &Hash) -> PathBuf {
    let (dir, file) = hash.to_path_components();
    kind.dir(repo).join(dir).join(file)
}

/// check whether an object is stored
pub fn object_exists(repo: &Repo, kind: ObjectKind, hash: &Hash) -> bool {
    object_path(repo, kind, hash).exists()
}

/// write bytes as a content-addressed object, returning their hash
///
/// atomic: temp file -> fsync -> rename. concurrent writers of identical
/// content race onto the same final name with identical bytes.
pub fn write_object(repo: &Repo, kind: ObjectKind, bytes: &[u8]) -> Result<Hash> {
    let hash = hash_bytes(bytes);

    let (dir, file) = hash.to_path_components();
    let object_dir = kind.dir(repo).join(&dir);
    let final_path = object_dir.join(&file);

    // dedup: identical content is already in place
    if final_path.exists() {
        return Ok(hash);
    }

    fs::create_dir_all(&object_dir).with_path(&object_dir)?;

    let tmp_path = repo.tmp_path().join(uuid::Uuid::new_v4().to_string());
    {
        let mut tmp_file = File::create(&tmp_path).with_path(&tmp_path)?;
        tmp_file.write_all(bytes).with_path(&tmp_path)?;
        tmp_file.sync_all().with_path(&tmp_path)?;
    }

    fs::rename(&tmp_path, &final_path).with_path(&final_path)?;
    fsync_dir(&object_dir)?;

    Ok(hash)
}

/// read an object's bytes, verifying they hash back to `hash`
pub fn read_object(repo: &Repo, kind: ObjectKind, hash: &Hash) -> Result<Vec<u8>> {
    let path = object_path(repo, kind, hash);
    let bytes = fs::read(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::ObjectNotFound(*hash)
        } else {
            Error::Io { path, source: e }
        }
    })?;

    if hash_bytes(&bytes) != *hash {
        return Err(Error::CorruptObject(*hash));
    }
    Ok(bytes)
}

/// delete a stored object; returns false if it was not present
pub fn delete_object(repo: &Repo, kind: ObjectKind, hash: &Hash) -> Result<bool> {
    let path = object_path(repo, kind, hash);
    match fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(Error::Io { path, source }),
    }
}

/// enumerate every stored hash of a kind
pub fn list_objects(repo: &Repo, kind: ObjectKind) -> Result<Vec<Hash>> {
    let dir = kind.dir(repo);
    let mut hashes = Vec::new();
    if !dir.exists() {
        return Ok(hashes);
    }

    for entry in WalkDir::new(&dir).min_depth(2).max_depth(2) {
        let entry = entry.map_err(|e| Error::Io {
            path: dir.clone(),
            source: e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("walkdir error")),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        // reconstruct hash from <xx>/<rest>
        let file_name = entry.file_name().to_string_lossy();
        let parent_name = entry
            .path()
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if let Ok(hash) = Hash::from_hex(&format!("{parent_name}{file_name}")) {
            hashes.push(hash);
        }
    }
    hashes.sort();
    Ok(hashes)
}

/// resolve an abbreviated hex prefix to a unique stored hash
///
/// a full 64-char prefix is parsed directly; shorter prefixes scan the
/// kind directory and fail on ambiguity.
pub fn resolve_prefix(repo: &Repo, kind: ObjectKind, prefix: &str) -> Result<Hash> {
    if prefix.len() < 4 || !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::UnknownRef(prefix.to_string()));
    }
    if prefix.len() == 64 {
        let hash = Hash::from_hex(prefix)?;
        if object_exists(repo, kind, &hash) {
            return Ok(hash);
        }
        return Err(Error::UnknownRef(prefix.to_string()));
    }

    let prefix = prefix.to_ascii_lowercase();
    let mut matches = list_objects(repo, kind)?
        .into_iter()
        .filter(|h| h.to_hex().starts_with(&prefix));

    match (matches.next(), matches.next()) {
        (Some(hash), None) => Ok(hash),
        (Some(_), Some(_)) => Err(Error::AmbiguousPrefix(prefix)),
        (None, _) => Err(Error::UnknownRef(prefix)),
    }
}

/// serialize a value to canonical JSON bytes (keys sorted ascending)
///
/// serde_json's object map is ordered, so routing through `Value` sorts
/// keys; float formatting is the shortest round-trip representation.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&value)?)
}

/// fsync a directory
fn fsync_dir(path: &std::path::Path) -> Result<()> {
    let dir = File::open(path).with_path(path)?;
    dir.sync_all().with_path(path)?;
    Ok(())
}
