use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{IoContext, Result};
use crate::hash::{hash_file, Hash};
use crate::object::{self, ObjectKind};
use crate::repo::Repo;

/// write a blob to the object store, returning its hash
pub fn write_blob(repo: &Repo, content: &[u8]) -> Result<Hash> {
    object::write_object(repo, ObjectKind::Blob, content)
}

/// write a working file into the blob store by streaming
///
/// hashes the file first; an already stored blob costs one read and no
/// write. returns (hash, size).
pub fn write_blob_from_file(repo: &Repo, path: &Path) -> Result<(Hash, u64)> {
    let (hash, size) = hash_file(path)?;

    if object::object_exists(repo, ObjectKind::Blob, &hash) {
        return Ok((hash, size));
    }

    let (dir, file) = hash.to_path_components();
    let blob_dir = ObjectKind::Blob.dir(repo).join(&dir);
    let final_path = blob_dir.join(&file);
    fs::create_dir_all(&blob_dir).with_path(&blob_dir)?;

    let tmp_path = repo.tmp_path().join(uuid::Uuid::new_v4().to_string());
    {
        let mut src = File::open(path).with_path(path)?;
        let mut tmp_file = File::create(&tmp_path).with_path(&tmp_path)?;
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = src.read(&mut buf).with_path(path)?;
            if n == 0 {
                break;
            }
            tmp_file.write_all(&buf[..n]).with_path(&tmp_path)?;
        }
        tmp_file.sync_all().with_path(&tmp_path)?;
    }

    fs::rename(&tmp_path, &final_path).with_path(&final_path)?;
    let dir_file = File::open(&blob_dir).with_path(&blob_dir)?;
    dir_file.sync_all().with_path(&blob_dir)?;

    Ok((hash, size))
}

/// read blob content
pub fn read_blob(repo: &Repo, hash: &Hash) -> Result<Vec<u8>> {
    object::read_object(repo, ObjectKind::Blob, hash)
}

/// check if a blob exists in the object store
pub fn blob_exists(repo: &Repo, hash: &Hash) -> bool {
    object::object_exists(repo, ObjectKind::Blob, hash)
}

/// get the filesystem path to a blob
pub fn blob_path(repo: &Repo, hash: &Hash) -> PathBuf {
    object::object_path(repo, ObjectKind::Blob, hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repo) {
        let dir = tempdir().unwrap();
        let repo = Repo::init(dir.path(), false).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_write_and_read_blob() {
        let (_dir, repo) = test_repo();

        let hash = write_blob(&repo, b"hello, world!").unwrap();
        assert!(blob_exists(&repo, &hash));
        assert_eq!(read_blob(&repo, &hash).unwrap(), b"hello, world!");
    }

    #[test]
    fn test_blob_hash_is_content_hash() {
        let (_dir, repo) = test_repo();

        let hash = write_blob(&repo, b"X").unwrap();
        assert_eq!(hash, hash_bytes(b"X"));
    }

    #[test]
    fn test_write_blob_from_file_matches_in_memory() {
        let (dir, repo) = test_repo();

        let path = dir.path().join("asset.bin");
        fs::write(&path, b"streamed bytes").unwrap();

        let (hash, size) = write_blob_from_file(&repo, &path).unwrap();
        assert_eq!(size, 14);
        assert_eq!(hash, write_blob(&repo, b"streamed bytes").unwrap());
        assert_eq!(read_blob(&repo, &hash).unwrap(), b"streamed bytes");
    }

    #[test]
    fn test_blob_path_structure() {
        let (_dir, repo) = test_repo();

        let hash = write_blob(&repo, b"test").unwrap();
        let path = blob_path(&repo, &hash);

        let hex = hash.to_hex();
        assert!(path.ends_with(format!("{}/{}", &hex[..2], &hex[2..])));
    }
}
