use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use crate::error::{Error, IoContext, Result};
use crate::hash::Hash;
use crate::repo::Repo;

/// the currently checked-out position
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Head {
    /// a branch name
    Branch(String),
    /// a raw commit, entered by checking out a commit hash
    Detached(Hash),
}

impl Head {
    /// branch name if attached
    pub fn branch(&self) -> Option<&str> {
        match self {
            Head::Branch(name) => Some(name),
            Head::Detached(_) => None,
        }
    }
}

/// read the HEAD file
pub fn read_head(repo: &Repo) -> Result<Head> {
    let path = repo.head_path();
    let content = fs::read_to_string(&path).with_path(&path)?;
    let value = content.trim();

    if let Some(hex) = value.strip_prefix('@') {
        return Ok(Head::Detached(Hash::from_hex(hex)?));
    }
    Ok(Head::Branch(value.to_string()))
}

/// write the HEAD file atomically
pub fn write_head(repo: &Repo, head: &Head) -> Result<()> {
    let value = match head {
        Head::Branch(name) => name.clone(),
        Head::Detached(hash) => format!("@{}", hash.to_hex()),
    };
    atomic_write(repo, &repo.head_path(), value.as_bytes())
}

/// write a branch ref file (create or update)
pub fn write_branch_ref(repo: &Repo, name: &str, hash: &Hash) -> Result<()> {
    validate_branch_name(name)?;
    write_ref_file(repo, repo.branch_refs_path().join(name), hash)
}

/// read a branch ref file
pub fn read_branch_ref(repo: &Repo, name: &str) -> Result<Hash> {
    read_ref_file(repo.branch_refs_path().join(name), name)
}

/// delete a branch ref file; missing files are not an error (unborn branch)
pub fn delete_branch_ref(repo: &Repo, name: &str) -> Result<()> {
    delete_ref_file(repo.branch_refs_path().join(name))
}

/// check whether a branch ref file exists
pub fn branch_ref_exists(repo: &Repo, name: &str) -> bool {
    repo.branch_refs_path().join(name).is_file()
}

/// list branch ref files, sorted by name
pub fn list_branch_refs(repo: &Repo) -> Result<Vec<(String, Hash)>> {
    list_ref_files(repo.branch_refs_path())
}

/// write a tag ref file
pub fn write_tag_ref(repo: &Repo, name: &str, hash: &Hash) -> Result<()> {
    validate_branch_name(name)?;
    write_ref_file(repo, repo.tag_refs_path().join(name), hash)
}

/// read a tag ref file
pub fn read_tag_ref(repo: &Repo, name: &str) -> Result<Hash> {
    read_ref_file(repo.tag_refs_path().join(name), name)
}

/// delete a tag ref file
pub fn delete_tag_ref(repo: &Repo, name: &str) -> Result<()> {
    let path = repo.tag_refs_path().join(name);
    if !path.is_file() {
        return Err(Error::UnknownRef(name.to_string()));
    }
    delete_ref_file(path)
}

/// check whether a tag ref file exists
pub fn tag_ref_exists(repo: &Repo, name: &str) -> bool {
    repo.tag_refs_path().join(name).is_file()
}

/// list tag ref files, sorted by name
pub fn list_tag_refs(repo: &Repo) -> Result<Vec<(String, Hash)>> {
    list_ref_files(repo.tag_refs_path())
}

/// validate a branch or tag name
///
/// names must be non-empty after trimming, contain no control characters,
/// no whitespace, and must not begin with '/' or contain path traversal.
pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidBranchName("empty name".to_string()));
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err(Error::InvalidBranchName(format!(
            "name cannot start or end with '/': {name}"
        )));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(Error::InvalidBranchName(format!(
            "name contains control characters: {name}"
        )));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(Error::InvalidBranchName(format!(
            "name contains whitespace: {name}"
        )));
    }
    for component in name.split('/') {
        if component.is_empty() || component == "." || component == ".." {
            return Err(Error::InvalidBranchName(format!(
                "name contains invalid path component: {name}"
            )));
        }
    }
    Ok(())
}

fn write_ref_file(repo: &Repo, path: PathBuf, hash: &Hash) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_path(parent)?;
    }
    atomic_write(repo, &path, format!("{}\n", hash.to_hex()).as_bytes())
}

fn read_ref_file(path: PathBuf, name: &str) -> Result<Hash> {
    let content = fs::read_to_string(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::UnknownRef(name.to_string())
        } else {
            Error::Io { path, source: e }
        }
    })?;
    Hash::from_hex(content.trim())
}

fn delete_ref_file(path: PathBuf) -> Result<()> {
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(Error::Io { path, source }),
    }
}

fn list_ref_files(dir: PathBuf) -> Result<Vec<(String, Hash)>> {
    let mut refs = Vec::new();
    if !dir.is_dir() {
        return Ok(refs);
    }
    for entry in fs::read_dir(&dir).with_path(&dir)? {
        let entry = entry.with_path(&dir)?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let hash = read_ref_file(path, &name)?;
        refs.push((name, hash));
    }
    refs.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(refs)
}

/// atomic write: temp file in .DFM/tmp -> fsync -> rename
fn atomic_write(repo: &Repo, path: &PathBuf, bytes: &[u8]) -> Result<()> {
    let tmp_path = repo.tmp_path().join(uuid::Uuid::new_v4().to_string());
    {
        let mut tmp_file = File::create(&tmp_path).with_path(&tmp_path)?;
        tmp_file.write_all(bytes).with_path(&tmp_path)?;
        tmp_file.sync_all().with_path(&tmp_path)?;
    }
    fs::rename(&tmp_path, path).with_path(path)?;
    if let Some(parent) = path.parent() {
        let dir = File::open(parent).with_path(parent)?;
        dir.sync_all().with_path(parent)?;
    }
    Ok(())
}
