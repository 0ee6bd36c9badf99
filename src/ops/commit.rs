use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::{Error, IoContext, Result};
use crate::hash::Hash;
use crate::index::{Index, NewCommit};
use crate::object::commit::unix_now;
use crate::object::{
    delete_object, flatten_tree, looks_like_mesh, read_commit, write_blob, write_commit,
    CommitRecord, CommitType, ObjectKind,
};
use crate::ops::hooks::{run_post_hook, run_pre_hook, Hook};
use crate::refs::{read_head, write_branch_ref};
use crate::repo::Repo;
use crate::scan::{scan_working_set, ScanEntry};
use crate::tree_builder::build_tree;

/// options for [`commit`]
pub struct CommitOptions {
    /// reject the commit when a changed file is locked by someone else
    pub check_locks: bool,
    /// skip the pre-commit hook
    pub no_verify: bool,
    /// project snapshot or mesh-only quick save
    pub commit_type: CommitType,
    /// viewport capture supplied by the external adapter, stored as a blob
    /// and linked on the commit row
    pub screenshot: Option<Vec<u8>>,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            check_locks: true,
            no_verify: false,
            commit_type: CommitType::Project,
            screenshot: None,
        }
    }
}

/// record a snapshot of the working set on the current branch
///
/// returns Ok(None) when the working set matches the branch tip. objects
/// are written before the single metadata transaction; a cancellation in
/// between leaks objects for the next GC rather than corrupting state.
pub fn commit(
    repo: &Repo,
    message: &str,
    author: Option<&str>,
    opts: &CommitOptions,
) -> Result<Option<Hash>> {
    let _repo_lock = repo.lock()?;

    let head = read_head(repo)?;
    let Some(branch) = head.branch().map(str::to_string) else {
        return Err(Error::DetachedHead);
    };
    let author = author.unwrap_or(&repo.config().default_author).to_string();

    let mut index = repo.index()?;
    let parent = index.branch_tip(&branch)?;
    let parent_record = parent.map(|hash| read_commit(repo, &hash)).transpose()?;

    let mut scan = scan_working_set(repo)?;
    if opts.commit_type == CommitType::MeshOnly {
        scan = filter_mesh_entries(repo, scan)?;
    }
    let build = build_tree(repo, &scan)?;

    if let Some(ref parent_record) = parent_record {
        if parent_record.tree == build.root {
            debug!("working set matches branch tip, nothing to commit");
            return Ok(None);
        }
    }

    if opts.check_locks {
        let parent_files: HashMap<String, Hash> = match parent_record {
            Some(ref record) => flatten_tree(repo, &record.tree)?
                .into_iter()
                .map(|entry| (entry.path, entry.hash))
                .collect(),
            None => HashMap::new(),
        };

        let mut changed: Vec<String> = build
            .files
            .iter()
            .filter(|file| parent_files.get(&file.path) != Some(&file.hash))
            .map(|file| file.path.clone())
            .collect();
        let new_paths: HashMap<&String, ()> =
            build.files.iter().map(|f| (&f.path, ())).collect();
        changed.extend(
            parent_files
                .keys()
                .filter(|path| !new_paths.contains_key(path))
                .cloned(),
        );

        let conflicts = index.check_conflicts(&changed, &branch, &author)?;
        if !conflicts.is_empty() {
            let mut paths: Vec<String> =
                conflicts.into_iter().map(|lock| lock.file_path).collect();
            paths.sort();
            paths.dedup();
            return Err(Error::LockedFiles(paths));
        }
    }

    if !opts.no_verify {
        run_pre_hook(
            repo,
            Hook::PreCommit,
            &[
                ("DFM_BRANCH", branch.clone()),
                ("DFM_AUTHOR", author.clone()),
                ("DFM_MESSAGE", message.to_string()),
            ],
        )?;
    }

    // timestamps stay monotonically non-decreasing along the branch
    let timestamp = match parent_record {
        Some(ref record) => unix_now().max(record.timestamp),
        None => unix_now(),
    };

    let screenshot = opts
        .screenshot
        .as_deref()
        .map(|bytes| write_blob(repo, bytes))
        .transpose()?;

    let record = CommitRecord {
        author,
        branch: branch.clone(),
        commit_type: opts.commit_type,
        message: message.to_string(),
        parent,
        screenshot,
        timestamp,
        tree: build.root,
    };
    let commit_hash = write_commit(repo, &record)?;

    // normalize ingested descriptors so the working copy matches the
    // stored mesh bytes
    for (path, canonical) in &build.normalized_meshes {
        let abs = repo.root().join(path);
        std::fs::write(&abs, canonical).with_path(&abs)?;
    }

    index.record_commit(&NewCommit {
        hash: commit_hash,
        record: &record,
        files: &build.files,
        trees: &build.trees,
        meshes: &build.meshes,
        textures: &build.textures,
        texture_links: &build.texture_links,
    })?;

    write_branch_ref(repo, &branch, &commit_hash)?;
    index.checkpoint()?;

    run_post_hook(
        repo,
        Hook::PostCommit,
        &[
            ("DFM_BRANCH", branch.clone()),
            ("DFM_AUTHOR", record.author.clone()),
            ("DFM_MESSAGE", message.to_string()),
            ("DFM_COMMIT_HASH", commit_hash.to_hex()),
        ],
    );

    if let Some(keep) = repo.config().auto_compress_keep {
        let removed = auto_compress(repo, &mut index, &branch, keep as usize)?;
        if removed > 0 {
            debug!("auto-compress removed {} old mesh-only commits", removed);
        }
    }

    Ok(Some(commit_hash))
}

/// keep only mesh descriptor files for a mesh-only quick save
fn filter_mesh_entries(repo: &Repo, scan: Vec<ScanEntry>) -> Result<Vec<ScanEntry>> {
    let mut meshes = Vec::new();
    for entry in scan {
        if !entry.path.ends_with(".json") {
            continue;
        }
        let abs = repo.root().join(&entry.path);
        let bytes = std::fs::read(&abs).with_path(&abs)?;
        if looks_like_mesh(&bytes) {
            meshes.push(entry);
        }
    }
    Ok(meshes)
}

/// delete mesh-only commits on a branch beyond the retention count
///
/// a candidate is only removed when no branch tip, tag, or remaining
/// history can still reach it.
fn auto_compress(repo: &Repo, index: &mut Index, branch: &str, keep: usize) -> Result<usize> {
    let candidates = index.commits_on_branch_of_type(branch, CommitType::MeshOnly)?;
    if candidates.len() <= keep {
        return Ok(0);
    }

    let reachable = reachable_commits(repo, index)?;

    let mut removed = 0;
    for (hash, _) in candidates.into_iter().skip(keep) {
        if reachable.contains(&hash) {
            continue;
        }
        if !delete_object(repo, ObjectKind::Commit, &hash)? {
            warn!("mesh-only commit {} already absent from store", hash);
        }
        index.delete_swept(&[hash], &[], &[])?;
        removed += 1;
    }
    Ok(removed)
}

/// every commit reachable from any branch tip or tag, via parent chains
pub(crate) fn reachable_commits(
    repo: &Repo,
    index: &mut Index,
) -> Result<std::collections::HashSet<Hash>> {
    let mut seeds: Vec<Hash> = index
        .list_branches()?
        .into_iter()
        .filter_map(|branch| branch.tip)
        .collect();
    for (_, hash) in crate::refs::list_tag_refs(repo)? {
        seeds.push(hash);
    }

    let mut reachable = std::collections::HashSet::new();
    while let Some(hash) = seeds.pop() {
        if !reachable.insert(hash) {
            continue;
        }
        // prefer the index row; fall back to the stored object
        let parent = match index.get_commit(&hash)? {
            Some(record) => record.parent,
            None => match read_commit(repo, &hash) {
                Ok(record) => record.parent,
                Err(Error::ObjectNotFound(_)) => None,
                Err(e) => return Err(e),
            },
        };
        if let Some(parent) = parent {
            seeds.push(parent);
        }
    }
    Ok(reachable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;
    use crate::object::list_objects;
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repo) {
        let dir = tempdir().unwrap();
        let repo = Repo::init(dir.path(), false).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_first_commit() {
        let (dir, repo) = test_repo();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();

        let hash = commit(&repo, "first", Some("alice"), &CommitOptions::default())
            .unwrap()
            .expect("changes present");
        assert_eq!(hash.to_hex().len(), 64);

        let index = repo.index().unwrap();
        let record = index.get_commit(&hash).unwrap().unwrap();
        assert_eq!(record.message, "first");
        assert_eq!(record.author, "alice");
        assert_eq!(record.branch, "main");
        assert!(record.parent.is_none());

        assert_eq!(index.branch_tip("main").unwrap(), Some(hash));
        assert_eq!(index.commit_count(&hash).unwrap(), 1);
        assert_eq!(crate::refs::read_branch_ref(&repo, "main").unwrap(), hash);
    }

    #[test]
    fn test_no_changes_returns_none() {
        let (dir, repo) = test_repo();
        std::fs::write(dir.path().join("a.txt"), "same").unwrap();

        commit(&repo, "one", None, &CommitOptions::default())
            .unwrap()
            .unwrap();
        let second = commit(&repo, "two", None, &CommitOptions::default()).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_identical_content_stored_once() {
        let (dir, repo) = test_repo();
        std::fs::write(dir.path().join("a.txt"), "X").unwrap();
        std::fs::write(dir.path().join("b.txt"), "X").unwrap();

        commit(&repo, "dup", None, &CommitOptions::default())
            .unwrap()
            .unwrap();

        let blobs = list_objects(&repo, ObjectKind::Blob).unwrap();
        assert_eq!(blobs, vec![hash_bytes(b"X")]);
    }

    #[test]
    fn test_parent_chain_and_timestamps() {
        let (dir, repo) = test_repo();

        std::fs::write(dir.path().join("a.txt"), "v1").unwrap();
        let h1 = commit(&repo, "one", None, &CommitOptions::default())
            .unwrap()
            .unwrap();

        std::fs::write(dir.path().join("a.txt"), "v2").unwrap();
        let h2 = commit(&repo, "two", None, &CommitOptions::default())
            .unwrap()
            .unwrap();

        let c1 = read_commit(&repo, &h1).unwrap();
        let c2 = read_commit(&repo, &h2).unwrap();
        assert_eq!(c2.parent, Some(h1));
        assert!(c1.timestamp <= c2.timestamp);
    }

    #[test]
    fn test_locked_file_rejects_commit() {
        let (dir, repo) = test_repo();

        std::fs::write(dir.path().join("a.txt"), "base").unwrap();
        commit(&repo, "base", Some("alice"), &CommitOptions::default())
            .unwrap()
            .unwrap();

        let mut index = repo.index().unwrap();
        assert!(index
            .lock_file("a.txt", "main", "bob", crate::index::LockType::Exclusive, None)
            .unwrap());
        let tip_before = index.branch_tip("main").unwrap();
        drop(index);

        std::fs::write(dir.path().join("a.txt"), "edited by alice").unwrap();
        let result = commit(&repo, "x", Some("alice"), &CommitOptions::default());
        match result {
            Err(Error::LockedFiles(paths)) => assert_eq!(paths, vec!["a.txt".to_string()]),
            other => panic!("expected LockedFiles, got {other:?}"),
        }

        // the branch did not advance
        let index = repo.index().unwrap();
        assert_eq!(index.branch_tip("main").unwrap(), tip_before);
    }

    #[test]
    fn test_own_lock_does_not_block() {
        let (dir, repo) = test_repo();

        std::fs::write(dir.path().join("a.txt"), "base").unwrap();
        commit(&repo, "base", Some("alice"), &CommitOptions::default())
            .unwrap()
            .unwrap();

        let mut index = repo.index().unwrap();
        index
            .lock_file("a.txt", "main", "alice", crate::index::LockType::Exclusive, None)
            .unwrap();
        drop(index);

        std::fs::write(dir.path().join("a.txt"), "still alice").unwrap();
        commit(&repo, "mine", Some("alice"), &CommitOptions::default())
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_check_locks_false_bypasses() {
        let (dir, repo) = test_repo();

        std::fs::write(dir.path().join("a.txt"), "base").unwrap();
        commit(&repo, "base", Some("alice"), &CommitOptions::default())
            .unwrap()
            .unwrap();

        let mut index = repo.index().unwrap();
        index
            .lock_file("a.txt", "main", "bob", crate::index::LockType::Exclusive, None)
            .unwrap();
        drop(index);

        std::fs::write(dir.path().join("a.txt"), "forced").unwrap();
        let opts = CommitOptions {
            check_locks: false,
            ..Default::default()
        };
        commit(&repo, "forced", Some("alice"), &opts)
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_screenshot_is_linked() {
        let (dir, repo) = test_repo();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();

        let opts = CommitOptions {
            screenshot: Some(b"viewport capture".to_vec()),
            ..Default::default()
        };
        let hash = commit(&repo, "shot", None, &opts).unwrap().unwrap();

        let record = read_commit(&repo, &hash).unwrap();
        let screenshot = record.screenshot.expect("screenshot linked");
        assert_eq!(
            crate::object::read_blob(&repo, &screenshot).unwrap(),
            b"viewport capture"
        );
    }

    #[test]
    fn test_mesh_only_commit_covers_meshes_only() {
        let (dir, repo) = test_repo();

        std::fs::write(dir.path().join("notes.txt"), "ignored in quick save").unwrap();
        std::fs::write(
            dir.path().join("rock.json"),
            r#"{"name": "rock", "vertices": [[0.0,0.0,0.0]], "faces": [[0]]}"#,
        )
        .unwrap();

        let opts = CommitOptions {
            commit_type: CommitType::MeshOnly,
            ..Default::default()
        };
        let hash = commit(&repo, "quick", None, &opts).unwrap().unwrap();

        let record = read_commit(&repo, &hash).unwrap();
        assert_eq!(record.commit_type, CommitType::MeshOnly);

        let flat = flatten_tree(&repo, &record.tree).unwrap();
        let paths: Vec<_> = flat.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["rock.json"]);
    }

    #[test]
    fn test_auto_compress_spares_reachable_history() {
        let (dir, mut repo) = test_repo();
        repo.config_mut().auto_compress_keep = Some(1);

        std::fs::write(
            dir.path().join("rock.json"),
            r#"{"name": "rock", "vertices": [[0.0,0.0,0.0]], "faces": [[0]]}"#,
        )
        .unwrap();
        let opts = CommitOptions {
            commit_type: CommitType::MeshOnly,
            ..Default::default()
        };
        let h1 = commit(&repo, "q1", None, &opts).unwrap().unwrap();

        std::fs::write(
            dir.path().join("rock.json"),
            r#"{"faces":[[0]],"name":"rock","vertices":[[0.0,0.0,1.0]]}"#,
        )
        .unwrap();
        let h2 = commit(&repo, "q2", None, &opts).unwrap().unwrap();

        // h1 is beyond the retention count but still reachable from the
        // tip's parent chain, so it survives
        assert!(crate::object::object_exists(&repo, ObjectKind::Commit, &h1));
        assert!(crate::object::object_exists(&repo, ObjectKind::Commit, &h2));
    }
}
