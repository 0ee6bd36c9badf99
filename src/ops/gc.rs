use std::collections::HashSet;
use std::fs;

use tracing::{debug, info};

use crate::error::{IoContext, Result};
use crate::hash::Hash;
use crate::index::Index;
use crate::object::{
    list_objects, object_path, read_commit, read_mesh, read_stash, read_tree, EntryKind,
    ObjectKind,
};
use crate::repo::Repo;

/// per-kind sweep counts
#[derive(Debug, Default, PartialEq, Eq)]
pub struct GcStats {
    pub blobs_deleted: usize,
    pub trees_deleted: usize,
    pub commits_deleted: usize,
    pub meshes_deleted: usize,
    pub textures_deleted: usize,
    pub stashes_deleted: usize,
    pub bytes_freed: u64,
}

impl GcStats {
    pub fn total_deleted(&self) -> usize {
        self.blobs_deleted
            + self.trees_deleted
            + self.commits_deleted
            + self.meshes_deleted
            + self.textures_deleted
            + self.stashes_deleted
    }
}

/// the fully marked reachable set
#[derive(Default)]
struct Reachable {
    commits: HashSet<Hash>,
    trees: HashSet<Hash>,
    blobs: HashSet<Hash>,
    meshes: HashSet<Hash>,
    textures: HashSet<Hash>,
    stashes: HashSet<Hash>,
}

/// mark-and-sweep garbage collection
///
/// seeds are every branch tip, tag, and stash record. holds the exclusive
/// repo lock for the whole run so no ref can move mid-sweep. `dry_run`
/// reports candidates without deleting anything. no reachable hash is
/// ever deleted, and a second run after convergence deletes nothing.
pub fn gc(repo: &Repo, dry_run: bool) -> Result<GcStats> {
    let _repo_lock = repo.lock()?;

    let mut index = repo.index()?;
    let reachable = mark(repo, &mut index)?;

    let mut stats = GcStats::default();
    sweep(repo, ObjectKind::Blob, &reachable.blobs, dry_run, &mut stats.blobs_deleted, &mut stats.bytes_freed)?;
    let trees = sweep(repo, ObjectKind::Tree, &reachable.trees, dry_run, &mut stats.trees_deleted, &mut stats.bytes_freed)?;
    let commits = sweep(repo, ObjectKind::Commit, &reachable.commits, dry_run, &mut stats.commits_deleted, &mut stats.bytes_freed)?;
    let meshes = sweep(repo, ObjectKind::Mesh, &reachable.meshes, dry_run, &mut stats.meshes_deleted, &mut stats.bytes_freed)?;
    let textures = sweep(repo, ObjectKind::Texture, &reachable.textures, dry_run, &mut stats.textures_deleted, &mut stats.bytes_freed)?;
    sweep(repo, ObjectKind::Stash, &reachable.stashes, dry_run, &mut stats.stashes_deleted, &mut stats.bytes_freed)?;

    if !dry_run {
        index.delete_swept(&commits, &meshes, &textures)?;
        index.delete_tree_entries(&trees)?;
        index.checkpoint()?;
        info!(
            "gc removed {} objects ({} bytes)",
            stats.total_deleted(),
            stats.bytes_freed
        );
    } else {
        debug!("gc dry run: {} candidates", stats.total_deleted());
    }

    Ok(stats)
}

/// collect everything reachable from branch tips, tags, and stashes
fn mark(repo: &Repo, index: &mut Index) -> Result<Reachable> {
    let mut reachable = Reachable::default();

    let mut commit_seeds: Vec<Hash> = index
        .list_branches()?
        .into_iter()
        .filter_map(|branch| branch.tip)
        .collect();
    for (_, hash) in crate::refs::list_tag_refs(repo)? {
        commit_seeds.push(hash);
    }

    while let Some(hash) = commit_seeds.pop() {
        if !reachable.commits.insert(hash) {
            continue;
        }
        let record = read_commit(repo, &hash)?;
        mark_tree(repo, &record.tree, &mut reachable)?;
        // textures are reachable both through mesh objects and through
        // the commit's link rows
        reachable
            .textures
            .extend(index.textures_for_commit(&hash)?);
        if let Some(screenshot) = record.screenshot {
            reachable.blobs.insert(screenshot);
        }
        if let Some(parent) = record.parent {
            commit_seeds.push(parent);
        }
    }

    for stash in index.list_stashes()? {
        reachable.stashes.insert(stash.hash);
        let record = read_stash(repo, &stash.hash)?;
        mark_tree(repo, &record.tree, &mut reachable)?;
        if let Some(screenshot) = record.screenshot {
            reachable.blobs.insert(screenshot);
        }
    }

    Ok(reachable)
}

/// mark a tree and its transitive blobs, meshes, and textures
fn mark_tree(repo: &Repo, tree_hash: &Hash, reachable: &mut Reachable) -> Result<()> {
    if !reachable.trees.insert(*tree_hash) {
        return Ok(());
    }

    let tree = read_tree(repo, tree_hash)?;
    for entry in tree.entries() {
        match entry.kind {
            EntryKind::Blob => {
                reachable.blobs.insert(entry.hash);
            }
            EntryKind::Mesh => {
                if reachable.meshes.insert(entry.hash) {
                    let mesh = read_mesh(repo, &entry.hash)?;
                    reachable.textures.extend(mesh.textures);
                }
            }
            EntryKind::Tree => mark_tree(repo, &entry.hash, reachable)?,
        }
    }
    Ok(())
}

/// sweep one kind directory, returning the hashes actually swept
fn sweep(
    repo: &Repo,
    kind: ObjectKind,
    reachable: &HashSet<Hash>,
    dry_run: bool,
    deleted: &mut usize,
    bytes_freed: &mut u64,
) -> Result<Vec<Hash>> {
    let mut swept = Vec::new();

    for hash in list_objects(repo, kind)? {
        if reachable.contains(&hash) {
            continue;
        }
        let path = object_path(repo, kind, &hash);
        let meta = fs::metadata(&path).with_path(&path)?;
        *bytes_freed += meta.len();
        *deleted += 1;
        swept.push(hash);

        if !dry_run {
            fs::remove_file(&path).with_path(&path)?;
        }
    }

    // drop emptied fan-out directories
    if !dry_run {
        let dir = kind.dir(repo);
        if dir.exists() {
            for entry in walkdir::WalkDir::new(&dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if entry.file_type().is_dir() {
                    let _ = fs::remove_dir(entry.path());
                }
            }
        }
    }

    Ok(swept)
}

/// convenience check used in tests and fsck-style verification
pub fn is_reachable(repo: &Repo, hash: &Hash) -> Result<bool> {
    let mut index = repo.index()?;
    let reachable = mark(repo, &mut index)?;
    Ok(reachable.commits.contains(hash)
        || reachable.trees.contains(hash)
        || reachable.blobs.contains(hash)
        || reachable.meshes.contains(hash)
        || reachable.textures.contains(hash)
        || reachable.stashes.contains(hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;
    use crate::object::{blob_exists, object_exists, write_blob};
    use crate::ops::branch::{create_branch, delete_branch, switch_branch};
    use crate::ops::commit::{commit, CommitOptions};
    use crate::ops::stash::{delete_stash, stash_changes};
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repo) {
        let dir = tempdir().unwrap();
        let repo = Repo::init(dir.path(), false).unwrap();
        (dir, repo)
    }

    fn commit_file(repo: &Repo, dir: &std::path::Path, name: &str, content: &str) -> Hash {
        std::fs::write(dir.join(name), content).unwrap();
        commit(repo, content, None, &CommitOptions::default())
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_gc_keeps_everything_reachable() {
        let (dir, repo) = test_repo();
        commit_file(&repo, dir.path(), "a.txt", "one");
        commit_file(&repo, dir.path(), "a.txt", "two");

        let stats = gc(&repo, false).unwrap();
        assert_eq!(stats.total_deleted(), 0);
    }

    #[test]
    fn test_gc_collects_leaked_objects() {
        let (dir, repo) = test_repo();
        commit_file(&repo, dir.path(), "a.txt", "kept");

        // an object written outside any commit leaks until gc
        let leaked = write_blob(&repo, b"orphan bytes").unwrap();

        let dry = gc(&repo, true).unwrap();
        assert_eq!(dry.blobs_deleted, 1);
        assert!(blob_exists(&repo, &leaked));

        let real = gc(&repo, false).unwrap();
        assert_eq!(real.blobs_deleted, 1);
        assert!(real.bytes_freed > 0);
        assert!(!blob_exists(&repo, &leaked));

        // the committed blob survived
        assert!(blob_exists(&repo, &hash_bytes(b"kept")));
    }

    #[test]
    fn test_gc_unreachable_commit_chain() {
        let (dir, repo) = test_repo();

        commit_file(&repo, dir.path(), "a.txt", "one");
        commit_file(&repo, dir.path(), "a.txt", "two");

        // grow a side branch, then force-delete it: its commit becomes
        // unreachable
        create_branch(&repo, "scratch", None).unwrap();
        switch_branch(&repo, "scratch").unwrap();
        let doomed = commit_file(&repo, dir.path(), "scratch.txt", "temp work");
        switch_branch(&repo, "main").unwrap();
        std::fs::remove_file(dir.path().join("scratch.txt")).unwrap();
        delete_branch(&repo, "scratch", false).unwrap();

        let stats = gc(&repo, false).unwrap();
        assert_eq!(stats.commits_deleted, 1);
        assert!(!object_exists(&repo, ObjectKind::Commit, &doomed));

        // the index row went with it
        let index = repo.index().unwrap();
        assert!(index.get_commit(&doomed).unwrap().is_none());

        // reachable blobs from the surviving history are intact
        assert!(blob_exists(&repo, &hash_bytes(b"one")));
        assert!(blob_exists(&repo, &hash_bytes(b"two")));

        // second run converges to zero
        let again = gc(&repo, false).unwrap();
        assert_eq!(again, GcStats::default());
    }

    #[test]
    fn test_stash_roots_protect_objects() {
        let (dir, repo) = test_repo();

        commit_file(&repo, dir.path(), "a.txt", "base");
        std::fs::write(dir.path().join("a.txt"), "stashed edit").unwrap();
        let stash = stash_changes(&repo, None).unwrap().unwrap();

        let stats = gc(&repo, false).unwrap();
        assert_eq!(stats.stashes_deleted, 0);
        assert!(blob_exists(&repo, &hash_bytes(b"stashed edit")));

        // dropping the stash frees its snapshot
        delete_stash(&repo, &stash.to_hex()).unwrap();
        let stats = gc(&repo, false).unwrap();
        assert!(stats.blobs_deleted >= 1);
        assert!(!blob_exists(&repo, &hash_bytes(b"stashed edit")));
    }

    #[test]
    fn test_gc_dry_run_deletes_nothing() {
        let (dir, repo) = test_repo();
        commit_file(&repo, dir.path(), "a.txt", "keep");
        write_blob(&repo, b"leak").unwrap();

        gc(&repo, true).unwrap();
        assert!(blob_exists(&repo, &hash_bytes(b"leak")));
    }

    #[test]
    fn test_tagged_commits_survive() {
        let (dir, repo) = test_repo();

        commit_file(&repo, dir.path(), "a.txt", "one");
        create_branch(&repo, "side", None).unwrap();
        switch_branch(&repo, "side").unwrap();
        let tagged = commit_file(&repo, dir.path(), "b.txt", "tagged work");
        crate::ops::tag::create_tag(&repo, "v1", Some(&tagged.to_hex())).unwrap();
        switch_branch(&repo, "main").unwrap();
        std::fs::remove_file(dir.path().join("b.txt")).unwrap();
        delete_branch(&repo, "side", false).unwrap();

        let stats = gc(&repo, false).unwrap();
        assert_eq!(stats.commits_deleted, 0);
        assert!(object_exists(&repo, ObjectKind::Commit, &tagged));
    }
}
