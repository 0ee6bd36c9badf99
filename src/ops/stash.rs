use tracing::debug;

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::index::StashInfo;
use crate::object::commit::unix_now;
use crate::object::{
    delete_object, read_commit, resolve_prefix, write_stash, CommitRecord, CommitType, ObjectKind,
};
use crate::ops::checkout::materialize_full_tree;
use crate::ops::status::status;
use crate::refs::{read_head, Head};
use crate::repo::Repo;
use crate::scan::scan_working_set;
use crate::tree_builder::build_tree;

/// snapshot the dirty working set outside branch history, then restore
/// the branch-tip state
///
/// returns Ok(None) when there is nothing to stash.
pub fn stash_changes(repo: &Repo, message: Option<&str>) -> Result<Option<Hash>> {
    let _repo_lock = repo.lock()?;

    let head = read_head(repo)?;
    let Some(branch) = head.branch().map(str::to_string) else {
        return Err(Error::DetachedHead);
    };

    let mut index = repo.index()?;
    let tip = index.branch_tip(&branch)?;
    let tip_tree = tip.map(|hash| read_commit(repo, &hash)).transpose()?.map(|c| c.tree);

    let scan = scan_working_set(repo)?;
    let build = build_tree(repo, &scan)?;

    if tip_tree == Some(build.root) || (tip_tree.is_none() && scan.is_empty()) {
        debug!("working set matches the branch tip, nothing to stash");
        return Ok(None);
    }

    let record = CommitRecord {
        author: repo.config().default_author.clone(),
        branch,
        commit_type: CommitType::Project,
        message: message.unwrap_or("stash").to_string(),
        parent: None,
        screenshot: None,
        timestamp: unix_now(),
        tree: build.root,
    };
    let stash_hash = write_stash(repo, &record)?;
    index.record_stash(&stash_hash, &record, &build.trees)?;
    index.checkpoint()?;

    // restore the pre-dirty state
    match tip_tree {
        Some(tree) => materialize_full_tree(repo, &tree)?,
        None => materialize_full_tree(repo, &crate::object::write_tree(repo, &crate::object::Tree::empty())?)?,
    }

    Ok(Some(stash_hash))
}

/// check a stash's tree out into the working directory
pub fn apply_stash(repo: &Repo, target: &str, force: bool) -> Result<Hash> {
    let _repo_lock = repo.lock()?;

    let stash_hash = resolve_prefix(repo, ObjectKind::Stash, target)?;
    let index = repo.index()?;
    let Some(info) = index.get_stash(&stash_hash)? else {
        return Err(Error::UnknownRef(target.to_string()));
    };

    if !force && !status(repo)?.is_clean() {
        return Err(Error::UncommittedChanges);
    }

    materialize_full_tree(repo, &info.tree)?;
    Ok(stash_hash)
}

/// drop a stash record; its objects become GC-eligible
pub fn delete_stash(repo: &Repo, target: &str) -> Result<()> {
    let _repo_lock = repo.lock()?;

    let stash_hash = resolve_prefix(repo, ObjectKind::Stash, target)?;
    let mut index = repo.index()?;
    if !index.delete_stash(&stash_hash)? {
        return Err(Error::UnknownRef(target.to_string()));
    }
    // the record object goes now; trees and blobs wait for GC
    delete_object(repo, ObjectKind::Stash, &stash_hash)?;
    index.checkpoint()?;
    Ok(())
}

/// all stashes, newest first; a reader operation
pub fn list_stashes(repo: &Repo) -> Result<Vec<StashInfo>> {
    repo.index()?.list_stashes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::commit::{commit, CommitOptions};
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repo) {
        let dir = tempdir().unwrap();
        let repo = Repo::init(dir.path(), false).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_stash_roundtrip() {
        let (dir, repo) = test_repo();

        std::fs::write(dir.path().join("a.txt"), "committed").unwrap();
        commit(&repo, "base", None, &CommitOptions::default())
            .unwrap()
            .unwrap();

        std::fs::write(dir.path().join("a.txt"), "dirty edit").unwrap();
        let stash = stash_changes(&repo, Some("wip"))
            .unwrap()
            .expect("dirty tree stashes");

        // the working directory is back at the committed state
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "committed"
        );

        // applying reproduces the dirty content exactly
        apply_stash(&repo, &stash.to_hex(), true).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "dirty edit"
        );
    }

    #[test]
    fn test_stash_clean_tree_returns_none() {
        let (dir, repo) = test_repo();

        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        commit(&repo, "base", None, &CommitOptions::default())
            .unwrap()
            .unwrap();

        assert!(stash_changes(&repo, None).unwrap().is_none());
    }

    #[test]
    fn test_stash_does_not_touch_branch() {
        let (dir, repo) = test_repo();

        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        let tip = commit(&repo, "base", None, &CommitOptions::default())
            .unwrap()
            .unwrap();

        std::fs::write(dir.path().join("a.txt"), "y").unwrap();
        stash_changes(&repo, None).unwrap().unwrap();

        let index = repo.index().unwrap();
        assert_eq!(index.branch_tip("main").unwrap(), Some(tip));
    }

    #[test]
    fn test_apply_guards_dirty_tree() {
        let (dir, repo) = test_repo();

        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        commit(&repo, "base", None, &CommitOptions::default())
            .unwrap()
            .unwrap();

        std::fs::write(dir.path().join("a.txt"), "y").unwrap();
        let stash = stash_changes(&repo, None).unwrap().unwrap();

        std::fs::write(dir.path().join("a.txt"), "conflicting edit").unwrap();
        let result = apply_stash(&repo, &stash.to_hex(), false);
        assert!(matches!(result, Err(Error::UncommittedChanges)));
    }

    #[test]
    fn test_list_and_delete() {
        let (dir, repo) = test_repo();

        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        commit(&repo, "base", None, &CommitOptions::default())
            .unwrap()
            .unwrap();

        std::fs::write(dir.path().join("a.txt"), "y").unwrap();
        let stash = stash_changes(&repo, Some("wip")).unwrap().unwrap();

        let listed = list_stashes(&repo).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].hash, stash);
        assert_eq!(listed[0].message, "wip");

        delete_stash(&repo, &stash.to_hex()[..12]).unwrap();
        assert!(list_stashes(&repo).unwrap().is_empty());
        assert!(matches!(
            delete_stash(&repo, &stash.to_hex()),
            Err(Error::UnknownRef(_))
        ));
    }
}
