use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::object::{resolve_prefix, ObjectKind};
use crate::refs::{
    delete_tag_ref, list_tag_refs, read_head, read_tag_ref, tag_ref_exists, write_tag_ref, Head,
};
use crate::repo::Repo;

/// create a lightweight tag pointing at a commit
///
/// `target` resolves as a branch name or commit hash prefix; None tags
/// the current HEAD tip.
pub fn create_tag(repo: &Repo, name: &str, target: Option<&str>) -> Result<()> {
    let _repo_lock = repo.lock()?;

    if tag_ref_exists(repo, name) {
        return Err(Error::AlreadyExists(format!("tag {name}")));
    }

    let index = repo.index()?;
    let commit = match target {
        Some(target) => {
            if index.branch_exists(target)? {
                index
                    .branch_tip(target)?
                    .ok_or_else(|| Error::UnknownRef(format!("branch {target} has no commits")))?
            } else {
                resolve_prefix(repo, ObjectKind::Commit, target)?
            }
        }
        None => match read_head(repo)? {
            Head::Branch(branch) => index
                .branch_tip(&branch)?
                .ok_or_else(|| Error::UnknownRef(format!("branch {branch} has no commits")))?,
            Head::Detached(hash) => hash,
        },
    };

    write_tag_ref(repo, name, &commit)
}

/// all tags with their targets, sorted by name; a reader operation
pub fn list_tags(repo: &Repo) -> Result<Vec<(String, Hash)>> {
    list_tag_refs(repo)
}

/// resolve a tag to its commit hash
pub fn show_tag(repo: &Repo, name: &str) -> Result<Hash> {
    read_tag_ref(repo, name)
}

/// remove a tag; the commit it pointed at stays until GC
pub fn delete_tag(repo: &Repo, name: &str) -> Result<()> {
    let _repo_lock = repo.lock()?;
    delete_tag_ref(repo, name)
}
