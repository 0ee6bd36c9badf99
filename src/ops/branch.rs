use crate::error::{Error, Result};
use crate::index::BranchInfo;
use crate::refs::{
    delete_branch_ref, read_head, validate_branch_name, write_branch_ref, write_head, Head,
};
use crate::repo::Repo;

/// a branch with its tip and history length
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchSummary {
    pub name: String,
    pub tip: Option<crate::hash::Hash>,
    pub commit_count: u64,
    pub is_current: bool,
}

/// create a branch pointing at `from`'s tip (or the current tip)
pub fn create_branch(repo: &Repo, name: &str, from: Option<&str>) -> Result<()> {
    let _repo_lock = repo.lock()?;
    validate_branch_name(name)?;

    let mut index = repo.index()?;
    if index.branch_exists(name)? {
        return Err(Error::AlreadyExists(format!("branch {name}")));
    }

    let tip = match from {
        Some(source) => index.branch_tip(source)?,
        None => match read_head(repo)? {
            Head::Branch(current) => index.branch_tip(&current)?,
            Head::Detached(hash) => Some(hash),
        },
    };

    index.create_branch(name, tip.as_ref())?;
    if let Some(tip) = tip {
        write_branch_ref(repo, name, &tip)?;
    }
    index.checkpoint()?;
    Ok(())
}

/// point HEAD at another branch; the working directory is untouched
///
/// callers combine this with checkout for the Git-style effect.
pub fn switch_branch(repo: &Repo, name: &str) -> Result<()> {
    let _repo_lock = repo.lock()?;

    let mut index = repo.index()?;
    if !index.branch_exists(name)? {
        return Err(Error::UnknownRef(name.to_string()));
    }

    write_head(repo, &Head::Branch(name.to_string()))?;
    index.set_meta("head", name)?;
    index.checkpoint()?;
    Ok(())
}

/// rename a branch, following HEAD if it pointed at the old name
pub fn rename_branch(repo: &Repo, old: &str, new: &str) -> Result<()> {
    let _repo_lock = repo.lock()?;
    validate_branch_name(new)?;

    let mut index = repo.index()?;
    if !index.branch_exists(old)? {
        return Err(Error::UnknownRef(old.to_string()));
    }
    if index.branch_exists(new)? {
        return Err(Error::AlreadyExists(format!("branch {new}")));
    }

    let tip = index.branch_tip(old)?;
    index.rename_branch(old, new)?;

    delete_branch_ref(repo, old)?;
    if let Some(tip) = tip {
        write_branch_ref(repo, new, &tip)?;
    }

    if read_head(repo)? == Head::Branch(old.to_string()) {
        write_head(repo, &Head::Branch(new.to_string()))?;
        index.set_meta("head", new)?;
    }
    index.checkpoint()?;
    Ok(())
}

/// delete a branch
///
/// refuses to delete the current branch unless forced, and never deletes
/// the last remaining branch. objects stay put: GC is the only deleter.
pub fn delete_branch(repo: &Repo, name: &str, force: bool) -> Result<()> {
    let _repo_lock = repo.lock()?;

    let mut index = repo.index()?;
    if !index.branch_exists(name)? {
        return Err(Error::UnknownRef(name.to_string()));
    }
    if index.branch_count()? <= 1 {
        return Err(Error::BranchInUse(format!("{name} is the only branch")));
    }

    let is_current = read_head(repo)? == Head::Branch(name.to_string());
    if is_current && !force {
        return Err(Error::BranchInUse(format!("{name} is the current branch")));
    }

    index.delete_branch(name)?;
    delete_branch_ref(repo, name)?;

    if is_current {
        // move HEAD to the first surviving branch
        if let Some(next) = index.list_branches()?.into_iter().next() {
            write_head(repo, &Head::Branch(next.name.clone()))?;
            index.set_meta("head", &next.name)?;
        }
    }
    index.checkpoint()?;
    Ok(())
}

/// all branches with commit counts; a reader operation
pub fn list_branches(repo: &Repo) -> Result<Vec<BranchSummary>> {
    let mut index = repo.index()?;
    let current = read_head(repo)?;

    let mut out = Vec::new();
    for BranchInfo { name, tip } in index.list_branches()? {
        let commit_count = match tip {
            Some(ref tip) => index.commit_count(tip)?,
            None => 0,
        };
        let is_current = current == Head::Branch(name.clone());
        out.push(BranchSummary {
            name,
            tip,
            commit_count,
            is_current,
        });
    }
    Ok(out)
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

    fn commit_file(repo: &Repo, dir: &std::path::Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
        commit(repo, content, None, &CommitOptions::default())
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_create_from_current_tip() {
        let (dir, repo) = test_repo();
        commit_file(&repo, dir.path(), "a.txt", "one");

        create_branch(&repo, "feature", None).unwrap();

        let branches = list_branches(&repo).unwrap();
        assert_eq!(branches.len(), 2);
        let feature = branches.iter().find(|b| b.name == "feature").unwrap();
        let main = branches.iter().find(|b| b.name == "main").unwrap();
        assert_eq!(feature.tip, main.tip);
        assert_eq!(feature.commit_count, 1);
        assert!(main.is_current);
        assert!(!feature.is_current);
    }

    #[test]
    fn test_create_duplicate_fails() {
        let (_dir, repo) = test_repo();
        let result = create_branch(&repo, "main", None);
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn test_create_validates_name() {
        let (_dir, repo) = test_repo();
        assert!(create_branch(&repo, "has space", None).is_err());
        assert!(create_branch(&repo, "", None).is_err());
        assert!(create_branch(&repo, "/lead", None).is_err());
    }

    #[test]
    fn test_switch_updates_head_only() {
        let (dir, repo) = test_repo();
        commit_file(&repo, dir.path(), "a.txt", "one");
        create_branch(&repo, "feature", None).unwrap();

        switch_branch(&repo, "feature").unwrap();
        assert_eq!(
            read_head(&repo).unwrap(),
            Head::Branch("feature".to_string())
        );
        // the working file is untouched
        assert!(dir.path().join("a.txt").exists());

        // switching twice is not a no-op trap: state is re-read each time
        switch_branch(&repo, "main").unwrap();
        switch_branch(&repo, "feature").unwrap();
        assert_eq!(
            read_head(&repo).unwrap(),
            Head::Branch("feature".to_string())
        );
    }

    #[test]
    fn test_switch_unknown_branch() {
        let (_dir, repo) = test_repo();
        assert!(matches!(
            switch_branch(&repo, "ghost"),
            Err(Error::UnknownRef(_))
        ));
    }

    #[test]
    fn test_rename_follows_head() {
        let (dir, repo) = test_repo();
        commit_file(&repo, dir.path(), "a.txt", "one");

        rename_branch(&repo, "main", "trunk").unwrap();
        assert_eq!(read_head(&repo).unwrap(), Head::Branch("trunk".to_string()));

        let branches = list_branches(&repo).unwrap();
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].name, "trunk");
        assert!(crate::refs::branch_ref_exists(&repo, "trunk"));
        assert!(!crate::refs::branch_ref_exists(&repo, "main"));
    }

    #[test]
    fn test_delete_guards() {
        let (dir, repo) = test_repo();
        commit_file(&repo, dir.path(), "a.txt", "one");

        // the last branch can never be deleted
        assert!(matches!(
            delete_branch(&repo, "main", true),
            Err(Error::BranchInUse(_))
        ));

        create_branch(&repo, "feature", None).unwrap();

        // the current branch needs force
        assert!(matches!(
            delete_branch(&repo, "main", false),
            Err(Error::BranchInUse(_))
        ));
        delete_branch(&repo, "main", true).unwrap();

        // HEAD moved to the survivor
        assert_eq!(
            read_head(&repo).unwrap(),
            Head::Branch("feature".to_string())
        );
    }

    #[test]
    fn test_delete_non_current() {
        let (dir, repo) = test_repo();
        commit_file(&repo, dir.path(), "a.txt", "one");
        create_branch(&repo, "feature", None).unwrap();

        delete_branch(&repo, "feature", false).unwrap();
        assert_eq!(list_branches(&repo).unwrap().len(), 1);
    }
}
