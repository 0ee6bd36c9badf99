use crate::error::Result;
use crate::hash::Hash;
use crate::index::CommitFileRow;
use crate::object::{read_commit, resolve_prefix, CommitRecord, ObjectKind};
use crate::repo::Repo;

/// full detail of one commit
#[derive(Clone, Debug)]
pub struct ShowInfo {
    pub hash: Hash,
    pub record: CommitRecord,
    /// files carried by the commit, from the commit_files table
    pub files: Vec<CommitFileRow>,
}

/// resolve a (possibly abbreviated) commit hash and collect its detail
///
/// a reader operation: takes no repo lock.
pub fn show(repo: &Repo, target: &str) -> Result<ShowInfo> {
    let hash = resolve_prefix(repo, ObjectKind::Commit, target)?;
    let record = read_commit(repo, &hash)?;
    let files = repo.index()?.commit_files(&hash)?;

    Ok(ShowInfo {
        hash,
        record,
        files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::object::EntryKind;
    use crate::ops::commit::{commit, CommitOptions};
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repo) {
        let dir = tempdir().unwrap();
        let repo = Repo::init(dir.path(), false).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_show_lists_files() {
        let (dir, repo) = test_repo();

        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), "world").unwrap();
        let hash = commit(&repo, "detail", Some("alice"), &CommitOptions::default())
            .unwrap()
            .unwrap();

        let info = show(&repo, &hash.to_hex()[..8]).unwrap();
        assert_eq!(info.hash, hash);
        assert_eq!(info.record.message, "detail");

        let paths: Vec<_> = info.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "sub/b.txt"]);
        assert_eq!(info.files[0].kind, EntryKind::Blob);
        assert_eq!(info.files[0].size, 5);
    }

    #[test]
    fn test_show_unknown() {
        let (_dir, repo) = test_repo();
        assert!(matches!(
            show(&repo, "abcd1234"),
            Err(Error::UnknownRef(_))
        ));
    }
}
