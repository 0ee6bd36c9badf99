use std::collections::HashMap;

use crate::error::Result;
use crate::hash::Hash;
use crate::object::{flatten_tree, read_commit};
use crate::refs::{read_head, Head};
use crate::repo::Repo;
use crate::scan::scan_working_set;

/// working-set differences against the HEAD tip tree
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Status {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl Status {
    pub fn is_clean(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// compare the working set against the current HEAD tip
///
/// a reader operation: takes no repo lock.
pub fn status(repo: &Repo) -> Result<Status> {
    let tip_tree = head_tree(repo)?;

    let tracked: HashMap<String, Hash> = match tip_tree {
        Some(tree) => flatten_tree(repo, &tree)?
            .into_iter()
            .map(|entry| (entry.path, entry.hash))
            .collect(),
        None => HashMap::new(),
    };

    let mut status = Status::default();
    let mut seen = std::collections::HashSet::new();

    for entry in scan_working_set(repo)? {
        seen.insert(entry.path.clone());
        match tracked.get(&entry.path) {
            None => status.added.push(entry.path),
            Some(hash) if *hash != entry.hash => status.modified.push(entry.path),
            Some(_) => {}
        }
    }

    status.deleted = tracked
        .into_keys()
        .filter(|path| !seen.contains(path))
        .collect();
    status.deleted.sort();

    Ok(status)
}

/// the tree of the current HEAD position, if any commit exists there
fn head_tree(repo: &Repo) -> Result<Option<Hash>> {
    match read_head(repo)? {
        Head::Branch(name) => {
            let index = repo.index()?;
            match index.branch_tip(&name)? {
                Some(tip) => Ok(Some(read_commit(repo, &tip)?.tree)),
                None => Ok(None),
            }
        }
        Head::Detached(hash) => Ok(Some(read_commit(repo, &hash)?.tree)),
    }
}
