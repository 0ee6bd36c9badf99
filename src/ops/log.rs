use crate::error::Result;
use crate::hash::Hash;
use crate::object::{read_commit, CommitRecord};
use crate::refs::{read_head, Head};
use crate::repo::Repo;

/// commit with its hash for log output
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub hash: Hash,
    pub record: CommitRecord,
}

/// walk the parent chain from a branch tip (or HEAD), newest first
///
/// a reader operation: takes no repo lock.
pub fn log(repo: &Repo, branch: Option<&str>, max_count: Option<usize>) -> Result<Vec<LogEntry>> {
    let index = repo.index()?;

    let tip = match branch {
        Some(name) => index.branch_tip(name)?,
        None => match read_head(repo)? {
            Head::Branch(name) => index.branch_tip(&name)?,
            Head::Detached(hash) => Some(hash),
        },
    };

    let mut entries = Vec::new();
    let mut cursor = tip;
    while let Some(hash) = cursor {
        if let Some(max) = max_count {
            if entries.len() >= max {
                break;
            }
        }
        let record = read_commit(repo, &hash)?;
        cursor = record.parent;
        entries.push(LogEntry { hash, record });
    }
    Ok(entries)
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "commit {}", self.hash)?;
        writeln!(f, "Author: {}", self.record.author)?;
        writeln!(
            f,
            "Date:   {} ({})",
            self.record.timestamp,
            self.record.commit_type.as_str()
        )?;
        writeln!(f)?;
        for line in self.record.message.lines() {
            writeln!(f, "    {line}")?;
        }
        Ok(())
    }
}
