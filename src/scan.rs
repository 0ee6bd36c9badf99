use std::collections::HashSet;
use std::path::Path;

use tracing::warn;
use walkdir::WalkDir;

use crate::error::{Error, IoContext, Result};
use crate::hash::{hash_file, Hash};
use crate::ignore::IgnoreFilter;
use crate::repo::Repo;

/// one tracked file in the working set
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanEntry {
    /// repo-relative POSIX path
    pub path: String,
    /// content hash of the raw bytes
    pub hash: Hash,
    pub size: u64,
}

/// walk the working directory, yielding sorted (path, hash, size) tuples
///
/// excludes .DFM/ and everything matched by .dfmignore. symlinks are
/// followed only when their target stays inside the working tree; symlink
/// cycles are broken by visited (dev, ino) tracking.
pub fn scan_working_set(repo: &Repo) -> Result<Vec<ScanEntry>> {
    let filter = IgnoreFilter::load(repo);
    scan_filtered(repo.root(), &filter)
}

/// scan with an explicit filter (the checkout deletion pass reuses this)
pub fn scan_filtered(root: &Path, filter: &IgnoreFilter) -> Result<Vec<ScanEntry>> {
    let mut seen_links: HashSet<(u64, u64)> = HashSet::new();
    let mut entries = Vec::new();

    let mut walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter();

    while let Some(next) = walker.next() {
        let entry = match next {
            Ok(entry) => entry,
            Err(e) if e.loop_ancestor().is_some() => {
                warn!("symlink cycle at {:?}, skipping", e.path());
                continue;
            }
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                return Err(Error::Io {
                    path,
                    source: e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("walkdir error")),
                });
            }
        };

        if entry.depth() == 0 {
            continue;
        }

        let rel = match entry.path().strip_prefix(root) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        let rel_posix = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let is_dir = entry.file_type().is_dir();
        if filter.is_ignored(&rel_posix, is_dir) {
            if is_dir {
                walker.skip_current_dir();
            }
            continue;
        }
        if is_dir {
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        if entry.path_is_symlink() {
            // only follow targets inside the working tree, once each
            let Ok(target) = entry.path().canonicalize() else {
                warn!("dangling symlink {}, skipping", rel_posix);
                continue;
            };
            let canonical_root = root.canonicalize().with_path(root)?;
            if !target.starts_with(&canonical_root) {
                continue;
            }

            #[cfg(unix)]
            {
                use std::os::unix::fs::MetadataExt as _;
                if let Ok(meta) = std::fs::metadata(&target) {
                    if !seen_links.insert((meta.dev(), meta.ino())) {
                        continue;
                    }
                }
            }
        }

        let (hash, size) = hash_file(entry.path())?;
        entries.push(ScanEntry {
            path: rel_posix,
            hash,
            size,
        });
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}
