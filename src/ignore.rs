use std::path::Path;

use ::ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::warn;

use crate::repo::{Repo, DFM_DIR};

/// decides which working-directory paths participate in commits
///
/// patterns come from .DFM/.dfmignore with gitignore semantics: `*`, `**`,
/// `?`, leading `/` anchors to the repo root, trailing `/` restricts to
/// directories, `!` negates. the .DFM directory itself is always excluded.
pub struct IgnoreFilter {
    matcher: Gitignore,
}

impl IgnoreFilter {
    /// load the filter for a repository
    ///
    /// an unreadable or malformed ignore file disables custom patterns
    /// rather than failing the operation.
    pub fn load(repo: &Repo) -> Self {
        Self::from_file(repo.root(), &repo.ignore_path())
    }

    /// build from an explicit ignore file (absent file means no patterns)
    pub fn from_file(root: &Path, ignore_file: &Path) -> Self {
        let mut builder = GitignoreBuilder::new(root);
        if ignore_file.is_file() {
            if let Some(e) = builder.add(ignore_file) {
                warn!("ignoring malformed {}: {}", ignore_file.display(), e);
            }
        }
        let matcher = match builder.build() {
            Ok(matcher) => matcher,
            Err(e) => {
                warn!("ignore patterns disabled: {}", e);
                Gitignore::empty()
            }
        };
        Self { matcher }
    }

    /// should this repo-relative path be excluded from the working set?
    pub fn is_ignored(&self, rel_path: &str, is_dir: bool) -> bool {
        if rel_path == DFM_DIR || rel_path.starts_with(".DFM/") {
            return true;
        }
        self.matcher
            .matched_path_or_any_parents(rel_path, is_dir)
            .is_ignore()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn filter_with(patterns: &str) -> (tempfile::TempDir, IgnoreFilter) {
        let dir = tempdir().unwrap();
        let ignore_file = dir.path().join(".dfmignore");
        std::fs::write(&ignore_file, patterns).unwrap();
        let filter = IgnoreFilter::from_file(dir.path(), &ignore_file);
        (dir, filter)
    }

    #[test]
    fn test_dfm_dir_always_ignored() {
        let dir = tempdir().unwrap();
        let filter = IgnoreFilter::from_file(dir.path(), &dir.path().join("absent"));

        assert!(filter.is_ignored(".DFM", true));
        assert!(filter.is_ignored(".DFM/objects/blobs/ab/cd", false));
        assert!(!filter.is_ignored("scene.json", false));
    }

    #[test]
    fn test_simple_globs() {
        let (_dir, filter) = filter_with("*.tmp\nrender_cache/\n");

        assert!(filter.is_ignored("scratch.tmp", false));
        assert!(filter.is_ignored("deep/nested/also.tmp", false));
        assert!(filter.is_ignored("render_cache", true));
        assert!(filter.is_ignored("render_cache/frame_001.exr", false));
        assert!(!filter.is_ignored("model.json", false));
    }

    #[test]
    fn test_anchored_and_double_star() {
        let (_dir, filter) = filter_with("/top_only.log\n**/generated\n");

        assert!(filter.is_ignored("top_only.log", false));
        assert!(!filter.is_ignored("sub/top_only.log", false));
        assert!(filter.is_ignored("a/b/generated", false));
    }

    #[test]
    fn test_negation() {
        let (_dir, filter) = filter_with("*.png\n!keep.png\n");

        assert!(filter.is_ignored("texture.png", false));
        assert!(!filter.is_ignored("keep.png", false));
    }

    #[test]
    fn test_question_mark() {
        let (_dir, filter) = filter_with("v?.bak\n");

        assert!(filter.is_ignored("v1.bak", false));
        assert!(!filter.is_ignored("v10.bak", false));
    }
}
