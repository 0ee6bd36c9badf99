use std::collections::HashSet;
use std::fs;

use tracing::debug;

use walkdir::WalkDir;

use crate::error::{Error, IoContext, Result};
use crate::hash::{hash_file, Hash};
use crate::ignore::IgnoreFilter;
use crate::object::tree::FlatEntry;
use crate::object::{
    flatten_tree, read_blob, read_commit, read_mesh, read_object, resolve_prefix, EntryKind,
    ObjectKind,
};
use crate::ops::hooks::{run_post_hook, run_pre_hook, Hook};
use crate::ops::status::status;
use crate::refs::{write_head, Head};
use crate::repo::Repo;
use crate::scan::scan_filtered;

/// options for [`checkout`]
#[derive(Clone, Debug, Default)]
pub struct CheckoutOptions {
    /// proceed even with uncommitted changes
    pub force: bool,
    /// skip the pre-checkout hook
    pub no_verify: bool,
    /// materialize only tree paths matching any of these globs
    pub file_patterns: Option<Vec<String>>,
    /// materialize only meshes with these object names
    pub mesh_names: Option<Vec<String>>,
}

/// reconstruct the working directory from a target commit
///
/// the target resolves first as a branch name, then as a (possibly
/// abbreviated) commit hash; the latter detaches HEAD. selective checkout
/// (file patterns or mesh names) leaves non-matching working files alone;
/// a full checkout also deletes tracked files absent from the target tree.
pub fn checkout(repo: &Repo, target: &str, opts: &CheckoutOptions) -> Result<Hash> {
    let _repo_lock = repo.lock()?;

    let mut index = repo.index()?;
    let (commit_hash, branch) = resolve_target(repo, &index, target)?;
    let record = read_commit(repo, &commit_hash)?;

    if !opts.force && !status(repo)?.is_clean() {
        return Err(Error::UncommittedChanges);
    }

    if !opts.no_verify {
        run_pre_hook(repo, Hook::PreCheckout, &[("DFM_TARGET", target.to_string())])?;
    }

    let selective = opts.file_patterns.is_some() || opts.mesh_names.is_some();
    let flat = flatten_tree(repo, &record.tree)?;

    let wanted = if selective {
        select_entries(repo, &flat, opts)?
    } else {
        flat.clone()
    };

    materialize_entries(repo, &wanted)?;
    if !selective {
        delete_untracked(repo, &flat)?;
    }

    match &branch {
        Some(name) => {
            write_head(repo, &Head::Branch(name.clone()))?;
            index.set_meta("head", name)?;
        }
        None => {
            write_head(repo, &Head::Detached(commit_hash))?;
            index.set_meta("head", &format!("@{}", commit_hash.to_hex()))?;
        }
    }
    index.checkpoint()?;

    run_post_hook(repo, Hook::PostCheckout, &[("DFM_TARGET", target.to_string())]);

    debug!(
        "checked out {} ({} entries)",
        commit_hash,
        wanted.len()
    );
    Ok(commit_hash)
}

/// resolve a checkout target: branch name first, then commit hash prefix
fn resolve_target(repo: &Repo, index: &crate::index::Index, target: &str) -> Result<(Hash, Option<String>)> {
    if index.branch_exists(target)? {
        return match index.branch_tip(target)? {
            Some(tip) => Ok((tip, Some(target.to_string()))),
            None => Err(Error::UnknownRef(format!("branch {target} has no commits"))),
        };
    }
    let hash = resolve_prefix(repo, ObjectKind::Commit, target)?;
    Ok((hash, None))
}

/// apply the selective filters to the flattened tree
fn select_entries(
    repo: &Repo,
    flat: &[FlatEntry],
    opts: &CheckoutOptions,
) -> Result<Vec<FlatEntry>> {
    let patterns = opts
        .file_patterns
        .as_deref()
        .map(|raw| {
            raw.iter()
                .map(|p| {
                    glob::Pattern::new(p)
                        .map_err(|e| Error::UnknownRef(format!("bad pattern {p}: {e}")))
                })
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?;

    let mut wanted = Vec::new();
    for entry in flat {
        let mut matched = false;

        if let Some(ref patterns) = patterns {
            matched |= patterns.iter().any(|p| p.matches(&entry.path));
        }
        if !matched {
            if let Some(ref names) = opts.mesh_names {
                if entry.kind == EntryKind::Mesh {
                    let mesh = read_mesh(repo, &entry.hash)?;
                    matched |= names.contains(&mesh.name);
                }
            }
        }

        if matched {
            wanted.push(entry.clone());
        }
    }
    Ok(wanted)
}

/// write matched entries into the working directory
///
/// overwrite when the current content hash differs, create when missing.
/// mesh entries materialize as their canonical descriptor bytes, which
/// hash back to the mesh object hash.
pub(crate) fn materialize_entries(repo: &Repo, entries: &[FlatEntry]) -> Result<()> {
    for entry in entries {
        let abs = repo.root().join(&entry.path);

        if abs.is_file() {
            let (current, _) = hash_file(&abs)?;
            if current == entry.hash {
                continue;
            }
        }

        if let Some(parent) = abs.parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }

        let bytes = match entry.kind {
            EntryKind::Blob => read_blob(repo, &entry.hash)?,
            EntryKind::Mesh => read_object(repo, ObjectKind::Mesh, &entry.hash)?,
            EntryKind::Tree => continue,
        };
        fs::write(&abs, bytes).with_path(&abs)?;
    }
    Ok(())
}

/// remove working files that are tracked by neither the target tree nor
/// the ignore rules, then prune empty directories
pub(crate) fn delete_untracked(repo: &Repo, keep: &[FlatEntry]) -> Result<()> {
    let tracked: HashSet<&str> = keep.iter().map(|entry| entry.path.as_str()).collect();
    let filter = IgnoreFilter::load(repo);

    for found in scan_filtered(repo.root(), &filter)? {
        if !tracked.contains(found.path.as_str()) {
            let abs = repo.root().join(&found.path);
            fs::remove_file(&abs).with_path(&abs)?;
        }
    }

    // prune now-empty directories, leaves first
    for entry in WalkDir::new(repo.root())
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if entry.file_type().is_dir()
            && entry.file_name() != crate::repo::DFM_DIR
            && !entry.path().starts_with(repo.dfm_path())
        {
            let _ = fs::remove_dir(entry.path());
        }
    }
    Ok(())
}

/// checkout a raw tree over the working directory (stash restore/apply)
pub(crate) fn materialize_full_tree(repo: &Repo, tree: &Hash) -> Result<()> {
    let flat = flatten_tree(repo, tree)?;
    materialize_entries(repo, &flat)?;
    delete_untracked(repo, &flat)
}
