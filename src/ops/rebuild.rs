use std::fs;

use tracing::{info, warn};

use crate::error::{IoContext, Result};
use crate::index::{CommitFileRow, MeshRow, TextureRow};
use crate::object::{
    flatten_tree, list_objects, object_path, read_commit, read_mesh, read_object, read_stash,
    read_tree, sniff_texture_info, EntryKind, ObjectKind,
};
use crate::refs::{list_branch_refs, read_head, Head};
use crate::repo::Repo;

/// what a rebuild recovered
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RebuildStats {
    pub commits: usize,
    pub stashes: usize,
    pub branches: usize,
    pub meshes: usize,
    pub textures: usize,
}

/// reconstruct the metadata index from the object store and ref files
///
/// for branch rows the ref files are authoritative. corrupt objects are
/// skipped with a warning; they stay on disk for manual inspection.
pub fn rebuild(repo: &Repo, backup: bool) -> Result<RebuildStats> {
    let _repo_lock = repo.lock()?;

    let db_path = repo.db_path();
    if backup && db_path.is_file() {
        let backup_path = db_path.with_extension("db.bak");
        fs::copy(&db_path, &backup_path).with_path(&backup_path)?;
        info!("backed up metadata index to {}", backup_path.display());
    }

    let mut index = repo.index()?;
    index.clear_all()?;

    let mut stats = RebuildStats::default();

    for tree_hash in list_objects(repo, ObjectKind::Tree)? {
        match read_tree(repo, &tree_hash) {
            Ok(tree) => {
                let entries: Vec<_> = tree
                    .entries()
                    .iter()
                    .map(|e| (e.name.clone(), e.kind, e.hash))
                    .collect();
                index.insert_tree_rows(&tree_hash, &entries)?;
            }
            Err(e) => warn!("skipping corrupt tree {}: {}", tree_hash, e),
        }
    }

    for mesh_hash in list_objects(repo, ObjectKind::Mesh)? {
        match read_mesh(repo, &mesh_hash) {
            Ok(mesh) => {
                index.insert_mesh_row(&MeshRow {
                    hash: mesh_hash,
                    name: mesh.name.clone(),
                    vertex_count: mesh.vertices.len() as u64,
                    face_count: mesh.faces.len() as u64,
                })?;
                stats.meshes += 1;
            }
            Err(e) => warn!("skipping corrupt mesh {}: {}", mesh_hash, e),
        }
    }

    for texture_hash in list_objects(repo, ObjectKind::Texture)? {
        match read_object(repo, ObjectKind::Texture, &texture_hash) {
            Ok(bytes) => {
                let info = sniff_texture_info(&bytes);
                index.insert_texture_row(&TextureRow {
                    hash: texture_hash,
                    width: info.width,
                    height: info.height,
                    channels: info.channels,
                    size: bytes.len() as u64,
                })?;
                stats.textures += 1;
            }
            Err(e) => warn!("skipping corrupt texture {}: {}", texture_hash, e),
        }
    }

    for commit_hash in list_objects(repo, ObjectKind::Commit)? {
        let record = match read_commit(repo, &commit_hash) {
            Ok(record) => record,
            Err(e) => {
                warn!("skipping corrupt commit {}: {}", commit_hash, e);
                continue;
            }
        };
        index.insert_commit_row(&commit_hash, &record)?;
        stats.commits += 1;

        // re-derive commit_files and texture links from the tree
        let flat = match flatten_tree(repo, &record.tree) {
            Ok(flat) => flat,
            Err(e) => {
                warn!("commit {} has unreadable tree: {}", commit_hash, e);
                continue;
            }
        };
        let mut files = Vec::new();
        for entry in flat {
            let size = fs::metadata(object_path(
                repo,
                match entry.kind {
                    EntryKind::Mesh => ObjectKind::Mesh,
                    _ => ObjectKind::Blob,
                },
                &entry.hash,
            ))
            .map(|m| m.len())
            .unwrap_or(0);

            if entry.kind == EntryKind::Mesh {
                if let Ok(mesh) = read_mesh(repo, &entry.hash) {
                    for texture in &mesh.textures {
                        index.insert_texture_link(texture, &commit_hash)?;
                    }
                }
            }
            files.push(CommitFileRow {
                path: entry.path,
                kind: entry.kind,
                hash: entry.hash,
                size,
            });
        }
        index.insert_commit_files(&commit_hash, &files)?;
    }

    for stash_hash in list_objects(repo, ObjectKind::Stash)? {
        match read_stash(repo, &stash_hash) {
            Ok(record) => {
                index.record_stash(&stash_hash, &record, &[])?;
                stats.stashes += 1;
            }
            Err(e) => warn!("skipping corrupt stash {}: {}", stash_hash, e),
        }
    }

    // branch rows: trust the ref files
    for (name, tip) in list_branch_refs(repo)? {
        index.create_branch(&name, Some(&tip))?;
        stats.branches += 1;
    }

    // HEAD may name an unborn branch with no ref file yet
    match read_head(repo)? {
        Head::Branch(name) => {
            if !index.branch_exists(&name)? {
                index.create_branch(&name, None)?;
                stats.branches += 1;
            }
            index.set_meta("head", &name)?;
        }
        Head::Detached(hash) => {
            index.set_meta("head", &format!("@{}", hash.to_hex()))?;
        }
    }

    index.checkpoint()?;
    info!(
        "rebuilt index: {} commits, {} stashes, {} branches",
        stats.commits, stats.stashes, stats.branches
    );
    Ok(stats)
}
