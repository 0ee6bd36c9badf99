use std::collections::BTreeMap;

use crate::error::{IoContext, Result};
use crate::hash::Hash;
use crate::index::{CommitFileRow, MeshRow, TextureRow};
use crate::object::{
    ingest_mesh, looks_like_mesh, write_blob_from_file, write_tree, EntryKind, Tree, TreeEntry,
};
use crate::repo::Repo;
use crate::scan::ScanEntry;

/// everything produced while assembling a snapshot's trees
///
/// objects (blobs, trees, meshes, textures) are written to the store as
/// the build proceeds; second writes of unchanged content are no-ops.
#[derive(Debug)]
pub struct TreeBuild {
    /// root tree hash
    pub root: Hash,
    /// every tree object of the snapshot with its flattened entries
    pub trees: Vec<(Hash, Vec<(String, EntryKind, Hash)>)>,
    /// leaf files with the hash that entered the tree
    pub files: Vec<CommitFileRow>,
    /// meshes ingested from descriptors
    pub meshes: Vec<MeshRow>,
    /// textures stored while ingesting meshes
    pub textures: Vec<TextureRow>,
    /// texture hashes referenced anywhere in the snapshot
    pub texture_links: Vec<Hash>,
    /// descriptor paths whose normalized bytes differ from the working copy
    pub normalized_meshes: Vec<(String, Vec<u8>)>,
}

enum Node<'a> {
    File(&'a ScanEntry),
    Dir(BTreeMap<String, Node<'a>>),
}

/// assemble trees from scan output, leaves first; returns the root hash
/// and the metadata rows the commit engine records
pub fn build_tree(repo: &Repo, scan: &[ScanEntry]) -> Result<TreeBuild> {
    let mut root_map: BTreeMap<String, Node<'_>> = BTreeMap::new();

    'entries: for entry in scan {
        let mut segments: Vec<&str> = entry.path.split('/').collect();
        let Some(file_name) = segments.pop() else {
            continue;
        };

        let mut cursor = &mut root_map;
        for segment in segments {
            let node = cursor
                .entry(segment.to_string())
                .or_insert_with(|| Node::Dir(BTreeMap::new()));
            cursor = match node {
                Node::Dir(map) => map,
                // a file and a directory cannot share a path segment
                Node::File(_) => continue 'entries,
            };
        }
        cursor.insert(file_name.to_string(), Node::File(entry));
    }

    let mut build = TreeBuild {
        root: Hash::ZERO,
        trees: Vec::new(),
        files: Vec::new(),
        meshes: Vec::new(),
        textures: Vec::new(),
        texture_links: Vec::new(),
        normalized_meshes: Vec::new(),
    };
    build.root = build_dir(repo, &root_map, "", &mut build)?;
    Ok(build)
}

fn build_dir(
    repo: &Repo,
    map: &BTreeMap<String, Node<'_>>,
    prefix: &str,
    build: &mut TreeBuild,
) -> Result<Hash> {
    let mut entries = Vec::new();

    for (name, node) in map {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}/{name}")
        };

        match node {
            Node::Dir(children) => {
                let subtree = build_dir(repo, children, &path, build)?;
                entries.push(TreeEntry::new(name.clone(), EntryKind::Tree, subtree));
            }

            Node::File(scan_entry) => {
                let abs = repo.root().join(&path);

                // mesh descriptors become mesh objects; everything else is a blob
                let mesh_bytes = if path.ends_with(".json") {
                    let bytes = std::fs::read(&abs).with_path(&abs)?;
                    looks_like_mesh(&bytes).then_some(bytes)
                } else {
                    None
                };

                if let Some(bytes) = mesh_bytes {
                    let ingest = ingest_mesh(repo, repo.root(), &bytes)?;

                    build.meshes.push(MeshRow {
                        hash: ingest.hash,
                        name: ingest.mesh.name.clone(),
                        vertex_count: ingest.mesh.vertices.len() as u64,
                        face_count: ingest.mesh.faces.len() as u64,
                    });
                    for texture in &ingest.textures {
                        build.textures.push(TextureRow {
                            hash: texture.hash,
                            width: texture.info.width,
                            height: texture.info.height,
                            channels: texture.info.channels,
                            size: texture.size,
                        });
                    }
                    for hash in &ingest.mesh.textures {
                        if !build.texture_links.contains(hash) {
                            build.texture_links.push(*hash);
                        }
                    }

                    let canonical = ingest.mesh.to_bytes()?;
                    if canonical != bytes {
                        build.normalized_meshes.push((path.clone(), canonical));
                    }

                    build.files.push(CommitFileRow {
                        path,
                        kind: EntryKind::Mesh,
                        hash: ingest.hash,
                        size: scan_entry.size,
                    });
                    entries.push(TreeEntry::new(name.clone(), EntryKind::Mesh, ingest.hash));
                } else {
                    let (hash, size) = write_blob_from_file(repo, &abs)?;
                    build.files.push(CommitFileRow {
                        path,
                        kind: EntryKind::Blob,
                        hash,
                        size,
                    });
                    entries.push(TreeEntry::new(name.clone(), EntryKind::Blob, hash));
                }
            }
        }
    }

    let tree = Tree::new(entries)?;
    let hash = write_tree(repo, &tree)?;
    build.trees.push((
        hash,
        tree.entries()
            .iter()
            .map(|e| (e.name.clone(), e.kind, e.hash))
            .collect(),
    ));
    Ok(hash)
}
