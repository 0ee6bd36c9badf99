use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, IoContext, Result};
use crate::hash::Hash;
use crate::object::texture::{write_texture, TextureInfo};
use crate::object::{self, ObjectKind};
use crate::repo::Repo;

/// a normalized mesh object
///
/// texture references are always texture hashes after ingestion. the mesh
/// hash is taken over the canonical JSON bytes, so field values must be
/// stable; floats round-trip at double precision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub faces: Vec<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub materials: Vec<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normals: Option<Vec<[f64; 3]>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub textures: Vec<Hash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uvs: Option<Vec<[f64; 2]>>,
    pub vertices: Vec<[f64; 3]>,
}

impl Mesh {
    /// canonical JSON bytes (keys sorted ascending)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        object::canonical_json(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// a raw mesh descriptor as authored in the working tree
///
/// identical to [`Mesh`] except texture references may be inline file
/// paths that ingestion resolves into stored texture hashes.
#[derive(Clone, Debug, Deserialize)]
struct RawMesh {
    faces: Vec<Vec<u32>>,
    #[serde(default)]
    materials: Vec<String>,
    name: String,
    #[serde(default)]
    normals: Option<Vec<[f64; 3]>>,
    #[serde(default)]
    textures: Vec<RawTextureRef>,
    #[serde(default)]
    transform: Option<Vec<f64>>,
    #[serde(default)]
    uvs: Option<Vec<[f64; 2]>>,
    vertices: Vec<[f64; 3]>,
}

/// a texture reference in a raw descriptor: either a bare string (texture
/// hash or file path) or an object with a `file` key
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum RawTextureRef {
    Name(String),
    Inline { file: String },
}

impl RawTextureRef {
    fn as_str(&self) -> &str {
        match self {
            RawTextureRef::Name(s) => s,
            RawTextureRef::Inline { file } => file,
        }
    }
}

/// a texture stored while ingesting a mesh
#[derive(Clone, Debug)]
pub struct TextureUse {
    pub hash: Hash,
    pub info: TextureInfo,
    pub size: u64,
}

/// result of ingesting a mesh descriptor
#[derive(Clone, Debug)]
pub struct MeshIngest {
    pub hash: Hash,
    pub mesh: Mesh,
    pub textures: Vec<TextureUse>,
}

/// quick structural check: does this JSON look like a mesh descriptor?
pub fn looks_like_mesh(bytes: &[u8]) -> bool {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes) else {
        return false;
    };
    let Some(obj) = value.as_object() else {
        return false;
    };
    obj.get("name").is_some_and(|v| v.is_string())
        && obj.get("vertices").is_some_and(|v| v.is_array())
        && obj.get("faces").is_some_and(|v| v.is_array())
}

/// ingest a mesh descriptor
///
/// parses the descriptor, stores every referenced texture by hash (inline
/// file references are read relative to `work_root`), rewrites the
/// references to hashes, and stores the normalized mesh object.
pub fn ingest_mesh(repo: &Repo, work_root: &Path, bytes: &[u8]) -> Result<MeshIngest> {
    let raw: RawMesh = serde_json::from_slice(bytes)?;

    let mut texture_hashes = Vec::new();
    let mut textures = Vec::new();
    for reference in &raw.textures {
        let value = reference.as_str();

        // an existing 64-hex reference is already a stored texture
        if value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit()) {
            let hash = Hash::from_hex(value)?;
            if object::object_exists(repo, ObjectKind::Texture, &hash) {
                if !texture_hashes.contains(&hash) {
                    texture_hashes.push(hash);
                }
                continue;
            }
        }

        let path = work_root.join(value);
        let content = std::fs::read(&path).with_path(&path)?;
        let (hash, info) = write_texture(repo, &content)?;
        if !texture_hashes.contains(&hash) {
            texture_hashes.push(hash);
            textures.push(TextureUse {
                hash,
                info,
                size: content.len() as u64,
            });
        }
    }

    let mesh = Mesh {
        faces: raw.faces,
        materials: raw.materials,
        name: raw.name,
        normals: raw.normals,
        textures: texture_hashes,
        transform: raw.transform,
        uvs: raw.uvs,
        vertices: raw.vertices,
    };

    let hash = write_mesh(repo, &mesh)?;
    Ok(MeshIngest {
        hash,
        mesh,
        textures,
    })
}

/// write a normalized mesh to the object store
pub fn write_mesh(repo: &Repo, mesh: &Mesh) -> Result<Hash> {
    object::write_object(repo, ObjectKind::Mesh, &mesh.to_bytes()?)
}

/// read a mesh from the object store
pub fn read_mesh(repo: &Repo, hash: &Hash) -> Result<Mesh> {
    let bytes = object::read_object(repo, ObjectKind::Mesh, hash)?;
    Mesh::from_bytes(&bytes).map_err(|e| match e {
        Error::Json(_) => Error::CorruptObjectData(format!("mesh {hash} failed to parse")),
        other => other,
    })
}
