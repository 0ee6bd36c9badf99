use crate::error::Result;
use crate::hash::Hash;
use crate::object::{self, ObjectKind};
use crate::repo::Repo;

/// image metadata derived from texture bytes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

/// write texture bytes to the object store, returning (hash, derived info)
///
/// textures are versioned independently of meshes: two meshes referencing
/// the same bytes share one stored object.
pub fn write_texture(repo: &Repo, bytes: &[u8]) -> Result<(Hash, TextureInfo)> {
    let info = sniff_texture_info(bytes);
    let hash = object::write_object(repo, ObjectKind::Texture, bytes)?;
    Ok((hash, info))
}

/// read texture bytes
pub fn read_texture(repo: &Repo, hash: &Hash) -> Result<Vec<u8>> {
    object::read_object(repo, ObjectKind::Texture, hash)
}

/// derive (width, height, channels) from PNG or JPEG headers
///
/// unknown formats report zeroed metadata; the bytes are stored either way.
pub fn sniff_texture_info(bytes: &[u8]) -> TextureInfo {
    sniff_png(bytes)
        .or_else(|| sniff_jpeg(bytes))
        .unwrap_or_default()
}

/// PNG: 8-byte signature, then the IHDR chunk with width/height/bit
/// depth/color type
fn sniff_png(bytes: &[u8]) -> Option<TextureInfo> {
    const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];
    if bytes.len() < 33 || bytes[..8] != SIGNATURE || &bytes[12..16] != b"IHDR" {
        return None;
    }

    let width = u32::from_be_bytes(bytes[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(bytes[20..24].try_into().ok()?);
    let color_type = bytes[25];
    let channels = match color_type {
        0 => 1, // grayscale
        2 => 3, // rgb
        3 => 3, // palette, expands to rgb
        4 => 2, // grayscale + alpha
        6 => 4, // rgba
        _ => return None,
    };

    Some(TextureInfo {
        width,
        height,
        channels,
    })
}

/// JPEG: walk marker segments until a start-of-frame carries the dimensions
fn sniff_jpeg(bytes: &[u8]) -> Option<TextureInfo> {
    if bytes.len() < 4 || bytes[0] != 0xff || bytes[1] != 0xd8 {
        return None;
    }

    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xff {
            return None;
        }
        let marker = bytes[pos + 1];
        // standalone markers carry no length
        if (0xd0..=0xd9).contains(&marker) {
            pos += 2;
            continue;
        }

        let len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        if len < 2 {
            return None;
        }

        let is_sof = matches!(marker, 0xc0..=0xcf) && !matches!(marker, 0xc4 | 0xc8 | 0xcc);
        if is_sof {
            let seg = bytes.get(pos + 4..pos + 2 + len)?;
            if seg.len() < 6 {
                return None;
            }
            let height = u16::from_be_bytes([seg[1], seg[2]]) as u32;
            let width = u16::from_be_bytes([seg[3], seg[4]]) as u32;
            let channels = seg[5];
            return Some(TextureInfo {
                width,
                height,
                channels,
            });
        }

        pos += 2 + len;
    }
    None
}
