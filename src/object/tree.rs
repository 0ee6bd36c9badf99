use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::object::{self, ObjectKind};
use crate::repo::Repo;

/// what a tree entry points at
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Blob,
    Tree,
    Mesh,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Blob => "blob",
            EntryKind::Tree => "tree",
            EntryKind::Mesh => "mesh",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "blob" => Ok(EntryKind::Blob),
            "tree" => Ok(EntryKind::Tree),
            "mesh" => Ok(EntryKind::Mesh),
            other => Err(Error::CorruptObjectData(format!(
                "unknown tree entry kind: {other}"
            ))),
        }
    }
}

/// a single entry in a tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub kind: EntryKind,
    pub hash: Hash,
}

impl TreeEntry {
    pub fn new(name: impl Into<String>, kind: EntryKind, hash: Hash) -> Self {
        Self {
            name: name.into(),
            kind,
            hash,
        }
    }
}

/// a directory snapshot: entries sorted by name, byte order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// create a new tree, validating and sorting entries
    pub fn new(mut entries: Vec<TreeEntry>) -> Result<Self> {
        for entry in &entries {
            validate_entry_name(&entry.name)?;
        }

        entries.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));

        for window in entries.windows(2) {
            if window[0].name == window[1].name {
                return Err(Error::DuplicateEntryName(window[0].name.clone()));
            }
        }

        Ok(Self { entries })
    }

    /// create an empty tree
    pub fn empty() -> Self {
        Self { entries: vec![] }
    }

    /// get entries slice
    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    /// look up entry by name
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_bytes().cmp(name.as_bytes()))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// is tree empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// canonical wire bytes: `<name>\t<kind>\t<hash>\n` per entry, name-sorted
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.name);
            out.push('\t');
            out.push_str(entry.kind.as_str());
            out.push('\t');
            out.push_str(&entry.hash.to_hex());
            out.push('\n');
        }
        out.into_bytes()
    }

    /// parse wire bytes back into a tree
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| Error::CorruptObjectData("tree is not utf-8".to_string()))?;

        let mut entries = Vec::new();
        for line in text.lines() {
            let mut fields = line.split('\t');
            let (name, kind, hash) = match (fields.next(), fields.next(), fields.next()) {
                (Some(n), Some(k), Some(h)) if fields.next().is_none() => (n, k, h),
                _ => {
                    return Err(Error::CorruptObjectData(format!(
                        "malformed tree line: {line}"
                    )))
                }
            };
            entries.push(TreeEntry::new(
                name,
                EntryKind::parse(kind)?,
                Hash::from_hex(hash)?,
            ));
        }
        Tree::new(entries)
    }
}

/// validate an entry name
fn validate_entry_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidEntryName("empty name".to_string()));
    }
    if name.contains('/') {
        return Err(Error::InvalidEntryName(format!("name contains '/': {name}")));
    }
    if name.contains('\t') || name.contains('\n') || name.contains('\0') {
        return Err(Error::InvalidEntryName(format!(
            "name contains forbidden characters: {name}"
        )));
    }
    if name == "." || name == ".." {
        return Err(Error::InvalidEntryName(format!("reserved name: {name}")));
    }
    Ok(())
}

/// write a tree to the object store
pub fn write_tree(repo: &Repo, tree: &Tree) -> Result<Hash> {
    object::write_object(repo, ObjectKind::Tree, &tree.to_bytes())
}

/// read a tree from the object store
pub fn read_tree(repo: &Repo, hash: &Hash) -> Result<Tree> {
    let bytes = object::read_object(repo, ObjectKind::Tree, hash)?;
    Tree::from_bytes(&bytes)
}

/// a leaf reachable from a root tree, with its repo-relative path
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlatEntry {
    pub path: String,
    pub kind: EntryKind,
    pub hash: Hash,
}

/// flatten a tree into its leaf (blob and mesh) entries, depth first
pub fn flatten_tree(repo: &Repo, root: &Hash) -> Result<Vec<FlatEntry>> {
    let mut out = Vec::new();
    flatten_into(repo, root, "", &mut out)?;
    Ok(out)
}

fn flatten_into(repo: &Repo, tree_hash: &Hash, prefix: &str, out: &mut Vec<FlatEntry>) -> Result<()> {
    let tree = read_tree(repo, tree_hash)?;
    for entry in tree.entries() {
        let path = if prefix.is_empty() {
            entry.name.clone()
        } else {
            format!("{}/{}", prefix, entry.name)
        };
        match entry.kind {
            EntryKind::Tree => flatten_into(repo, &entry.hash, &path, out)?,
            kind => out.push(FlatEntry {
                path,
                kind,
                hash: entry.hash,
            }),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn h(n: u8) -> Hash {
        Hash::from_bytes([n; 32])
    }

    #[test]
    fn test_tree_sorts_entries() {
        let tree = Tree::new(vec![
            TreeEntry::new("zebra.png", EntryKind::Blob, h(1)),
            TreeEntry::new("apple.txt", EntryKind::Blob, h(2)),
        ])
        .unwrap();

        let names: Vec<_> = tree.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["apple.txt", "zebra.png"]);
    }

    #[test]
    fn test_tree_rejects_duplicates() {
        let result = Tree::new(vec![
            TreeEntry::new("a", EntryKind::Blob, h(1)),
            TreeEntry::new("a", EntryKind::Blob, h(2)),
        ]);
        assert!(matches!(result, Err(Error::DuplicateEntryName(_))));
    }

    #[test]
    fn test_invalid_entry_names() {
        for bad in ["", "a/b", "tab\there", ".", ".."] {
            let result = Tree::new(vec![TreeEntry::new(bad, EntryKind::Blob, h(1))]);
            assert!(result.is_err(), "expected rejection of {bad:?}");
        }
    }

    #[test]
    fn test_wire_format() {
        let tree = Tree::new(vec![
            TreeEntry::new("model.json", EntryKind::Mesh, h(0xab)),
            TreeEntry::new("dir", EntryKind::Tree, h(0xcd)),
        ])
        .unwrap();

        let text = String::from_utf8(tree.to_bytes()).unwrap();
        let expected = format!(
            "dir\ttree\t{}\nmodel.json\tmesh\t{}\n",
            h(0xcd).to_hex(),
            h(0xab).to_hex()
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn test_wire_roundtrip() {
        let tree = Tree::new(vec![
            TreeEntry::new("a.txt", EntryKind::Blob, h(1)),
            TreeEntry::new("sub", EntryKind::Tree, h(2)),
            TreeEntry::new("m.json", EntryKind::Mesh, h(3)),
        ])
        .unwrap();

        let parsed = Tree::from_bytes(&tree.to_bytes()).unwrap();
        assert_eq!(tree, parsed);
    }

    #[test]
    fn test_wire_rejects_garbage() {
        assert!(Tree::from_bytes(b"no tabs in this line\n").is_err());
        assert!(Tree::from_bytes(b"name\tblob\tnothex\n").is_err());
        assert!(Tree::from_bytes(b"name\tsocket\t0000000000000000000000000000000000000000000000000000000000000000\n").is_err());
    }

    #[test]
    fn test_identical_content_identical_hash() {
        let dir = tempdir().unwrap();
        let repo = Repo::init(dir.path(), false).unwrap();

        let t1 = Tree::new(vec![TreeEntry::new("f", EntryKind::Blob, h(9))]).unwrap();
        let t2 = Tree::new(vec![TreeEntry::new("f", EntryKind::Blob, h(9))]).unwrap();

        assert_eq!(write_tree(&repo, &t1).unwrap(), write_tree(&repo, &t2).unwrap());
    }

    #[test]
    fn test_flatten_tree() {
        let dir = tempdir().unwrap();
        let repo = Repo::init(dir.path(), false).unwrap();

        let leaf = Tree::new(vec![TreeEntry::new("deep.txt", EntryKind::Blob, h(7))]).unwrap();
        let leaf_hash = write_tree(&repo, &leaf).unwrap();

        let root = Tree::new(vec![
            TreeEntry::new("top.txt", EntryKind::Blob, h(8)),
            TreeEntry::new("sub", EntryKind::Tree, leaf_hash),
        ])
        .unwrap();
        let root_hash = write_tree(&repo, &root).unwrap();

        let flat = flatten_tree(&repo, &root_hash).unwrap();
        let paths: Vec<_> = flat.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["sub/deep.txt", "top.txt"]);
    }
}
