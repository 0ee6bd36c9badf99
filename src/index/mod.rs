//! metadata index
//!
//! a single rusqlite database at .DFM/forester.db holds refs, the commit
//! graph, flattened tree membership, lock registry, and review records.
//! connections are opened fresh at operation boundaries and every
//! write-side operation is framed in one transaction. WAL journaling keeps
//! readers off the writer's back; commit creation forces a checkpoint so
//! the next connection observes the new state.

pub mod locks;
pub mod review;

use std::path::Path;

use indoc::indoc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::object::{CommitRecord, CommitType, EntryKind};

pub use locks::{Lock, LockType};
pub use review::{Approval, ApprovalStatus, AssetType, Comment};

const SCHEMA_VERSION: u32 = 1;

/// handle to the metadata index database
pub struct Index {
    conn: Connection,
}

/// a branch row
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchInfo {
    pub name: String,
    pub tip: Option<Hash>,
}

/// a file recorded for a commit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitFileRow {
    pub path: String,
    pub kind: EntryKind,
    pub hash: Hash,
    pub size: u64,
}

/// a mesh row
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshRow {
    pub hash: Hash,
    pub name: String,
    pub vertex_count: u64,
    pub face_count: u64,
}

/// a texture row
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureRow {
    pub hash: Hash,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub size: u64,
}

/// a stash row
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StashInfo {
    pub hash: Hash,
    pub message: String,
    pub author: String,
    pub timestamp: i64,
    pub tree: Hash,
}

/// everything recorded atomically for one new commit
pub struct NewCommit<'a> {
    pub hash: Hash,
    pub record: &'a CommitRecord,
    pub files: &'a [CommitFileRow],
    /// every tree object of the snapshot, flattened per tree
    pub trees: &'a [(Hash, Vec<(String, EntryKind, Hash)>)],
    pub meshes: &'a [MeshRow],
    pub textures: &'a [TextureRow],
    /// textures referenced anywhere in this commit's tree
    pub texture_links: &'a [Hash],
}

impl Index {
    /// open (creating the schema if needed)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "wal")?;
        conn.pragma_update(None, "foreign_keys", "on")?;
        conn.pragma_update(None, "synchronous", "normal")?;

        let mut index = Self { conn };
        index.migrate()?;
        Ok(index)
    }

    fn migrate(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;

        let user_version: u32 = tx.pragma_query_value(None, "user_version", |r| r.get(0))?;
        if user_version > SCHEMA_VERSION {
            return Err(Error::CorruptObjectData(format!(
                "metadata index schema version {user_version} is newer than this build"
            )));
        }

        if user_version == 0 {
            tx.execute_batch(indoc! {r#"
                create table commits
                (
                    hash text primary key,
                    parent text,
                    tree_hash text not null,
                    message text not null,
                    author text not null,
                    timestamp integer not null,
                    branch text not null,
                    commit_type text not null,
                    screenshot_hash text
                );

                create index commits_branch on commits (branch, timestamp);

                create table branches
                (
                    name text primary key,
                    tip text
                );

                -- flattened materialization of each tree for fast enumeration
                create table tree_entries
                (
                    tree_hash text not null,
                    name text not null,
                    kind text not null,
                    child_hash text not null,
                    primary key (tree_hash, name)
                ) without rowid;

                create table commit_files
                (
                    commit_hash text not null,
                    path text not null,
                    kind text not null,
                    hash text not null,
                    size integer not null,
                    primary key (commit_hash, path)
                ) without rowid;

                create table meshes
                (
                    hash text primary key,
                    name text not null,
                    vertex_count integer not null,
                    face_count integer not null
                );

                create table textures
                (
                    hash text primary key,
                    width integer not null,
                    height integer not null,
                    channels integer not null,
                    size integer not null
                );

                create table texture_commits
                (
                    texture_hash text not null,
                    commit_hash text not null,
                    primary key (texture_hash, commit_hash)
                ) without rowid;

                create table stashes
                (
                    hash text primary key,
                    message text not null,
                    author text not null,
                    timestamp integer not null,
                    tree_hash text not null
                );

                create table locks
                (
                    file_path text not null,
                    branch text not null,
                    locked_by text not null,
                    lock_type text not null,
                    locked_at integer not null,
                    expires_at integer,
                    primary key (file_path, branch, locked_by)
                ) without rowid;

                create table comments
                (
                    id integer primary key autoincrement,
                    asset_hash text not null,
                    asset_type text not null,
                    author text not null,
                    text text not null,
                    created_at integer not null,
                    x real,
                    y real,
                    resolved integer not null default 0
                );

                create index comments_asset on comments (asset_hash);

                create table approvals
                (
                    id integer primary key autoincrement,
                    asset_hash text not null,
                    asset_type text not null,
                    approver text not null,
                    status text not null,
                    comment text,
                    created_at integer not null
                );

                create index approvals_asset on approvals (asset_hash, approver);

                create table repo_meta
                (
                    key text primary key,
                    value text not null
                ) without rowid;
            "#})?;
            tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }

        tx.commit()?;
        Ok(())
    }

    /// force a WAL checkpoint so subsequent connections see committed state
    pub fn checkpoint(&self) -> Result<()> {
        self.conn
            .query_row("pragma wal_checkpoint(truncate)", [], |_| Ok(()))?;
        Ok(())
    }

    // ---- repo_meta -------------------------------------------------------

    pub fn set_meta(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "insert into repo_meta (key, value) values (?1, ?2)
             on conflict (key) do update set value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "select value from repo_meta where key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    // ---- branches --------------------------------------------------------

    pub fn create_branch(&mut self, name: &str, tip: Option<&Hash>) -> Result<()> {
        self.conn.execute(
            "insert into branches (name, tip) values (?1, ?2)",
            params![name, tip.map(Hash::to_hex)],
        )?;
        Ok(())
    }

    pub fn branch_exists(&self, name: &str) -> Result<bool> {
        let count: u32 = self.conn.query_row(
            "select count(*) from branches where name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// tip of a branch; Err(UnknownRef) when the branch has no row
    pub fn branch_tip(&self, name: &str) -> Result<Option<Hash>> {
        let tip: Option<Option<String>> = self
            .conn
            .query_row(
                "select tip from branches where name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;

        match tip {
            None => Err(Error::UnknownRef(name.to_string())),
            Some(None) => Ok(None),
            Some(Some(hex)) => Ok(Some(Hash::from_hex(&hex)?)),
        }
    }

    pub fn set_branch_tip(&mut self, name: &str, tip: &Hash) -> Result<()> {
        self.conn.execute(
            "insert into branches (name, tip) values (?1, ?2)
             on conflict (name) do update set tip = excluded.tip",
            params![name, tip.to_hex()],
        )?;
        Ok(())
    }

    pub fn delete_branch(&mut self, name: &str) -> Result<()> {
        self.conn
            .execute("delete from branches where name = ?1", params![name])?;
        Ok(())
    }

    pub fn rename_branch(&mut self, old: &str, new: &str) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "update branches set name = ?2 where name = ?1",
            params![old, new],
        )?;
        tx.execute(
            "update commits set branch = ?2 where branch = ?1",
            params![old, new],
        )?;
        tx.execute(
            "update locks set branch = ?2 where branch = ?1",
            params![old, new],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn list_branches(&mut self) -> Result<Vec<BranchInfo>> {
        let mut stmt = self
            .conn
            .prepare_cached("select name, tip from branches order by name")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;

        let mut branches = Vec::new();
        for row in rows {
            let (name, tip) = row?;
            let tip = tip.map(|hex| Hash::from_hex(&hex)).transpose()?;
            branches.push(BranchInfo { name, tip });
        }
        Ok(branches)
    }

    pub fn branch_count(&self) -> Result<u64> {
        Ok(self
            .conn
            .query_row("select count(*) from branches", [], |row| row.get(0))?)
    }

    /// number of commits reachable from a tip along the parent chain
    pub fn commit_count(&self, tip: &Hash) -> Result<u64> {
        Ok(self.conn.query_row(
            indoc! {r#"
                with recursive chain (hash) as (
                    select ?1
                    union all
                    select c.parent from commits c
                    join chain on c.hash = chain.hash
                    where c.parent is not null
                )
                select count(*) from chain
            "#},
            params![tip.to_hex()],
            |row| row.get(0),
        )?)
    }

    // ---- commits ---------------------------------------------------------

    /// record a commit and everything it carries in one transaction
    ///
    /// advances the branch tip and mirrors HEAD; object writes must already
    /// have happened.
    pub fn record_commit(&mut self, new: &NewCommit<'_>) -> Result<()> {
        let tx = self.conn.transaction()?;

        tx.execute(
            indoc! {r#"
                insert or replace into commits
                    (hash, parent, tree_hash, message, author, timestamp,
                     branch, commit_type, screenshot_hash)
                values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#},
            params![
                new.hash.to_hex(),
                new.record.parent.as_ref().map(Hash::to_hex),
                new.record.tree.to_hex(),
                new.record.message,
                new.record.author,
                new.record.timestamp,
                new.record.branch,
                new.record.commit_type.as_str(),
                new.record.screenshot.as_ref().map(Hash::to_hex),
            ],
        )?;

        tx.execute(
            "insert into branches (name, tip) values (?1, ?2)
             on conflict (name) do update set tip = excluded.tip",
            params![new.record.branch, new.hash.to_hex()],
        )?;

        tx.execute(
            "insert into repo_meta (key, value) values ('head', ?1)
             on conflict (key) do update set value = excluded.value",
            params![new.record.branch],
        )?;

        {
            let mut insert_entry = tx.prepare_cached(indoc! {r#"
                insert or ignore into tree_entries (tree_hash, name, kind, child_hash)
                values (?1, ?2, ?3, ?4)
            "#})?;
            for (tree_hash, entries) in new.trees {
                for (name, kind, child) in entries {
                    insert_entry.execute(params![
                        tree_hash.to_hex(),
                        name,
                        kind.as_str(),
                        child.to_hex()
                    ])?;
                }
            }

            let mut insert_file = tx.prepare_cached(indoc! {r#"
                insert or replace into commit_files (commit_hash, path, kind, hash, size)
                values (?1, ?2, ?3, ?4, ?5)
            "#})?;
            for file in new.files {
                insert_file.execute(params![
                    new.hash.to_hex(),
                    file.path,
                    file.kind.as_str(),
                    file.hash.to_hex(),
                    file.size
                ])?;
            }

            let mut insert_mesh = tx.prepare_cached(indoc! {r#"
                insert or ignore into meshes (hash, name, vertex_count, face_count)
                values (?1, ?2, ?3, ?4)
            "#})?;
            for mesh in new.meshes {
                insert_mesh.execute(params![
                    mesh.hash.to_hex(),
                    mesh.name,
                    mesh.vertex_count,
                    mesh.face_count
                ])?;
            }

            let mut insert_texture = tx.prepare_cached(indoc! {r#"
                insert or ignore into textures (hash, width, height, channels, size)
                values (?1, ?2, ?3, ?4, ?5)
            "#})?;
            for texture in new.textures {
                insert_texture.execute(params![
                    texture.hash.to_hex(),
                    texture.width,
                    texture.height,
                    texture.channels,
                    texture.size
                ])?;
            }

            let mut insert_link = tx.prepare_cached(indoc! {r#"
                insert or ignore into texture_commits (texture_hash, commit_hash)
                values (?1, ?2)
            "#})?;
            for texture in new.texture_links {
                insert_link.execute(params![texture.to_hex(), new.hash.to_hex()])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// fetch a commit record by hash
    pub fn get_commit(&self, hash: &Hash) -> Result<Option<CommitRecord>> {
        let row = self
            .conn
            .query_row(
                indoc! {r#"
                    select parent, tree_hash, message, author, timestamp,
                           branch, commit_type, screenshot_hash
                    from commits where hash = ?1
                "#},
                params![hash.to_hex()],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, Option<String>>(7)?,
                    ))
                },
            )
            .optional()?;

        let Some((parent, tree, message, author, timestamp, branch, commit_type, screenshot)) = row
        else {
            return Ok(None);
        };

        Ok(Some(CommitRecord {
            author,
            branch,
            commit_type: CommitType::parse(&commit_type).ok_or_else(|| {
                Error::CorruptObjectData(format!("unknown commit type: {commit_type}"))
            })?,
            message,
            parent: parent.map(|hex| Hash::from_hex(&hex)).transpose()?,
            screenshot: screenshot.map(|hex| Hash::from_hex(&hex)).transpose()?,
            timestamp,
            tree: Hash::from_hex(&tree)?,
        }))
    }

    /// files recorded for a commit, sorted by path
    pub fn commit_files(&self, hash: &Hash) -> Result<Vec<CommitFileRow>> {
        let mut stmt = self.conn.prepare_cached(indoc! {r#"
            select path, kind, hash, size from commit_files
            where commit_hash = ?1 order by path
        "#})?;
        let rows = stmt.query_map(params![hash.to_hex()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u64>(3)?,
            ))
        })?;

        let mut files = Vec::new();
        for row in rows {
            let (path, kind, hash, size) = row?;
            files.push(CommitFileRow {
                path,
                kind: EntryKind::parse(&kind)?,
                hash: Hash::from_hex(&hash)?,
                size,
            });
        }
        Ok(files)
    }

    /// commits of one type on a branch, newest first
    pub fn commits_on_branch_of_type(
        &self,
        branch: &str,
        commit_type: CommitType,
    ) -> Result<Vec<(Hash, i64)>> {
        let mut stmt = self.conn.prepare_cached(indoc! {r#"
            select hash, timestamp from commits
            where branch = ?1 and commit_type = ?2
            order by timestamp desc, hash
        "#})?;
        let rows = stmt.query_map(params![branch, commit_type.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut commits = Vec::new();
        for row in rows {
            let (hex, ts) = row?;
            commits.push((Hash::from_hex(&hex)?, ts));
        }
        Ok(commits)
    }

    /// textures linked to a commit through the texture_commits table
    pub fn textures_for_commit(&self, commit: &Hash) -> Result<Vec<Hash>> {
        let mut stmt = self.conn.prepare_cached(
            "select texture_hash from texture_commits where commit_hash = ?1",
        )?;
        let rows = stmt.query_map(params![commit.to_hex()], |row| row.get::<_, String>(0))?;

        let mut textures = Vec::new();
        for row in rows {
            textures.push(Hash::from_hex(&row?)?);
        }
        Ok(textures)
    }

    // ---- stashes ---------------------------------------------------------

    pub fn record_stash(
        &mut self,
        hash: &Hash,
        record: &CommitRecord,
        trees: &[(Hash, Vec<(String, EntryKind, Hash)>)],
    ) -> Result<()> {
        let tx = self.conn.transaction()?;

        tx.execute(
            indoc! {r#"
                insert or replace into stashes (hash, message, author, timestamp, tree_hash)
                values (?1, ?2, ?3, ?4, ?5)
            "#},
            params![
                hash.to_hex(),
                record.message,
                record.author,
                record.timestamp,
                record.tree.to_hex()
            ],
        )?;

        {
            let mut insert_entry = tx.prepare_cached(indoc! {r#"
                insert or ignore into tree_entries (tree_hash, name, kind, child_hash)
                values (?1, ?2, ?3, ?4)
            "#})?;
            for (tree_hash, entries) in trees {
                for (name, kind, child) in entries {
                    insert_entry.execute(params![
                        tree_hash.to_hex(),
                        name,
                        kind.as_str(),
                        child.to_hex()
                    ])?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    pub fn list_stashes(&mut self) -> Result<Vec<StashInfo>> {
        let mut stmt = self.conn.prepare_cached(indoc! {r#"
            select hash, message, author, timestamp, tree_hash
            from stashes order by timestamp desc, hash
        "#})?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut stashes = Vec::new();
        for row in rows {
            let (hash, message, author, timestamp, tree) = row?;
            stashes.push(StashInfo {
                hash: Hash::from_hex(&hash)?,
                message,
                author,
                timestamp,
                tree: Hash::from_hex(&tree)?,
            });
        }
        Ok(stashes)
    }

    pub fn get_stash(&self, hash: &Hash) -> Result<Option<StashInfo>> {
        let row = self
            .conn
            .query_row(
                "select message, author, timestamp, tree_hash from stashes where hash = ?1",
                params![hash.to_hex()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((message, author, timestamp, tree)) = row else {
            return Ok(None);
        };
        Ok(Some(StashInfo {
            hash: *hash,
            message,
            author,
            timestamp,
            tree: Hash::from_hex(&tree)?,
        }))
    }

    pub fn delete_stash(&mut self, hash: &Hash) -> Result<bool> {
        let n = self.conn.execute(
            "delete from stashes where hash = ?1",
            params![hash.to_hex()],
        )?;
        Ok(n > 0)
    }

    // ---- gc & rebuild support -------------------------------------------

    /// delete metadata rows for swept objects in one transaction
    pub fn delete_swept(
        &mut self,
        commits: &[Hash],
        meshes: &[Hash],
        textures: &[Hash],
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut del_commit = tx.prepare_cached("delete from commits where hash = ?1")?;
            let mut del_files =
                tx.prepare_cached("delete from commit_files where commit_hash = ?1")?;
            let mut del_links =
                tx.prepare_cached("delete from texture_commits where commit_hash = ?1")?;
            for hash in commits {
                del_commit.execute(params![hash.to_hex()])?;
                del_files.execute(params![hash.to_hex()])?;
                del_links.execute(params![hash.to_hex()])?;
            }

            let mut del_mesh = tx.prepare_cached("delete from meshes where hash = ?1")?;
            for hash in meshes {
                del_mesh.execute(params![hash.to_hex()])?;
            }

            let mut del_texture = tx.prepare_cached("delete from textures where hash = ?1")?;
            let mut del_tex_links =
                tx.prepare_cached("delete from texture_commits where texture_hash = ?1")?;
            for hash in textures {
                del_texture.execute(params![hash.to_hex()])?;
                del_tex_links.execute(params![hash.to_hex()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// drop tree_entries rows whose tree was swept
    pub fn delete_tree_entries(&mut self, trees: &[Hash]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut del = tx.prepare_cached("delete from tree_entries where tree_hash = ?1")?;
            for hash in trees {
                del.execute(params![hash.to_hex()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// insert a commit row without touching branches or HEAD (rebuild path)
    pub fn insert_commit_row(&mut self, hash: &Hash, record: &CommitRecord) -> Result<()> {
        self.conn.execute(
            indoc! {r#"
                insert or replace into commits
                    (hash, parent, tree_hash, message, author, timestamp,
                     branch, commit_type, screenshot_hash)
                values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#},
            params![
                hash.to_hex(),
                record.parent.as_ref().map(Hash::to_hex),
                record.tree.to_hex(),
                record.message,
                record.author,
                record.timestamp,
                record.branch,
                record.commit_type.as_str(),
                record.screenshot.as_ref().map(Hash::to_hex),
            ],
        )?;
        Ok(())
    }

    /// insert one tree's flattened entries (rebuild path)
    pub fn insert_tree_rows(
        &mut self,
        tree: &Hash,
        entries: &[(String, EntryKind, Hash)],
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut insert = tx.prepare_cached(indoc! {r#"
                insert or ignore into tree_entries (tree_hash, name, kind, child_hash)
                values (?1, ?2, ?3, ?4)
            "#})?;
            for (name, kind, child) in entries {
                insert.execute(params![tree.to_hex(), name, kind.as_str(), child.to_hex()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// insert commit_files rows (rebuild path)
    pub fn insert_commit_files(&mut self, commit: &Hash, files: &[CommitFileRow]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut insert = tx.prepare_cached(indoc! {r#"
                insert or replace into commit_files (commit_hash, path, kind, hash, size)
                values (?1, ?2, ?3, ?4, ?5)
            "#})?;
            for file in files {
                insert.execute(params![
                    commit.to_hex(),
                    file.path,
                    file.kind.as_str(),
                    file.hash.to_hex(),
                    file.size
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// insert a mesh row (rebuild path)
    pub fn insert_mesh_row(&mut self, mesh: &MeshRow) -> Result<()> {
        self.conn.execute(
            indoc! {r#"
                insert or ignore into meshes (hash, name, vertex_count, face_count)
                values (?1, ?2, ?3, ?4)
            "#},
            params![
                mesh.hash.to_hex(),
                mesh.name,
                mesh.vertex_count,
                mesh.face_count
            ],
        )?;
        Ok(())
    }

    /// insert a texture row (rebuild path)
    pub fn insert_texture_row(&mut self, texture: &TextureRow) -> Result<()> {
        self.conn.execute(
            indoc! {r#"
                insert or ignore into textures (hash, width, height, channels, size)
                values (?1, ?2, ?3, ?4, ?5)
            "#},
            params![
                texture.hash.to_hex(),
                texture.width,
                texture.height,
                texture.channels,
                texture.size
            ],
        )?;
        Ok(())
    }

    /// link a texture to a commit (rebuild path)
    pub fn insert_texture_link(&mut self, texture: &Hash, commit: &Hash) -> Result<()> {
        self.conn.execute(
            "insert or ignore into texture_commits (texture_hash, commit_hash) values (?1, ?2)",
            params![texture.to_hex(), commit.to_hex()],
        )?;
        Ok(())
    }

    /// wipe every table; used by rebuild before repopulating
    pub fn clear_all(&mut self) -> Result<()> {
        self.conn.execute_batch(indoc! {r#"
            delete from commits;
            delete from branches;
            delete from tree_entries;
            delete from commit_files;
            delete from meshes;
            delete from textures;
            delete from texture_commits;
            delete from stashes;
            delete from repo_meta;
        "#})?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_index() -> (tempfile::TempDir, Index) {
        let dir = tempdir().unwrap();
        let index = Index::open(&dir.path().join("forester.db")).unwrap();
        (dir, index)
    }

    fn h(n: u8) -> Hash {
        Hash::from_bytes([n; 32])
    }

    fn record(parent: Option<Hash>, branch: &str, timestamp: i64) -> CommitRecord {
        CommitRecord {
            author: "alice".to_string(),
            branch: branch.to_string(),
            commit_type: CommitType::Project,
            message: "msg".to_string(),
            parent,
            screenshot: None,
            timestamp,
            tree: h(0xee),
        }
    }

    #[test]
    fn test_schema_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("forester.db");
        drop(Index::open(&path).unwrap());
        drop(Index::open(&path).unwrap());
    }

    #[test]
    fn test_branch_crud() {
        let (_dir, mut index) = open_index();

        index.create_branch("main", None).unwrap();
        assert!(index.branch_exists("main").unwrap());
        assert_eq!(index.branch_tip("main").unwrap(), None);

        index.set_branch_tip("main", &h(1)).unwrap();
        assert_eq!(index.branch_tip("main").unwrap(), Some(h(1)));

        index.rename_branch("main", "trunk").unwrap();
        assert!(!index.branch_exists("main").unwrap());
        assert_eq!(index.branch_tip("trunk").unwrap(), Some(h(1)));

        index.delete_branch("trunk").unwrap();
        assert!(matches!(
            index.branch_tip("trunk"),
            Err(Error::UnknownRef(_))
        ));
    }

    #[test]
    fn test_record_commit_advances_branch() {
        let (_dir, mut index) = open_index();
        index.create_branch("main", None).unwrap();

        let rec = record(None, "main", 100);
        index
            .record_commit(&NewCommit {
                hash: h(1),
                record: &rec,
                files: &[CommitFileRow {
                    path: "a.txt".to_string(),
                    kind: EntryKind::Blob,
                    hash: h(9),
                    size: 5,
                }],
                trees: &[(h(0xee), vec![("a.txt".to_string(), EntryKind::Blob, h(9))])],
                meshes: &[],
                textures: &[],
                texture_links: &[],
            })
            .unwrap();

        assert_eq!(index.branch_tip("main").unwrap(), Some(h(1)));
        assert_eq!(index.get_meta("head").unwrap().as_deref(), Some("main"));

        let fetched = index.get_commit(&h(1)).unwrap().unwrap();
        assert_eq!(fetched, rec);

        let files = index.commit_files(&h(1)).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "a.txt");
    }

    #[test]
    fn test_commit_count_walks_parent_chain() {
        let (_dir, mut index) = open_index();
        index.create_branch("main", None).unwrap();

        for (i, parent) in [(1u8, None), (2, Some(h(1))), (3, Some(h(2)))] {
            let rec = record(parent, "main", 100 + i as i64);
            index
                .record_commit(&NewCommit {
                    hash: h(i),
                    record: &rec,
                    files: &[],
                    trees: &[],
                    meshes: &[],
                    textures: &[],
                    texture_links: &[],
                })
                .unwrap();
        }

        assert_eq!(index.commit_count(&h(3)).unwrap(), 3);
        assert_eq!(index.commit_count(&h(1)).unwrap(), 1);
    }

    #[test]
    fn test_stash_crud() {
        let (_dir, mut index) = open_index();

        let rec = record(None, "main", 55);
        index.record_stash(&h(7), &rec, &[]).unwrap();

        let stashes = index.list_stashes().unwrap();
        assert_eq!(stashes.len(), 1);
        assert_eq!(stashes[0].hash, h(7));
        assert_eq!(stashes[0].tree, h(0xee));

        assert!(index.get_stash(&h(7)).unwrap().is_some());
        assert!(index.delete_stash(&h(7)).unwrap());
        assert!(!index.delete_stash(&h(7)).unwrap());
        assert!(index.get_stash(&h(7)).unwrap().is_none());
    }

    #[test]
    fn test_delete_swept_removes_linked_rows() {
        let (_dir, mut index) = open_index();
        index.create_branch("main", None).unwrap();

        let rec = record(None, "main", 1);
        index
            .record_commit(&NewCommit {
                hash: h(1),
                record: &rec,
                files: &[],
                trees: &[],
                meshes: &[MeshRow {
                    hash: h(2),
                    name: "cube".to_string(),
                    vertex_count: 8,
                    face_count: 6,
                }],
                textures: &[TextureRow {
                    hash: h(3),
                    width: 4,
                    height: 4,
                    channels: 4,
                    size: 64,
                }],
                texture_links: &[h(3)],
            })
            .unwrap();

        index.delete_swept(&[h(1)], &[h(2)], &[h(3)]).unwrap();
        assert!(index.get_commit(&h(1)).unwrap().is_none());

        let links: u32 = index
            .conn
            .query_row("select count(*) from texture_commits", [], |r| r.get(0))
            .unwrap();
        assert_eq!(links, 0);
    }
}
