//! review records: comments and approvals keyed by asset hash
//!
//! append-mostly. asset hashes are not validated against the object store;
//! a comment may outlive its asset and GC leaves review rows alone.

use indoc::indoc;
use rusqlite::params;

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::index::Index;
use crate::object::commit::unix_now;

/// which kind of asset a review record refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetType {
    Mesh,
    Blob,
    Commit,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Mesh => "mesh",
            AssetType::Blob => "blob",
            AssetType::Commit => "commit",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "mesh" => Ok(AssetType::Mesh),
            "blob" => Ok(AssetType::Blob),
            "commit" => Ok(AssetType::Commit),
            other => Err(Error::CorruptObjectData(format!(
                "unknown asset type: {other}"
            ))),
        }
    }
}

/// review outcome of an approval row
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            other => Err(Error::CorruptObjectData(format!(
                "unknown approval status: {other}"
            ))),
        }
    }
}

/// a review comment, optionally anchored at a 2D position
#[derive(Clone, Debug, PartialEq)]
pub struct Comment {
    pub id: i64,
    pub asset_hash: Hash,
    pub asset_type: AssetType,
    pub author: String,
    pub text: String,
    pub created_at: i64,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub resolved: bool,
}

/// the approval state of one approver for one asset
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Approval {
    pub asset_hash: Hash,
    pub asset_type: AssetType,
    pub approver: String,
    pub status: ApprovalStatus,
    pub comment: Option<String>,
    pub created_at: i64,
}

impl Index {
    /// insert a comment, returning its id
    pub fn comment_on_asset(
        &mut self,
        asset_hash: &Hash,
        asset_type: AssetType,
        author: &str,
        text: &str,
        position: Option<(f64, f64)>,
    ) -> Result<i64> {
        self.conn.execute(
            indoc! {r#"
                insert into comments
                    (asset_hash, asset_type, author, text, created_at, x, y, resolved)
                values (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)
            "#},
            params![
                asset_hash.to_hex(),
                asset_type.as_str(),
                author,
                text,
                unix_now(),
                position.map(|p| p.0),
                position.map(|p| p.1)
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// all comments on an asset, oldest first
    pub fn get_comments(&mut self, asset_hash: &Hash) -> Result<Vec<Comment>> {
        let mut stmt = self.conn.prepare_cached(indoc! {r#"
            select id, asset_hash, asset_type, author, text, created_at, x, y, resolved
            from comments where asset_hash = ?1 order by id
        "#})?;
        let rows = stmt.query_map(params![asset_hash.to_hex()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, Option<f64>>(6)?,
                row.get::<_, Option<f64>>(7)?,
                row.get::<_, bool>(8)?,
            ))
        })?;

        let mut comments = Vec::new();
        for row in rows {
            let (id, hash, asset_type, author, text, created_at, x, y, resolved) = row?;
            comments.push(Comment {
                id,
                asset_hash: Hash::from_hex(&hash)?,
                asset_type: AssetType::parse(&asset_type)?,
                author,
                text,
                created_at,
                x,
                y,
                resolved,
            });
        }
        Ok(comments)
    }

    /// flip a comment to resolved; returns false for an unknown id
    pub fn resolve_comment(&mut self, id: i64) -> Result<bool> {
        let n = self.conn.execute(
            "update comments set resolved = 1 where id = ?1",
            params![id],
        )?;
        Ok(n > 0)
    }

    /// remove a comment; returns false for an unknown id
    pub fn delete_comment(&mut self, id: i64) -> Result<bool> {
        let n = self
            .conn
            .execute("delete from comments where id = ?1", params![id])?;
        Ok(n > 0)
    }

    /// append an approval row; the newest row per (asset, approver) wins
    pub fn approve_asset(
        &mut self,
        asset_hash: &Hash,
        asset_type: AssetType,
        approver: &str,
        status: ApprovalStatus,
        comment: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            indoc! {r#"
                insert into approvals
                    (asset_hash, asset_type, approver, status, comment, created_at)
                values (?1, ?2, ?3, ?4, ?5, ?6)
            "#},
            params![
                asset_hash.to_hex(),
                asset_type.as_str(),
                approver,
                status.as_str(),
                comment,
                unix_now()
            ],
        )?;
        Ok(())
    }

    /// current approval per approver for an asset (latest row wins)
    pub fn approval_status(&mut self, asset_hash: &Hash) -> Result<Vec<Approval>> {
        let mut stmt = self.conn.prepare_cached(indoc! {r#"
            select a.asset_hash, a.asset_type, a.approver, a.status, a.comment, a.created_at
            from approvals a
            join (
                select approver, max(id) as latest from approvals
                where asset_hash = ?1 group by approver
            ) m on a.id = m.latest
            order by a.approver
        "#})?;
        let rows = stmt.query_map(params![asset_hash.to_hex()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let mut approvals = Vec::new();
        for row in rows {
            let (hash, asset_type, approver, status, comment, created_at) = row?;
            approvals.push(Approval {
                asset_hash: Hash::from_hex(&hash)?,
                asset_type: AssetType::parse(&asset_type)?,
                approver,
                status: ApprovalStatus::parse(&status)?,
                comment,
                created_at,
            });
        }
        Ok(approvals)
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

    #[test]
    fn test_comment_lifecycle() {
        let (_dir, mut index) = open_index();

        let id = index
            .comment_on_asset(&h(1), AssetType::Mesh, "alice", "wing too thin", Some((0.4, 0.7)))
            .unwrap();
        let id2 = index
            .comment_on_asset(&h(1), AssetType::Mesh, "bob", "agreed", None)
            .unwrap();
        assert!(id2 > id);

        let comments = index.get_comments(&h(1)).unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].author, "alice");
        assert_eq!(comments[0].x, Some(0.4));
        assert!(!comments[0].resolved);
        assert_eq!(comments[1].x, None);

        assert!(index.resolve_comment(id).unwrap());
        assert!(index.get_comments(&h(1)).unwrap()[0].resolved);

        assert!(index.delete_comment(id2).unwrap());
        assert!(!index.delete_comment(id2).unwrap());
        assert_eq!(index.get_comments(&h(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_comments_survive_for_unknown_assets() {
        let (_dir, mut index) = open_index();

        // nothing validates that the asset exists
        index
            .comment_on_asset(&h(0xfe), AssetType::Commit, "alice", "orphan note", None)
            .unwrap();
        assert_eq!(index.get_comments(&h(0xfe)).unwrap().len(), 1);
    }

    #[test]
    fn test_latest_approval_wins() {
        let (_dir, mut index) = open_index();

        index
            .approve_asset(&h(2), AssetType::Mesh, "alice", ApprovalStatus::Pending, None)
            .unwrap();
        index
            .approve_asset(&h(2), AssetType::Mesh, "alice", ApprovalStatus::Rejected, Some("normals flipped"))
            .unwrap();
        index
            .approve_asset(&h(2), AssetType::Mesh, "bob", ApprovalStatus::Approved, None)
            .unwrap();

        let status = index.approval_status(&h(2)).unwrap();
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].approver, "alice");
        assert_eq!(status[0].status, ApprovalStatus::Rejected);
        assert_eq!(status[0].comment.as_deref(), Some("normals flipped"));
        assert_eq!(status[1].approver, "bob");
        assert_eq!(status[1].status, ApprovalStatus::Approved);
    }
}
