//! collaborative file-lock registry
//!
//! locks are advisory rows keyed by (file_path, branch, owner). an
//! exclusive lock excludes everything on its key; shared locks coexist
//! with each other. expiry is evaluated lazily: every query first purges
//! rows whose expires_at has passed.

use indoc::indoc;
use rusqlite::params;

use crate::error::{Error, Result};
use crate::index::Index;
use crate::object::commit::unix_now;

/// exclusivity of a lock
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockType {
    Exclusive,
    Shared,
}

impl LockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockType::Exclusive => "exclusive",
            LockType::Shared => "shared",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "exclusive" => Ok(LockType::Exclusive),
            "shared" => Ok(LockType::Shared),
            other => Err(Error::CorruptObjectData(format!(
                "unknown lock type: {other}"
            ))),
        }
    }
}

/// an advisory ownership record for a file path on a branch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lock {
    pub file_path: String,
    pub branch: String,
    pub locked_by: String,
    pub lock_type: LockType,
    pub locked_at: i64,
    pub expires_at: Option<i64>,
}

impl Index {
    /// acquire a lock; returns false when the state machine forbids it
    ///
    /// `ttl_secs` sets expires_at relative to now; None never expires.
    pub fn lock_file(
        &mut self,
        file_path: &str,
        branch: &str,
        locked_by: &str,
        lock_type: LockType,
        ttl_secs: Option<i64>,
    ) -> Result<bool> {
        let now = unix_now();
        let tx = self.conn.transaction()?;

        tx.execute(
            "delete from locks where expires_at is not null and expires_at <= ?1",
            params![now],
        )?;

        // current holders of this key
        let holders: Vec<(String, String)> = {
            let mut stmt = tx.prepare_cached(indoc! {r#"
                select locked_by, lock_type from locks
                where file_path = ?1 and branch = ?2
            "#})?;
            let rows = stmt.query_map(params![file_path, branch], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            rows.collect::<std::result::Result<_, _>>()?
        };

        let any_exclusive = holders.iter().any(|(_, t)| t == "exclusive");
        let allowed = match lock_type {
            // exclusive requires a free key
            LockType::Exclusive => holders.is_empty(),
            // shared joins other shared holders but not an exclusive one
            LockType::Shared => !any_exclusive,
        };
        if !allowed {
            return Ok(false);
        }

        tx.execute(
            indoc! {r#"
                insert or replace into locks
                    (file_path, branch, locked_by, lock_type, locked_at, expires_at)
                values (?1, ?2, ?3, ?4, ?5, ?6)
            "#},
            params![
                file_path,
                branch,
                locked_by,
                lock_type.as_str(),
                now,
                ttl_secs.map(|ttl| now + ttl)
            ],
        )?;

        tx.commit()?;
        Ok(true)
    }

    /// release a lock; returns false when `locked_by` holds nothing here
    pub fn unlock_file(&mut self, file_path: &str, branch: &str, locked_by: &str) -> Result<bool> {
        let now = unix_now();
        let tx = self.conn.transaction()?;

        tx.execute(
            "delete from locks where expires_at is not null and expires_at <= ?1",
            params![now],
        )?;

        let n = tx.execute(
            "delete from locks where file_path = ?1 and branch = ?2 and locked_by = ?3",
            params![file_path, branch, locked_by],
        )?;

        tx.commit()?;
        Ok(n > 0)
    }

    /// all live locks, optionally restricted to one branch
    pub fn get_locks(&mut self, branch: Option<&str>) -> Result<Vec<Lock>> {
        let now = unix_now();
        self.conn.execute(
            "delete from locks where expires_at is not null and expires_at <= ?1",
            params![now],
        )?;

        let mut stmt = self.conn.prepare_cached(indoc! {r#"
            select file_path, branch, locked_by, lock_type, locked_at, expires_at
            from locks
            where (?1 is null or branch = ?1)
            order by file_path, locked_by
        "#})?;
        let rows = stmt.query_map(params![branch], row_to_lock)?;

        let mut locks = Vec::new();
        for row in rows {
            locks.push(row?.validate()?);
        }
        Ok(locks)
    }

    /// every live lock on any of `paths` (on `branch`) not owned by `user`
    pub fn check_conflicts(
        &mut self,
        paths: &[String],
        branch: &str,
        user: &str,
    ) -> Result<Vec<Lock>> {
        let mut conflicts = Vec::new();
        for lock in self.get_locks(Some(branch))? {
            if lock.locked_by != user && paths.contains(&lock.file_path) {
                conflicts.push(lock);
            }
        }
        Ok(conflicts)
    }
}

struct LockRow {
    file_path: String,
    branch: String,
    locked_by: String,
    lock_type: String,
    locked_at: i64,
    expires_at: Option<i64>,
}

impl LockRow {
    fn validate(self) -> Result<Lock> {
        Ok(Lock {
            file_path: self.file_path,
            branch: self.branch,
            locked_by: self.locked_by,
            lock_type: LockType::parse(&self.lock_type)?,
            locked_at: self.locked_at,
            expires_at: self.expires_at,
        })
    }
}

fn row_to_lock(row: &rusqlite::Row<'_>) -> rusqlite::Result<LockRow> {
    Ok(LockRow {
        file_path: row.get(0)?,
        branch: row.get(1)?,
        locked_by: row.get(2)?,
        lock_type: row.get(3)?,
        locked_at: row.get(4)?,
        expires_at: row.get(5)?,
    })
}
