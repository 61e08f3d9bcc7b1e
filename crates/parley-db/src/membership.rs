//! The user/conversation join table.

use parley_types::models::Membership;
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::{Database, Result, StoreError};

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Membership> {
    Ok(Membership {
        id: row.get(0)?,
        user_id: row.get(1)?,
        conversation_id: row.get(2)?,
    })
}

/// Make `user_id` a member of `conversation_id` if it is not one already.
///
/// The UNIQUE(user_id, conversation_id) constraint arbitrates concurrent callers:
/// a conflicting insert is a no-op rather than an error. Returns `true` when this
/// call inserted the row.
pub fn ensure_membership(conn: &Connection, user_id: i64, conversation_id: i64) -> Result<bool> {
    let inserted = conn
        .prepare_cached(
            "INSERT INTO memberships (user_id, conversation_id) VALUES (?1, ?2)
             ON CONFLICT(user_id, conversation_id) DO NOTHING",
        )?
        .execute([user_id, conversation_id])?;

    if inserted > 0 {
        debug!(user_id, conversation_id, "membership created");
    }
    Ok(inserted > 0)
}

pub fn get_membership(conn: &Connection, user_id: i64, conversation_id: i64) -> Result<Membership> {
    conn.prepare_cached(
        "SELECT id, user_id, conversation_id FROM memberships
         WHERE user_id = ?1 AND conversation_id = ?2",
    )?
    .query_row([user_id, conversation_id], from_row)
    .optional()?
    .ok_or(StoreError::NotFound("membership"))
}

pub fn list_by_user(conn: &Connection, user_id: i64) -> Result<Vec<Membership>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, user_id, conversation_id FROM memberships
         WHERE user_id = ?1 ORDER BY conversation_id",
    )?;
    let rows = stmt
        .query_map([user_id], from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

impl Database {
    // -- Memberships --

    /// Standalone idempotent ensure, in its own transaction.
    pub fn ensure_membership(&self, user_id: i64, conversation_id: i64) -> Result<bool> {
        self.transaction(|tx| ensure_membership(tx, user_id, conversation_id))
    }

    pub fn get_membership(&self, user_id: i64, conversation_id: i64) -> Result<Membership> {
        self.with_conn(|conn| get_membership(conn, user_id, conversation_id))
    }

    pub fn list_memberships_by_user(&self, user_id: i64) -> Result<Vec<Membership>> {
        self.with_conn(|conn| list_by_user(conn, user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{conversations, test_support};

    fn conversation(db: &Database) -> i64 {
        db.transaction(|tx| conversations::insert_conversation(tx, None))
            .unwrap()
            .id
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let t = test_support::open();
        let user = test_support::user(&t.db, "carol");
        let conv = conversation(&t.db);

        assert!(t.db.ensure_membership(user.id, conv).unwrap());
        assert!(!t.db.ensure_membership(user.id, conv).unwrap());

        let m = t.db.get_membership(user.id, conv).unwrap();
        assert_eq!((m.user_id, m.conversation_id), (user.id, conv));
        assert_eq!(test_support::count(&t.db, "SELECT COUNT(*) FROM memberships"), 1);
    }

    #[test]
    fn test_concurrent_ensure_leaves_one_row() {
        let t = test_support::open();
        let user = test_support::user(&t.db, "dave");
        let conv = conversation(&t.db);
        let user_id = user.id;
        // Two handles means two writer connections contending on the file lock.
        let other = t.reopen();
        let dbs = [&t.db, &other];

        let results: Vec<Result<bool>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let db = dbs[i % 2];
                    s.spawn(move || db.ensure_membership(user_id, conv))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results.iter().all(|r| r.is_ok()));
        let inserted = results.into_iter().filter(|r| matches!(r, Ok(true))).count();
        assert_eq!(inserted, 1);
        assert_eq!(test_support::count(&t.db, "SELECT COUNT(*) FROM memberships"), 1);
    }

    #[test]
    fn test_missing_membership_and_listing() {
        let t = test_support::open();
        let user = test_support::user(&t.db, "erin");
        let first = conversation(&t.db);
        let second = conversation(&t.db);

        assert!(t.db.get_membership(user.id, first).unwrap_err().is_not_found());

        t.db.ensure_membership(user.id, second).unwrap();
        t.db.ensure_membership(user.id, first).unwrap();

        let convs: Vec<i64> = t
            .db
            .list_memberships_by_user(user.id)
            .unwrap()
            .into_iter()
            .map(|m| m.conversation_id)
            .collect();
        assert_eq!(convs, vec![first, second]);
    }

    #[test]
    fn test_membership_requires_existing_conversation() {
        let t = test_support::open();
        let user = test_support::user(&t.db, "frank");
        let err = t.db.ensure_membership(user.id, 4242).unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
    }
}
