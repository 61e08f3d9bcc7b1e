use parley_types::models::Conversation;
use rusqlite::{Connection, OptionalExtension};

use crate::{Database, Result, StoreError};

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

/// Insert a conversation row. `None` is stored as SQL NULL.
pub fn insert_conversation(conn: &Connection, name: Option<&str>) -> Result<Conversation> {
    Ok(conn
        .prepare_cached("INSERT INTO conversations (name) VALUES (?1) RETURNING id, name")?
        .query_row([name], from_row)?)
}

pub fn get_conversation(conn: &Connection, id: i64) -> Result<Conversation> {
    conn.prepare_cached("SELECT id, name FROM conversations WHERE id = ?1")?
        .query_row([id], from_row)
        .optional()?
        .ok_or(StoreError::NotFound("conversation"))
}

/// Conversations `user_id` is a member of, oldest first.
pub fn list_for_user(conn: &Connection, user_id: i64) -> Result<Vec<Conversation>> {
    let mut stmt = conn.prepare_cached(
        "SELECT c.id, c.name
         FROM conversations c
         JOIN memberships m ON m.conversation_id = c.id
         WHERE m.user_id = ?1
         ORDER BY c.id",
    )?;
    let rows = stmt
        .query_map([user_id], from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

impl Database {
    // -- Conversations --

    pub fn get_conversation(&self, id: i64) -> Result<Conversation> {
        self.with_conn(|conn| get_conversation(conn, id))
    }

    pub fn list_conversations_for_user(&self, user_id: i64) -> Result<Vec<Conversation>> {
        self.with_conn(|conn| list_for_user(conn, user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn test_name_absence_round_trips() {
        let t = test_support::open();
        let unnamed = t.db.transaction(|tx| insert_conversation(tx, None)).unwrap();
        let named = t.db.transaction(|tx| insert_conversation(tx, Some("trip"))).unwrap();

        assert_eq!(t.db.get_conversation(unnamed.id).unwrap().name, None);
        assert_eq!(t.db.get_conversation(named.id).unwrap().name.as_deref(), Some("trip"));
        assert!(named.id > unnamed.id);
    }

    #[test]
    fn test_list_only_member_conversations() {
        let t = test_support::open();
        let user = test_support::user(&t.db, "gina");
        let mine = t.db.transaction(|tx| insert_conversation(tx, Some("mine"))).unwrap();
        t.db.transaction(|tx| insert_conversation(tx, Some("theirs"))).unwrap();
        t.db.ensure_membership(user.id, mine.id).unwrap();

        assert_eq!(t.db.list_conversations_for_user(user.id).unwrap(), vec![mine]);
        assert!(t.db.get_conversation(777).unwrap_err().is_not_found());
    }
}
