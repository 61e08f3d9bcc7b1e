use chrono::{DateTime, Utc};
use parley_types::models::Message;
use rusqlite::{Connection, OptionalExtension};

use crate::models::parse_timestamp;
use crate::{Database, Result, StoreError};

/// Identifier and server-assigned timestamp of a freshly appended message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appended {
    pub id: i64,
    pub created_at: DateTime<Utc>,
}

/// Append a message. A missing conversation trips the foreign key and surfaces
/// as `StoreError::Storage`.
pub fn append(
    conn: &Connection,
    conversation_id: i64,
    sender_name: &str,
    content: &str,
) -> Result<Appended> {
    let (id, created_at): (i64, String) = conn
        .prepare_cached(
            "INSERT INTO messages (sender_name, content, conversation_id) VALUES (?1, ?2, ?3)
             RETURNING id, created_at",
        )?
        .query_row(rusqlite::params![sender_name, content, conversation_id], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;

    Ok(Appended {
        id,
        created_at: parse_timestamp("messages.created_at", &created_at)?,
    })
}

const MESSAGE_COLUMNS: &str = "id, sender_name, content, conversation_id, created_at";

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, String, String, i64, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_message(
    (id, sender_name, content, conversation_id, created_at): (i64, String, String, i64, String),
) -> Result<Message> {
    Ok(Message {
        id,
        sender_name,
        content,
        conversation_id,
        created_at: parse_timestamp("messages.created_at", &created_at)?,
    })
}

pub fn get_message(conn: &Connection, id: i64) -> Result<Message> {
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
    let raw = conn
        .prepare_cached(&sql)?
        .query_row([id], read_row)
        .optional()?
        .ok_or(StoreError::NotFound("message"))?;
    into_message(raw)
}

/// Messages in a conversation in insertion order.
pub fn list_for_conversation(conn: &Connection, conversation_id: i64) -> Result<Vec<Message>> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1 ORDER BY id"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map([conversation_id], read_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(into_message).collect()
}

impl Database {
    // -- Messages --

    pub fn get_message(&self, id: i64) -> Result<Message> {
        self.with_conn(|conn| get_message(conn, id))
    }

    pub fn list_messages(&self, conversation_id: i64) -> Result<Vec<Message>> {
        self.with_conn(|conn| list_for_conversation(conn, conversation_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{conversations, test_support};

    #[test]
    fn test_append_assigns_increasing_ids() {
        let t = test_support::open();
        let conv = t
            .db
            .transaction(|tx| conversations::insert_conversation(tx, None))
            .unwrap();

        let first = t.db.transaction(|tx| append(tx, conv.id, "hana", "hi")).unwrap();
        let second = t.db.transaction(|tx| append(tx, conv.id, "hana", "there")).unwrap();
        assert!(second.id > first.id);
        assert!(second.created_at >= first.created_at);

        let listed = t.db.list_messages(conv.id).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].content, "hi");
        assert_eq!(listed[1].sender_name, "hana");
        assert_eq!(t.db.get_message(first.id).unwrap().created_at, first.created_at);
    }

    #[test]
    fn test_append_to_missing_conversation_fails() {
        let t = test_support::open();
        let err = t.db.transaction(|tx| append(tx, 31337, "ivan", "lost")).unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
        assert_eq!(test_support::count(&t.db, "SELECT COUNT(*) FROM messages"), 0);
    }
}
