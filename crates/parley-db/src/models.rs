//! Database row types. These map directly to SQLite rows and stay distinct
//! from the `parley-types` models so the wire format can evolve separately.

use chrono::{DateTime, NaiveDateTime, Utc};
use parley_types::models::User;

use crate::{Result, StoreError};

pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub hashed_password: String,
    pub image: Option<String>,
    pub status: Option<String>,
    pub created_at: String,
}

impl UserRow {
    pub(crate) const COLUMNS: &'static str =
        "id, name, email, hashed_password, image, status, created_at";

    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            hashed_password: row.get(3)?,
            image: row.get(4)?,
            status: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    pub fn into_user(self) -> Result<User> {
        let created_at = parse_timestamp("users.created_at", &self.created_at)?;
        Ok(User {
            id: self.id,
            name: self.name,
            email: self.email,
            image: self.image,
            status: self.status,
            created_at,
        })
    }
}

/// Parse a timestamp written by SQLite. New rows carry RFC 3339; rows written
/// with `datetime('now')` have no timezone and are treated as UTC.
pub(crate) fn parse_timestamp(column: &'static str, raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|n| n.and_utc()))
        .map_err(|_| StoreError::Corrupt {
            column,
            value: raw.to_string(),
        })
}
