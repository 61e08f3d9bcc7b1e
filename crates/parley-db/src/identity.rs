//! Identity Lookup and the minimal Account Store writes the server needs.

use parley_types::models::User;
use rusqlite::{Connection, OptionalExtension};

use crate::error::is_unique_violation;
use crate::models::UserRow;
use crate::{Database, Result, StoreError};

pub fn create_user(
    conn: &Connection,
    name: &str,
    email: &str,
    hashed_password: &str,
) -> Result<User> {
    let sql = format!(
        "INSERT INTO users (name, email, hashed_password) VALUES (?1, ?2, ?3) RETURNING {}",
        UserRow::COLUMNS
    );
    conn.query_row(&sql, (name, email, hashed_password), UserRow::from_row)
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::EmailTaken
            } else {
                e.into()
            }
        })?
        .into_user()
}

pub fn resolve_by_id(conn: &Connection, id: i64) -> Result<User> {
    query_user(conn, "id = ?1", id)?
        .ok_or(StoreError::NotFound("user"))?
        .into_user()
}

pub fn resolve_by_email(conn: &Connection, email: &str) -> Result<User> {
    find_credentials(conn, email)?
        .ok_or(StoreError::NotFound("user"))?
        .into_user()
}

/// Full row including the credential hash, for login.
pub fn find_credentials(conn: &Connection, email: &str) -> Result<Option<UserRow>> {
    query_user(conn, "email = ?1", email)
}

/// Fields to change on a user. `None` leaves the stored value as it is.
#[derive(Debug, Default, Clone, Copy)]
pub struct UserUpdate<'a> {
    pub name: Option<&'a str>,
    pub email: Option<&'a str>,
    pub image: Option<&'a str>,
    pub status: Option<&'a str>,
    pub hashed_password: Option<&'a str>,
}

pub fn update_user(conn: &Connection, id: i64, update: &UserUpdate<'_>) -> Result<User> {
    let sql = format!(
        "UPDATE users SET
            name = COALESCE(?2, name),
            email = COALESCE(?3, email),
            image = COALESCE(?4, image),
            status = COALESCE(?5, status),
            hashed_password = COALESCE(?6, hashed_password)
         WHERE id = ?1
         RETURNING {}",
        UserRow::COLUMNS
    );
    let params = rusqlite::params![
        id,
        update.name,
        update.email,
        update.image,
        update.status,
        update.hashed_password,
    ];
    conn.query_row(&sql, params, UserRow::from_row)
        .optional()
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::EmailTaken
            } else {
                e.into()
            }
        })?
        .ok_or(StoreError::NotFound("user"))?
        .into_user()
}

/// One page of users ordered by id.
pub fn list_users(conn: &Connection, limit: i64, offset: i64) -> Result<Vec<User>> {
    let sql = format!(
        "SELECT {} FROM users ORDER BY id LIMIT ?1 OFFSET ?2",
        UserRow::COLUMNS
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map([limit, offset], UserRow::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(UserRow::into_user).collect()
}

fn query_user<P: rusqlite::ToSql>(
    conn: &Connection,
    predicate: &str,
    value: P,
) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {predicate}", UserRow::COLUMNS);
    let mut stmt = conn.prepare_cached(&sql)?;
    Ok(stmt.query_row([value], UserRow::from_row).optional()?)
}

impl Database {
    // -- Users --

    pub fn create_user(&self, name: &str, email: &str, hashed_password: &str) -> Result<User> {
        self.with_conn_mut(|conn| create_user(conn, name, email, hashed_password))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<User> {
        self.with_conn(|conn| resolve_by_id(conn, id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<User> {
        self.with_conn(|conn| resolve_by_email(conn, email))
    }

    pub fn get_credentials_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| find_credentials(conn, email))
    }

    pub fn update_user(&self, id: i64, update: &UserUpdate<'_>) -> Result<User> {
        self.transaction(|tx| update_user(tx, id, update))
    }

    pub fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<User>> {
        self.with_conn(|conn| list_users(conn, limit, offset))
    }
}
