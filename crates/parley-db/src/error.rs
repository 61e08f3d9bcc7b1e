use rusqlite::ErrorCode;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Every recipient address failed to resolve, so no conversation was created.
    #[error("none of the recipient emails belong to an account")]
    NoValidRecipients,

    /// The authenticated sender has no account row. This is a consistency fault,
    /// not a client error.
    #[error("sender {0} does not exist")]
    UnknownSender(i64),

    #[error("transaction cancelled before commit")]
    Cancelled,

    #[error("email is already registered")]
    EmailTaken,

    #[error("corrupt {column} value {value:?}")]
    Corrupt { column: &'static str, value: String },

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// True when `err` is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        }
        _ => false,
    }
}
