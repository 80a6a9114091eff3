//! Error types shared by the local store, the remote adapters and the auth gate.

use thiserror::Error;

/// Result type for local store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for remote adapter calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors raised by the local durable store.
///
/// Every variant propagates to the immediate caller; the store never retries.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The database file or its directory could not be opened or created.
    #[error("local storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A single transaction failed.
    #[error("transaction failed: {0}")]
    TransactionFailure(String),

    /// A unique index rejected the write (e.g. two clients sharing a phone).
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// A stored JSON column could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The connection mutex was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::ConstraintViolation(err.to_string())
            }
            other => StoreError::TransactionFailure(other.to_string()),
        }
    }
}

/// Errors raised by a remote store adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The remote could not be reached at all.
    #[error("remote unreachable: {0}")]
    Unreachable(String),

    /// The call did not complete within the configured bound.
    #[error("remote call timed out")]
    Timeout,

    /// The document does not exist on the remote.
    #[error("document {collection}/{id} not found")]
    NotFound {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
    },

    /// Credentials were refused.
    #[error("remote refused credentials: {0}")]
    Unauthorized(String),

    /// The remote answered but rejected the request.
    #[error("remote rejected request: {0}")]
    Rejected(String),

    /// The remote answered with a body we could not interpret.
    #[error("invalid response from remote: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Returns true if a later attempt might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Unreachable(_) | RemoteError::Timeout | RemoteError::Rejected(_)
        )
    }
}

/// Result type for the offline write path.
pub type OrderResult<T> = Result<T, OrderError>;

/// Errors raised by the offline write path.
#[derive(Error, Debug)]
pub enum OrderError {
    /// The order was rejected before anything was written.
    #[error("invalid order: {0}")]
    Invalid(String),

    #[error("order {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by the authentication precondition gate.
#[derive(Error, Debug)]
pub enum AuthError {
    /// No remote endpoint or API key has been stored yet.
    #[error("remote credentials not configured: missing {0}")]
    NotConfigured(&'static str),

    /// The OS credential store failed.
    #[error("credential store error: {0}")]
    Keyring(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_unique_violation_maps_to_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id TEXT PRIMARY KEY, phone TEXT UNIQUE);
             INSERT INTO t VALUES ('a', '123');",
        )
        .unwrap();
        let err = conn
            .execute("INSERT INTO t VALUES ('b', '123')", [])
            .unwrap_err();
        assert!(matches!(
            StoreError::from(err),
            StoreError::ConstraintViolation(_)
        ));
    }

    #[test]
    fn test_other_sqlite_errors_map_to_transaction_failure() {
        let conn = Connection::open_in_memory().unwrap();
        let err = conn.execute("INSERT INTO missing VALUES (1)", []).unwrap_err();
        assert!(matches!(
            StoreError::from(err),
            StoreError::TransactionFailure(_)
        ));
    }

    #[test]
    fn test_retryable_remote_errors() {
        assert!(RemoteError::Timeout.is_retryable());
        assert!(RemoteError::Unreachable("dns".into()).is_retryable());
        assert!(!RemoteError::Unauthorized("bad key".into()).is_retryable());
        assert!(!RemoteError::NotFound {
            collection: "orders".into(),
            id: "o1".into()
        }
        .is_retryable());
    }
}
