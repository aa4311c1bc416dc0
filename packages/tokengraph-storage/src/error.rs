//! Versioned store errors
//!
//! Every adapter reports failures as a [`StorageError`]: a coarse
//! [`ErrorKind`] callers can branch on, a message, and the underlying
//! driver error when there is one.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Backend failure (SQLite, lock, schema)
    Database,
    /// Entity payload could not be encoded or decoded
    Serialization,
    /// No entity with the requested id
    EntityNotFound,
    /// Write or anchored init of a kind other than the entity's own
    KindMismatch,
    /// Atomic commit rejected or rolled back
    Transaction,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Database => "database",
            ErrorKind::Serialization => "serialization",
            ErrorKind::EntityNotFound => "entity_not_found",
            ErrorKind::KindMismatch => "kind_mismatch",
            ErrorKind::Transaction => "transaction",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct StorageError {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StorageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the driver error this one wraps
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Serialization, message)
    }

    pub fn transaction(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transaction, message)
    }

    pub fn entity_not_found(id: impl fmt::Display) -> Self {
        Self::new(ErrorKind::EntityNotFound, format!("no entity with id {}", id))
    }

    /// `target` holds `expected` entities; `found` was offered instead
    pub fn kind_mismatch(
        target: impl fmt::Display,
        expected: impl fmt::Display,
        found: impl fmt::Display,
    ) -> Self {
        Self::new(
            ErrorKind::KindMismatch,
            format!("{} holds {} entities, got {}", target, expected, found),
        )
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::EntityNotFound
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::database(err.to_string()).with_source(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::serialization(format!("entity payload: {}", err)).with_source(err)
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_display_carries_kind_tag() {
        let err = StorageError::entity_not_found(42);
        assert_eq!(err.to_string(), "[entity_not_found] no entity with id 42");
        assert!(err.is_not_found());
        assert!(err.source().is_none());
    }

    #[test]
    fn test_kind_mismatch_message() {
        let err = StorageError::kind_mismatch("index:3", "content_index", "ngram");
        assert_eq!(err.kind, ErrorKind::KindMismatch);
        assert_eq!(
            err.message,
            "index:3 holds content_index entities, got ngram"
        );
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_payload_error_keeps_source() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: StorageError = json_err.into();

        assert_eq!(err.kind, ErrorKind::Serialization);
        assert!(err.message.starts_with("entity payload:"));
        assert!(err.source().is_some());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_error_is_database_kind() {
        let err: StorageError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.kind, ErrorKind::Database);
        assert!(err.source().is_some());
    }
}
