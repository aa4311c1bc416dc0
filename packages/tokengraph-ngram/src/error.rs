use thiserror::Error;
use tokengraph_storage::{EntityId, EntityKind, Revision, StorageError};

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Entity {id} is a {found}, expected a {expected}")]
    WrongEntityType {
        id: EntityId,
        expected: EntityKind,
        found: EntityKind,
    },

    #[error("Content {0} has no revisions")]
    NoRevisions(EntityId),

    #[error("Revision {revision} of content {content} precedes last indexed revision {last_indexed}")]
    OutOfOrderRevision {
        content: EntityId,
        revision: Revision,
        last_indexed: Revision,
    },

    #[error("Index corruption in content {content}, order {order}, revision {revision}: {detail}")]
    Consistency {
        content: EntityId,
        order: usize,
        revision: Revision,
        detail: String,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Worker failed: {0}")]
    Worker(String),
}

impl IndexError {
    pub fn worker<E: std::fmt::Display>(e: E) -> Self {
        Self::Worker(e.to_string())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            IndexError::WrongEntityType { .. }
            | IndexError::NoRevisions(_)
            | IndexError::OutOfOrderRevision { .. }
            | IndexError::Config(_) => ErrorCategory::Input,
            IndexError::Consistency { .. } => ErrorCategory::Consistency,
            IndexError::Storage(_) | IndexError::Worker(_) => ErrorCategory::Collaborator,
        }
    }
}

/// Error category for callers deciding what to do with a failed content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input - reported, no index created or advanced
    Input,
    /// Index invariants already violated - never repaired silently
    Consistency,
    /// Storage or worker failure - propagated unchanged, retry is up to the caller
    Collaborator,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Input => "input",
            ErrorCategory::Consistency => "consistency",
            ErrorCategory::Collaborator => "collaborator",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
