//! Versioned Entity Store
//!
//! Storage collaborator of the n-gram indexer: every entity is a chain of
//! versions keyed by revision, and reads return the state as of a revision.
//!
//! ## Core Principles
//!
//! 1. **Point-in-time reads**: a version written at `t` is visible from `t` on
//! 2. **Anchored creation**: index entities are created once at
//!    `Revision::REFERENCE`, through an atomic create-if-absent key
//! 3. **Atomic commits**: all writes of one revision land together or not at all
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tokengraph_storage::{Content, Entity, InMemoryVersionedStore, Revision, TokenId, VersionedStore};
//!
//! let store = InMemoryVersionedStore::new();
//!
//! // 1. The tokenizer writes content revisions
//! let id = store.create(Revision(1), Entity::Content(Content::new("text", tokens))).await?;
//! store.write(id, Revision(2), Entity::Content(Content::new("text", edited))).await?;
//!
//! // 2. Readers see the state as of any revision
//! let first = store.read(id, Revision(1)).await?;
//! let timeline = store.timepoints(id, Revision::REFERENCE, Revision::END).await?;
//! ```

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::{ErrorKind, Result, StorageError};

pub use domain::{
    AnchorKey, Content, ContentIndex, Entity, EntityId, EntityKind, InvertedEntry, Ngram,
    NgramId, Revision, StoreStats, TokenId, VersionedStore,
};

pub use infrastructure::InMemoryVersionedStore;

#[cfg(feature = "sqlite")]
pub use infrastructure::SqliteVersionedStore;
