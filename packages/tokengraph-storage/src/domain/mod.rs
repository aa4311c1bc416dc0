//! Domain layer for the versioned entity store
//!
//! # Domain Models
//!
//! - `Content`: tokenized content, owned by the tokenization collaborator
//! - `ContentIndex`: per-content n-gram sequences, one per order
//! - `Ngram`: deduplicated identity of a token tuple
//! - `InvertedEntry`: positions of one n-gram within one content
//!
//! # Port Trait
//!
//! - `VersionedStore`: entity state as of a revision, anchored
//!   create-if-absent, atomic multi-entity commits
//!
//! # Examples
//!
//! ```rust,ignore
//! use tokengraph_storage::domain::{Content, Entity, Revision, TokenId, VersionedStore};
//!
//! async fn example(store: impl VersionedStore) -> Result<()> {
//!     let content = Content::new("text", vec![TokenId(1), TokenId(2)]);
//!     let id = store.create(Revision(1), Entity::Content(content)).await?;
//!
//!     // Nothing is visible before the first version
//!     assert!(store.read(id, Revision(0)).await?.is_none());
//!     Ok(())
//! }
//! ```

pub mod models;
pub mod ports;

pub use models::{
    AnchorKey, Content, ContentIndex, Entity, EntityId, EntityKind, InvertedEntry, Ngram,
    NgramId, Revision, TokenId,
};
pub use ports::{StoreStats, VersionedStore};
