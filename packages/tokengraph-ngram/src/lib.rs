//! TokenGraph N-gram Index
//!
//! Incrementally maintains, for tokenized content that changes revision
//! after revision, one n-gram sequence per order `1..=N` and a positional
//! inverted index from each n-gram to its offsets in that sequence.
//!
//! # Architecture
//!
//! ```text
//! NgramIndexer (sequencer)
//!   ├─ pending revisions = content timeline − index timeline
//!   ├─ first revision ──▶ InitialIndexBuilder
//!   └─ later revisions ─▶ edit_script (diff) ──▶ ReconcileContext (reconciler)
//!                 both use Materializer ──▶ NgramRegistry
//! ```
//!
//! Each revision is committed atomically through
//! [`VersionedStore::commit`](tokengraph_storage::VersionedStore::commit).
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tokengraph_ngram::{IndexReader, IndexerConfig, NgramIndexer};
//! use tokengraph_storage::{Content, Entity, InMemoryVersionedStore, Revision, TokenId, VersionedStore};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let store = Arc::new(InMemoryVersionedStore::new());
//! let tokens = vec![TokenId(1), TokenId(2), TokenId(3)];
//! let content = store
//!     .create(Revision(1), Entity::Content(Content::new("text", tokens)))
//!     .await
//!     .unwrap();
//!
//! let indexer = NgramIndexer::new(store.clone(), IndexerConfig::default().max_order(2)).unwrap();
//! let report = indexer.index_content(content).await.unwrap();
//! assert!(report.initial_build);
//!
//! let reader = IndexReader::new(store);
//! assert_eq!(reader.sequence_at(content, 1, Revision(1)).await.unwrap().len(), 2);
//! # });
//! ```

pub mod audit;
pub mod builder;
pub mod config;
pub mod diff;
mod entries;
pub mod error;
pub mod materializer;
pub mod reader;
pub mod reconciler;
pub mod sequencer;

pub use audit::{AuditFinding, AuditReport, IndexAudit};
pub use builder::{InitialIndexBuilder, RevisionOutcome};
pub use config::{ConfigError, IndexerConfig};
pub use diff::{edit_script, EditKind, EditOp, EditScript, EditStats};
pub use error::{ErrorCategory, IndexError, Result};
pub use materializer::{Materializer, NgramRegistry, NgramWindows, StoreNgramRegistry};
pub use reader::IndexReader;
pub use reconciler::{reconcile, ReconcileContext, Reconciled};
pub use sequencer::{IndexReport, NgramIndexer};
