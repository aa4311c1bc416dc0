//! Shared fixtures for the n-gram index integration tests

#![allow(dead_code)]

use std::sync::{Arc, Once};

use tokengraph_ngram::{IndexReader, IndexerConfig, NgramIndexer};
use tokengraph_storage::{Content, Entity, EntityId, NgramId, Revision, TokenId, VersionedStore};

pub const A: TokenId = TokenId(1);
pub const B: TokenId = TokenId(2);
pub const C: TokenId = TokenId(3);
pub const D: TokenId = TokenId(4);
pub const X: TokenId = TokenId(24);

static TRACING: Once = Once::new();

/// Install a test subscriber honouring `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Store, indexer and reader over one backend
pub struct Fixture<S: VersionedStore + ?Sized + 'static> {
    pub store: Arc<S>,
    pub indexer: NgramIndexer<S>,
    pub reader: IndexReader<S>,
}

impl<S: VersionedStore + ?Sized + 'static> Fixture<S> {
    pub fn new(store: Arc<S>, max_order: usize) -> Self {
        init_tracing();
        let config = IndexerConfig::default().max_order(max_order);
        Self {
            indexer: NgramIndexer::new(store.clone(), config).unwrap(),
            reader: IndexReader::new(store.clone()),
            store,
        }
    }

    /// Create a text content whose first version is at `rev`
    pub async fn content(&self, rev: i64, tokens: &[TokenId]) -> EntityId {
        self.store
            .create(Revision(rev), Entity::Content(Content::new("text", tokens.to_vec())))
            .await
            .unwrap()
    }

    /// Write a new version of a content at `rev`
    pub async fn revise(&self, content: EntityId, rev: i64, tokens: &[TokenId]) {
        self.store
            .write(
                content,
                Revision(rev),
                Entity::Content(Content::new("text", tokens.to_vec())),
            )
            .await
            .unwrap();
    }

    /// Identity of an n-gram that must already exist
    pub async fn ngram(&self, tokens: &[TokenId]) -> NgramId {
        self.reader
            .lookup_ngram(tokens)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("no n-gram for {:?}", tokens))
    }

    pub async fn positions(&self, content: EntityId, tokens: &[TokenId], rev: i64) -> Vec<u32> {
        let ngram = self.ngram(tokens).await;
        self.reader
            .positions_at(content, ngram, Revision(rev))
            .await
            .unwrap()
    }

    /// Order-`order` sequence as of `rev`, spelled as token tuples
    pub async fn spelled(&self, content: EntityId, order: usize, rev: i64) -> Vec<Vec<TokenId>> {
        let mut out = Vec::new();
        for ngram in self
            .reader
            .sequence_at(content, order, Revision(rev))
            .await
            .unwrap()
        {
            out.push(self.reader.ngram_tokens(ngram).await.unwrap().unwrap());
        }
        out
    }
}
