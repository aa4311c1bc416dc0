//! Indexing through an n-gram registry that lives outside the store

mod common;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use common::{init_tracing, A, B, C};
use dashmap::DashMap;
use pretty_assertions::assert_eq;
use tokengraph_ngram::{IndexAudit, IndexReader, IndexerConfig, NgramIndexer, NgramRegistry};
use tokengraph_storage::{
    Content, Entity, EntityId, InMemoryVersionedStore, NgramId, Revision, TokenId, VersionedStore,
};

/// Identities handed out from a private counter, unrelated to store ids
struct LocalRegistry {
    next: AtomicU64,
    ids: DashMap<Vec<TokenId>, NgramId>,
    tuples: DashMap<NgramId, Vec<TokenId>>,
}

impl LocalRegistry {
    fn new() -> Self {
        Self {
            next: AtomicU64::new(1_000),
            ids: DashMap::new(),
            tuples: DashMap::new(),
        }
    }
}

#[async_trait]
impl NgramRegistry for LocalRegistry {
    async fn get_or_create(&self, tokens: &[TokenId]) -> tokengraph_ngram::Result<NgramId> {
        let id = *self
            .ids
            .entry(tokens.to_vec())
            .or_insert_with(|| EntityId(self.next.fetch_add(1, Ordering::SeqCst)));
        self.tuples.insert(id, tokens.to_vec());
        Ok(id)
    }

    async fn lookup(&self, tokens: &[TokenId]) -> tokengraph_ngram::Result<Option<NgramId>> {
        Ok(self.ids.get(tokens).map(|id| *id))
    }

    async fn tokens(&self, ngram: NgramId) -> tokengraph_ngram::Result<Option<Vec<TokenId>>> {
        Ok(self.tuples.get(&ngram).map(|tokens| tokens.clone()))
    }
}

#[tokio::test]
async fn test_index_and_audit_through_local_registry() {
    init_tracing();
    let store = Arc::new(InMemoryVersionedStore::new());
    let registry: Arc<dyn NgramRegistry> = Arc::new(LocalRegistry::new());

    let content = store
        .create(Revision(1), Entity::Content(Content::new("text", vec![A, B, C])))
        .await
        .unwrap();
    store
        .write(content, Revision(2), Entity::Content(Content::new("text", vec![A, C, B, C])))
        .await
        .unwrap();

    let config = IndexerConfig::default().max_order(2);
    let indexer = NgramIndexer::with_registry(store.clone(), registry.clone(), config).unwrap();
    let report = indexer.index_content(content).await.unwrap();
    assert_eq!(report.revisions, vec![Revision(1), Revision(2)]);

    let audit = IndexAudit::with_registry(store.clone(), indexer.registry().clone());
    for rev in [1, 2] {
        let result = audit.verify(content, Revision(rev), 2).await.unwrap();
        assert!(result.is_clean(), "revision {rev}: {:?}", result.findings);
    }

    let reader = IndexReader::with_registry(store.clone(), registry);
    let bc = reader.lookup_ngram(&[B, C]).await.unwrap().unwrap();
    assert!(bc.0 >= 1_000);
    assert_eq!(reader.positions_at(content, bc, Revision(2)).await.unwrap(), vec![2]);

    let mut spelled = Vec::new();
    for ngram in reader.sequence_at(content, 1, Revision(2)).await.unwrap() {
        spelled.push(reader.ngram_tokens(ngram).await.unwrap().unwrap());
    }
    assert_eq!(spelled, vec![vec![A, C], vec![C, B], vec![B, C]]);

    // Nothing was anchored in the store for the tuples
    let store_reader = IndexReader::new(store);
    assert_eq!(store_reader.lookup_ngram(&[B, C]).await.unwrap(), None);
}
