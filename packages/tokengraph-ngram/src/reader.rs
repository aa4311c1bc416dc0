//! Point-in-time reads of a content's n-gram index

use std::sync::Arc;

use tokengraph_storage::{
    AnchorKey, ContentIndex, Entity, EntityId, EntityKind, NgramId, Revision, TokenId,
    VersionedStore,
};

use crate::error::{IndexError, Result};
use crate::materializer::{NgramRegistry, StoreNgramRegistry};

pub struct IndexReader<S: ?Sized> {
    store: Arc<S>,
    registry: Arc<dyn NgramRegistry>,
}

impl<S: VersionedStore + ?Sized + 'static> IndexReader<S> {
    /// Reader resolving n-gram identities through anchored store entities
    pub fn new(store: Arc<S>) -> Self {
        let registry = Arc::new(StoreNgramRegistry::new(store.clone()));
        Self::with_registry(store, registry)
    }

    /// Reader over an index built with a caller-supplied registry
    pub fn with_registry(store: Arc<S>, registry: Arc<dyn NgramRegistry>) -> Self {
        Self { store, registry }
    }

    /// Content index entity of `content`, if one was ever created
    pub async fn index_id(&self, content: EntityId) -> Result<Option<EntityId>> {
        Ok(self
            .store
            .lookup_anchored(&AnchorKey::ContentIndex { content })
            .await?)
    }

    /// Revisions of `content` already reflected in its index, ascending
    pub async fn processed_revisions(&self, content: EntityId) -> Result<Vec<Revision>> {
        let Some(index) = self.index_id(content).await? else {
            return Ok(Vec::new());
        };
        let timeline = self
            .store
            .timepoints(index, Revision::REFERENCE, Revision::END)
            .await?;
        Ok(timeline.into_iter().filter(|rev| !rev.is_reference()).collect())
    }

    /// Whole content index as of `at`
    pub async fn index_at(&self, content: EntityId, at: Revision) -> Result<ContentIndex> {
        let Some(id) = self.index_id(content).await? else {
            return Ok(ContentIndex::new(content));
        };
        match self.store.read(id, at).await? {
            Some(Entity::ContentIndex(index)) => Ok(index),
            Some(other) => Err(IndexError::WrongEntityType {
                id,
                expected: EntityKind::ContentIndex,
                found: other.kind(),
            }),
            None => Ok(ContentIndex::new(content)),
        }
    }

    /// Order-`order` n-gram sequence as of `at`
    ///
    /// Empty when the content has no index, the order was never built, or
    /// `at` predates the first processed revision.
    pub async fn sequence_at(
        &self,
        content: EntityId,
        order: usize,
        at: Revision,
    ) -> Result<Vec<NgramId>> {
        Ok(self.index_at(content, at).await?.sequence(order).to_vec())
    }

    /// Sorted positions of `ngram` within `content` as of `at`
    pub async fn positions_at(
        &self,
        content: EntityId,
        ngram: NgramId,
        at: Revision,
    ) -> Result<Vec<u32>> {
        let key = AnchorKey::InvertedEntry { content, ngram };
        let Some(id) = self.store.lookup_anchored(&key).await? else {
            return Ok(Vec::new());
        };
        match self.store.read(id, at).await? {
            Some(Entity::InvertedEntry(entry)) => Ok(entry.sorted_positions()),
            Some(other) => Err(IndexError::WrongEntityType {
                id,
                expected: EntityKind::InvertedEntry,
                found: other.kind(),
            }),
            None => Ok(Vec::new()),
        }
    }

    /// Token tuple behind an n-gram identity
    pub async fn ngram_tokens(&self, ngram: NgramId) -> Result<Option<Vec<TokenId>>> {
        self.registry.tokens(ngram).await
    }

    /// Resolve a token tuple to its n-gram identity without creating one
    pub async fn lookup_ngram(&self, tokens: &[TokenId]) -> Result<Option<NgramId>> {
        self.registry.lookup(tokens).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokengraph_storage::InMemoryVersionedStore;

    #[tokio::test]
    async fn test_unindexed_content_reads_empty() {
        let store = Arc::new(InMemoryVersionedStore::new());
        let reader = IndexReader::new(store);

        assert_eq!(reader.index_id(EntityId(1)).await.unwrap(), None);
        assert!(reader.processed_revisions(EntityId(1)).await.unwrap().is_empty());
        assert!(reader
            .sequence_at(EntityId(1), 1, Revision(5))
            .await
            .unwrap()
            .is_empty());
        assert!(reader
            .positions_at(EntityId(1), EntityId(2), Revision(5))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(reader.lookup_ngram(&[TokenId(1), TokenId(2)]).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ngram_tokens_rejects_other_kinds() {
        let store = Arc::new(InMemoryVersionedStore::new());
        let (index, _) = store
            .get_or_create_anchored(
                &AnchorKey::ContentIndex {
                    content: EntityId(9),
                },
                Entity::ContentIndex(ContentIndex::new(EntityId(9))),
            )
            .await
            .unwrap();

        let err = IndexReader::new(store).ngram_tokens(index).await.unwrap_err();
        assert!(matches!(
            err,
            IndexError::WrongEntityType {
                expected: EntityKind::Ngram,
                ..
            }
        ));
    }
}
