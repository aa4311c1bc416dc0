//! Initial Index Builder
//!
//! Builds the first snapshot of a content's index: every order's sequence
//! is stored verbatim and each position is appended to its n-gram's
//! inverted entry. No diffing is involved.

use tokengraph_storage::{
    AnchorKey, Content, ContentIndex, Entity, EntityId, EntityKind, Revision, VersionedStore,
};
use tracing::debug;

use crate::diff::EditStats;
use crate::entries::{EntryLoader, LoadedEntries};
use crate::error::{IndexError, Result};
use crate::materializer::Materializer;

/// Outcome of one processed revision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevisionOutcome {
    pub index: EntityId,
    pub revision: Revision,
    pub stats: EditStats,
}

pub struct InitialIndexBuilder<'a, S: ?Sized> {
    store: &'a S,
    materializer: &'a Materializer,
    max_order: usize,
}

impl<'a, S: VersionedStore + ?Sized> InitialIndexBuilder<'a, S> {
    pub fn new(store: &'a S, materializer: &'a Materializer, max_order: usize) -> Self {
        Self {
            store,
            materializer,
            max_order,
        }
    }

    /// Build and commit the index of `content_id` at its first revision
    pub async fn build(
        &self,
        content_id: EntityId,
        revision: Revision,
        content: &Content,
    ) -> Result<RevisionOutcome> {
        let key = AnchorKey::ContentIndex {
            content: content_id,
        };
        let (index_id, created) = self
            .store
            .get_or_create_anchored(&key, Entity::ContentIndex(ContentIndex::new(content_id)))
            .await?;

        let mut index = match self.store.read(index_id, revision).await? {
            Some(Entity::ContentIndex(index)) => index,
            Some(other) => {
                return Err(IndexError::WrongEntityType {
                    id: index_id,
                    expected: EntityKind::ContentIndex,
                    found: other.kind(),
                })
            }
            None => ContentIndex::new(content_id),
        };

        let loader = EntryLoader::new(self.store, content_id, &content.content_type, revision);
        let mut loaded = LoadedEntries::default();
        let mut stats = EditStats::default();

        for order in 1..=self.max_order {
            let sequence = self.materializer.materialize(&content.tokens, order).await?;

            for (i, ngram) in sequence.iter().enumerate() {
                if !loaded.contains(*ngram) {
                    loader.open(*ngram, &mut loaded).await?;
                    let stale = loaded
                        .entries
                        .get(ngram)
                        .is_some_and(|entry| !entry.positions.is_empty());
                    if stale {
                        return Err(IndexError::Consistency {
                            content: content_id,
                            order,
                            revision,
                            detail: format!(
                                "n-gram {} already has positions before the first build",
                                ngram
                            ),
                        });
                    }
                }

                let position = u32::try_from(i).map_err(|_| IndexError::Consistency {
                    content: content_id,
                    order,
                    revision,
                    detail: format!("position {} exceeds u32", i),
                })?;
                if let Some(entry) = loaded.entries.get_mut(ngram) {
                    entry.add_position(position);
                }
            }

            debug!(
                "Content {} order {}: {} n-grams in first build",
                content_id,
                order,
                sequence.len()
            );
            stats.insertions += sequence.len();
            index.set_sequence(order, sequence);
        }

        let mut writes = Vec::with_capacity(loaded.entries.len() + 1);
        writes.push((index_id, Entity::ContentIndex(index)));
        let mut entries: Vec<_> = loaded.entries.into_values().collect();
        entries.sort_by_key(|entry| entry.ngram);
        for mut entry in entries {
            entry.positions.sort_unstable();
            if let Some(id) = loaded.ids.get(&entry.ngram) {
                writes.push((*id, Entity::InvertedEntry(entry)));
            }
        }

        self.store.commit(revision, writes).await?;

        debug!(
            "Content {}: index {} {} at revision {}",
            content_id,
            index_id,
            if created { "created" } else { "reused" },
            revision
        );

        Ok(RevisionOutcome {
            index: index_id,
            revision,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materializer::{NgramRegistry, StoreNgramRegistry};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tokengraph_storage::{InMemoryVersionedStore, TokenId};

    fn tokens(raw: &[u64]) -> Vec<TokenId> {
        raw.iter().copied().map(TokenId).collect()
    }

    async fn entry_positions(
        store: &InMemoryVersionedStore,
        content: EntityId,
        ngram: EntityId,
        at: Revision,
    ) -> Vec<u32> {
        let id = store
            .lookup_anchored(&AnchorKey::InvertedEntry { content, ngram })
            .await
            .unwrap()
            .unwrap();
        store
            .read(id, at)
            .await
            .unwrap()
            .and_then(Entity::into_inverted_entry)
            .unwrap()
            .positions
    }

    #[tokio::test]
    async fn test_first_build_records_positions() {
        let store = Arc::new(InMemoryVersionedStore::new());
        let materializer = Materializer::new(Arc::new(StoreNgramRegistry::new(store.clone())));
        let content = Content::new("text", tokens(&[1, 2, 1, 2]));
        let content_id = store
            .create(Revision(1), Entity::Content(content.clone()))
            .await
            .unwrap();

        let outcome = InitialIndexBuilder::new(store.as_ref(), &materializer, 2)
            .build(content_id, Revision(1), &content)
            .await
            .unwrap();

        // order 1: 12 21 12, order 2: 121 212
        assert_eq!(outcome.stats.insertions, 5);

        let index = store
            .read(outcome.index, Revision(1))
            .await
            .unwrap()
            .and_then(Entity::into_content_index)
            .unwrap();
        assert_eq!(index.sequence(1).len(), 3);
        assert_eq!(index.sequence(2).len(), 2);

        let repeated = index.sequence(1)[0];
        assert_eq!(
            entry_positions(&store, content_id, repeated, Revision(1)).await,
            vec![0, 2]
        );
        // Entries are empty before the build revision
        assert!(entry_positions(&store, content_id, repeated, Revision(0))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_stale_entry_is_rejected() {
        let store = Arc::new(InMemoryVersionedStore::new());
        let registry = Arc::new(StoreNgramRegistry::new(store.clone()));
        let materializer = Materializer::new(registry.clone());
        let content = Content::new("text", tokens(&[1, 2]));
        let content_id = store
            .create(Revision(1), Entity::Content(content.clone()))
            .await
            .unwrap();

        // Pre-seed the entry with a stray position
        let ngram = registry.get_or_create(&tokens(&[1, 2])).await.unwrap();
        let mut stray = tokengraph_storage::InvertedEntry::new(content_id, ngram, "text");
        stray.add_position(7);
        store
            .get_or_create_anchored(
                &AnchorKey::InvertedEntry {
                    content: content_id,
                    ngram,
                },
                Entity::InvertedEntry(stray),
            )
            .await
            .unwrap();

        let err = InitialIndexBuilder::new(store.as_ref(), &materializer, 1)
            .build(content_id, Revision(1), &content)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Consistency { order: 1, .. }));
    }
}
