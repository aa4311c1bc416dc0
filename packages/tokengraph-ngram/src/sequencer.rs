//! Revision Sequencer
//!
//! Drives indexing of a content: finds the revisions its index has not yet
//! processed and feeds them, oldest first, to the initial builder or to the
//! diff + reconcile update path.
//!
//! A revision is processed iff the content index has a version at that
//! revision. Every revision is committed in one store commit, so a failed
//! revision leaves no trace and the next run picks it up again.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use rayon::prelude::*;
use tokengraph_storage::{
    AnchorKey, Content, ContentIndex, Entity, EntityId, EntityKind, InvertedEntry, NgramId,
    Revision, VersionedStore,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::builder::{InitialIndexBuilder, RevisionOutcome};
use crate::config::IndexerConfig;
use crate::diff::EditStats;
use crate::entries::{EntryLoader, LoadedEntries};
use crate::error::{IndexError, Result};
use crate::materializer::{Materializer, NgramRegistry, StoreNgramRegistry};
use crate::reconciler::{reconcile, Reconciled};

/// Result of indexing one content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub content: EntityId,
    /// Content index entity
    pub index: EntityId,
    /// Whether this run created the first snapshot
    pub initial_build: bool,
    /// Revisions processed by this run, ascending
    pub revisions: Vec<Revision>,
    /// Edit operations summed over all revisions and orders
    pub stats: EditStats,
}

/// Diff + reconcile input of one order
struct OrderJob {
    order: usize,
    prev: Vec<NgramId>,
    new: Vec<NgramId>,
    entries: HashMap<NgramId, InvertedEntry>,
}

/// Incremental n-gram indexer over a versioned store
pub struct NgramIndexer<S: ?Sized> {
    config: IndexerConfig,
    store: Arc<S>,
    materializer: Materializer,
    locks: DashMap<EntityId, Arc<Mutex<()>>>,
}

impl<S: VersionedStore + ?Sized + 'static> NgramIndexer<S> {
    /// Indexer resolving n-gram identities through anchored store entities
    pub fn new(store: Arc<S>, config: IndexerConfig) -> Result<Self> {
        let registry = Arc::new(StoreNgramRegistry::new(store.clone()));
        Self::with_registry(store, registry, config)
    }

    /// Indexer with a caller-supplied n-gram identity collaborator
    pub fn with_registry(
        store: Arc<S>,
        registry: Arc<dyn NgramRegistry>,
        config: IndexerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            materializer: Materializer::new(registry),
            locks: DashMap::new(),
        })
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// N-gram identity collaborator; readers and audits of this index share it
    pub fn registry(&self) -> &Arc<dyn NgramRegistry> {
        self.materializer.registry()
    }

    /// Bring the index of one content up to date with its latest revision
    ///
    /// # Errors
    ///
    /// - `WrongEntityType` / `NoRevisions` for bad input; no index is created
    /// - `OutOfOrderRevision` when an unprocessed revision predates the
    ///   latest processed one
    /// - `Consistency` when the existing index is corrupted
    /// - `Storage` for collaborator failures, propagated unchanged
    pub async fn index_content(&self, content_id: EntityId) -> Result<IndexReport> {
        let lock = self.locks.entry(content_id).or_default().clone();
        let result = {
            let _guard = lock.lock().await;
            self.index_locked(content_id).await
        };

        // Last holder out drops the per-content lock
        drop(lock);
        self.locks.remove_if(&content_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn index_locked(&self, content_id: EntityId) -> Result<IndexReport> {
        let timeline = self.content_timeline(content_id).await?;
        let content_type = self.check_content(content_id, &timeline).await?;

        let index_id = self
            .store
            .lookup_anchored(&AnchorKey::ContentIndex {
                content: content_id,
            })
            .await?;
        let processed = match index_id {
            Some(id) => self.processed(id).await?,
            None => Vec::new(),
        };

        let done: BTreeSet<Revision> = processed.iter().copied().collect();
        let pending: Vec<Revision> = timeline
            .iter()
            .copied()
            .filter(|rev| !done.contains(rev))
            .collect();

        if let (Some(last), Some(first)) = (processed.last(), pending.first()) {
            if first < last {
                warn!(
                    "Content {}: revision {} predates last indexed revision {}",
                    content_id, first, last
                );
                return Err(IndexError::OutOfOrderRevision {
                    content: content_id,
                    revision: *first,
                    last_indexed: *last,
                });
            }
        }

        debug!(
            "Content {} ({}): {} revisions, {} processed, {} pending",
            content_id,
            content_type,
            timeline.len(),
            processed.len(),
            pending.len()
        );

        let mut index = index_id.filter(|_| !processed.is_empty());
        let mut initial_build = false;
        let mut revisions = Vec::with_capacity(pending.len());
        let mut stats = EditStats::default();

        for revision in pending {
            let content = self.read_content(content_id, revision).await?;

            let outcome = match index {
                None => {
                    initial_build = true;
                    InitialIndexBuilder::new(
                        self.store.as_ref(),
                        &self.materializer,
                        self.config.max_order,
                    )
                    .build(content_id, revision, &content)
                    .await?
                }
                Some(id) => self.update(content_id, id, revision, &content).await?,
            };

            info!(
                "Content {}: indexed revision {} (+{} -{} ={})",
                content_id,
                revision,
                outcome.stats.insertions,
                outcome.stats.deletions,
                outcome.stats.keeps
            );

            index = Some(outcome.index);
            revisions.push(revision);
            stats += outcome.stats;
        }

        let report = IndexReport {
            content: content_id,
            index: index
                .or(index_id)
                .ok_or(IndexError::NoRevisions(content_id))?,
            initial_build,
            revisions,
            stats,
        };

        info!(
            "Content {}: {} revisions indexed into index {}{}",
            content_id,
            report.revisions.len(),
            report.index,
            if report.initial_build { " (initial build)" } else { "" }
        );

        Ok(report)
    }

    /// Index many contents concurrently, one result per content
    ///
    /// Results arrive in completion order. A failing content does not
    /// affect the others.
    pub async fn index_contents(
        &self,
        contents: &[EntityId],
    ) -> Vec<(EntityId, Result<IndexReport>)> {
        let results: Vec<_> = stream::iter(contents.iter().copied())
            .map(|content| async move { (content, self.index_content(content).await) })
            .buffer_unordered(self.config.max_concurrent_contents)
            .collect()
            .await;

        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        if failed > 0 {
            warn!("{} of {} contents failed to index", failed, results.len());
        }
        results
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Input checks
    // ═══════════════════════════════════════════════════════════════════════

    async fn content_timeline(&self, content_id: EntityId) -> Result<Vec<Revision>> {
        let mut timeline = self
            .store
            .timepoints(content_id, Revision::REFERENCE, Revision::END)
            .await?;

        // The reference revision is reserved for anchored index entities
        if timeline.first().is_some_and(Revision::is_reference) {
            warn!(
                "Content {}: ignoring version at the reference revision",
                content_id
            );
            timeline.remove(0);
        }

        if timeline.is_empty() {
            warn!("Content {} has no revisions", content_id);
            return Err(IndexError::NoRevisions(content_id));
        }
        Ok(timeline)
    }

    async fn check_content(&self, content_id: EntityId, timeline: &[Revision]) -> Result<String> {
        let first = timeline
            .first()
            .copied()
            .ok_or(IndexError::NoRevisions(content_id))?;
        let content = self.read_content(content_id, first).await?;
        Ok(content.content_type)
    }

    async fn read_content(&self, content_id: EntityId, at: Revision) -> Result<Content> {
        match self.store.read(content_id, at).await? {
            Some(Entity::Content(content)) => Ok(content),
            Some(other) => {
                warn!("Entity {} is a {}, not a content", content_id, other.kind());
                Err(IndexError::WrongEntityType {
                    id: content_id,
                    expected: EntityKind::Content,
                    found: other.kind(),
                })
            }
            None => Err(IndexError::NoRevisions(content_id)),
        }
    }

    async fn processed(&self, index_id: EntityId) -> Result<Vec<Revision>> {
        let timeline = self
            .store
            .timepoints(index_id, Revision::REFERENCE, Revision::END)
            .await?;
        Ok(timeline.into_iter().filter(|rev| !rev.is_reference()).collect())
    }

    async fn read_index(&self, index_id: EntityId, at: Revision) -> Result<ContentIndex> {
        match self.store.read(index_id, at).await? {
            Some(Entity::ContentIndex(index)) => Ok(index),
            Some(other) => Err(IndexError::WrongEntityType {
                id: index_id,
                expected: EntityKind::ContentIndex,
                found: other.kind(),
            }),
            None => Err(IndexError::Storage(
                tokengraph_storage::StorageError::entity_not_found(index_id),
            )),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Update path
    // ═══════════════════════════════════════════════════════════════════════

    async fn update(
        &self,
        content_id: EntityId,
        index_id: EntityId,
        revision: Revision,
        content: &Content,
    ) -> Result<RevisionOutcome> {
        let mut index = self.read_index(index_id, revision).await?;
        let loader = EntryLoader::new(
            self.store.as_ref(),
            content_id,
            &content.content_type,
            revision,
        );
        let mut loaded = LoadedEntries::default();

        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        // Materialize and load every entry the scripts can touch
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        let mut jobs = Vec::with_capacity(self.config.max_order);
        for order in 1..=self.config.max_order {
            let new = self.materializer.materialize(&content.tokens, order).await?;
            let prev = index.sequence(order).to_vec();

            for ngram in &new {
                loader.open(*ngram, &mut loaded).await?;
            }
            for ngram in &prev {
                loader.existing(*ngram, order, &mut loaded).await?;
            }

            let mentioned: HashSet<NgramId> = prev.iter().chain(new.iter()).copied().collect();
            jobs.push(OrderJob {
                order,
                entries: loaded.take(mentioned),
                prev,
                new,
            });
        }

        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        // Diff + reconcile (orders touch disjoint n-grams)
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        let reconciled = self.reconcile_orders(content_id, revision, jobs).await?;

        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        // Commit the revision
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        let mut stats = EditStats::default();
        let mut entry_writes = Vec::new();
        for result in reconciled {
            debug!(
                "Content {} order {} at {}: {} keeps, {} insertions, {} deletions",
                content_id,
                result.order,
                revision,
                result.stats.keeps,
                result.stats.insertions,
                result.stats.deletions
            );
            stats += result.stats;
            index.set_sequence(result.order, result.sequence);

            for entry in result.entries {
                let id = loaded.ids.get(&entry.ngram).copied().ok_or_else(|| {
                    IndexError::Consistency {
                        content: content_id,
                        order: result.order,
                        revision,
                        detail: format!("reconciled n-gram {} has no entry id", entry.ngram),
                    }
                })?;
                entry_writes.push((id, Entity::InvertedEntry(entry)));
            }
        }

        let mut writes = Vec::with_capacity(entry_writes.len() + 1);
        writes.push((index_id, Entity::ContentIndex(index)));
        writes.extend(entry_writes);
        self.store.commit(revision, writes).await?;

        Ok(RevisionOutcome {
            index: index_id,
            revision,
            stats,
        })
    }

    async fn reconcile_orders(
        &self,
        content_id: EntityId,
        revision: Revision,
        jobs: Vec<OrderJob>,
    ) -> Result<Vec<Reconciled>> {
        let run = move |job: OrderJob| {
            reconcile(content_id, revision, job.order, job.prev, &job.new, job.entries)
        };

        if !self.config.parallel_orders || jobs.len() < 2 {
            return jobs.into_iter().map(run).collect();
        }

        tokio::task::spawn_blocking(move || {
            jobs.into_par_iter()
                .map(run)
                .collect::<Result<Vec<_>>>()
        })
        .await
        .map_err(IndexError::worker)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokengraph_storage::{InMemoryVersionedStore, TokenId};

    fn tokens(raw: &[u64]) -> Vec<TokenId> {
        raw.iter().copied().map(TokenId).collect()
    }

    fn indexer(
        store: &Arc<InMemoryVersionedStore>,
        parallel: bool,
    ) -> NgramIndexer<InMemoryVersionedStore> {
        let config = IndexerConfig::default()
            .max_order(2)
            .parallel_orders(parallel);
        NgramIndexer::new(store.clone(), config).unwrap()
    }

    async fn sequences(
        store: &InMemoryVersionedStore,
        index: EntityId,
        at: i64,
    ) -> Vec<Vec<NgramId>> {
        store
            .read(index, Revision(at))
            .await
            .unwrap()
            .and_then(Entity::into_content_index)
            .unwrap()
            .sequences
    }

    #[tokio::test]
    async fn test_initial_build_then_update() {
        let store = Arc::new(InMemoryVersionedStore::new());
        let id = store
            .create(Revision(1), Entity::Content(Content::new("text", tokens(&[1, 2, 3]))))
            .await
            .unwrap();
        store
            .write(id, Revision(2), Entity::Content(Content::new("text", tokens(&[1, 2, 4]))))
            .await
            .unwrap();

        let report = indexer(&store, false).index_content(id).await.unwrap();
        assert!(report.initial_build);
        assert_eq!(report.revisions, vec![Revision(1), Revision(2)]);
        // first build: 3 insertions; update: order 1 keep/del/ins, order 2 del/ins
        assert_eq!(
            report.stats,
            EditStats {
                keeps: 1,
                insertions: 3 + 2,
                deletions: 2
            }
        );

        let first = sequences(&store, report.index, 1).await;
        let second = sequences(&store, report.index, 2).await;
        assert_eq!(first[0][0], second[0][0]);
        assert_ne!(first[0][1], second[0][1]);
        assert_ne!(first[1], second[1]);
    }

    #[tokio::test]
    async fn test_rerun_is_a_noop() {
        let store = Arc::new(InMemoryVersionedStore::new());
        let id = store
            .create(Revision(1), Entity::Content(Content::new("text", tokens(&[1, 2, 3]))))
            .await
            .unwrap();

        let indexer = indexer(&store, true);
        let first = indexer.index_content(id).await.unwrap();
        let versions = store.stats().await.unwrap().total_versions;

        let second = indexer.index_content(id).await.unwrap();
        assert!(indexer.locks.is_empty());
        assert!(!second.initial_build);
        assert!(second.revisions.is_empty());
        assert_eq!(second.index, first.index);
        assert_eq!(store.stats().await.unwrap().total_versions, versions);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_parallel_and_serial_orders_agree() {
        let revisions: [&[u64]; 3] = [&[1, 2, 3, 1, 2], &[1, 2, 9, 3, 1, 2, 2], &[2, 2, 1]];

        let mut results = Vec::new();
        for parallel in [false, true] {
            let store = Arc::new(InMemoryVersionedStore::new());
            let id = store
                .create(Revision(1), Entity::Content(Content::new("text", tokens(revisions[0]))))
                .await
                .unwrap();
            for (rev, raw) in revisions.iter().enumerate().skip(1) {
                store
                    .write(
                        id,
                        Revision(rev as i64 + 1),
                        Entity::Content(Content::new("text", tokens(raw))),
                    )
                    .await
                    .unwrap();
            }
            let report = indexer(&store, parallel).index_content(id).await.unwrap();
            results.push((report.stats, sequences(&store, report.index, 3).await));
        }
        assert_eq!(results[0], results[1]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_content_locks_released_after_runs() {
        let store = Arc::new(InMemoryVersionedStore::new());
        let mut ids = Vec::new();
        for raw in [[1, 2, 3], [3, 2, 1], [2, 2, 2]] {
            ids.push(
                store
                    .create(Revision(1), Entity::Content(Content::new("text", tokens(&raw))))
                    .await
                    .unwrap(),
            );
        }

        let indexer = indexer(&store, true);
        let (first, second) = tokio::join!(
            indexer.index_contents(&ids),
            indexer.index_content(ids[0])
        );
        assert!(first.iter().all(|(_, result)| result.is_ok()));
        assert!(second.is_ok());
        assert!(indexer.locks.is_empty());

        let missing = indexer.index_content(EntityId(999)).await;
        assert!(missing.is_err());
        assert!(indexer.locks.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let store = Arc::new(InMemoryVersionedStore::new());
        let result = NgramIndexer::new(store, IndexerConfig::default().max_order(0));
        assert!(matches!(result, Err(IndexError::Config(_))));
    }
}
