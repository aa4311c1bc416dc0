//! In-Memory Versioned Store
//!
//! Version chains in `BTreeMap`s behind a single `RwLock`. Every trait
//! operation takes the lock once, so anchored creation and multi-entity
//! commits are atomic.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::domain::{AnchorKey, Entity, EntityId, EntityKind, Revision, StoreStats, VersionedStore};
use crate::{Result, StorageError};

/// Versions of a single entity
#[derive(Debug, Clone)]
struct VersionChain {
    kind: EntityKind,
    versions: BTreeMap<Revision, Entity>,
}

impl VersionChain {
    fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            versions: BTreeMap::new(),
        }
    }

    fn at(&self, at: Revision) -> Option<&Entity> {
        self.versions.range(..=at).next_back().map(|(_, e)| e)
    }
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    chains: HashMap<EntityId, VersionChain>,
    anchors: HashMap<String, EntityId>,
}

impl Inner {
    fn allocate(&mut self, kind: EntityKind) -> EntityId {
        self.next_id += 1;
        let id = EntityId(self.next_id);
        self.chains.insert(id, VersionChain::new(kind));
        id
    }

    fn chain(&self, id: EntityId) -> Result<&VersionChain> {
        self.chains
            .get(&id)
            .ok_or_else(|| StorageError::entity_not_found(id))
    }

    fn check_kind(&self, id: EntityId, entity: &Entity) -> Result<()> {
        let chain = self.chain(id)?;
        if chain.kind != entity.kind() {
            return Err(StorageError::kind_mismatch(id, chain.kind, entity.kind()));
        }
        Ok(())
    }

    fn put(&mut self, id: EntityId, at: Revision, entity: Entity) {
        if let Some(chain) = self.chains.get_mut(&id) {
            chain.versions.insert(at, entity);
        }
    }
}

/// HashMap-based [`VersionedStore`] for tests and embedded use
#[derive(Clone, Default)]
pub struct InMemoryVersionedStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryVersionedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VersionedStore for InMemoryVersionedStore {
    async fn create(&self, at: Revision, entity: Entity) -> Result<EntityId> {
        let mut inner = self.inner.write();
        let id = inner.allocate(entity.kind());
        inner.put(id, at, entity);
        Ok(id)
    }

    async fn get_or_create_anchored(
        &self,
        key: &AnchorKey,
        init: Entity,
    ) -> Result<(EntityId, bool)> {
        if init.kind() != key.entity_kind() {
            return Err(StorageError::kind_mismatch(
                key.storage_key(),
                key.entity_kind(),
                init.kind(),
            ));
        }

        let storage_key = key.storage_key();
        let mut inner = self.inner.write();
        if let Some(id) = inner.anchors.get(&storage_key) {
            return Ok((*id, false));
        }

        let id = inner.allocate(init.kind());
        inner.put(id, Revision::REFERENCE, init);
        inner.anchors.insert(storage_key, id);
        Ok((id, true))
    }

    async fn lookup_anchored(&self, key: &AnchorKey) -> Result<Option<EntityId>> {
        Ok(self.inner.read().anchors.get(&key.storage_key()).copied())
    }

    async fn timepoints(
        &self,
        id: EntityId,
        begin: Revision,
        end: Revision,
    ) -> Result<Vec<Revision>> {
        if begin >= end {
            return Ok(Vec::new());
        }
        let inner = self.inner.read();
        let chain = inner.chain(id)?;
        Ok(chain.versions.range(begin..end).map(|(rev, _)| *rev).collect())
    }

    async fn read(&self, id: EntityId, at: Revision) -> Result<Option<Entity>> {
        let inner = self.inner.read();
        Ok(inner.chain(id)?.at(at).cloned())
    }

    async fn write(&self, id: EntityId, at: Revision, entity: Entity) -> Result<()> {
        let mut inner = self.inner.write();
        inner.check_kind(id, &entity)?;
        inner.put(id, at, entity);
        Ok(())
    }

    async fn commit(&self, at: Revision, writes: Vec<(EntityId, Entity)>) -> Result<()> {
        let mut inner = self.inner.write();

        // Validate everything before touching any chain
        for (id, entity) in &writes {
            inner.check_kind(*id, entity)?;
        }

        let count = writes.len();
        for (id, entity) in writes {
            inner.put(id, at, entity);
        }
        tracing::trace!(revision = %at, writes = count, "committed versions");
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let inner = self.inner.read();
        Ok(StoreStats {
            total_entities: inner.chains.len(),
            total_versions: inner.chains.values().map(|c| c.versions.len()).sum(),
            total_anchors: inner.anchors.len(),
        })
    }
}
