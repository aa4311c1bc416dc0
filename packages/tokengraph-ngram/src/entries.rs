//! Loading of inverted entries for one content at one revision

use std::collections::HashMap;

use tokengraph_storage::{
    AnchorKey, Entity, EntityId, EntityKind, InvertedEntry, NgramId, Revision, VersionedStore,
};

use crate::error::{IndexError, Result};

/// Inverted entries of one content, keyed by n-gram
#[derive(Debug, Default)]
pub(crate) struct LoadedEntries {
    pub ids: HashMap<NgramId, EntityId>,
    pub entries: HashMap<NgramId, InvertedEntry>,
}

impl LoadedEntries {
    pub fn contains(&self, ngram: NgramId) -> bool {
        self.entries.contains_key(&ngram)
    }

    fn insert(&mut self, ngram: NgramId, id: EntityId, entry: InvertedEntry) {
        self.ids.insert(ngram, id);
        self.entries.insert(ngram, entry);
    }

    /// Split off the entries of the given n-grams
    pub fn take(&mut self, ngrams: impl IntoIterator<Item = NgramId>) -> HashMap<NgramId, InvertedEntry> {
        ngrams
            .into_iter()
            .filter_map(|ngram| self.entries.remove(&ngram).map(|entry| (ngram, entry)))
            .collect()
    }
}

pub(crate) struct EntryLoader<'a, S: ?Sized> {
    store: &'a S,
    content: EntityId,
    content_type: &'a str,
    at: Revision,
}

impl<'a, S: VersionedStore + ?Sized> EntryLoader<'a, S> {
    pub fn new(store: &'a S, content: EntityId, content_type: &'a str, at: Revision) -> Self {
        Self {
            store,
            content,
            content_type,
            at,
        }
    }

    /// Fetch the entry of an n-gram present in the new sequence, creating it
    /// at the reference revision if absent
    pub async fn open(&self, ngram: NgramId, loaded: &mut LoadedEntries) -> Result<()> {
        if loaded.contains(ngram) {
            return Ok(());
        }
        let key = AnchorKey::InvertedEntry {
            content: self.content,
            ngram,
        };
        let init = Entity::InvertedEntry(InvertedEntry::new(self.content, ngram, self.content_type));
        let (id, _) = self.store.get_or_create_anchored(&key, init).await?;
        let entry = self.read(id).await?;
        loaded.insert(ngram, id, entry);
        Ok(())
    }

    /// Fetch the entry of an n-gram that only the previous sequence holds
    ///
    /// Such an entry must already exist; its absence means the index is
    /// corrupted.
    pub async fn existing(&self, ngram: NgramId, order: usize, loaded: &mut LoadedEntries) -> Result<()> {
        if loaded.contains(ngram) {
            return Ok(());
        }
        let key = AnchorKey::InvertedEntry {
            content: self.content,
            ngram,
        };
        let id = self
            .store
            .lookup_anchored(&key)
            .await?
            .ok_or_else(|| IndexError::Consistency {
                content: self.content,
                order,
                revision: self.at,
                detail: format!("previous n-gram {} has no inverted entry", ngram),
            })?;
        let entry = self.read(id).await?;
        loaded.insert(ngram, id, entry);
        Ok(())
    }

    async fn read(&self, id: EntityId) -> Result<InvertedEntry> {
        match self.store.read(id, self.at).await? {
            Some(Entity::InvertedEntry(entry)) => Ok(entry),
            Some(other) => Err(IndexError::WrongEntityType {
                id,
                expected: EntityKind::InvertedEntry,
                found: other.kind(),
            }),
            None => Err(IndexError::Storage(
                tokengraph_storage::StorageError::entity_not_found(id),
            )),
        }
    }
}
