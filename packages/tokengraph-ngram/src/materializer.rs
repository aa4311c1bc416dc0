//! N-gram Materializer
//!
//! Slices a token sequence into windows of `order + 1` tokens and resolves
//! each window to a deduplicated n-gram identity.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokengraph_storage::{
    AnchorKey, Entity, EntityKind, Ngram, NgramId, Revision, TokenId, VersionedStore,
};

use crate::error::{IndexError, Result};

/// N-gram identity collaborator
///
/// Identical token tuples always map to the same identity, regardless of
/// which content or revision saw them first.
#[async_trait]
pub trait NgramRegistry: Send + Sync {
    async fn get_or_create(&self, tokens: &[TokenId]) -> Result<NgramId>;

    /// Identity of `tokens` if one was ever created; never creates
    async fn lookup(&self, tokens: &[TokenId]) -> Result<Option<NgramId>>;

    /// Token tuple behind an identity
    async fn tokens(&self, ngram: NgramId) -> Result<Option<Vec<TokenId>>>;
}

/// [`NgramRegistry`] backed by anchored n-gram entities in a versioned store
///
/// Resolved identities are cached; a cache miss costs one atomic
/// create-if-absent round trip to the store. The cache keeps one entry per
/// distinct tuple for the life of the registry and is never evicted.
pub struct StoreNgramRegistry<S: ?Sized> {
    store: Arc<S>,
    cache: DashMap<Vec<TokenId>, NgramId>,
}

impl<S: VersionedStore + ?Sized> StoreNgramRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
        }
    }

    /// Number of cached identities
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl<S: VersionedStore + ?Sized> NgramRegistry for StoreNgramRegistry<S> {
    async fn get_or_create(&self, tokens: &[TokenId]) -> Result<NgramId> {
        if let Some(id) = self.cache.get(tokens) {
            return Ok(*id);
        }

        let key = AnchorKey::Ngram {
            tokens: tokens.to_vec(),
        };
        let init = Entity::Ngram(Ngram {
            tokens: tokens.to_vec(),
        });
        let (id, _) = self.store.get_or_create_anchored(&key, init).await?;
        self.cache.insert(tokens.to_vec(), id);
        Ok(id)
    }

    async fn lookup(&self, tokens: &[TokenId]) -> Result<Option<NgramId>> {
        if let Some(id) = self.cache.get(tokens) {
            return Ok(Some(*id));
        }

        let key = AnchorKey::Ngram {
            tokens: tokens.to_vec(),
        };
        let found = self.store.lookup_anchored(&key).await?;
        if let Some(id) = found {
            self.cache.insert(tokens.to_vec(), id);
        }
        Ok(found)
    }

    async fn tokens(&self, ngram: NgramId) -> Result<Option<Vec<TokenId>>> {
        match self.store.read(ngram, Revision::REFERENCE).await? {
            Some(Entity::Ngram(ngram)) => Ok(Some(ngram.tokens)),
            Some(other) => Err(IndexError::WrongEntityType {
                id: ngram,
                expected: EntityKind::Ngram,
                found: other.kind(),
            }),
            None => Ok(None),
        }
    }
}

/// Lazy windows of `order + 1` consecutive tokens, stepping by one
///
/// Yields `len(tokens) - order` windows, none when `len(tokens) <= order`
/// (including `order == usize::MAX`).
///
/// ```rust
/// use tokengraph_ngram::materializer::NgramWindows;
/// use tokengraph_storage::TokenId;
///
/// let tokens: Vec<TokenId> = (1..=4).map(TokenId).collect();
/// let windows: Vec<_> = NgramWindows::new(&tokens, 2).collect();
/// assert_eq!(windows.len(), 2);
/// assert_eq!(windows[0], &tokens[0..3]);
/// ```
pub struct NgramWindows<'a> {
    inner: std::slice::Windows<'a, TokenId>,
}

impl<'a> NgramWindows<'a> {
    pub fn new(tokens: &'a [TokenId], order: usize) -> Self {
        Self {
            inner: tokens.windows(order.saturating_add(1)),
        }
    }
}

impl<'a> Iterator for NgramWindows<'a> {
    type Item = &'a [TokenId];

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for NgramWindows<'_> {}

/// Produces the ordered n-gram sequence of a token sequence for one order
#[derive(Clone)]
pub struct Materializer {
    registry: Arc<dyn NgramRegistry>,
}

impl Materializer {
    pub fn new(registry: Arc<dyn NgramRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<dyn NgramRegistry> {
        &self.registry
    }

    /// Resolve every window of the given order, in token order
    pub async fn materialize(&self, tokens: &[TokenId], order: usize) -> Result<Vec<NgramId>> {
        let windows = NgramWindows::new(tokens, order);
        let mut sequence = Vec::with_capacity(windows.len());
        for window in windows {
            sequence.push(self.registry.get_or_create(window).await?);
        }
        Ok(sequence)
    }
}
