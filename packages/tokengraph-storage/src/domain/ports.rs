//! Versioned Store Port (Trait Interface)
//!
//! Port/Adapter pattern for backend flexibility:
//! - Testing: InMemory (fast unit tests)
//! - Local: SQLite (zero-config persistence)

use async_trait::async_trait;

use super::models::{AnchorKey, Entity, EntityId, Revision};
use crate::Result;

/// Versioned entity store (primary interface)
///
/// Each entity is a chain of versions keyed by [`Revision`]. A version
/// written at `t` is what every read at `t' >= t` observes until a later
/// version exists, and is invisible to reads at `t' < t`.
///
/// # Core Operations
///
/// 1. **Creation**
///    - `create`: collaborator-owned entity with its first version at `at`
///    - `get_or_create_anchored`: atomic create-if-absent at [`Revision::REFERENCE`]
///    - `lookup_anchored`: resolve an anchor key without creating
///
/// 2. **Reads**
///    - `timepoints`: revisions at which the entity has a version
///    - `read`: entity state as of a revision
///
/// 3. **Writes**
///    - `write`: single version
///    - `commit`: several versions at one revision, all or nothing
#[async_trait]
pub trait VersionedStore: Send + Sync {
    // ═══════════════════════════════════════════════════════════════════════
    // Creation
    // ═══════════════════════════════════════════════════════════════════════

    /// Create an entity whose first version is written at `at`
    async fn create(&self, at: Revision, entity: Entity) -> Result<EntityId>;

    /// Return the entity anchored under `key`, creating it from `init` at
    /// [`Revision::REFERENCE`] if absent
    ///
    /// The boolean is `true` when this call created the entity. Concurrent
    /// callers racing on the same key all observe the same id.
    async fn get_or_create_anchored(&self, key: &AnchorKey, init: Entity)
        -> Result<(EntityId, bool)>;

    /// Resolve an anchor key without creating anything
    async fn lookup_anchored(&self, key: &AnchorKey) -> Result<Option<EntityId>>;

    // ═══════════════════════════════════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════════════════════════════════

    /// Revisions in `[begin, end)` at which `id` has a version, ascending
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` if `id` is unknown
    async fn timepoints(&self, id: EntityId, begin: Revision, end: Revision)
        -> Result<Vec<Revision>>;

    /// State of `id` as of `at`
    ///
    /// Returns `None` when the entity exists but has no version at or
    /// before `at`.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` if `id` is unknown
    async fn read(&self, id: EntityId, at: Revision) -> Result<Option<Entity>>;

    // ═══════════════════════════════════════════════════════════════════════
    // Writes
    // ═══════════════════════════════════════════════════════════════════════

    /// Write the version of `id` at `at`, replacing any version at exactly `at`
    ///
    /// # Errors
    ///
    /// - `EntityNotFound` if `id` is unknown
    /// - `KindMismatch` if `entity` is not the kind `id` was created with
    async fn write(&self, id: EntityId, at: Revision, entity: Entity) -> Result<()>;

    /// Write several versions at `at` atomically
    ///
    /// Either every write becomes visible or none does.
    async fn commit(&self, at: Revision, writes: Vec<(EntityId, Entity)>) -> Result<()>;

    // ═══════════════════════════════════════════════════════════════════════
    // Statistics
    // ═══════════════════════════════════════════════════════════════════════

    async fn stats(&self) -> Result<StoreStats>;
}

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Total number of entities
    pub total_entities: usize,

    /// Total number of versions over all entities
    pub total_versions: usize,

    /// Total number of anchor keys
    pub total_anchors: usize,
}
