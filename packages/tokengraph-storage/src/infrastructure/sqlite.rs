//! SQLite Versioned Store
//!
//! File-based persistent storage using SQLite.
//! Entity states are stored as tagged JSON, one row per (entity, revision).
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;

use crate::domain::{AnchorKey, Entity, EntityId, EntityKind, Revision, StoreStats, VersionedStore};
use crate::{Result, StorageError};

/// SQLite-based [`VersionedStore`] implementation
#[derive(Clone)]
pub struct SqliteVersionedStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVersionedStore {
    /// Create a new SQLite store at the given path
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS entities (
                entity_id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS versions (
                entity_id INTEGER NOT NULL,
                revision INTEGER NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (entity_id, revision),
                FOREIGN KEY (entity_id) REFERENCES entities(entity_id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS anchors (
                anchor_key TEXT PRIMARY KEY,
                entity_id INTEGER NOT NULL,
                FOREIGN KEY (entity_id) REFERENCES entities(entity_id)
            )",
            [],
        )?;

        tracing::debug!("sqlite versioned store schema ready");
        Ok(())
    }
}

fn to_sql_id(id: EntityId) -> Result<i64> {
    i64::try_from(id.0)
        .map_err(|_| StorageError::database(format!("Entity id out of range: {}", id)))
}

fn from_sql_id(raw: i64) -> Result<EntityId> {
    u64::try_from(raw)
        .map(EntityId)
        .map_err(|_| StorageError::database(format!("Negative entity id in database: {}", raw)))
}

fn entity_kind(conn: &Connection, id: EntityId) -> Result<EntityKind> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT kind FROM entities WHERE entity_id = ?1",
            params![to_sql_id(id)?],
            |row| row.get(0),
        )
        .optional()?;
    let raw = raw.ok_or_else(|| StorageError::entity_not_found(id))?;
    EntityKind::parse(&raw)
        .ok_or_else(|| StorageError::serialization(format!("Unknown entity kind: {}", raw)))
}

fn check_kind(conn: &Connection, id: EntityId, entity: &Entity) -> Result<()> {
    let kind = entity_kind(conn, id)?;
    if kind != entity.kind() {
        return Err(StorageError::kind_mismatch(id, kind, entity.kind()));
    }
    Ok(())
}

fn insert_entity(conn: &Connection, kind: EntityKind) -> Result<EntityId> {
    conn.execute(
        "INSERT INTO entities (kind) VALUES (?1)",
        params![kind.as_str()],
    )?;
    from_sql_id(conn.last_insert_rowid())
}

fn put_version(conn: &Connection, id: EntityId, at: Revision, entity: &Entity) -> Result<()> {
    let payload = serde_json::to_string(entity)?;
    conn.execute(
        "INSERT OR REPLACE INTO versions (entity_id, revision, payload) VALUES (?1, ?2, ?3)",
        params![to_sql_id(id)?, at.0, payload],
    )?;
    Ok(())
}

#[async_trait]
impl VersionedStore for SqliteVersionedStore {
    async fn create(&self, at: Revision, entity: Entity) -> Result<EntityId> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let id = insert_entity(&tx, entity.kind())?;
        put_version(&tx, id, at, &entity)?;
        tx.commit()?;
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
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT entity_id FROM anchors WHERE anchor_key = ?1",
                params![&storage_key],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(raw) = existing {
            return Ok((from_sql_id(raw)?, false));
        }

        let id = insert_entity(&tx, init.kind())?;
        put_version(&tx, id, Revision::REFERENCE, &init)?;
        tx.execute(
            "INSERT INTO anchors (anchor_key, entity_id) VALUES (?1, ?2)",
            params![&storage_key, to_sql_id(id)?],
        )?;
        tx.commit()?;
        Ok((id, true))
    }

    async fn lookup_anchored(&self, key: &AnchorKey) -> Result<Option<EntityId>> {
        let conn = self.conn.lock();
        let raw: Option<i64> = conn
            .query_row(
                "SELECT entity_id FROM anchors WHERE anchor_key = ?1",
                params![key.storage_key()],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(from_sql_id).transpose()
    }

    async fn timepoints(
        &self,
        id: EntityId,
        begin: Revision,
        end: Revision,
    ) -> Result<Vec<Revision>> {
        let conn = self.conn.lock();
        entity_kind(&conn, id)?;

        let mut stmt = conn.prepare(
            "SELECT revision FROM versions
             WHERE entity_id = ?1 AND revision >= ?2 AND revision < ?3
             ORDER BY revision ASC",
        )?;
        let revisions = stmt
            .query_map(params![to_sql_id(id)?, begin.0, end.0], |row| {
                row.get::<_, i64>(0).map(Revision)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(revisions)
    }

    async fn read(&self, id: EntityId, at: Revision) -> Result<Option<Entity>> {
        let conn = self.conn.lock();
        entity_kind(&conn, id)?;

        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM versions
                 WHERE entity_id = ?1 AND revision <= ?2
                 ORDER BY revision DESC LIMIT 1",
                params![to_sql_id(id)?, at.0],
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn write(&self, id: EntityId, at: Revision, entity: Entity) -> Result<()> {
        let conn = self.conn.lock();
        check_kind(&conn, id, &entity)?;
        put_version(&conn, id, at, &entity)
    }

    async fn commit(&self, at: Revision, writes: Vec<(EntityId, Entity)>) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        for (id, entity) in &writes {
            check_kind(&tx, *id, entity)?;
            put_version(&tx, *id, at, entity)?;
        }

        // Dropping an uncommitted transaction rolls it back, so any error
        // above leaves no partial revision behind.
        tx.commit()
            .map_err(|e| StorageError::transaction(format!("Commit failed: {}", e)).with_source(e))?;
        tracing::trace!(revision = %at, writes = writes.len(), "committed versions");
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock();
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(usize::try_from(n).unwrap_or(0))
        };

        Ok(StoreStats {
            total_entities: count("SELECT COUNT(*) FROM entities")?,
            total_versions: count("SELECT COUNT(*) FROM versions")?,
            total_anchors: count("SELECT COUNT(*) FROM anchors")?,
        })
    }
}
