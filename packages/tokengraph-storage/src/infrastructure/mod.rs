//! Infrastructure layer - Storage adapters
//!
//! - `memory`: in-process version chains (tests, embedded use)
//! - `sqlite`: persistent SQLite adapter

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemoryVersionedStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteVersionedStore;
