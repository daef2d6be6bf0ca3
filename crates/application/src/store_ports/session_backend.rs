use async_trait::async_trait;
use tessera_core::AppResult;
use tessera_domain::{EntityRow, EntitySchema, FieldDefinition, FieldValue};

use super::QueryPlan;

/// Write staged in a session until the next flush or commit.
#[derive(Debug, Clone)]
pub enum PendingWrite {
    /// Insert a new row; generated attributes left `Null` are filled by the store.
    Insert {
        /// Target entity.
        schema: &'static EntitySchema,
        /// Row values.
        row: EntityRow,
    },
    /// Assign new values to the row with the given primary key.
    Update {
        /// Target entity.
        schema: &'static EntitySchema,
        /// Primary key of the updated row.
        key: FieldValue,
        /// Changed attributes.
        assignments: Vec<(&'static FieldDefinition, FieldValue)>,
    },
    /// Remove the row with the given primary key.
    Delete {
        /// Target entity.
        schema: &'static EntitySchema,
        /// Primary key of the removed row.
        key: FieldValue,
    },
}

/// Store-side half of a unit of work.
///
/// Implementations begin their transaction lazily on first use and flush
/// staged writes before every read, so reads observe the session's own writes.
/// Commit and rollback end the current transaction; calling either without an
/// active transaction is a no-op.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Returns rows matching a plan.
    async fn fetch_rows(&self, plan: &QueryPlan) -> AppResult<Vec<EntityRow>>;

    /// Counts non-null values of `by_field` over rows matching a plan, ignoring its window.
    async fn count_rows(&self, plan: &QueryPlan, by_field: &FieldDefinition) -> AppResult<u64>;

    /// Stages a write.
    async fn stage(&self, write: PendingWrite) -> AppResult<()>;

    /// Executes every staged write without committing.
    async fn flush(&self) -> AppResult<()>;

    /// Inserts a row immediately and returns it with generated attributes filled.
    async fn insert_returning(
        &self,
        schema: &'static EntitySchema,
        row: EntityRow,
    ) -> AppResult<EntityRow>;

    /// Creates a named savepoint inside the current transaction.
    async fn savepoint(&self, name: &str) -> AppResult<()>;

    /// Releases a named savepoint, keeping its writes.
    async fn release_savepoint(&self, name: &str) -> AppResult<()>;

    /// Discards every write made after a named savepoint.
    async fn rollback_to_savepoint(&self, name: &str) -> AppResult<()>;

    /// Flushes staged writes and commits the current transaction.
    async fn commit(&self) -> AppResult<()>;

    /// Discards staged writes and rolls back the current transaction.
    async fn rollback(&self) -> AppResult<()>;
}

/// Opens one session backend per unit of work.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Opens a fresh session backend.
    async fn open_session(&self) -> AppResult<Box<dyn SessionBackend>>;
}
