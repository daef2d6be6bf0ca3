use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tessera_application::{PendingWrite, QueryPlan, SessionBackend, SessionFactory};
use tessera_core::{AppError, AppResult};
use tessera_domain::{EntityRow, EntitySchema, FieldDefinition};
use tokio::sync::Mutex;
use tracing::debug;

mod decode;
mod render;

use decode::decode_row;
use render::{
    quote_identifier, render_count, render_delete, render_insert, render_select, render_update,
};

/// PostgreSQL-backed session factory.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionFactory for PostgresStore {
    async fn open_session(&self) -> AppResult<Box<dyn SessionBackend>> {
        Ok(Box::new(PostgresSession::new(self.pool.clone())))
    }
}

#[derive(Default)]
struct SessionState {
    transaction: Option<Transaction<'static, Postgres>>,
    pending: Vec<PendingWrite>,
}

/// Unit of work over one lazily begun PostgreSQL transaction.
///
/// Dropping the session rolls back an uncommitted transaction.
pub struct PostgresSession {
    pool: PgPool,
    state: Mutex<SessionState>,
}

impl PostgresSession {
    /// Creates a session that begins its transaction on first use.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            state: Mutex::new(SessionState::default()),
        }
    }
}

async fn active_transaction<'a>(
    pool: &PgPool,
    slot: &'a mut Option<Transaction<'static, Postgres>>,
) -> AppResult<&'a mut Transaction<'static, Postgres>> {
    if slot.is_none() {
        let transaction = pool
            .begin()
            .await
            .map_err(|error| store_error("failed to begin transaction", error))?;
        debug!("postgres transaction started");
        *slot = Some(transaction);
    }

    slot.as_mut()
        .ok_or_else(|| AppError::Internal("postgres transaction was not started".to_owned()))
}

async fn flush_pending(pool: &PgPool, state: &mut SessionState) -> AppResult<()> {
    if state.pending.is_empty() {
        return Ok(());
    }

    let pending = std::mem::take(&mut state.pending);
    let transaction = active_transaction(pool, &mut state.transaction).await?;

    for write in pending {
        let (mut builder, context) = match &write {
            PendingWrite::Insert { schema, row } => (
                render_insert(schema, row, false)?,
                format!("failed to insert into '{}'", schema.table()),
            ),
            PendingWrite::Update {
                schema,
                key,
                assignments,
            } => (
                render_update(schema, key, assignments)?,
                format!("failed to update '{}' row {key}", schema.table()),
            ),
            PendingWrite::Delete { schema, key } => (
                render_delete(schema, key)?,
                format!("failed to delete '{}' row {key}", schema.table()),
            ),
        };

        builder
            .build()
            .execute(&mut **transaction)
            .await
            .map_err(|error| store_error(&context, error))?;
    }

    Ok(())
}

async fn execute_statement(
    pool: &PgPool,
    state: &mut SessionState,
    statement: String,
    context: &str,
) -> AppResult<()> {
    let transaction = active_transaction(pool, &mut state.transaction).await?;
    sqlx::query(statement.as_str())
        .execute(&mut **transaction)
        .await
        .map_err(|error| store_error(context, error))?;
    Ok(())
}

/// Maps a sqlx failure to the application error taxonomy.
pub(crate) fn store_error(context: &str, error: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::Conflict(format!("{context}: {}", database_error.message()));
    }

    AppError::Store(format!("{context}: {error}"))
}

#[async_trait]
impl SessionBackend for PostgresSession {
    async fn fetch_rows(&self, plan: &QueryPlan) -> AppResult<Vec<EntityRow>> {
        let mut state = self.state.lock().await;
        flush_pending(&self.pool, &mut state).await?;
        let transaction = active_transaction(&self.pool, &mut state.transaction).await?;

        let mut builder = render_select(plan)?;
        let rows = builder
            .build()
            .fetch_all(&mut **transaction)
            .await
            .map_err(|error| {
                store_error(
                    &format!("failed to query '{}'", plan.entity.table()),
                    error,
                )
            })?;

        rows.iter().map(|row| decode_row(plan.entity, row)).collect()
    }

    async fn count_rows(&self, plan: &QueryPlan, by_field: &FieldDefinition) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        flush_pending(&self.pool, &mut state).await?;
        let transaction = active_transaction(&self.pool, &mut state.transaction).await?;

        let mut builder = render_count(plan, by_field)?;
        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&mut **transaction)
            .await
            .map_err(|error| {
                store_error(
                    &format!("failed to count '{}'", plan.entity.table()),
                    error,
                )
            })?;

        u64::try_from(count)
            .map_err(|error| AppError::Internal(format!("negative row count {count}: {error}")))
    }

    async fn stage(&self, write: PendingWrite) -> AppResult<()> {
        self.state.lock().await.pending.push(write);
        Ok(())
    }

    async fn flush(&self) -> AppResult<()> {
        let mut state = self.state.lock().await;
        flush_pending(&self.pool, &mut state).await
    }

    async fn insert_returning(
        &self,
        schema: &'static EntitySchema,
        row: EntityRow,
    ) -> AppResult<EntityRow> {
        let mut state = self.state.lock().await;
        flush_pending(&self.pool, &mut state).await?;
        let transaction = active_transaction(&self.pool, &mut state.transaction).await?;

        let mut builder = render_insert(schema, &row, true)?;
        let stored = builder
            .build()
            .fetch_one(&mut **transaction)
            .await
            .map_err(|error| {
                store_error(&format!("failed to insert into '{}'", schema.table()), error)
            })?;

        decode_row(schema, &stored)
    }

    async fn savepoint(&self, name: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        flush_pending(&self.pool, &mut state).await?;
        execute_statement(
            &self.pool,
            &mut state,
            format!("SAVEPOINT {}", quote_identifier(name)),
            "failed to create savepoint",
        )
        .await
    }

    async fn release_savepoint(&self, name: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        flush_pending(&self.pool, &mut state).await?;
        execute_statement(
            &self.pool,
            &mut state,
            format!("RELEASE SAVEPOINT {}", quote_identifier(name)),
            "failed to release savepoint",
        )
        .await
    }

    async fn rollback_to_savepoint(&self, name: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.pending.clear();
        execute_statement(
            &self.pool,
            &mut state,
            format!("ROLLBACK TO SAVEPOINT {}", quote_identifier(name)),
            "failed to roll back to savepoint",
        )
        .await
    }

    async fn commit(&self) -> AppResult<()> {
        let mut state = self.state.lock().await;
        flush_pending(&self.pool, &mut state).await?;

        if let Some(transaction) = state.transaction.take() {
            transaction
                .commit()
                .await
                .map_err(|error| store_error("failed to commit transaction", error))?;
            debug!("postgres transaction committed");
        }

        Ok(())
    }

    async fn rollback(&self) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.pending.clear();

        if let Some(transaction) = state.transaction.take() {
            transaction
                .rollback()
                .await
                .map_err(|error| store_error("failed to roll back transaction", error))?;
            debug!("postgres transaction rolled back");
        }

        Ok(())
    }
}
