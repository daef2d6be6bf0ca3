use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tessera_application::{PendingWrite, QueryPlan, SessionBackend, SessionFactory};
use tessera_core::{AppError, AppResult};
use tessera_domain::{EntityRow, EntitySchema, FieldDefinition, FieldType, FieldValue};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

mod evaluate;

use evaluate::select_rows;

/// Committed rows and key sequences, keyed by table name.
#[derive(Debug, Clone, Default)]
struct Tables {
    rows: HashMap<&'static str, Vec<EntityRow>>,
    sequences: HashMap<&'static str, i64>,
}

impl Tables {
    fn rows(&self, table: &str) -> &[EntityRow] {
        self.rows.get(table).map(Vec::as_slice).unwrap_or_default()
    }

    fn apply(&mut self, write: &PendingWrite) -> AppResult<()> {
        match write {
            PendingWrite::Insert { schema, row } => {
                check_not_null(schema, row)?;
                self.check_unique(schema, row, None)?;
                self.rows.entry(schema.table()).or_default().push(row.clone());
            }
            PendingWrite::Update {
                schema,
                key,
                assignments,
            } => {
                let key_name = schema.primary_key()?.name();
                let Some(position) = self
                    .rows(schema.table())
                    .iter()
                    .position(|row| row.value(key_name) == key)
                else {
                    return Ok(());
                };

                let mut candidate = self.rows(schema.table())[position].clone();
                for (field, value) in assignments {
                    candidate.insert(field.name(), value.clone());
                }
                check_not_null(schema, &candidate)?;
                self.check_unique(schema, &candidate, Some(key))?;

                if let Some(rows) = self.rows.get_mut(schema.table()) {
                    rows[position] = candidate;
                }
            }
            PendingWrite::Delete { schema, key } => {
                let key_name = schema.primary_key()?.name();
                if let Some(rows) = self.rows.get_mut(schema.table()) {
                    rows.retain(|row| row.value(key_name) != key);
                }
            }
        }

        Ok(())
    }

    fn check_unique(
        &self,
        schema: &EntitySchema,
        row: &EntityRow,
        own_key: Option<&FieldValue>,
    ) -> AppResult<()> {
        let key_name = schema.primary_key()?.name();

        for field in schema.fields().iter().filter(|field| field.is_unique()) {
            let value = row.value(field.name());
            if value.is_null() {
                continue;
            }

            let duplicate = self.rows(schema.table()).iter().any(|stored| {
                stored.value(field.name()) == value
                    && own_key.is_none_or(|key| stored.value(key_name) != key)
            });
            if duplicate {
                return Err(AppError::Conflict(format!(
                    "duplicate value {value} for unique attribute '{}' of '{}'",
                    field.name(),
                    schema.name()
                )));
            }
        }

        Ok(())
    }
}

fn check_not_null(schema: &EntitySchema, row: &EntityRow) -> AppResult<()> {
    match schema
        .fields()
        .iter()
        .find(|field| !field.is_nullable() && row.value(field.name()).is_null())
    {
        Some(field) => Err(AppError::Store(format!(
            "null value for required attribute '{}' of '{}'",
            field.name(),
            schema.name()
        ))),
        None => Ok(()),
    }
}

/// Process-local session factory for tests and store-less runs.
///
/// Every session works on its own snapshot; committed writes are replayed onto
/// the shared tables.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionFactory for InMemoryStore {
    async fn open_session(&self) -> AppResult<Box<dyn SessionBackend>> {
        Ok(Box::new(InMemorySession {
            shared: Arc::clone(&self.tables),
            state: Mutex::new(SessionState::default()),
        }))
    }
}

struct Savepoint {
    name: String,
    journal_len: usize,
    snapshot: Tables,
}

#[derive(Default)]
struct SessionState {
    working: Option<Tables>,
    journal: Vec<PendingWrite>,
    pending: Vec<PendingWrite>,
    savepoints: Vec<Savepoint>,
}

/// Unit of work over a snapshot of an [`InMemoryStore`].
pub struct InMemorySession {
    shared: Arc<RwLock<Tables>>,
    state: Mutex<SessionState>,
}

impl InMemorySession {
    async fn working<'a>(&self, state: &'a mut SessionState) -> &'a mut Tables {
        if state.working.is_none() {
            state.working = Some(self.shared.read().await.clone());
            debug!("in-memory transaction started");
        }

        state.working.get_or_insert_with(Tables::default)
    }

    async fn next_key(&self, table: &'static str) -> i64 {
        let mut shared = self.shared.write().await;
        let sequence = shared.sequences.entry(table).or_insert(0);
        *sequence += 1;
        *sequence
    }

    /// Fills generated values so the write can be replayed verbatim on commit.
    async fn resolve(&self, write: PendingWrite) -> PendingWrite {
        match write {
            PendingWrite::Insert { schema, row } => {
                let mut stored = EntityRow::new();
                for field in schema.fields() {
                    let mut value = row.value(field.name()).clone();
                    if value.is_null() && field.is_generated() {
                        value = self.generated_value(schema, field).await;
                    }
                    stored.insert(field.name(), value);
                }
                PendingWrite::Insert {
                    schema,
                    row: stored,
                }
            }
            PendingWrite::Update {
                schema,
                key,
                mut assignments,
            } => {
                for field in schema.fields() {
                    let assigned = assignments
                        .iter()
                        .any(|(assigned, _)| assigned.name() == field.name());
                    if field.is_refreshed_on_update() && !assigned {
                        assignments.push((field, FieldValue::DateTime(Utc::now())));
                    }
                }
                PendingWrite::Update {
                    schema,
                    key,
                    assignments,
                }
            }
            delete @ PendingWrite::Delete { .. } => delete,
        }
    }

    async fn generated_value(
        &self,
        schema: &'static EntitySchema,
        field: &FieldDefinition,
    ) -> FieldValue {
        match field.field_type() {
            FieldType::Integer => FieldValue::Integer(self.next_key(schema.table()).await),
            FieldType::DateTime => FieldValue::DateTime(Utc::now()),
            FieldType::Uuid => FieldValue::Uuid(Uuid::new_v4()),
            FieldType::Boolean | FieldType::Text => FieldValue::Null,
        }
    }

    async fn apply(&self, state: &mut SessionState, write: PendingWrite) -> AppResult<()> {
        let write = self.resolve(write).await;
        self.working(state).await.apply(&write)?;
        state.journal.push(write);
        Ok(())
    }

    async fn flush_pending(&self, state: &mut SessionState) -> AppResult<()> {
        for write in std::mem::take(&mut state.pending) {
            self.apply(state, write).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl SessionBackend for InMemorySession {
    async fn fetch_rows(&self, plan: &QueryPlan) -> AppResult<Vec<EntityRow>> {
        let mut state = self.state.lock().await;
        self.flush_pending(&mut state).await?;
        let tables = self.working(&mut state).await;

        let rows = select_rows(tables, plan)?;
        let (offset, limit) = plan.window.map_or((0, usize::MAX), |window| {
            (
                usize::try_from(window.offset).unwrap_or(usize::MAX),
                usize::try_from(window.limit).unwrap_or(usize::MAX),
            )
        });

        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_rows(&self, plan: &QueryPlan, by_field: &FieldDefinition) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        self.flush_pending(&mut state).await?;
        let tables = self.working(&mut state).await;

        let counted = select_rows(tables, plan)?
            .iter()
            .filter(|row| !row.value(by_field.name()).is_null())
            .count();

        u64::try_from(counted)
            .map_err(|error| AppError::Internal(format!("row count {counted} overflows: {error}")))
    }

    async fn stage(&self, write: PendingWrite) -> AppResult<()> {
        self.state.lock().await.pending.push(write);
        Ok(())
    }

    async fn flush(&self) -> AppResult<()> {
        let mut state = self.state.lock().await;
        self.flush_pending(&mut state).await
    }

    async fn insert_returning(
        &self,
        schema: &'static EntitySchema,
        row: EntityRow,
    ) -> AppResult<EntityRow> {
        let mut state = self.state.lock().await;
        self.flush_pending(&mut state).await?;

        let write = self.resolve(PendingWrite::Insert { schema, row }).await;
        self.working(&mut state).await.apply(&write)?;
        let stored = match &write {
            PendingWrite::Insert { row, .. } => row.clone(),
            PendingWrite::Update { .. } | PendingWrite::Delete { .. } => {
                return Err(AppError::Internal(
                    "insert resolved to a different write".to_owned(),
                ));
            }
        };
        state.journal.push(write);

        Ok(stored)
    }

    async fn savepoint(&self, name: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        self.flush_pending(&mut state).await?;
        let snapshot = self.working(&mut state).await.clone();

        let journal_len = state.journal.len();
        state.savepoints.push(Savepoint {
            name: name.to_owned(),
            journal_len,
            snapshot,
        });
        Ok(())
    }

    async fn release_savepoint(&self, name: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        self.flush_pending(&mut state).await?;

        let position = savepoint_position(&state, name)?;
        state.savepoints.truncate(position);
        Ok(())
    }

    async fn rollback_to_savepoint(&self, name: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.pending.clear();

        let position = savepoint_position(&state, name)?;
        state.savepoints.truncate(position + 1);
        let (journal_len, snapshot) = {
            let savepoint = &state.savepoints[position];
            (savepoint.journal_len, savepoint.snapshot.clone())
        };
        state.journal.truncate(journal_len);
        state.working = Some(snapshot);
        Ok(())
    }

    async fn commit(&self) -> AppResult<()> {
        let mut state = self.state.lock().await;
        self.flush_pending(&mut state).await?;

        if state.working.take().is_none() {
            return Ok(());
        }

        let journal = std::mem::take(&mut state.journal);
        state.savepoints.clear();

        let mut shared = self.shared.write().await;
        let mut next = shared.clone();
        for write in &journal {
            next.apply(write)?;
        }
        *shared = next;

        debug!(writes = journal.len(), "in-memory transaction committed");
        Ok(())
    }

    async fn rollback(&self) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.pending.clear();

        if state.working.take().is_some() {
            state.journal.clear();
            state.savepoints.clear();
            debug!("in-memory transaction rolled back");
        }

        Ok(())
    }
}

fn savepoint_position(state: &SessionState, name: &str) -> AppResult<usize> {
    state
        .savepoints
        .iter()
        .rposition(|savepoint| savepoint.name == name)
        .ok_or_else(|| AppError::Store(format!("savepoint '{name}' does not exist")))
}

#[cfg(test)]
mod tests;
