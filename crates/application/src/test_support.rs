use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tessera_core::{AppError, AppResult};
use tessera_domain::{EntityRow, EntitySchema, FieldDefinition, FieldValue};
use tokio::sync::Mutex;

use crate::{FieldPath, PendingWrite, Predicate, QueryPlan, Session, SessionBackend};

/// Shared view of everything a [`RecordingBackend`] was asked to do.
#[derive(Default)]
pub(crate) struct Recorded {
    pub(crate) calls: Vec<String>,
    pub(crate) plans: Vec<QueryPlan>,
    pub(crate) staged: Vec<PendingWrite>,
}

/// Fake backend serving canned rows and recording every call.
#[derive(Clone, Default)]
pub(crate) struct RecordingBackend {
    tables: Arc<Mutex<HashMap<&'static str, Vec<EntityRow>>>>,
    recorded: Arc<Mutex<Recorded>>,
    failing_flush: bool,
    failing_commit: bool,
}

impl RecordingBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing_flush() -> Self {
        Self {
            failing_flush: true,
            ..Self::default()
        }
    }

    pub(crate) fn failing_commit() -> Self {
        Self {
            failing_commit: true,
            ..Self::default()
        }
    }

    pub(crate) async fn seed(&self, table: &'static str, rows: Vec<EntityRow>) {
        self.tables.lock().await.insert(table, rows);
    }

    pub(crate) fn session(&self) -> Session {
        Session::new(Box::new(self.clone()))
    }

    pub(crate) async fn calls(&self) -> Vec<String> {
        self.recorded.lock().await.calls.clone()
    }

    pub(crate) async fn plans(&self) -> Vec<QueryPlan> {
        self.recorded.lock().await.plans.clone()
    }

    pub(crate) async fn staged(&self) -> Vec<PendingWrite> {
        self.recorded.lock().await.staged.clone()
    }

    async fn record(&self, call: impl Into<String>) {
        self.recorded.lock().await.calls.push(call.into());
    }

    async fn matching(&self, plan: &QueryPlan) -> Vec<EntityRow> {
        let tables = self.tables.lock().await;
        tables
            .get(plan.entity.table())
            .map(|rows| {
                rows.iter()
                    .filter(|row| plan.predicates.iter().all(|predicate| holds(predicate, row)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn holds(predicate: &Predicate, row: &EntityRow) -> bool {
    match predicate {
        Predicate::Equals {
            path: FieldPath::Root(field),
            value,
        } => row.value(field.name()) == value,
        Predicate::OneOf { field, values } => values.contains(row.value(field.name())),
        Predicate::All(children) => children.iter().all(|child| holds(child, row)),
        Predicate::Any(children) => children.iter().any(|child| holds(child, row)),
        Predicate::Equals { .. } | Predicate::Contains { .. } => true,
    }
}

#[async_trait]
impl SessionBackend for RecordingBackend {
    async fn fetch_rows(&self, plan: &QueryPlan) -> AppResult<Vec<EntityRow>> {
        self.recorded.lock().await.plans.push(plan.clone());
        let rows = self.matching(plan).await;
        Ok(match plan.window {
            Some(window) => rows
                .into_iter()
                .skip(usize::try_from(window.offset).unwrap_or(usize::MAX))
                .take(usize::try_from(window.limit).unwrap_or(usize::MAX))
                .collect(),
            None => rows,
        })
    }

    async fn count_rows(&self, plan: &QueryPlan, by_field: &FieldDefinition) -> AppResult<u64> {
        self.record(format!("count {}", by_field.name())).await;
        let rows = self.matching(plan).await;
        Ok(rows
            .iter()
            .filter(|row| !row.value(by_field.name()).is_null())
            .count() as u64)
    }

    async fn stage(&self, write: PendingWrite) -> AppResult<()> {
        self.record("stage").await;
        self.recorded.lock().await.staged.push(write);
        Ok(())
    }

    async fn flush(&self) -> AppResult<()> {
        self.record("flush").await;
        if self.failing_flush {
            return Err(AppError::Store("flush rejected".to_owned()));
        }
        Ok(())
    }

    async fn insert_returning(
        &self,
        schema: &'static EntitySchema,
        mut row: EntityRow,
    ) -> AppResult<EntityRow> {
        self.record(format!("insert {}", schema.table())).await;
        let mut tables = self.tables.lock().await;
        let rows = tables.entry(schema.table()).or_default();
        let next_id = i64::try_from(rows.len()).unwrap_or(i64::MAX) + 1;
        row.insert("id", FieldValue::Integer(next_id));
        rows.push(row.clone());
        Ok(row)
    }

    async fn savepoint(&self, name: &str) -> AppResult<()> {
        self.record(format!("savepoint {name}")).await;
        Ok(())
    }

    async fn release_savepoint(&self, name: &str) -> AppResult<()> {
        self.record(format!("release {name}")).await;
        Ok(())
    }

    async fn rollback_to_savepoint(&self, name: &str) -> AppResult<()> {
        self.record(format!("rollback to {name}")).await;
        Ok(())
    }

    async fn commit(&self) -> AppResult<()> {
        self.record("commit").await;
        if self.failing_commit {
            return Err(AppError::Conflict("commit rejected".to_owned()));
        }
        Ok(())
    }

    async fn rollback(&self) -> AppResult<()> {
        self.record("rollback").await;
        Ok(())
    }
}
