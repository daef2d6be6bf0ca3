//! Unit of work shared by repositories and services for one request.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use tessera_core::{AppError, AppResult};
use tessera_domain::{EntityRow, EntitySchema, FieldDefinition};
use tracing::{debug, warn};

use crate::{PendingWrite, QueryPlan, SessionBackend, SessionFactory};

/// How a transactional block relates to an already active scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Join the active scope, or open the outermost one.
    Required,
    /// Open a nested scope backed by a savepoint.
    RequiredNew,
}

/// Request-scoped unit of work over a [`SessionBackend`].
///
/// Dropping a session with an uncommitted transaction discards it.
pub struct Session {
    backend: Box<dyn SessionBackend>,
    depth: AtomicUsize,
    savepoints: AtomicUsize,
}

impl Session {
    /// Wraps an opened backend.
    #[must_use]
    pub fn new(backend: Box<dyn SessionBackend>) -> Self {
        Self {
            backend,
            depth: AtomicUsize::new(0),
            savepoints: AtomicUsize::new(0),
        }
    }

    /// Opens a session from a factory.
    pub async fn open(factory: &dyn SessionFactory) -> AppResult<Self> {
        Ok(Self::new(factory.open_session().await?))
    }

    /// Returns whether a transactional scope is active.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.depth.load(Ordering::SeqCst) > 0
    }

    /// Runs `work` inside a transactional scope.
    ///
    /// The outermost scope commits when `work` succeeds and rolls back when it
    /// fails. A joined [`Propagation::Required`] scope leaves both decisions to
    /// the enclosing scope. A [`Propagation::RequiredNew`] scope releases its
    /// savepoint on success and rolls back to it on failure.
    pub async fn transactional<F, Fut, T>(&self, propagation: Propagation, work: F) -> AppResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let outermost = !self.in_transaction();

        if propagation == Propagation::Required && !outermost {
            return work().await;
        }

        let savepoint = match propagation {
            Propagation::RequiredNew => {
                let name = format!(
                    "tessera_sp_{}",
                    self.savepoints.fetch_add(1, Ordering::SeqCst)
                );
                self.backend.savepoint(name.as_str()).await?;
                Some(name)
            }
            Propagation::Required => None,
        };

        let result = {
            let _scope = ScopeGuard::enter(&self.depth);
            work().await
        };

        match result {
            Ok(value) => {
                if let Some(name) = &savepoint {
                    self.backend.release_savepoint(name).await?;
                }
                if outermost {
                    if let Err(error) = self.backend.commit().await {
                        warn!(error = %error, "commit failed, rolling back");
                        report_rollback(self.backend.rollback().await, &error);
                        return Err(error);
                    }
                    debug!("session committed");
                }
                Ok(value)
            }
            Err(error) => {
                warn!(error = %error, outermost, "unit of work failed, rolling back");
                if let Some(name) = &savepoint {
                    report_rollback(self.backend.rollback_to_savepoint(name).await, &error);
                }
                if outermost {
                    report_rollback(self.backend.rollback().await, &error);
                }
                Err(error)
            }
        }
    }

    /// Returns rows matching a plan.
    pub async fn fetch_rows(&self, plan: &QueryPlan) -> AppResult<Vec<EntityRow>> {
        self.backend.fetch_rows(plan).await
    }

    /// Counts non-null values of an attribute over rows matching a plan.
    pub async fn count_rows(&self, plan: &QueryPlan, by_field: &FieldDefinition) -> AppResult<u64> {
        self.backend.count_rows(plan, by_field).await
    }

    /// Stages a write until the next flush or commit.
    pub async fn stage(&self, write: PendingWrite) -> AppResult<()> {
        self.backend.stage(write).await
    }

    /// Executes staged writes without committing.
    pub async fn flush(&self) -> AppResult<()> {
        self.backend.flush().await
    }

    /// Inserts a row immediately and returns it with generated values.
    pub async fn insert_returning(
        &self,
        schema: &'static EntitySchema,
        row: EntityRow,
    ) -> AppResult<EntityRow> {
        self.backend.insert_returning(schema, row).await
    }

    /// Commits outside of a transactional scope.
    pub async fn commit(&self) -> AppResult<()> {
        self.backend.commit().await
    }

    /// Rolls back the current transaction.
    pub async fn rollback(&self) -> AppResult<()> {
        debug!("session rolled back");
        self.backend.rollback().await
    }
}

fn report_rollback(outcome: AppResult<()>, cause: &AppError) {
    if let Err(rollback_error) = outcome {
        warn!(
            error = %rollback_error,
            cause = %cause,
            "rollback after failed unit of work did not complete"
        );
    }
}

struct ScopeGuard<'a> {
    depth: &'a AtomicUsize,
}

impl<'a> ScopeGuard<'a> {
    fn enter(depth: &'a AtomicUsize) -> Self {
        depth.fetch_add(1, Ordering::SeqCst);
        Self { depth }
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}
