//! Entity-agnostic service operations with transactional boundaries.

use tessera_core::{AppError, AppResult};
use tessera_domain::{
    Entity, FieldValue, FilterSchema, PaddingSchema, SearchSchema, SortSchema,
};

use crate::generic_repository::describe_lookup;
use crate::{FieldFilters, GenericRepository, ListOptions, Propagation, Session};

/// Create or update payload for an entity.
pub trait EntityInput: Send + Sync {
    /// Returns the attribute values the caller explicitly set.
    fn changes(&self) -> Vec<(&'static str, FieldValue)>;

    /// Returns payload attributes that are never written to the entity.
    fn transient_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Returns [`EntityInput::changes`] without transient attributes.
    fn persistent_changes(&self) -> Vec<(&'static str, FieldValue)> {
        let transient = self.transient_fields();
        self.changes()
            .into_iter()
            .filter(|(name, _)| !transient.contains(name))
            .collect()
    }
}

/// Generic service for one entity type.
pub struct GenericService<T> {
    repository: GenericRepository<T>,
}

impl<T> Default for GenericService<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for GenericService<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> GenericService<T> {
    /// Creates a service.
    #[must_use]
    pub fn new() -> Self {
        Self {
            repository: GenericRepository::new(),
        }
    }

    /// Returns the underlying repository.
    #[must_use]
    pub fn repository(&self) -> &GenericRepository<T> {
        &self.repository
    }
}

impl<T> GenericService<T>
where
    T: Entity,
{
    /// Returns the entity with primary key `pk`.
    pub async fn get(
        &self,
        session: &Session,
        pk: impl Into<FieldValue>,
        select_load: &[&str],
    ) -> AppResult<T> {
        let key = T::schema().primary_key()?.name();
        self.get_by_field(session, select_load, &[(key, pk.into())])
            .await
    }

    /// Returns the first entity matching `filters`.
    pub async fn get_by_field(
        &self,
        session: &Session,
        select_load: &[&str],
        filters: FieldFilters<'_>,
    ) -> AppResult<T> {
        self.repository
            .get(session, select_load, filters)
            .await?
            .ok_or_else(|| AppError::RecordNotFound(describe_lookup(T::schema().name(), filters)))
    }

    /// Lists one page of entities and the total number of matches.
    pub async fn list(
        &self,
        session: &Session,
        padding: PaddingSchema,
        sort: SortSchema,
        search: Option<SearchSchema>,
        filter: Option<FilterSchema>,
        select_load: Vec<String>,
    ) -> AppResult<(Vec<T>, u64)> {
        T::schema().field(&sort.sort_field)?;

        self.repository
            .list(
                session,
                ListOptions {
                    padding: Some(padding),
                    sort: Some(sort),
                    search: search.and_then(SearchSchema::into_usable),
                    filter,
                    select_load,
                    filters: Vec::new(),
                },
            )
            .await
    }

    /// Creates an entity from `input` and flushes it so generated values are populated.
    pub async fn create(&self, session: &Session, input: &impl EntityInput) -> AppResult<T> {
        session
            .transactional(Propagation::Required, || async {
                let changes = input.persistent_changes();
                let entity = self.repository.create(&changes)?;
                self.repository.save(session, entity, true).await
            })
            .await
    }

    /// Applies the explicitly set attributes of `input` to the entity with key `pk`.
    pub async fn update(
        &self,
        session: &Session,
        pk: impl Into<FieldValue>,
        input: &impl EntityInput,
    ) -> AppResult<T> {
        let pk = pk.into();
        session
            .transactional(Propagation::Required, || async {
                let entity = self.get(session, pk, &[]).await?;
                let changes = input.persistent_changes();
                self.repository
                    .update(session, &changes, None, Some(&entity))
                    .await
            })
            .await
    }

    /// Deletes the entity with key `pk`.
    pub async fn delete(&self, session: &Session, pk: impl Into<FieldValue>) -> AppResult<()> {
        let pk = pk.into();
        session
            .transactional(Propagation::Required, || async {
                let key = T::schema().primary_key()?.name();
                let filters = [(key, pk)];
                match self.repository.delete(session, &filters).await {
                    Err(AppError::RecordNotFound(_)) => Err(AppError::RecordNotFound(
                        describe_lookup(T::schema().name(), &filters),
                    )),
                    other => other,
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests;
