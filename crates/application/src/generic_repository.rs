//! Entity-agnostic persistence operations over a [`Session`].

mod eager_load;

use std::marker::PhantomData;

use tessera_core::{AppError, AppResult};
use tessera_domain::{Entity, FieldValue, FilterSchema, PaddingSchema, SearchSchema, SortSchema};
use tracing::warn;

use crate::query_compiler::{
    Combinator, apply_condition_filter, apply_equality_filters, apply_search_filter,
};
use crate::{PendingWrite, QueryPlan, Session, SortKey, Window};

pub use eager_load::RelationPath;

/// Typed attribute equalities, conjoined.
pub type FieldFilters<'a> = &'a [(&'a str, FieldValue)];

/// Inputs of [`GenericRepository::list`].
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Pagination window; `None` returns every matching row.
    pub padding: Option<PaddingSchema>,
    /// Ordering; `None` keeps store order.
    pub sort: Option<SortSchema>,
    /// Substring search.
    pub search: Option<SearchSchema>,
    /// OR-block and AND-block equality conditions.
    pub filter: Option<FilterSchema>,
    /// Relation paths loaded alongside each row.
    pub select_load: Vec<String>,
    /// Typed attribute equalities.
    pub filters: Vec<(String, FieldValue)>,
}

/// Generic repository for one entity type.
pub struct GenericRepository<T> {
    entity: PhantomData<fn() -> T>,
}

impl<T> Default for GenericRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for GenericRepository<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> GenericRepository<T> {
    /// Creates a repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entity: PhantomData,
        }
    }
}

impl<T> GenericRepository<T>
where
    T: Entity,
{
    /// Returns the first entity matching `filters`, with `select_load` relations attached.
    pub async fn get(
        &self,
        session: &Session,
        select_load: &[&str],
        filters: FieldFilters<'_>,
    ) -> AppResult<Option<T>> {
        let paths = RelationPath::parse_all(T::schema(), select_load)?;
        let mut plan = apply_equality_filters(QueryPlan::new(T::schema()), filters)?;
        plan.window = Some(Window {
            offset: 0,
            limit: 1,
        });

        let mut rows = session.fetch_rows(&plan).await?;
        rows.truncate(1);
        eager_load::load(session, &paths, &mut rows).await?;

        rows.into_iter().next().map(T::from_row).transpose()
    }

    /// Lists entities and the number of rows matching before pagination.
    pub async fn list(&self, session: &Session, options: ListOptions) -> AppResult<(Vec<T>, u64)> {
        let schema = T::schema();
        let select_load: Vec<&str> = options.select_load.iter().map(String::as_str).collect();
        let paths = RelationPath::parse_all(schema, &select_load)?;

        let filters: Vec<(&str, FieldValue)> = options
            .filters
            .iter()
            .map(|(name, value)| (name.as_str(), value.clone()))
            .collect();
        let mut plan = apply_equality_filters(QueryPlan::new(schema), &filters)?;

        if let Some(filter) = &options.filter {
            plan = apply_condition_filter(plan, &filter.filters_or, Combinator::Or)?;
            plan = apply_condition_filter(plan, &filter.filters_and, Combinator::And)?;
        }

        if let Some(search) = options.search.and_then(SearchSchema::into_usable) {
            plan = apply_search_filter(plan, &search)?;
        }

        if let Some(sort) = &options.sort {
            let key = schema.primary_key()?;
            if let Some(ids) = &sort.sort_case_ids {
                plan.ordering.push(SortKey::KeyPriority {
                    key,
                    ids: ids.clone(),
                });
            }
            plan.ordering.push(SortKey::Field {
                field: schema.field(&sort.sort_field)?,
                descending: sort.desc,
            });
        }

        let total_count = session.count_rows(&plan, schema.primary_key()?).await?;

        plan.window = options.padding.map(|padding| Window {
            offset: padding.offset(),
            limit: padding.limit(),
        });

        let mut rows = session.fetch_rows(&plan).await?;
        eager_load::load(session, &paths, &mut rows).await?;

        let items = rows
            .into_iter()
            .map(T::from_row)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((items, total_count))
    }

    /// Builds an unsaved entity from attribute values.
    pub fn create(&self, attributes: FieldFilters<'_>) -> AppResult<T> {
        let registry = T::registry();
        let mut entity = T::default();
        for (name, value) in attributes {
            registry.write(&mut entity, name, value.clone())?;
        }

        Ok(entity)
    }

    /// Stages an insert of `instance`.
    ///
    /// With `flush`, staged writes and the insert execute immediately and the
    /// returned entity carries its generated attributes.
    pub async fn save(&self, session: &Session, instance: T, flush: bool) -> AppResult<T> {
        let schema = T::schema();
        let row = instance.to_row()?;

        if !flush {
            session.stage(PendingWrite::Insert { schema, row }).await?;
            return Ok(instance);
        }

        session.flush().await?;
        let stored = session.insert_returning(schema, row).await?;
        T::from_row(stored)
    }

    /// Applies `updates` to the entity selected by exactly one of `filter` or `instance`.
    ///
    /// Only attributes whose value changes are written. Any failure rolls the
    /// session back before the error is returned, and `instance` itself is
    /// never modified.
    pub async fn update(
        &self,
        session: &Session,
        updates: FieldFilters<'_>,
        filter: Option<FieldFilters<'_>>,
        instance: Option<&T>,
    ) -> AppResult<T> {
        let result = self.apply_update(session, updates, filter, instance).await;

        if let Err(error) = &result {
            warn!(
                entity = T::schema().name(),
                error = %error,
                "update failed, rolling back session"
            );
            if let Err(rollback_error) = session.rollback().await {
                warn!(error = %rollback_error, "rollback after failed update did not complete");
            }
        }

        result
    }

    async fn apply_update(
        &self,
        session: &Session,
        updates: FieldFilters<'_>,
        filter: Option<FieldFilters<'_>>,
        instance: Option<&T>,
    ) -> AppResult<T> {
        let schema = T::schema();
        let target = match (filter, instance) {
            (Some(filter), None) => self.get(session, &[], filter).await?.ok_or_else(|| {
                AppError::RecordNotFound(describe_lookup(schema.name(), filter))
            })?,
            (None, Some(instance)) => instance.clone(),
            _ => {
                return Err(AppError::Configuration(
                    "update requires exactly one of a filter or an instance".to_owned(),
                ));
            }
        };

        let registry = T::registry();
        let mut updated = target.clone();
        let mut assignments = Vec::new();

        for (name, value) in updates {
            let field = schema.field(name).map_err(|_| {
                AppError::InvalidAttribute(format!(
                    "'{name}' is not a valid attribute of '{}'",
                    schema.name()
                ))
            })?;

            registry.write(&mut updated, name, value.clone())?;
            if &registry.read(&target, name)? != value {
                assignments.push((field, value.clone()));
            }
        }

        if assignments.is_empty() {
            return Ok(updated);
        }

        let key = target.primary_key_value()?;
        if key.is_null() {
            return Err(AppError::Validation(format!(
                "cannot update an unsaved '{}'",
                schema.name()
            )));
        }

        session
            .stage(PendingWrite::Update {
                schema,
                key,
                assignments,
            })
            .await?;

        Ok(updated)
    }

    /// Stages deletion of the first entity matching `filters`.
    pub async fn delete(&self, session: &Session, filters: FieldFilters<'_>) -> AppResult<()> {
        let schema = T::schema();
        let entity = self
            .get(session, &[], filters)
            .await?
            .ok_or_else(|| AppError::RecordNotFound(describe_lookup(schema.name(), filters)))?;

        session
            .stage(PendingWrite::Delete {
                schema,
                key: entity.primary_key_value()?,
            })
            .await
    }

    /// Counts non-null values of `by_field` among entities matching `filters`.
    pub async fn count(
        &self,
        session: &Session,
        by_field: &str,
        filters: FieldFilters<'_>,
    ) -> AppResult<u64> {
        let schema = T::schema();
        let plan = apply_equality_filters(QueryPlan::new(schema), filters)?;
        session.count_rows(&plan, schema.field(by_field)?).await
    }
}

pub(crate) fn describe_lookup(entity: &str, filters: FieldFilters<'_>) -> String {
    let conditions: Vec<String> = filters
        .iter()
        .map(|(name, value)| format!("{name} = {value}"))
        .collect();
    format!("{entity} where {}", conditions.join(" and "))
}
