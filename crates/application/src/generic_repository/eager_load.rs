use tessera_core::{AppError, AppResult};
use tessera_domain::{EntityRow, EntitySchema, FieldValue, RelationDefinition};

use crate::{Predicate, QueryPlan, Session, SortKey};

/// Relation chain of at most two hops, loaded alongside listed rows.
#[derive(Debug, Clone, Copy)]
pub struct RelationPath {
    first: &'static RelationDefinition,
    second: Option<&'static RelationDefinition>,
}

impl RelationPath {
    /// Parses a dotted path such as `tenant` or `users.tenant`.
    pub fn parse(schema: &'static EntitySchema, path: &str) -> AppResult<Self> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.len() > 2 || segments.iter().any(|segment| segment.is_empty()) {
            return Err(AppError::Validation(format!(
                "select_load path '{path}' must name one or two relations"
            )));
        }

        let first = schema.relation(segments[0])?;
        let second = match segments.get(1) {
            Some(name) => Some(first.target().relation(name)?),
            None => None,
        };

        Ok(Self { first, second })
    }

    /// Parses every path, failing on the first invalid one.
    pub fn parse_all(schema: &'static EntitySchema, paths: &[&str]) -> AppResult<Vec<Self>> {
        paths.iter().map(|path| Self::parse(schema, path)).collect()
    }

    /// Returns the relation loaded on the listed rows.
    #[must_use]
    pub fn first(&self) -> &'static RelationDefinition {
        self.first
    }

    /// Returns the relation loaded on the related rows, if any.
    #[must_use]
    pub fn second(&self) -> Option<&'static RelationDefinition> {
        self.second
    }
}

/// Loads every path with one query per relation hop, keyed by the parent rows.
pub(super) async fn load(
    session: &Session,
    paths: &[RelationPath],
    rows: &mut [EntityRow],
) -> AppResult<()> {
    let mut loaded: Vec<&str> = Vec::new();

    for path in paths {
        let relation = path.first();
        if loaded.contains(&relation.name()) {
            continue;
        }
        loaded.push(relation.name());

        let mut children = fetch_related(session, relation, rows).await?;

        let mut nested_loaded: Vec<&str> = Vec::new();
        for nested in paths
            .iter()
            .filter(|candidate| candidate.first().name() == relation.name())
            .filter_map(RelationPath::second)
        {
            if nested_loaded.contains(&nested.name()) {
                continue;
            }
            nested_loaded.push(nested.name());

            let grandchildren = fetch_related(session, nested, &children).await?;
            attach(nested, &mut children, &grandchildren);
        }

        attach(relation, rows, &children);
    }

    Ok(())
}

async fn fetch_related(
    session: &Session,
    relation: &'static RelationDefinition,
    parents: &[EntityRow],
) -> AppResult<Vec<EntityRow>> {
    let mut keys: Vec<FieldValue> = Vec::new();
    for parent in parents {
        let key = parent.value(relation.local_field());
        if !key.is_null() && !keys.contains(key) {
            keys.push(key.clone());
        }
    }

    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let target = relation.target();
    let mut plan = QueryPlan::new(target);
    plan.and_where(Predicate::OneOf {
        field: target.field(relation.remote_field())?,
        values: keys,
    });
    plan.ordering.push(SortKey::Field {
        field: target.primary_key()?,
        descending: false,
    });

    session.fetch_rows(&plan).await
}

fn attach(relation: &RelationDefinition, parents: &mut [EntityRow], children: &[EntityRow]) {
    for parent in parents.iter_mut() {
        let key = parent.value(relation.local_field()).clone();
        let matching = if key.is_null() {
            Vec::new()
        } else {
            children
                .iter()
                .filter(|child| child.value(relation.remote_field()) == &key)
                .cloned()
                .collect()
        };
        parent.set_related(relation.name(), matching);
    }
}
