//! Translation of request predicate models into [`QueryPlan`] conditions.

use tessera_core::{AppError, AppResult};
use tessera_domain::{
    EntitySchema, FieldValue, FilterItem, FilterValue, ScalarValue, SearchItem, SearchSchema,
    SearchValue,
};

use crate::{FieldPath, Predicate, QueryPlan};

/// How the items of one filter block combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Every item must hold.
    And,
    /// At least one item must hold.
    Or,
}

/// Conjoins a block of equality items onto a plan.
///
/// A nested item holds when a related row satisfies it. An empty block leaves
/// the plan unchanged.
pub fn apply_condition_filter(
    mut plan: QueryPlan,
    items: &[FilterItem],
    combinator: Combinator,
) -> AppResult<QueryPlan> {
    if items.is_empty() {
        return Ok(plan);
    }

    let predicates = items
        .iter()
        .map(|item| filter_condition(plan.entity, item))
        .collect::<AppResult<Vec<_>>>()?;

    plan.and_where(match combinator {
        Combinator::And => Predicate::All(predicates),
        Combinator::Or => Predicate::Any(predicates),
    });

    Ok(plan)
}

/// Conjoins a disjunction of substring conditions onto a plan.
///
/// Searching through a to-many relation marks the plan distinct.
pub fn apply_search_filter(mut plan: QueryPlan, search: &SearchSchema) -> AppResult<QueryPlan> {
    if search.search.is_empty() {
        return Ok(plan);
    }

    let mut predicates = Vec::with_capacity(search.search.len());
    for item in &search.search {
        let (path, needle) = search_target(plan.entity, item)?;
        plan.distinct |= path.is_to_many();
        predicates.push(Predicate::Contains {
            path,
            needle: needle.to_owned(),
        });
    }

    plan.and_where(Predicate::Any(predicates));
    Ok(plan)
}

/// Conjoins typed attribute equalities onto a plan.
pub fn apply_equality_filters(
    mut plan: QueryPlan,
    filters: &[(&str, FieldValue)],
) -> AppResult<QueryPlan> {
    for (name, value) in filters {
        let path = FieldPath::root(plan.entity, name)?;
        let expected = path.field().field_type();
        if value.field_type().is_some_and(|actual| actual != expected) {
            return Err(AppError::Validation(format!(
                "filter '{name}' expects a {} value, got '{value}'",
                expected.as_str()
            )));
        }

        plan.and_where(Predicate::Equals {
            path,
            value: value.clone(),
        });
    }

    Ok(plan)
}

fn filter_condition(schema: &'static EntitySchema, item: &FilterItem) -> AppResult<Predicate> {
    match &item.value {
        FilterValue::Scalar { value, raw } => equals(
            FieldPath::root(schema, &item.name)?,
            value,
            raw.as_deref(),
        ),
        FilterValue::Nested(nested) => match &nested.value {
            FilterValue::Scalar { value, raw } => equals(
                FieldPath::related(schema, &item.name, &nested.name)?,
                value,
                raw.as_deref(),
            ),
            FilterValue::Nested(_) => Err(too_deep(&item.name, &nested.name)),
        },
    }
}

fn search_target<'item>(
    schema: &'static EntitySchema,
    item: &'item SearchItem,
) -> AppResult<(FieldPath, &'item str)> {
    match &item.value {
        SearchValue::Text(needle) => Ok((FieldPath::root(schema, &item.name)?, needle)),
        SearchValue::Nested(nested) => match &nested.value {
            SearchValue::Text(needle) => Ok((
                FieldPath::related(schema, &item.name, &nested.name)?,
                needle,
            )),
            SearchValue::Nested(_) => Err(too_deep(&item.name, &nested.name)),
        },
    }
}

fn equals(path: FieldPath, scalar: &ScalarValue, raw: Option<&str>) -> AppResult<Predicate> {
    Ok(Predicate::Equals {
        value: scalar.cast_with_raw(raw, path.field().field_type())?,
        path,
    })
}

fn too_deep(relation: &str, nested: &str) -> AppError {
    AppError::Validation(format!(
        "condition on '{relation}.{nested}' nests deeper than one relation"
    ))
}
