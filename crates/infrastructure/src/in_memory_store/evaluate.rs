use std::cmp::Ordering;
use std::collections::HashSet;

use tessera_application::{FieldPath, Predicate, QueryPlan, SortKey};
use tessera_core::AppResult;
use tessera_domain::{EntityRow, FieldValue};

use super::Tables;

/// Returns the rows matching a plan in plan order, ignoring its window.
pub(super) fn select_rows(tables: &Tables, plan: &QueryPlan) -> AppResult<Vec<EntityRow>> {
    let key_name = plan.entity.primary_key()?.name();

    let mut rows: Vec<EntityRow> = tables
        .rows(plan.entity.table())
        .iter()
        .filter(|row| {
            plan.predicates
                .iter()
                .all(|predicate| holds(tables, row, predicate))
        })
        .cloned()
        .collect();

    if plan.distinct {
        let mut seen = HashSet::new();
        rows.retain(|row| seen.insert(row.value(key_name).to_string()));
    }

    rows.sort_by(|left, right| {
        plan.ordering
            .iter()
            .map(|key| compare_by_key(key, left, right))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    });

    Ok(rows)
}

fn holds(tables: &Tables, row: &EntityRow, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::Equals { path, value } => {
            path_values(tables, row, path).any(|candidate| &candidate == value)
        }
        Predicate::Contains { path, needle } => path_values(tables, row, path).any(|candidate| {
            candidate
                .as_text()
                .is_some_and(|text| text.contains(needle.as_str()))
        }),
        Predicate::OneOf { field, values } => values.contains(row.value(field.name())),
        Predicate::All(children) => children.iter().all(|child| holds(tables, row, child)),
        Predicate::Any(children) => children.iter().any(|child| holds(tables, row, child)),
    }
}

/// Yields the compared values a path reaches from one root row.
fn path_values<'a>(
    tables: &'a Tables,
    row: &'a EntityRow,
    path: &'a FieldPath,
) -> Box<dyn Iterator<Item = FieldValue> + 'a> {
    match path {
        FieldPath::Root(field) => Box::new(std::iter::once(row.value(field.name()).clone())),
        FieldPath::Related {
            relation,
            local,
            remote,
            field,
        } => {
            let join_value = row.value(local.name());
            if join_value.is_null() {
                return Box::new(std::iter::empty());
            }

            Box::new(
                tables
                    .rows(relation.target().table())
                    .iter()
                    .filter(move |target| target.value(remote.name()) == join_value)
                    .map(move |target| target.value(field.name()).clone()),
            )
        }
    }
}

fn compare_by_key(key: &SortKey, left: &EntityRow, right: &EntityRow) -> Ordering {
    match key {
        SortKey::Field { field, descending } => {
            let ordering = compare_values(left.value(field.name()), right.value(field.name()));
            if *descending {
                ordering.reverse()
            } else {
                ordering
            }
        }
        SortKey::KeyPriority { key, ids } => {
            let rank = |row: &EntityRow| {
                row.value(key.name())
                    .as_i64()
                    .and_then(|id| ids.iter().position(|candidate| *candidate == id))
                    .unwrap_or(ids.len())
            };
            rank(left).cmp(&rank(right))
        }
    }
}

/// Orders values with `NULL` greater than every other value.
fn compare_values(left: &FieldValue, right: &FieldValue) -> Ordering {
    match (left, right) {
        (FieldValue::Null, FieldValue::Null) => Ordering::Equal,
        (FieldValue::Null, _) => Ordering::Greater,
        (_, FieldValue::Null) => Ordering::Less,
        (FieldValue::Boolean(left), FieldValue::Boolean(right)) => left.cmp(right),
        (FieldValue::Integer(left), FieldValue::Integer(right)) => left.cmp(right),
        (FieldValue::Text(left), FieldValue::Text(right)) => left.cmp(right),
        (FieldValue::DateTime(left), FieldValue::DateTime(right)) => left.cmp(right),
        (FieldValue::Uuid(left), FieldValue::Uuid(right)) => left.cmp(right),
        _ => left.as_text().cmp(&right.as_text()),
    }
}
