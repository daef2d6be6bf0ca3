use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};
use tessera_application::{FieldPath, Predicate, QueryPlan, SortKey};
use tessera_core::{AppError, AppResult};
use tessera_domain::{EntityRow, EntitySchema, FieldDefinition, FieldType, FieldValue};
use uuid::Uuid;

type Builder = QueryBuilder<'static, Postgres>;

const ROOT_ALIAS: &str = "root";
const RELATED_ALIAS: &str = "related";

pub(super) fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Escapes `LIKE` wildcards so the needle matches literally.
fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for character in needle.chars() {
        if matches!(character, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(character);
    }
    escaped
}

pub(super) fn render_select(plan: &QueryPlan) -> AppResult<Builder> {
    let mut builder = Builder::new("SELECT ");
    for (index, field) in plan.entity.fields().iter().enumerate() {
        if index > 0 {
            builder.push(", ");
        }
        push_column(&mut builder, ROOT_ALIAS, field);
    }
    push_from(&mut builder, plan.entity);
    push_where(&mut builder, plan);
    push_ordering(&mut builder, &plan.ordering);

    if let Some(window) = plan.window {
        let offset = i64::try_from(window.offset).map_err(|error| {
            AppError::Validation(format!("invalid offset {}: {error}", window.offset))
        })?;
        builder.push(" LIMIT ");
        builder.push_bind(i64::from(window.limit));
        builder.push(" OFFSET ");
        builder.push_bind(offset);
    }

    Ok(builder)
}

pub(super) fn render_count(plan: &QueryPlan, by_field: &FieldDefinition) -> AppResult<Builder> {
    let mut builder = Builder::new("SELECT COUNT(");
    push_column(&mut builder, ROOT_ALIAS, by_field);
    builder.push(")");
    push_from(&mut builder, plan.entity);
    push_where(&mut builder, plan);
    Ok(builder)
}

pub(super) fn render_insert(
    schema: &EntitySchema,
    row: &EntityRow,
    returning: bool,
) -> AppResult<Builder> {
    let fields: Vec<&FieldDefinition> = schema
        .fields()
        .iter()
        .filter(|field| !(field.is_generated() && row.value(field.name()).is_null()))
        .collect();

    let mut builder = Builder::new("INSERT INTO ");
    builder.push(quote_identifier(schema.table()));

    if fields.is_empty() {
        builder.push(" DEFAULT VALUES");
    } else {
        builder.push(" (");
        for (index, field) in fields.iter().enumerate() {
            if index > 0 {
                builder.push(", ");
            }
            builder.push(quote_identifier(field.column()));
        }
        builder.push(") VALUES (");
        for (index, field) in fields.iter().enumerate() {
            if index > 0 {
                builder.push(", ");
            }
            push_value(&mut builder, field.field_type(), row.value(field.name()));
        }
        builder.push(")");
    }

    if returning {
        builder.push(" RETURNING ");
        for (index, field) in schema.fields().iter().enumerate() {
            if index > 0 {
                builder.push(", ");
            }
            builder.push(quote_identifier(field.column()));
        }
    }

    Ok(builder)
}

pub(super) fn render_update(
    schema: &EntitySchema,
    key: &FieldValue,
    assignments: &[(&'static FieldDefinition, FieldValue)],
) -> AppResult<Builder> {
    if assignments.is_empty() {
        return Err(AppError::Internal(format!(
            "update of '{}' row {key} carries no assignments",
            schema.table()
        )));
    }

    let primary_key = schema.primary_key()?;
    let mut builder = Builder::new("UPDATE ");
    builder.push(quote_identifier(schema.table()));
    builder.push(" SET ");

    for (index, (field, value)) in assignments.iter().enumerate() {
        if index > 0 {
            builder.push(", ");
        }
        builder.push(quote_identifier(field.column()));
        builder.push(" = ");
        push_value(&mut builder, field.field_type(), value);
    }

    for field in schema.fields().iter().filter(|field| {
        field.is_refreshed_on_update()
            && !assignments
                .iter()
                .any(|(assigned, _)| assigned.name() == field.name())
    }) {
        builder.push(", ");
        builder.push(quote_identifier(field.column()));
        builder.push(" = now()");
    }

    builder.push(" WHERE ");
    builder.push(quote_identifier(primary_key.column()));
    builder.push(" = ");
    push_value(&mut builder, primary_key.field_type(), key);

    Ok(builder)
}

pub(super) fn render_delete(schema: &EntitySchema, key: &FieldValue) -> AppResult<Builder> {
    let primary_key = schema.primary_key()?;
    let mut builder = Builder::new("DELETE FROM ");
    builder.push(quote_identifier(schema.table()));
    builder.push(" WHERE ");
    builder.push(quote_identifier(primary_key.column()));
    builder.push(" = ");
    push_value(&mut builder, primary_key.field_type(), key);
    Ok(builder)
}

fn push_from(builder: &mut Builder, schema: &EntitySchema) {
    builder.push(" FROM ");
    builder.push(quote_identifier(schema.table()));
    builder.push(" ");
    builder.push(ROOT_ALIAS);
}

fn push_column(builder: &mut Builder, alias: &str, field: &FieldDefinition) {
    builder.push(alias);
    builder.push(".");
    builder.push(quote_identifier(field.column()));
}

fn push_value(builder: &mut Builder, field_type: FieldType, value: &FieldValue) {
    match value {
        FieldValue::Null => match field_type {
            FieldType::Boolean => builder.push_bind(None::<bool>),
            FieldType::Integer => builder.push_bind(None::<i64>),
            FieldType::Text => builder.push_bind(None::<String>),
            FieldType::DateTime => builder.push_bind(None::<DateTime<Utc>>),
            FieldType::Uuid => builder.push_bind(None::<Uuid>),
        },
        FieldValue::Boolean(value) => builder.push_bind(*value),
        FieldValue::Integer(value) => builder.push_bind(*value),
        FieldValue::Text(value) => builder.push_bind(value.clone()),
        FieldValue::DateTime(value) => builder.push_bind(*value),
        FieldValue::Uuid(value) => builder.push_bind(*value),
    };
}

fn push_where(builder: &mut Builder, plan: &QueryPlan) {
    for (index, predicate) in plan.predicates.iter().enumerate() {
        builder.push(if index == 0 { " WHERE " } else { " AND " });
        push_predicate(builder, predicate);
    }
}

fn push_predicate(builder: &mut Builder, predicate: &Predicate) {
    match predicate {
        Predicate::Equals { path, value } => push_scoped(builder, path, |builder, alias, field| {
            push_column(builder, alias, field);
            if value.is_null() {
                builder.push(" IS NULL");
            } else {
                builder.push(" = ");
                push_value(builder, field.field_type(), value);
            }
        }),
        Predicate::Contains { path, needle } => {
            push_scoped(builder, path, |builder, alias, field| {
                builder.push("CAST(");
                push_column(builder, alias, field);
                builder.push(" AS TEXT) LIKE ");
                builder.push_bind(format!("%{}%", escape_like(needle)));
                builder.push(" ESCAPE '\\'");
            });
        }
        Predicate::OneOf { field, values } => {
            if values.is_empty() {
                builder.push("FALSE");
                return;
            }
            push_column(builder, ROOT_ALIAS, field);
            builder.push(" IN (");
            for (index, value) in values.iter().enumerate() {
                if index > 0 {
                    builder.push(", ");
                }
                push_value(builder, field.field_type(), value);
            }
            builder.push(")");
        }
        Predicate::All(children) => push_group(builder, children, " AND ", "TRUE"),
        Predicate::Any(children) => push_group(builder, children, " OR ", "FALSE"),
    }
}

fn push_group(builder: &mut Builder, children: &[Predicate], separator: &str, empty: &str) {
    if children.is_empty() {
        builder.push(empty);
        return;
    }

    builder.push("(");
    for (index, child) in children.iter().enumerate() {
        if index > 0 {
            builder.push(separator);
        }
        push_predicate(builder, child);
    }
    builder.push(")");
}

/// Renders a condition on the path's attribute, wrapping related attributes in `EXISTS`.
fn push_scoped(
    builder: &mut Builder,
    path: &FieldPath,
    condition: impl FnOnce(&mut Builder, &str, &FieldDefinition),
) {
    match path {
        FieldPath::Root(field) => condition(builder, ROOT_ALIAS, field),
        FieldPath::Related {
            relation,
            local,
            remote,
            field,
        } => {
            builder.push("EXISTS (SELECT 1 FROM ");
            builder.push(quote_identifier(relation.target().table()));
            builder.push(" ");
            builder.push(RELATED_ALIAS);
            builder.push(" WHERE ");
            push_column(builder, RELATED_ALIAS, remote);
            builder.push(" = ");
            push_column(builder, ROOT_ALIAS, local);
            builder.push(" AND ");
            condition(builder, RELATED_ALIAS, field);
            builder.push(")");
        }
    }
}

fn push_ordering(builder: &mut Builder, ordering: &[SortKey]) {
    let mut first = true;
    for key in ordering {
        match key {
            SortKey::KeyPriority { ids, .. } if ids.is_empty() => continue,
            _ => {}
        }

        builder.push(if first { " ORDER BY " } else { ", " });
        first = false;

        match key {
            SortKey::KeyPriority { key, ids } => {
                builder.push("CASE ");
                push_column(builder, ROOT_ALIAS, key);
                for (rank, id) in ids.iter().enumerate() {
                    builder.push(" WHEN ");
                    builder.push_bind(*id);
                    builder.push(" THEN ");
                    builder.push_bind(i64::try_from(rank).unwrap_or(i64::MAX));
                }
                builder.push(" ELSE ");
                builder.push_bind(i64::try_from(ids.len()).unwrap_or(i64::MAX));
                builder.push(" END");
            }
            SortKey::Field { field, descending } => {
                push_column(builder, ROOT_ALIAS, field);
                builder.push(if *descending {
                    " DESC NULLS FIRST"
                } else {
                    " ASC NULLS LAST"
                });
            }
        }
    }
}
