use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::PgRow;
use tessera_core::{AppError, AppResult};
use tessera_domain::{EntityRow, EntitySchema, FieldType, FieldValue};
use uuid::Uuid;

pub(super) fn decode_row(schema: &EntitySchema, row: &PgRow) -> AppResult<EntityRow> {
    let mut decoded = EntityRow::new();

    for field in schema.fields() {
        let column = field.column();
        let value = match field.field_type() {
            FieldType::Boolean => row.try_get::<Option<bool>, _>(column).map(FieldValue::from),
            FieldType::Integer => row.try_get::<Option<i64>, _>(column).map(FieldValue::from),
            FieldType::Text => row.try_get::<Option<String>, _>(column).map(FieldValue::from),
            FieldType::DateTime => row
                .try_get::<Option<DateTime<Utc>>, _>(column)
                .map(FieldValue::from),
            FieldType::Uuid => row.try_get::<Option<Uuid>, _>(column).map(FieldValue::from),
        }
        .map_err(|error| {
            AppError::Store(format!(
                "failed to decode column '{}.{column}': {error}",
                schema.table()
            ))
        })?;

        decoded.insert(field.name(), value);
    }

    Ok(decoded)
}
