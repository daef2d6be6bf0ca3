use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tessera_core::{AppError, AppResult};
use uuid::Uuid;

use crate::entity::{FieldType, FieldValue};

/// Largest page a list request may ask for.
pub const MAX_PAGE_LIMIT: u32 = 250;

/// Page size used when a request does not specify one.
pub const DEFAULT_PAGE_LIMIT: u32 = 15;

/// Scalar coerced from a raw request string.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    /// `"true"` or `"false"`.
    Boolean(bool),
    /// ISO-8601 date or date-time, normalized to UTC.
    DateTime(DateTime<Utc>),
    /// Decimal integer.
    Integer(i64),
    /// Anything else.
    Text(String),
}

impl ScalarValue {
    /// Coerces a raw string: booleans first, then ISO dates, then integers, else text.
    #[must_use]
    pub fn coerce(raw: &str) -> Self {
        match raw {
            "true" => return Self::Boolean(true),
            "false" => return Self::Boolean(false),
            _ => {}
        }

        if let Some(value) = parse_iso_datetime(raw) {
            return Self::DateTime(value);
        }

        if let Ok(value) = raw.parse::<i64>() {
            return Self::Integer(value);
        }

        Self::Text(raw.to_owned())
    }

    /// Casts the coerced scalar to the storage type of the compared attribute.
    pub fn cast_to(&self, field_type: FieldType) -> AppResult<FieldValue> {
        match (self, field_type) {
            (Self::Boolean(value), FieldType::Boolean) => Ok(FieldValue::Boolean(*value)),
            (Self::Integer(value), FieldType::Integer) => Ok(FieldValue::Integer(*value)),
            (Self::DateTime(value), FieldType::DateTime) => Ok(FieldValue::DateTime(*value)),
            (Self::Text(value), FieldType::Text) => Ok(FieldValue::Text(value.clone())),
            (Self::Boolean(value), FieldType::Text) => Ok(FieldValue::Text(value.to_string())),
            (Self::Integer(value), FieldType::Text) => Ok(FieldValue::Text(value.to_string())),
            (Self::DateTime(value), FieldType::Text) => Ok(FieldValue::Text(value.to_rfc3339())),
            (Self::Text(value), FieldType::Uuid) => Uuid::parse_str(value)
                .map(FieldValue::Uuid)
                .map_err(|error| AppError::Validation(format!("invalid uuid '{value}': {error}"))),
            (scalar, field_type) => Err(AppError::Validation(format!(
                "value {} cannot be compared with a {} attribute",
                scalar.describe(),
                field_type.as_str()
            ))),
        }
    }

    /// Casts like [`ScalarValue::cast_to`], except that a text attribute is
    /// compared against the request string verbatim when one is known.
    pub fn cast_with_raw(
        &self,
        raw: Option<&str>,
        field_type: FieldType,
    ) -> AppResult<FieldValue> {
        match (raw, field_type) {
            (Some(raw), FieldType::Text) => Ok(FieldValue::Text(raw.to_owned())),
            _ => self.cast_to(field_type),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Boolean(value) => format!("'{value}'"),
            Self::DateTime(value) => format!("'{}'", value.to_rfc3339()),
            Self::Integer(value) => format!("'{value}'"),
            Self::Text(value) => format!("'{value}'"),
        }
    }
}

fn parse_iso_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(value) = DateTime::parse_from_rfc3339(raw) {
        return Some(value.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(value) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(value.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|value| value.and_utc())
}

/// Value side of a [`FilterItem`].
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Compare the named attribute against a scalar.
    Scalar {
        /// Coerced value.
        value: ScalarValue,
        /// Request string the value was coerced from, if any.
        raw: Option<String>,
    },
    /// Evaluate a nested item against the named relation.
    Nested(Box<FilterItem>),
}

/// Equality condition on an attribute, or on an attribute of a related entity.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterItem {
    /// Attribute or relation name.
    pub name: String,
    /// Scalar or nested item.
    pub value: FilterValue,
}

impl FilterItem {
    /// Creates a scalar item from a raw request string, applying coercion.
    #[must_use]
    pub fn coerced(name: impl Into<String>, raw: &str) -> Self {
        Self {
            name: name.into(),
            value: FilterValue::Scalar {
                value: ScalarValue::coerce(raw),
                raw: Some(raw.to_owned()),
            },
        }
    }

    /// Creates a scalar item from an already typed scalar.
    #[must_use]
    pub fn scalar(name: impl Into<String>, value: ScalarValue) -> Self {
        Self {
            name: name.into(),
            value: FilterValue::Scalar { value, raw: None },
        }
    }

    /// Creates an item evaluated against a relation.
    #[must_use]
    pub fn nested(relation: impl Into<String>, item: FilterItem) -> Self {
        Self {
            name: relation.into(),
            value: FilterValue::Nested(Box::new(item)),
        }
    }

    /// Returns how many relations the item traverses.
    #[must_use]
    pub fn depth(&self) -> usize {
        match &self.value {
            FilterValue::Scalar { .. } => 0,
            FilterValue::Nested(item) => 1 + item.depth(),
        }
    }
}

/// OR-block and AND-block of filter items; the two blocks are conjoined.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSchema {
    /// Items of which at least one must hold.
    pub filters_or: Vec<FilterItem>,
    /// Items which must all hold.
    pub filters_and: Vec<FilterItem>,
}

impl FilterSchema {
    /// Returns true when neither block carries an item.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters_or.is_empty() && self.filters_and.is_empty()
    }
}

/// Value side of a [`SearchItem`].
#[derive(Debug, Clone, PartialEq)]
pub enum SearchValue {
    /// Substring expected inside the named attribute.
    Text(String),
    /// Evaluate a nested item against the named relation.
    Nested(Box<SearchItem>),
}

/// Substring containment condition.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchItem {
    /// Attribute or relation name.
    pub name: String,
    /// Needle or nested item.
    pub value: SearchValue,
}

impl SearchItem {
    /// Creates a containment item on an attribute.
    #[must_use]
    pub fn text(name: impl Into<String>, needle: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: SearchValue::Text(needle.into()),
        }
    }

    /// Creates an item evaluated against a relation.
    #[must_use]
    pub fn nested(relation: impl Into<String>, item: SearchItem) -> Self {
        Self {
            name: relation.into(),
            value: SearchValue::Nested(Box::new(item)),
        }
    }

    /// Returns how many relations the item traverses.
    #[must_use]
    pub fn depth(&self) -> usize {
        match &self.value {
            SearchValue::Text(_) => 0,
            SearchValue::Nested(item) => 1 + item.depth(),
        }
    }
}

/// Search terms combined with logical OR.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchSchema {
    /// Containment items.
    pub search: Vec<SearchItem>,
}

impl SearchSchema {
    /// Returns `None` when the schema carries no usable item.
    #[must_use]
    pub fn into_usable(self) -> Option<Self> {
        (!self.search.is_empty()).then_some(self)
    }
}

/// Requested ordering of a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSchema {
    /// Attribute to order by.
    pub sort_field: String,
    /// Descending order when true.
    pub desc: bool,
    /// Primary keys listed first, in this order, ahead of every other row.
    pub sort_case_ids: Option<Vec<i64>>,
}

impl SortSchema {
    /// Creates a plain attribute ordering.
    #[must_use]
    pub fn new(sort_field: impl Into<String>, desc: bool) -> Self {
        Self {
            sort_field: sort_field.into(),
            desc,
            sort_case_ids: None,
        }
    }

    /// Adds an explicit primary key priority list.
    #[must_use]
    pub fn with_case_ids(mut self, ids: Vec<i64>) -> Self {
        self.sort_case_ids = Some(ids);
        self
    }
}

impl Default for SortSchema {
    fn default() -> Self {
        Self::new("id", true)
    }
}

/// Offset pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaddingSchema {
    offset: u64,
    limit: u32,
}

impl PaddingSchema {
    /// Creates a validated window: `limit` must be within `1..=250`.
    pub fn new(offset: u64, limit: u32) -> AppResult<Self> {
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}, got {limit}"
            )));
        }

        Ok(Self { offset, limit })
    }

    /// Returns the number of rows skipped.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns the maximum number of rows returned.
    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }
}

impl Default for PaddingSchema {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}
