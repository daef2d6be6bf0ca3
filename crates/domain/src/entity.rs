use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_core::{AppError, AppResult};
use uuid::Uuid;

/// Storage type of an entity attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Boolean column.
    Boolean,
    /// 64-bit signed integer column.
    Integer,
    /// UTF-8 text column.
    Text,
    /// UTC timestamp column.
    DateTime,
    /// UUID column.
    Uuid,
}

impl FieldType {
    /// Returns a stable name for the field type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Text => "text",
            Self::DateTime => "datetime",
            Self::Uuid => "uuid",
        }
    }
}

/// Dynamically typed attribute value exchanged between entities and stores.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// SQL `NULL` / absent value.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// Integer value.
    Integer(i64),
    /// Text value.
    Text(String),
    /// UTC timestamp value.
    DateTime(DateTime<Utc>),
    /// UUID value.
    Uuid(Uuid),
}

impl FieldValue {
    /// Returns true for [`FieldValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the storage type carried by the value, if any.
    #[must_use]
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            Self::Null => None,
            Self::Boolean(_) => Some(FieldType::Boolean),
            Self::Integer(_) => Some(FieldType::Integer),
            Self::Text(_) => Some(FieldType::Text),
            Self::DateTime(_) => Some(FieldType::DateTime),
            Self::Uuid(_) => Some(FieldType::Uuid),
        }
    }

    /// Returns the integer payload, if this is an integer value.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Renders the value as text the same way a SQL `CAST(.. AS TEXT)` would.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Boolean(value) => Some(value.to_string()),
            Self::Integer(value) => Some(value.to_string()),
            Self::Text(value) => Some(value.clone()),
            Self::DateTime(value) => Some(value.to_rfc3339()),
            Self::Uuid(value) => Some(value.to_string()),
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self.as_text() {
            Some(text) => write!(formatter, "{text}"),
            None => write!(formatter, "null"),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTime(value)
    }
}

impl From<Uuid> for FieldValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl<T> From<Option<T>> for FieldValue
where
    T: Into<FieldValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Conversion from a [`FieldValue`] back into a typed entity attribute.
pub trait FromFieldValue: Sized {
    /// Converts the value or fails with a validation error on type mismatch.
    fn from_field_value(value: FieldValue) -> AppResult<Self>;
}

fn type_mismatch(expected: FieldType, value: &FieldValue) -> AppError {
    AppError::Validation(format!(
        "expected {} value, got {}",
        expected.as_str(),
        value.field_type().map(|kind| kind.as_str()).unwrap_or("null")
    ))
}

impl FromFieldValue for bool {
    fn from_field_value(value: FieldValue) -> AppResult<Self> {
        match value {
            FieldValue::Boolean(value) => Ok(value),
            other => Err(type_mismatch(FieldType::Boolean, &other)),
        }
    }
}

impl FromFieldValue for i64 {
    fn from_field_value(value: FieldValue) -> AppResult<Self> {
        match value {
            FieldValue::Integer(value) => Ok(value),
            other => Err(type_mismatch(FieldType::Integer, &other)),
        }
    }
}

impl FromFieldValue for String {
    fn from_field_value(value: FieldValue) -> AppResult<Self> {
        match value {
            FieldValue::Text(value) => Ok(value),
            other => Err(type_mismatch(FieldType::Text, &other)),
        }
    }
}

impl FromFieldValue for DateTime<Utc> {
    fn from_field_value(value: FieldValue) -> AppResult<Self> {
        match value {
            FieldValue::DateTime(value) => Ok(value),
            other => Err(type_mismatch(FieldType::DateTime, &other)),
        }
    }
}

impl FromFieldValue for Uuid {
    fn from_field_value(value: FieldValue) -> AppResult<Self> {
        match value {
            FieldValue::Uuid(value) => Ok(value),
            other => Err(type_mismatch(FieldType::Uuid, &other)),
        }
    }
}

impl<T> FromFieldValue for Option<T>
where
    T: FromFieldValue,
{
    fn from_field_value(value: FieldValue) -> AppResult<Self> {
        match value {
            FieldValue::Null => Ok(None),
            other => T::from_field_value(other).map(Some),
        }
    }
}

/// Assigns a converted [`FieldValue`] into a typed attribute slot.
pub fn assign<T>(slot: &mut T, value: FieldValue) -> AppResult<()>
where
    T: FromFieldValue,
{
    *slot = T::from_field_value(value)?;
    Ok(())
}

/// Declared attribute of an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    name: &'static str,
    column: &'static str,
    field_type: FieldType,
    nullable: bool,
    generated: bool,
    unique: bool,
    refreshed_on_update: bool,
}

impl FieldDefinition {
    /// Declares a non-null attribute stored in a column of the same name.
    #[must_use]
    pub const fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            column: name,
            field_type,
            nullable: false,
            generated: false,
            unique: false,
            refreshed_on_update: false,
        }
    }

    /// Stores the attribute in a differently named column.
    #[must_use]
    pub const fn with_column(mut self, column: &'static str) -> Self {
        self.column = column;
        self
    }

    /// Marks the attribute as nullable.
    #[must_use]
    pub const fn as_nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Marks the attribute as filled by the store when inserted without a value.
    #[must_use]
    pub const fn as_generated(mut self) -> Self {
        self.generated = true;
        self
    }

    /// Marks the attribute as unique across the table.
    #[must_use]
    pub const fn as_unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks a timestamp attribute the store resets to the current time on every update.
    #[must_use]
    pub const fn as_refreshed_on_update(mut self) -> Self {
        self.refreshed_on_update = true;
        self
    }

    /// Returns the attribute name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the storage column name.
    #[must_use]
    pub fn column(&self) -> &'static str {
        self.column
    }

    /// Returns the storage type.
    #[must_use]
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Returns whether `NULL` is a legal stored value.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Returns whether the store generates the value on insert.
    #[must_use]
    pub fn is_generated(&self) -> bool {
        self.generated
    }

    /// Returns whether two rows may not share a non-null value.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Returns whether the store refreshes the value on update.
    #[must_use]
    pub fn is_refreshed_on_update(&self) -> bool {
        self.refreshed_on_update
    }
}

/// Cardinality of a relation seen from its owning entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationCardinality {
    /// At most one related row (many-to-one).
    ToOne,
    /// Any number of related rows (one-to-many).
    ToMany,
}

/// Declared relation between two entity types.
///
/// A related row belongs to an owner row when
/// `related.remote_field == owner.local_field`.
#[derive(Debug, Clone)]
pub struct RelationDefinition {
    name: &'static str,
    cardinality: RelationCardinality,
    target: fn() -> &'static EntitySchema,
    local_field: &'static str,
    remote_field: &'static str,
}

impl RelationDefinition {
    /// Declares a many-to-one relation through a foreign key on the owner.
    #[must_use]
    pub const fn to_one(
        name: &'static str,
        target: fn() -> &'static EntitySchema,
        foreign_key: &'static str,
        target_key: &'static str,
    ) -> Self {
        Self {
            name,
            cardinality: RelationCardinality::ToOne,
            target,
            local_field: foreign_key,
            remote_field: target_key,
        }
    }

    /// Declares a one-to-many relation through a foreign key on the target.
    #[must_use]
    pub const fn to_many(
        name: &'static str,
        target: fn() -> &'static EntitySchema,
        owner_key: &'static str,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            name,
            cardinality: RelationCardinality::ToMany,
            target,
            local_field: owner_key,
            remote_field: foreign_key,
        }
    }

    /// Returns the relation name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the relation cardinality.
    #[must_use]
    pub fn cardinality(&self) -> RelationCardinality {
        self.cardinality
    }

    /// Returns the related entity schema.
    #[must_use]
    pub fn target(&self) -> &'static EntitySchema {
        (self.target)()
    }

    /// Returns the owner-side join attribute name.
    #[must_use]
    pub fn local_field(&self) -> &'static str {
        self.local_field
    }

    /// Returns the target-side join attribute name.
    #[must_use]
    pub fn remote_field(&self) -> &'static str {
        self.remote_field
    }
}

/// Type-erased descriptor of an entity table.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    name: &'static str,
    table: &'static str,
    primary_key: &'static str,
    fields: Vec<FieldDefinition>,
    relations: Vec<RelationDefinition>,
}

impl EntitySchema {
    /// Creates a schema; call [`EntitySchema::validate`] in tests to check declarations.
    #[must_use]
    pub fn new(
        name: &'static str,
        table: &'static str,
        primary_key: &'static str,
        fields: Vec<FieldDefinition>,
        relations: Vec<RelationDefinition>,
    ) -> Self {
        Self {
            name,
            table,
            primary_key,
            fields,
            relations,
        }
    }

    /// Returns the entity name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the storage table name.
    #[must_use]
    pub fn table(&self) -> &'static str {
        self.table
    }

    /// Returns all declared attributes in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    /// Returns all declared relations.
    #[must_use]
    pub fn relations(&self) -> &[RelationDefinition] {
        &self.relations
    }

    /// Looks up an attribute by name.
    pub fn field(&self, name: &str) -> AppResult<&FieldDefinition> {
        self.fields
            .iter()
            .find(|field| field.name() == name)
            .ok_or_else(|| {
                AppError::FieldNotFound(format!("'{}' on entity '{}'", name, self.name))
            })
    }

    /// Looks up a relation by name.
    pub fn relation(&self, name: &str) -> AppResult<&RelationDefinition> {
        self.relations
            .iter()
            .find(|relation| relation.name() == name)
            .ok_or_else(|| {
                AppError::FieldNotFound(format!("relation '{}' on entity '{}'", name, self.name))
            })
    }

    /// Returns the primary key attribute.
    pub fn primary_key(&self) -> AppResult<&FieldDefinition> {
        self.field(self.primary_key).map_err(|_| {
            AppError::Internal(format!(
                "entity '{}' declares missing primary key '{}'",
                self.name, self.primary_key
            ))
        })
    }

    /// Checks that the primary key and every relation key are declared attributes.
    pub fn validate(&self) -> AppResult<()> {
        self.primary_key()?;

        for relation in &self.relations {
            self.field(relation.local_field()).map_err(|_| {
                AppError::Internal(format!(
                    "relation '{}' on entity '{}' uses undeclared key '{}'",
                    relation.name(),
                    self.name,
                    relation.local_field()
                ))
            })?;
            relation
                .target()
                .field(relation.remote_field())
                .map_err(|_| {
                    AppError::Internal(format!(
                        "relation '{}' on entity '{}' targets undeclared key '{}'",
                        relation.name(),
                        self.name,
                        relation.remote_field()
                    ))
                })?;
        }

        Ok(())
    }
}

/// Store-level representation of one entity row and its eagerly loaded relations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityRow {
    values: BTreeMap<String, FieldValue>,
    related: BTreeMap<String, Vec<EntityRow>>,
}

impl EntityRow {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the row with one more attribute value.
    #[must_use]
    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Sets an attribute value.
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.values.insert(name.into(), value);
    }

    /// Returns an attribute value; missing attributes read as `NULL`.
    #[must_use]
    pub fn value(&self, name: &str) -> &FieldValue {
        self.values.get(name).unwrap_or(&FieldValue::Null)
    }

    /// Returns all attribute values keyed by attribute name.
    #[must_use]
    pub fn values(&self) -> &BTreeMap<String, FieldValue> {
        &self.values
    }

    /// Replaces the rows loaded for a relation.
    pub fn set_related(&mut self, relation: impl Into<String>, rows: Vec<EntityRow>) {
        self.related.insert(relation.into(), rows);
    }

    /// Returns mutable access to rows loaded for a relation.
    pub fn related_mut(&mut self, relation: &str) -> Option<&mut Vec<EntityRow>> {
        self.related.get_mut(relation)
    }

    /// Returns rows loaded for a relation.
    #[must_use]
    pub fn related(&self, relation: &str) -> &[EntityRow] {
        self.related
            .get(relation)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Splits the row into attribute values and loaded relations.
    #[must_use]
    pub fn into_parts(
        self,
    ) -> (
        BTreeMap<String, FieldValue>,
        BTreeMap<String, Vec<EntityRow>>,
    ) {
        (self.values, self.related)
    }
}

/// Reads one attribute from a typed entity.
pub type FieldGetter<T> = fn(&T) -> FieldValue;

/// Writes one attribute into a typed entity.
pub type FieldSetter<T> = fn(&mut T, FieldValue) -> AppResult<()>;

/// Attaches eagerly loaded rows for one relation to a typed entity.
pub type RelationAttacher<T> = fn(&mut T, Vec<EntityRow>) -> AppResult<()>;

struct FieldAccessor<T> {
    getter: FieldGetter<T>,
    setter: FieldSetter<T>,
}

/// Name-indexed typed accessors for one entity type, built once per process.
pub struct FieldRegistry<T> {
    entity_name: &'static str,
    fields: BTreeMap<&'static str, FieldAccessor<T>>,
    relations: BTreeMap<&'static str, RelationAttacher<T>>,
}

impl<T> FieldRegistry<T> {
    /// Creates an empty registry for an entity.
    #[must_use]
    pub fn new(entity_name: &'static str) -> Self {
        Self {
            entity_name,
            fields: BTreeMap::new(),
            relations: BTreeMap::new(),
        }
    }

    /// Registers a getter/setter pair for an attribute.
    #[must_use]
    pub fn field(
        mut self,
        name: &'static str,
        getter: FieldGetter<T>,
        setter: FieldSetter<T>,
    ) -> Self {
        self.fields.insert(name, FieldAccessor { getter, setter });
        self
    }

    /// Registers the attach function for a relation.
    #[must_use]
    pub fn relation(mut self, name: &'static str, attacher: RelationAttacher<T>) -> Self {
        self.relations.insert(name, attacher);
        self
    }

    /// Returns whether an attribute with the given name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Reads an attribute by name.
    pub fn read(&self, entity: &T, name: &str) -> AppResult<FieldValue> {
        self.fields
            .get(name)
            .map(|accessor| (accessor.getter)(entity))
            .ok_or_else(|| {
                AppError::FieldNotFound(format!("'{}' on entity '{}'", name, self.entity_name))
            })
    }

    /// Writes an attribute by name.
    pub fn write(&self, entity: &mut T, name: &str, value: FieldValue) -> AppResult<()> {
        let accessor = self.fields.get(name).ok_or_else(|| {
            AppError::InvalidAttribute(format!(
                "'{}' is not a valid attribute of '{}'",
                name, self.entity_name
            ))
        })?;

        (accessor.setter)(entity, value)
    }

    /// Attaches eagerly loaded rows for a relation.
    pub fn attach(&self, entity: &mut T, relation: &str, rows: Vec<EntityRow>) -> AppResult<()> {
        let attacher = self.relations.get(relation).ok_or_else(|| {
            AppError::FieldNotFound(format!(
                "relation '{}' on entity '{}'",
                relation, self.entity_name
            ))
        })?;

        attacher(entity, rows)
    }
}

/// Typed entity backed by an [`EntitySchema`] and a [`FieldRegistry`].
pub trait Entity: Clone + Default + Send + Sync + 'static {
    /// Returns the table descriptor.
    fn schema() -> &'static EntitySchema;

    /// Returns the typed accessor registry.
    fn registry() -> &'static FieldRegistry<Self>;

    /// Reads every declared attribute into a row.
    fn to_row(&self) -> AppResult<EntityRow> {
        let registry = Self::registry();
        let mut row = EntityRow::new();
        for field in Self::schema().fields() {
            row.insert(field.name(), registry.read(self, field.name())?);
        }

        Ok(row)
    }

    /// Builds an entity from a store row, attaching any eagerly loaded relations.
    fn from_row(row: EntityRow) -> AppResult<Self> {
        let registry = Self::registry();
        let mut entity = Self::default();
        let (values, related) = row.into_parts();

        for (name, value) in values {
            registry.write(&mut entity, name.as_str(), value)?;
        }

        for (relation, rows) in related {
            registry.attach(&mut entity, relation.as_str(), rows)?;
        }

        Ok(entity)
    }

    /// Returns the primary key value.
    fn primary_key_value(&self) -> AppResult<FieldValue> {
        Self::registry().read(self, Self::schema().primary_key()?.name())
    }
}
