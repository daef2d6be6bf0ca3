use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use tessera_core::{AppError, AppResult, NonEmptyString};

use crate::entity::{
    Entity, EntityRow, EntitySchema, FieldDefinition, FieldRegistry, FieldType, RelationDefinition,
    assign,
};
use crate::user::User;

/// Partition owning a set of users.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tenant {
    /// Store-generated primary key; `None` until flushed.
    pub id: Option<i64>,
    /// Display name.
    pub name: String,
    /// Unique URL-safe handle.
    pub slug: String,
    /// Whether members can sign in.
    pub is_active: bool,
    /// Store-generated creation timestamp.
    pub created_date: Option<DateTime<Utc>>,
    /// Eagerly loaded members.
    pub users: Vec<User>,
}

/// Validates a tenant slug: lower-case ASCII letters, digits and dashes.
pub fn validate_slug(slug: &str) -> AppResult<NonEmptyString> {
    let slug = NonEmptyString::new(slug)?;
    let well_formed = slug
        .as_str()
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
        && !slug.as_str().starts_with('-')
        && !slug.as_str().ends_with('-');

    if !well_formed {
        return Err(AppError::Validation(format!(
            "tenant slug '{}' must contain only lower-case letters, digits and inner dashes",
            slug.as_str()
        )));
    }

    Ok(slug)
}

static TENANT_SCHEMA: LazyLock<EntitySchema> = LazyLock::new(|| {
    EntitySchema::new(
        "tenant",
        "tenants",
        "id",
        vec![
            FieldDefinition::new("id", FieldType::Integer).as_generated(),
            FieldDefinition::new("name", FieldType::Text),
            FieldDefinition::new("slug", FieldType::Text).as_unique(),
            FieldDefinition::new("is_active", FieldType::Boolean),
            FieldDefinition::new("created_date", FieldType::DateTime).as_generated(),
        ],
        vec![RelationDefinition::to_many(
            "users",
            User::schema,
            "id",
            "tenant_id",
        )],
    )
});

static TENANT_REGISTRY: LazyLock<FieldRegistry<Tenant>> = LazyLock::new(|| {
    FieldRegistry::<Tenant>::new("tenant")
        .field(
            "id",
            |tenant| tenant.id.into(),
            |tenant, value| assign(&mut tenant.id, value),
        )
        .field(
            "name",
            |tenant| tenant.name.clone().into(),
            |tenant, value| assign(&mut tenant.name, value),
        )
        .field(
            "slug",
            |tenant| tenant.slug.clone().into(),
            |tenant, value| assign(&mut tenant.slug, value),
        )
        .field(
            "is_active",
            |tenant| tenant.is_active.into(),
            |tenant, value| assign(&mut tenant.is_active, value),
        )
        .field(
            "created_date",
            |tenant| tenant.created_date.into(),
            |tenant, value| assign(&mut tenant.created_date, value),
        )
        .relation("users", attach_users)
});

fn attach_users(tenant: &mut Tenant, rows: Vec<EntityRow>) -> AppResult<()> {
    tenant.users = rows
        .into_iter()
        .map(User::from_row)
        .collect::<AppResult<Vec<_>>>()?;
    Ok(())
}

impl Entity for Tenant {
    fn schema() -> &'static EntitySchema {
        &TENANT_SCHEMA
    }

    fn registry() -> &'static FieldRegistry<Self> {
        &TENANT_REGISTRY
    }
}
