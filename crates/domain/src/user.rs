//! User entity and the value rules applied to its attributes.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_core::{AppError, AppResult};

use crate::entity::{
    Entity, EntityRow, EntitySchema, FieldDefinition, FieldRegistry, FieldType, FieldValue,
    RelationDefinition, assign,
};
use crate::tenant::Tenant;

/// Validated email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Creates a validated, lower-cased email address.
    ///
    /// Performs basic structural validation: non-empty, contains exactly one `@`,
    /// local part and domain are non-empty, domain contains at least one `.`.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let trimmed = value.trim().to_lowercase();

        if trimmed.is_empty() {
            return Err(AppError::Validation(
                "email address must not be empty".to_owned(),
            ));
        }

        let Some((local, domain)) = trimmed.split_once('@') else {
            return Err(AppError::Validation(
                "email address must contain exactly one '@'".to_owned(),
            ));
        };

        if local.is_empty() {
            return Err(AppError::Validation(
                "email local part must not be empty".to_owned(),
            ));
        }

        if domain.is_empty() || domain.contains('@') || !domain.contains('.') {
            return Err(AppError::Validation(
                "email domain must contain at least one '.'".to_owned(),
            ));
        }

        if trimmed.len() > 254 {
            return Err(AppError::Validation(
                "email address must not exceed 254 characters".to_owned(),
            ));
        }

        Ok(Self(trimmed))
    }

    /// Returns the validated email string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<EmailAddress> for String {
    fn from(value: EmailAddress) -> Self {
        value.0
    }
}

/// IANA-shaped timezone identifier such as `Europe/Berlin` or `UTC`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timezone(String);

impl Timezone {
    /// Creates a timezone identifier, rejecting values that cannot be IANA names.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value == "UTC" || value == "GMT" {
            return Ok(Self(value));
        }

        let well_formed = value.len() <= 128
            && value.split('/').count() >= 2
            && value.split('/').all(|segment| {
                !segment.is_empty()
                    && segment
                        .chars()
                        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '+'))
            });

        if !well_formed {
            return Err(AppError::Validation(format!("wrong timezone '{value}'")));
        }

        Ok(Self(value))
    }

    /// Returns the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self("UTC".to_owned())
    }
}

/// Identity provider a user signed in with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocialProvider {
    /// Email and password.
    Email,
    /// Google sign-in.
    Google,
    /// Sign in with Apple.
    Apple,
    /// Facebook login.
    Facebook,
}

impl SocialProvider {
    /// Returns the storage string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Google => "google",
            Self::Apple => "apple",
            Self::Facebook => "facebook",
        }
    }
}

impl FromStr for SocialProvider {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "email" => Ok(Self::Email),
            "google" => Ok(Self::Google),
            "apple" => Ok(Self::Apple),
            "facebook" => Ok(Self::Facebook),
            _ => Err(AppError::Validation(format!(
                "unknown social provider '{value}'"
            ))),
        }
    }
}

/// Signed-in user of a tenant.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// Store-generated primary key; `None` until flushed.
    pub id: Option<i64>,
    /// Owning tenant.
    pub tenant_id: Option<i64>,
    /// Display name.
    pub name: String,
    /// Unique email address.
    pub email: String,
    /// Avatar URL.
    pub avatar: Option<String>,
    /// Identity provider storage string.
    pub soc_type: String,
    /// Last provider token presented at sign-in.
    pub soc_token: String,
    /// Push notification token.
    pub firebase_token: String,
    /// Timezone identifier.
    pub timezone: String,
    /// Logical deletion marker.
    pub is_deleted: bool,
    /// Store-generated creation timestamp.
    pub created_date: Option<DateTime<Utc>>,
    /// Store-generated last event timestamp.
    pub event_date: Option<DateTime<Utc>>,
    /// Eagerly loaded tenant.
    pub tenant: Option<Box<Tenant>>,
}

impl Default for User {
    fn default() -> Self {
        Self {
            id: None,
            tenant_id: None,
            name: String::new(),
            email: String::new(),
            avatar: None,
            soc_type: SocialProvider::Email.as_str().to_owned(),
            soc_token: String::new(),
            firebase_token: String::new(),
            timezone: Timezone::default().as_str().to_owned(),
            is_deleted: false,
            created_date: None,
            event_date: None,
            tenant: None,
        }
    }
}

static USER_SCHEMA: LazyLock<EntitySchema> = LazyLock::new(|| {
    EntitySchema::new(
        "user",
        "users",
        "id",
        vec![
            FieldDefinition::new("id", FieldType::Integer).as_generated(),
            FieldDefinition::new("tenant_id", FieldType::Integer).as_nullable(),
            FieldDefinition::new("name", FieldType::Text),
            FieldDefinition::new("email", FieldType::Text).as_unique(),
            FieldDefinition::new("avatar", FieldType::Text).as_nullable(),
            FieldDefinition::new("soc_type", FieldType::Text),
            FieldDefinition::new("soc_token", FieldType::Text),
            FieldDefinition::new("firebase_token", FieldType::Text),
            FieldDefinition::new("timezone", FieldType::Text),
            FieldDefinition::new("is_deleted", FieldType::Boolean),
            FieldDefinition::new("created_date", FieldType::DateTime).as_generated(),
            FieldDefinition::new("event_date", FieldType::DateTime)
                .as_generated()
                .as_refreshed_on_update(),
        ],
        vec![RelationDefinition::to_one(
            "tenant",
            Tenant::schema,
            "tenant_id",
            "id",
        )],
    )
});

static USER_REGISTRY: LazyLock<FieldRegistry<User>> = LazyLock::new(|| {
    FieldRegistry::<User>::new("user")
        .field("id", |user| user.id.into(), |user, value| assign(&mut user.id, value))
        .field(
            "tenant_id",
            |user| user.tenant_id.into(),
            |user, value| assign(&mut user.tenant_id, value),
        )
        .field(
            "name",
            |user| user.name.clone().into(),
            |user, value| assign(&mut user.name, value),
        )
        .field(
            "email",
            |user| user.email.clone().into(),
            |user, value| assign(&mut user.email, value),
        )
        .field(
            "avatar",
            |user| user.avatar.clone().into(),
            |user, value| assign(&mut user.avatar, value),
        )
        .field(
            "soc_type",
            |user| user.soc_type.clone().into(),
            |user, value| assign(&mut user.soc_type, value),
        )
        .field(
            "soc_token",
            |user| user.soc_token.clone().into(),
            |user, value| assign(&mut user.soc_token, value),
        )
        .field(
            "firebase_token",
            |user| user.firebase_token.clone().into(),
            |user, value| assign(&mut user.firebase_token, value),
        )
        .field(
            "timezone",
            |user| user.timezone.clone().into(),
            |user, value| assign(&mut user.timezone, value),
        )
        .field(
            "is_deleted",
            |user| user.is_deleted.into(),
            |user, value| assign(&mut user.is_deleted, value),
        )
        .field(
            "created_date",
            |user| user.created_date.into(),
            |user, value| assign(&mut user.created_date, value),
        )
        .field(
            "event_date",
            |user| user.event_date.into(),
            |user, value| assign(&mut user.event_date, value),
        )
        .relation("tenant", attach_tenant)
});

fn attach_tenant(user: &mut User, rows: Vec<EntityRow>) -> AppResult<()> {
    user.tenant = rows
        .into_iter()
        .next()
        .map(Tenant::from_row)
        .transpose()?
        .map(Box::new);
    Ok(())
}

impl Entity for User {
    fn schema() -> &'static EntitySchema {
        &USER_SCHEMA
    }

    fn registry() -> &'static FieldRegistry<Self> {
        &USER_REGISTRY
    }
}

impl User {
    /// Returns the primary key as a field value.
    #[must_use]
    pub fn key(&self) -> FieldValue {
        self.id.into()
    }
}
