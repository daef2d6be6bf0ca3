use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_application::EntityInput;
use tessera_core::{AppResult, NonEmptyString};
use tessera_domain::{FieldValue, Tenant, validate_slug};
use ts_rs::TS;

use crate::dto::UserResponse;

/// Incoming tenant create payload.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/create-tenant-request.ts"
)]
pub struct CreateTenantRequest {
    pub name: String,
    pub slug: String,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
}

fn active_by_default() -> bool {
    true
}

/// Validated tenant create payload.
#[derive(Debug)]
pub struct NewTenant {
    name: NonEmptyString,
    slug: NonEmptyString,
    is_active: bool,
}

impl CreateTenantRequest {
    pub fn validate(self) -> AppResult<NewTenant> {
        Ok(NewTenant {
            name: NonEmptyString::new(self.name.trim())?,
            slug: validate_slug(self.slug.trim())?,
            is_active: self.is_active,
        })
    }
}

impl EntityInput for NewTenant {
    fn changes(&self) -> Vec<(&'static str, FieldValue)> {
        vec![
            ("name", self.name.as_str().into()),
            ("slug", self.slug.as_str().into()),
            ("is_active", self.is_active.into()),
        ]
    }
}

/// API representation of a tenant without its members.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/tenant-summary-response.ts"
)]
pub struct TenantSummaryResponse {
    #[ts(type = "number | null")]
    pub id: Option<i64>,
    pub name: String,
    pub slug: String,
    pub is_active: bool,
    pub created_date: Option<DateTime<Utc>>,
}

impl From<Tenant> for TenantSummaryResponse {
    fn from(value: Tenant) -> Self {
        Self {
            id: value.id,
            name: value.name,
            slug: value.slug,
            is_active: value.is_active,
            created_date: value.created_date,
        }
    }
}

/// API representation of a tenant.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/tenant-response.ts"
)]
pub struct TenantResponse {
    #[ts(type = "number | null")]
    pub id: Option<i64>,
    pub name: String,
    pub slug: String,
    pub is_active: bool,
    pub created_date: Option<DateTime<Utc>>,
    /// Members, present when requested through `select_load=users`.
    pub users: Vec<UserResponse>,
}

impl From<Tenant> for TenantResponse {
    fn from(value: Tenant) -> Self {
        Self {
            id: value.id,
            name: value.name,
            slug: value.slug,
            is_active: value.is_active,
            created_date: value.created_date,
            users: value.users.into_iter().map(UserResponse::from).collect(),
        }
    }
}
