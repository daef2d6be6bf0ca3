use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tessera_application::{SignInData, UserChanges};
use tessera_core::AppResult;
use tessera_domain::{SocialProvider, User};
use ts_rs::TS;

use crate::dto::TenantSummaryResponse;

/// Incoming user registration payload.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/create-user-request.ts"
)]
pub struct CreateUserRequest {
    #[ts(type = "number | null")]
    pub tenant_id: Option<i64>,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
    /// One of `email`, `google`, `apple`, `facebook`; defaults to `email`.
    pub soc_type: Option<String>,
    #[serde(default)]
    pub soc_token: String,
    #[serde(default)]
    pub firebase_token: String,
    pub timezone: Option<String>,
}

impl CreateUserRequest {
    pub fn into_sign_in(self) -> AppResult<SignInData> {
        let soc_type = match self.soc_type.as_deref() {
            Some(raw) => raw.parse::<SocialProvider>()?,
            None => SocialProvider::Email,
        };

        Ok(SignInData {
            tenant_id: self.tenant_id,
            name: self.name,
            email: self.email,
            avatar: self.avatar,
            soc_type,
            soc_token: self.soc_token,
            firebase_token: self.firebase_token,
            timezone: self.timezone.unwrap_or_else(|| "UTC".to_owned()),
        })
    }
}

/// Incoming user profile patch; absent attributes are left unchanged.
#[derive(Debug, Default, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/update-user-request.ts"
)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    /// `null` clears the avatar.
    #[serde(default, deserialize_with = "present")]
    #[ts(type = "string | null")]
    pub avatar: Option<Option<String>>,
    pub firebase_token: Option<String>,
    pub timezone: Option<String>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl From<UpdateUserRequest> for UserChanges {
    fn from(value: UpdateUserRequest) -> Self {
        Self {
            name: value.name,
            avatar: value.avatar,
            firebase_token: value.firebase_token,
            timezone: value.timezone,
        }
    }
}

/// API representation of a user; provider and device tokens are never exposed.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/user-response.ts"
)]
pub struct UserResponse {
    #[ts(type = "number | null")]
    pub id: Option<i64>,
    #[ts(type = "number | null")]
    pub tenant_id: Option<i64>,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
    pub soc_type: String,
    pub timezone: String,
    pub is_deleted: bool,
    pub created_date: Option<DateTime<Utc>>,
    pub event_date: Option<DateTime<Utc>>,
    /// Owning tenant, present when requested through `select_load=tenant`.
    pub tenant: Option<TenantSummaryResponse>,
}

impl From<User> for UserResponse {
    fn from(value: User) -> Self {
        Self {
            id: value.id,
            tenant_id: value.tenant_id,
            name: value.name,
            email: value.email,
            avatar: value.avatar,
            soc_type: value.soc_type,
            timezone: value.timezone,
            is_deleted: value.is_deleted,
            created_date: value.created_date,
            event_date: value.event_date,
            tenant: value
                .tenant
                .map(|tenant| TenantSummaryResponse::from(*tenant)),
        }
    }
}
