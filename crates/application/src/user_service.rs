//! User lifecycle operations on top of the generic service.

use tessera_core::AppResult;
use tessera_domain::{EmailAddress, FieldValue, SocialProvider, Timezone, User};

use crate::{EntityInput, GenericService, Propagation, Session};

/// Identity data presented at sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInData {
    /// Owning tenant.
    pub tenant_id: Option<i64>,
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Avatar URL.
    pub avatar: Option<String>,
    /// Identity provider.
    pub soc_type: SocialProvider,
    /// Provider token.
    pub soc_token: String,
    /// Push notification token.
    pub firebase_token: String,
    /// Timezone identifier.
    pub timezone: String,
}

impl EntityInput for SignInData {
    fn changes(&self) -> Vec<(&'static str, FieldValue)> {
        vec![
            ("tenant_id", self.tenant_id.into()),
            ("name", self.name.clone().into()),
            ("email", self.email.clone().into()),
            ("avatar", self.avatar.clone().into()),
            ("soc_type", self.soc_type.as_str().into()),
            ("soc_token", self.soc_token.clone().into()),
            ("firebase_token", self.firebase_token.clone().into()),
            ("timezone", self.timezone.clone().into()),
        ]
    }
}

/// Profile attributes a user may change; `None` leaves the attribute as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChanges {
    /// New display name.
    pub name: Option<String>,
    /// New avatar URL; `Some(None)` clears it.
    pub avatar: Option<Option<String>>,
    /// New push notification token.
    pub firebase_token: Option<String>,
    /// New timezone identifier.
    pub timezone: Option<String>,
}

impl EntityInput for UserChanges {
    fn changes(&self) -> Vec<(&'static str, FieldValue)> {
        let mut changes = Vec::new();
        if let Some(name) = &self.name {
            changes.push(("name", name.clone().into()));
        }
        if let Some(avatar) = &self.avatar {
            changes.push(("avatar", avatar.clone().into()));
        }
        if let Some(token) = &self.firebase_token {
            changes.push(("firebase_token", token.clone().into()));
        }
        if let Some(timezone) = &self.timezone {
            changes.push(("timezone", timezone.clone().into()));
        }
        changes
    }
}

/// Application service for users.
#[derive(Clone, Default)]
pub struct UserService {
    users: GenericService<User>,
}

impl UserService {
    /// Creates a user service.
    #[must_use]
    pub fn new() -> Self {
        Self {
            users: GenericService::new(),
        }
    }

    /// Returns the generic operations for users.
    #[must_use]
    pub fn users(&self) -> &GenericService<User> {
        &self.users
    }

    /// Registers a user from sign-in data.
    pub async fn create_user(&self, session: &Session, data: SignInData) -> AppResult<User> {
        let data = normalized(data)?;
        session
            .transactional(Propagation::Required, || async {
                self.users.create(session, &data).await
            })
            .await
    }

    /// Returns the user registered with `email`.
    pub async fn find_by_email(&self, session: &Session, email: &str) -> AppResult<User> {
        let email = EmailAddress::new(email)?;
        self.users
            .get_by_field(session, &[], &[("email", email.as_str().into())])
            .await
    }

    /// Signs a user in: registers an unknown email, otherwise refreshes the
    /// stored identity data while keeping the provider the account was
    /// registered with.
    pub async fn update_on_login(&self, session: &Session, data: SignInData) -> AppResult<User> {
        let data = normalized(data)?;
        session
            .transactional(Propagation::Required, || async {
                let registered = self
                    .users
                    .repository()
                    .get(session, &[], &[("email", data.email.as_str().into())])
                    .await?;
                let Some(user) = registered else {
                    return self.users.create(session, &data).await;
                };

                let updates: Vec<(&str, FieldValue)> = data
                    .changes()
                    .into_iter()
                    .filter(|(name, _)| *name != "soc_type")
                    .collect();
                self.users
                    .repository()
                    .update(session, &updates, None, Some(&user))
                    .await
            })
            .await
    }

    /// Applies profile changes to the user with key `pk`.
    pub async fn update_profile(
        &self,
        session: &Session,
        pk: i64,
        changes: UserChanges,
    ) -> AppResult<User> {
        if let Some(timezone) = &changes.timezone {
            Timezone::new(timezone.as_str())?;
        }

        self.users.update(session, pk, &changes).await
    }

    /// Marks the user with key `pk` as deleted without removing the row.
    pub async fn mark_deleted(&self, session: &Session, pk: i64) -> AppResult<User> {
        self.users.update(session, pk, &DeletionMark).await
    }
}

struct DeletionMark;

impl EntityInput for DeletionMark {
    fn changes(&self) -> Vec<(&'static str, FieldValue)> {
        vec![("is_deleted", true.into())]
    }
}

fn normalized(data: SignInData) -> AppResult<SignInData> {
    let email = EmailAddress::new(data.email)?;
    let timezone = Timezone::new(data.timezone)?;

    Ok(SignInData {
        email: email.into(),
        timezone: timezone.as_str().to_owned(),
        ..data
    })
}
