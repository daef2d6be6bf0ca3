use proptest::prelude::*;
use tessera_application::{
    EntityInput, GenericRepository, GenericService, ListOptions, Propagation, Session, SignInData,
    UserChanges, UserService,
};
use tessera_core::AppError;
use tessera_domain::{
    Entity, EntityRow, FieldValue, FilterItem, FilterSchema, PaddingSchema, SearchItem,
    SearchSchema, SocialProvider, SortSchema, Tenant, User,
};

use super::InMemoryStore;

struct NewTenant {
    slug: &'static str,
    is_active: bool,
}

impl EntityInput for NewTenant {
    fn changes(&self) -> Vec<(&'static str, FieldValue)> {
        vec![
            ("name", FieldValue::from(self.slug.to_uppercase())),
            ("slug", FieldValue::from(self.slug)),
            ("is_active", FieldValue::from(self.is_active)),
        ]
    }
}

fn sign_in(tenant_id: Option<i64>, name: &str, email: &str) -> SignInData {
    SignInData {
        tenant_id,
        name: name.to_owned(),
        email: email.to_owned(),
        avatar: None,
        soc_type: SocialProvider::Email,
        soc_token: String::new(),
        firebase_token: String::new(),
        timezone: "UTC".to_owned(),
    }
}

async fn session(store: &InMemoryStore) -> Session {
    Session::open(store)
        .await
        .unwrap_or_else(|_| unreachable!())
}

/// Two tenants; acme (id 1) owns ann, bob and cid, globex (id 2) owns dee.
async fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    let setup = session(&store).await;
    let tenants = GenericService::<Tenant>::new();
    let users = UserService::new();

    for (slug, is_active) in [("acme", true), ("globex", false)] {
        tenants
            .create(&setup, &NewTenant { slug, is_active })
            .await
            .unwrap_or_else(|error| panic!("tenant setup failed: {error}"));
    }

    for (tenant_id, name) in [(1, "Ann"), (1, "Bob"), (1, "Cid"), (2, "Dee")] {
        let email = format!("{}@example.com", name.to_lowercase());
        users
            .create_user(&setup, sign_in(Some(tenant_id), name, &email))
            .await
            .unwrap_or_else(|error| panic!("user setup failed: {error}"));
    }

    store
}

fn names(users: &[User]) -> Vec<&str> {
    users.iter().map(|user| user.name.as_str()).collect()
}

async fn list_users(
    session: &Session,
    padding: PaddingSchema,
    sort: SortSchema,
    filter: Option<FilterSchema>,
) -> (Vec<User>, u64) {
    GenericService::<User>::new()
        .list(session, padding, sort, None, filter, Vec::new())
        .await
        .unwrap_or_else(|error| panic!("list failed: {error}"))
}

#[tokio::test]
async fn generated_values_are_filled_on_create() {
    let store = seeded_store().await;
    let reader = session(&store).await;

    let user = UserService::new()
        .find_by_email(&reader, "  ANN@example.com ")
        .await
        .unwrap_or_else(|error| panic!("lookup failed: {error}"));
    assert_eq!(user.id, Some(1));
    assert!(user.created_date.is_some());
    assert!(user.event_date.is_some());
    assert_eq!(user.timezone, "UTC");
}

#[tokio::test]
async fn and_filters_require_every_condition() {
    let store = seeded_store().await;
    let reader = session(&store).await;

    let (users, total) = list_users(
        &reader,
        PaddingSchema::default(),
        SortSchema::new("name", false),
        Some(FilterSchema {
            filters_or: Vec::new(),
            filters_and: vec![
                FilterItem::coerced("tenant_id", "1"),
                FilterItem::nested("tenant", FilterItem::coerced("slug", "acme")),
                FilterItem::coerced("name", "Bob"),
            ],
        }),
    )
    .await;

    assert_eq!(total, 1);
    assert_eq!(names(&users), vec!["Bob"]);
}

#[tokio::test]
async fn or_block_is_conjoined_with_and_block() {
    let store = seeded_store().await;
    let reader = session(&store).await;

    let (users, total) = list_users(
        &reader,
        PaddingSchema::default(),
        SortSchema::new("name", false),
        Some(FilterSchema {
            filters_or: vec![
                FilterItem::coerced("name", "Ann"),
                FilterItem::coerced("name", "Dee"),
            ],
            filters_and: vec![FilterItem::nested(
                "tenant",
                FilterItem::coerced("is_active", "true"),
            )],
        }),
    )
    .await;

    assert_eq!(total, 1);
    assert_eq!(names(&users), vec!["Ann"]);
}

#[tokio::test]
async fn boolean_literals_filter_boolean_attributes() {
    let store = seeded_store().await;
    let reader = session(&store).await;

    let (tenants, total) = GenericService::<Tenant>::new()
        .list(
            &reader,
            PaddingSchema::default(),
            SortSchema::default(),
            None,
            Some(FilterSchema {
                filters_or: Vec::new(),
                filters_and: vec![FilterItem::coerced("is_active", "true")],
            }),
            Vec::new(),
        )
        .await
        .unwrap_or_else(|error| panic!("list failed: {error}"));

    assert_eq!(total, 1);
    assert_eq!(tenants[0].slug, "acme");
}

#[tokio::test]
async fn numeric_and_date_shaped_text_filters_match_verbatim() {
    let store = seeded_store().await;
    let tenants = GenericService::<Tenant>::new();

    let writer = session(&store).await;
    for slug in ["007", "2024-01-01"] {
        tenants
            .create(&writer, &NewTenant { slug, is_active: true })
            .await
            .unwrap_or_else(|error| panic!("tenant setup failed: {error}"));
    }

    let reader = session(&store).await;
    for slug in ["007", "2024-01-01"] {
        let (found, total) = tenants
            .list(
                &reader,
                PaddingSchema::default(),
                SortSchema::default(),
                None,
                Some(FilterSchema {
                    filters_or: Vec::new(),
                    filters_and: vec![FilterItem::coerced("slug", slug)],
                }),
                Vec::new(),
            )
            .await
            .unwrap_or_else(|error| panic!("list failed: {error}"));

        assert_eq!(total, 1, "slug {slug}");
        assert_eq!(found[0].slug, slug);
    }
}

#[tokio::test]
async fn case_ids_come_first_then_the_sort_field() {
    let store = seeded_store().await;
    let reader = session(&store).await;

    let (users, total) = list_users(
        &reader,
        PaddingSchema::default(),
        SortSchema::new("name", true).with_case_ids(vec![2, 4]),
        None,
    )
    .await;

    assert_eq!(total, 4);
    assert_eq!(names(&users), vec!["Bob", "Dee", "Cid", "Ann"]);
}

#[tokio::test]
async fn search_through_a_to_many_relation_returns_each_owner_once() {
    let store = seeded_store().await;
    let reader = session(&store).await;

    let (tenants, total) = GenericService::<Tenant>::new()
        .list(
            &reader,
            PaddingSchema::default(),
            SortSchema::new("slug", false),
            Some(SearchSchema {
                search: vec![SearchItem::nested(
                    "users",
                    SearchItem::text("email", "@example.com"),
                )],
            }),
            None,
            vec!["users".to_owned()],
        )
        .await
        .unwrap_or_else(|error| panic!("list failed: {error}"));

    assert_eq!(total, 2);
    assert_eq!(tenants.len(), 2);
    assert_eq!(tenants[0].users.len(), 3);
    assert_eq!(tenants[1].users.len(), 1);
}

#[tokio::test]
async fn eager_loading_attaches_the_owning_tenant() {
    let store = seeded_store().await;
    let reader = session(&store).await;

    let user = GenericService::<User>::new()
        .get(&reader, 4_i64, &["tenant"])
        .await
        .unwrap_or_else(|error| panic!("get failed: {error}"));

    assert_eq!(
        user.tenant.as_ref().map(|tenant| tenant.slug.as_str()),
        Some("globex")
    );
}

#[tokio::test]
async fn invalid_attributes_leave_stored_rows_unchanged() {
    let store = seeded_store().await;
    let repository = GenericRepository::<User>::new();

    let writer = session(&store).await;
    let ann = repository
        .get(&writer, &[], &[("id", FieldValue::from(1_i64))])
        .await
        .unwrap_or_else(|_| unreachable!())
        .unwrap_or_else(|| unreachable!());
    let result = repository
        .update(
            &writer,
            &[
                ("name", FieldValue::from("Annie")),
                ("nickname", FieldValue::from("A")),
            ],
            None,
            Some(&ann),
        )
        .await;
    assert!(matches!(result, Err(AppError::InvalidAttribute(_))));
    assert!(writer.commit().await.is_ok());

    let reader = session(&store).await;
    let reloaded = GenericService::<User>::new()
        .get(&reader, 1_i64, &[])
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(reloaded.name, "Ann");
}

#[tokio::test]
async fn update_requires_exactly_one_target() {
    let store = seeded_store().await;
    let writer = session(&store).await;

    let result = GenericRepository::<User>::new()
        .update(&writer, &[("name", FieldValue::from("X"))], None, None)
        .await;
    assert!(matches!(result, Err(AppError::Configuration(_))));
}

#[tokio::test]
async fn deleting_a_missing_record_is_not_found() {
    let store = seeded_store().await;
    let writer = session(&store).await;

    let result = GenericService::<User>::new().delete(&writer, 99_i64).await;
    assert!(matches!(result, Err(AppError::RecordNotFound(_))));
}

#[tokio::test]
async fn deleted_records_disappear_after_commit() {
    let store = seeded_store().await;
    let service = GenericService::<User>::new();

    let writer = session(&store).await;
    assert!(service.delete(&writer, 3_i64).await.is_ok());

    let reader = session(&store).await;
    let (users, total) = list_users(
        &reader,
        PaddingSchema::default(),
        SortSchema::new("id", false),
        None,
    )
    .await;
    assert_eq!(total, 3);
    assert_eq!(names(&users), vec!["Ann", "Bob", "Dee"]);
}

#[tokio::test]
async fn flushed_rows_are_readable_in_the_same_session_only() {
    let store = seeded_store().await;
    let repository = GenericRepository::<Tenant>::new();

    let writer = session(&store).await;
    let draft = repository
        .create(&[
            ("name", FieldValue::from("Initech")),
            ("slug", FieldValue::from("initech")),
            ("is_active", FieldValue::from(true)),
        ])
        .unwrap_or_else(|_| unreachable!());
    let saved = repository
        .save(&writer, draft, true)
        .await
        .unwrap_or_else(|error| panic!("save failed: {error}"));
    assert_eq!(saved.id, Some(3));

    let own = repository
        .get(&writer, &[], &[("slug", FieldValue::from("initech"))])
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(own.and_then(|tenant| tenant.id), Some(3));

    let other = session(&store).await;
    let foreign = repository
        .get(&other, &[], &[("slug", FieldValue::from("initech"))])
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(foreign.is_none());
}

#[tokio::test]
async fn committed_updates_are_visible_to_new_sessions() {
    let store = seeded_store().await;
    let users = UserService::new();

    let writer = session(&store).await;
    let before = users
        .users()
        .get(&writer, 2_i64, &[])
        .await
        .unwrap_or_else(|_| unreachable!());
    let updated = users
        .update_profile(
            &writer,
            2,
            UserChanges {
                name: Some("Robert".to_owned()),
                timezone: Some("Europe/Berlin".to_owned()),
                ..UserChanges::default()
            },
        )
        .await
        .unwrap_or_else(|error| panic!("update failed: {error}"));
    assert_eq!(updated.name, "Robert");

    let reader = session(&store).await;
    let reloaded = users
        .users()
        .get(&reader, 2_i64, &[])
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(reloaded.name, "Robert");
    assert_eq!(reloaded.timezone, "Europe/Berlin");
    assert!(reloaded.event_date >= before.event_date);
}

#[tokio::test]
async fn login_refresh_keeps_the_identity_provider() {
    let store = seeded_store().await;
    let users = UserService::new();

    let writer = session(&store).await;
    let mut data = sign_in(Some(1), "Ann Lee", "ann@example.com");
    data.soc_type = SocialProvider::Google;
    data.firebase_token = "device-7".to_owned();
    let refreshed = users
        .update_on_login(&writer, data)
        .await
        .unwrap_or_else(|error| panic!("login refresh failed: {error}"));

    assert_eq!(refreshed.id, Some(1));
    assert_eq!(refreshed.soc_type, "email");
    assert_eq!(refreshed.firebase_token, "device-7");

    let reader = session(&store).await;
    let reloaded = users
        .find_by_email(&reader, "ann@example.com")
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(reloaded.name, "Ann Lee");
    assert_eq!(reloaded.soc_type, "email");
}

#[tokio::test]
async fn first_login_registers_the_user() {
    let store = seeded_store().await;
    let users = UserService::new();

    let writer = session(&store).await;
    let mut data = sign_in(Some(2), "Fay", "fay@example.com");
    data.soc_type = SocialProvider::Apple;
    let created = users
        .update_on_login(&writer, data)
        .await
        .unwrap_or_else(|error| panic!("first login failed: {error}"));
    assert_eq!(created.id, Some(5));
    assert_eq!(created.soc_type, "apple");

    let reader = session(&store).await;
    let reloaded = users
        .find_by_email(&reader, "fay@example.com")
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(reloaded.id, Some(5));
}

#[tokio::test]
async fn duplicate_unique_values_are_conflicts() {
    let store = seeded_store().await;
    let writer = session(&store).await;

    let result = UserService::new()
        .create_user(&writer, sign_in(Some(2), "Impostor", "BOB@example.com"))
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn conflicting_commit_discards_the_whole_unit() {
    let store = seeded_store().await;
    let tenants = GenericService::<Tenant>::new();
    let repository = tenants.repository();

    let writer = session(&store).await;
    let outcome = writer
        .transactional(Propagation::Required, || async {
            tenants
                .create(&writer, &NewTenant { slug: "initech", is_active: true })
                .await?;
            let duplicate = repository.create(&[
                ("name", FieldValue::from("ACME")),
                ("slug", FieldValue::from("acme")),
                ("is_active", FieldValue::from(true)),
            ])?;
            repository.save(&writer, duplicate, false).await
        })
        .await;
    assert!(matches!(outcome, Err(AppError::Conflict(_))));
    assert!(writer.commit().await.is_ok());

    let reader = session(&store).await;
    let initech = repository
        .count(&reader, "id", &[("slug", FieldValue::from("initech"))])
        .await;
    assert_eq!(initech.ok(), Some(0));
}

#[tokio::test]
async fn missing_required_values_are_store_errors() {
    let store = InMemoryStore::new();
    let writer = session(&store).await;

    let repository = GenericRepository::<Tenant>::new();
    let row_without_name = EntityRow::new()
        .with_value("slug", "nameless")
        .with_value("is_active", true);
    let result = writer
        .insert_returning(Tenant::schema(), row_without_name)
        .await;
    assert!(matches!(result, Err(AppError::Store(_))));

    let count = repository.count(&writer, "id", &[]).await;
    assert_eq!(count.ok(), Some(0));
}

#[tokio::test]
async fn failed_nested_scope_only_discards_its_own_writes() {
    let store = seeded_store().await;
    let tenants = GenericService::<Tenant>::new();

    let writer = session(&store).await;
    let outcome = writer
        .transactional(Propagation::Required, || async {
            tenants
                .create(&writer, &NewTenant { slug: "kept", is_active: true })
                .await?;

            let nested = writer
                .transactional(Propagation::RequiredNew, || async {
                    tenants
                        .create(&writer, &NewTenant { slug: "dropped", is_active: true })
                        .await?;
                    Err::<(), _>(AppError::Validation("abort nested".to_owned()))
                })
                .await;
            assert!(matches!(nested, Err(AppError::Validation(_))));
            Ok(())
        })
        .await;
    assert!(outcome.is_ok());

    let reader = session(&store).await;
    let repository = tenants.repository();
    let kept = repository
        .count(&reader, "id", &[("slug", FieldValue::from("kept"))])
        .await;
    let dropped = repository
        .count(&reader, "id", &[("slug", FieldValue::from("dropped"))])
        .await;
    assert_eq!(kept.ok(), Some(1));
    assert_eq!(dropped.ok(), Some(0));
}

#[tokio::test]
async fn count_skips_null_values() {
    let store = seeded_store().await;
    let users = UserService::new();

    let writer = session(&store).await;
    users
        .create_user(&writer, sign_in(None, "Eve", "eve@example.com"))
        .await
        .unwrap_or_else(|error| panic!("create failed: {error}"));

    let reader = session(&store).await;
    let repository = GenericRepository::<User>::new();
    assert_eq!(repository.count(&reader, "id", &[]).await.ok(), Some(5));
    assert_eq!(
        repository.count(&reader, "tenant_id", &[]).await.ok(),
        Some(4)
    );
}

#[tokio::test]
async fn list_without_options_returns_every_row() {
    let store = seeded_store().await;
    let reader = session(&store).await;

    let (users, total) = GenericRepository::<User>::new()
        .list(&reader, ListOptions::default())
        .await
        .unwrap_or_else(|error| panic!("list failed: {error}"));
    assert_eq!(total, 4);
    assert_eq!(users.len(), 4);
}

proptest! {
    #[test]
    fn total_count_ignores_the_window(offset in 0_u64..8, limit in 1_u32..6) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap_or_else(|_| unreachable!());

        let (page_len, total) = runtime.block_on(async {
            let store = seeded_store().await;
            let reader = session(&store).await;
            let padding = PaddingSchema::new(offset, limit).unwrap_or_else(|_| unreachable!());
            let (users, total) =
                list_users(&reader, padding, SortSchema::default(), None).await;
            (users.len(), total)
        });

        let expected_len = 4_u64.saturating_sub(offset).min(u64::from(limit));
        prop_assert_eq!(total, 4);
        prop_assert_eq!(u64::try_from(page_len).ok(), Some(expected_len));
    }
}
