use tessera_core::AppError;
use tessera_domain::{EntityRow, FieldValue, PaddingSchema, SearchSchema, SortSchema, Tenant};

use crate::PendingWrite;
use crate::test_support::RecordingBackend;

use super::{EntityInput, GenericService};

struct TenantDraft {
    name: Option<String>,
    slug: Option<String>,
    invite_message: Option<String>,
}

impl EntityInput for TenantDraft {
    fn changes(&self) -> Vec<(&'static str, FieldValue)> {
        let mut changes = Vec::new();
        if let Some(name) = &self.name {
            changes.push(("name", FieldValue::from(name.as_str())));
        }
        if let Some(slug) = &self.slug {
            changes.push(("slug", FieldValue::from(slug.as_str())));
        }
        if let Some(message) = &self.invite_message {
            changes.push(("invite_message", FieldValue::from(message.as_str())));
        }
        changes
    }

    fn transient_fields(&self) -> &'static [&'static str] {
        &["invite_message"]
    }
}

fn tenant_row(id: i64, slug: &str) -> EntityRow {
    EntityRow::new()
        .with_value("id", id)
        .with_value("name", slug)
        .with_value("slug", slug)
        .with_value("is_active", true)
}

async fn seeded() -> RecordingBackend {
    let backend = RecordingBackend::new();
    backend
        .seed("tenants", vec![tenant_row(1, "acme"), tenant_row(2, "globex")])
        .await;
    backend
}

#[tokio::test]
async fn get_reports_missing_records() {
    let backend = seeded().await;
    let session = backend.session();
    let service = GenericService::<Tenant>::new();

    let found = service.get(&session, 2_i64, &[]).await;
    assert_eq!(found.map(|tenant| tenant.slug).ok().as_deref(), Some("globex"));

    let missing = service.get(&session, 9_i64, &[]).await;
    assert!(matches!(missing, Err(AppError::RecordNotFound(_))));

    let by_field = service
        .get_by_field(&session, &[], &[("slug", FieldValue::from("nobody"))])
        .await;
    assert!(matches!(by_field, Err(AppError::RecordNotFound(_))));
}

#[tokio::test]
async fn list_resolves_the_sort_field_first() {
    let backend = seeded().await;
    let session = backend.session();
    let service = GenericService::<Tenant>::new();

    let result = service
        .list(
            &session,
            PaddingSchema::default(),
            SortSchema::new("popularity", true),
            None,
            None,
            Vec::new(),
        )
        .await;

    assert!(matches!(result, Err(AppError::FieldNotFound(_))));
    assert!(backend.plans().await.is_empty());
}

#[tokio::test]
async fn list_treats_empty_search_as_absent() {
    let backend = seeded().await;
    let session = backend.session();
    let service = GenericService::<Tenant>::new();

    let (tenants, total) = service
        .list(
            &session,
            PaddingSchema::default(),
            SortSchema::default(),
            Some(SearchSchema::default()),
            None,
            Vec::new(),
        )
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(total, 2);
    assert_eq!(tenants.len(), 2);
    assert!(backend.plans().await[0].predicates.is_empty());
}

#[tokio::test]
async fn create_skips_transient_fields_and_commits() {
    let backend = RecordingBackend::new();
    let session = backend.session();
    let service = GenericService::<Tenant>::new();

    let tenant = service
        .create(
            &session,
            &TenantDraft {
                name: Some("Acme".to_owned()),
                slug: Some("acme".to_owned()),
                invite_message: Some("welcome".to_owned()),
            },
        )
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(tenant.id, Some(1));
    assert_eq!(tenant.slug, "acme");
    assert_eq!(
        backend.calls().await,
        vec![
            "flush".to_owned(),
            "insert tenants".to_owned(),
            "commit".to_owned()
        ]
    );
}

#[tokio::test]
async fn create_rolls_back_when_the_flush_fails() {
    let backend = RecordingBackend::failing_flush();
    let session = backend.session();
    let service = GenericService::<Tenant>::new();

    let result = service
        .create(
            &session,
            &TenantDraft {
                name: Some("Acme".to_owned()),
                slug: Some("acme".to_owned()),
                invite_message: None,
            },
        )
        .await;

    assert!(matches!(result, Err(AppError::Store(_))));
    assert_eq!(
        backend.calls().await,
        vec!["flush".to_owned(), "rollback".to_owned()]
    );
}

#[tokio::test]
async fn update_writes_only_explicitly_set_fields() {
    let backend = seeded().await;
    let session = backend.session();
    let service = GenericService::<Tenant>::new();

    let tenant = service
        .update(
            &session,
            1_i64,
            &TenantDraft {
                name: Some("Acme Corp".to_owned()),
                slug: None,
                invite_message: None,
            },
        )
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(tenant.name, "Acme Corp");
    assert_eq!(tenant.slug, "acme");
    let staged = backend.staged().await;
    let [PendingWrite::Update { assignments, .. }] = staged.as_slice() else {
        panic!("expected one staged update");
    };
    assert_eq!(assignments.len(), 1);
    assert_eq!(backend.calls().await.last().map(String::as_str), Some("commit"));
}

#[tokio::test]
async fn update_and_delete_of_missing_records_roll_back() {
    let backend = seeded().await;
    let session = backend.session();
    let service = GenericService::<Tenant>::new();
    let draft = TenantDraft {
        name: Some("Ghost".to_owned()),
        slug: None,
        invite_message: None,
    };

    let updated = service.update(&session, 404_i64, &draft).await;
    assert!(matches!(updated, Err(AppError::RecordNotFound(_))));

    let deleted = service.delete(&session, 404_i64).await;
    assert!(matches!(deleted, Err(AppError::RecordNotFound(message)) if message.contains("404")));

    assert_eq!(
        backend.calls().await,
        vec!["rollback".to_owned(), "rollback".to_owned()]
    );
}

#[tokio::test]
async fn delete_stages_and_commits() {
    let backend = seeded().await;
    let session = backend.session();
    let service = GenericService::<Tenant>::new();

    let deleted = service.delete(&session, 2_i64).await;

    assert!(deleted.is_ok());
    assert_eq!(
        backend.calls().await,
        vec!["stage".to_owned(), "commit".to_owned()]
    );
}
