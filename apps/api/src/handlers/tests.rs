use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tessera_infrastructure::InMemoryStore;

use crate::dto::{CreateTenantRequest, CreateUserRequest, UpdateUserRequest};
use crate::state::AppState;

use super::health::health_handler;
use super::tenants::{create_tenant_handler, get_tenant_handler, list_tenants_handler};
use super::users::{
    SelectLoadQuery, create_user_handler, delete_user_handler, get_user_handler,
    list_users_handler, update_user_handler,
};

fn state() -> AppState {
    AppState::new(Arc::new(InMemoryStore::new()), "memory")
}

fn user_request(tenant_id: Option<i64>, name: &str, email: &str) -> CreateUserRequest {
    CreateUserRequest {
        tenant_id,
        name: name.to_owned(),
        email: email.to_owned(),
        avatar: None,
        soc_type: None,
        soc_token: String::new(),
        firebase_token: String::new(),
        timezone: None,
    }
}

async fn seeded_state() -> AppState {
    let state = state();
    let created = create_tenant_handler(
        State(state.clone()),
        Json(CreateTenantRequest {
            name: "Acme".to_owned(),
            slug: "acme".to_owned(),
            is_active: true,
        }),
    )
    .await;
    assert!(created.is_ok());

    for (name, email) in [("Ann", "ann@acme.io"), ("Bob", "bob@acme.io")] {
        let created =
            create_user_handler(State(state.clone()), Json(user_request(Some(1), name, email)))
                .await;
        assert!(created.is_ok());
    }

    state
}

fn query(raw: &[(&str, &str)]) -> Query<Vec<(String, String)>> {
    Query(
        raw.iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect(),
    )
}

#[tokio::test]
async fn health_reports_the_store() {
    let Json(body) = health_handler(State(state())).await;
    assert_eq!(body.status, "ok");
    assert_eq!(body.store, "memory");
}

#[tokio::test]
async fn list_users_applies_bracketed_filters() {
    let state = seeded_state().await;

    let page = list_users_handler(
        State(state),
        query(&[
            ("filters_and[tenant][slug]", "acme"),
            ("search[email]", "bob"),
            ("select_load", "tenant"),
        ]),
    )
    .await;

    let Ok(Json(page)) = page else {
        unreachable!();
    };
    assert_eq!(page.total_count, 1);
    assert_eq!(page.items[0].name, "Bob");
    assert_eq!(
        page.items[0].tenant.as_ref().map(|tenant| tenant.slug.as_str()),
        Some("acme")
    );
}

#[tokio::test]
async fn unknown_sort_field_is_a_bad_request() {
    let state = seeded_state().await;

    let result = list_users_handler(State(state), query(&[("sort_field", "nickname")])).await;
    let status = result.map(|_| StatusCode::OK).unwrap_or_else(|error| {
        error.into_response().status()
    });
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
    let state = seeded_state().await;

    let result = create_user_handler(
        State(state),
        Json(user_request(None, "Other Ann", "ANN@acme.io")),
    )
    .await;
    let status = result
        .map(|(status, _)| status)
        .unwrap_or_else(|error| error.into_response().status());
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn profile_patch_and_soft_delete_round_trip() {
    let state = seeded_state().await;

    let patched = update_user_handler(
        State(state.clone()),
        Path(2),
        Json(UpdateUserRequest {
            timezone: Some("America/New_York".to_owned()),
            ..UpdateUserRequest::default()
        }),
    )
    .await;
    assert!(patched.is_ok());

    let deleted = delete_user_handler(State(state.clone()), Path(2)).await;
    assert_eq!(deleted.ok(), Some(StatusCode::NO_CONTENT));

    let fetched = get_user_handler(
        State(state),
        Path(2),
        Query(SelectLoadQuery::default()),
    )
    .await;
    let Ok(Json(user)) = fetched else {
        unreachable!();
    };
    assert!(user.is_deleted);
    assert_eq!(user.timezone, "America/New_York");
}

#[tokio::test]
async fn missing_records_are_not_found() {
    let state = state();

    let user = get_user_handler(
        State(state.clone()),
        Path(42),
        Query(SelectLoadQuery::default()),
    )
    .await;
    let status = user
        .map(|_| StatusCode::OK)
        .unwrap_or_else(|error| error.into_response().status());
    assert_eq!(status, StatusCode::NOT_FOUND);

    let deleted = delete_user_handler(State(state), Path(42)).await;
    let status = deleted.unwrap_or_else(|error| error.into_response().status());
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn tenants_list_and_load_members() {
    let state = seeded_state().await;

    let listed = list_tenants_handler(State(state.clone()), query(&[("limit", "5")])).await;
    let Ok(Json(page)) = listed else {
        unreachable!();
    };
    assert_eq!(page.total_count, 1);
    assert!(page.items[0].users.is_empty());

    let fetched = get_tenant_handler(
        State(state),
        Path(1),
        Query(SelectLoadQuery {
            select_load: Some("users".to_owned()),
        }),
    )
    .await;
    let Ok(Json(tenant)) = fetched else {
        unreachable!();
    };
    let emails: Vec<&str> = tenant.users.iter().map(|user| user.email.as_str()).collect();
    assert_eq!(emails, vec!["ann@acme.io", "bob@acme.io"]);
}
