use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;

use crate::dto::{CreateUserRequest, EntityPage, UpdateUserRequest, UserResponse};
use crate::error::ApiResult;
use crate::query_params::{ListQuery, split_list};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SelectLoadQuery {
    pub select_load: Option<String>,
}

impl SelectLoadQuery {
    pub fn relations(&self) -> Vec<String> {
        self.select_load
            .as_deref()
            .map(split_list)
            .unwrap_or_default()
    }
}

pub async fn list_users_handler(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ApiResult<Json<EntityPage<UserResponse>>> {
    let query = ListQuery::from_pairs(&pairs)?;
    let session = state.open_session().await?;

    let (users, total_count) = state
        .user_service
        .users()
        .list(
            &session,
            query.padding,
            query.sort,
            query.search,
            query.filter,
            query.select_load,
        )
        .await?;

    Ok(Json(EntityPage::new(
        users.into_iter().map(UserResponse::from).collect(),
        total_count,
    )))
}

pub async fn create_user_handler(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let data = payload.into_sign_in()?;
    let session = state.open_session().await?;
    let user = state.user_service.create_user(&session, data).await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

pub async fn get_user_handler(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<SelectLoadQuery>,
) -> ApiResult<Json<UserResponse>> {
    let relations = query.relations();
    let relations: Vec<&str> = relations.iter().map(String::as_str).collect();
    let session = state.open_session().await?;

    let user = state
        .user_service
        .users()
        .get(&session, user_id, &relations)
        .await?;

    Ok(Json(UserResponse::from(user)))
}

pub async fn update_user_handler(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserResponse>> {
    let session = state.open_session().await?;
    let user = state
        .user_service
        .update_profile(&session, user_id, payload.into())
        .await?;

    Ok(Json(UserResponse::from(user)))
}

/// Marks the user deleted; the row stays in place.
pub async fn delete_user_handler(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<StatusCode> {
    let session = state.open_session().await?;
    state.user_service.mark_deleted(&session, user_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
