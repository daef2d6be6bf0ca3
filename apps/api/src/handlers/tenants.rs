use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;

use crate::dto::{CreateTenantRequest, EntityPage, TenantResponse};
use crate::error::ApiResult;
use crate::handlers::users::SelectLoadQuery;
use crate::query_params::ListQuery;
use crate::state::AppState;

pub async fn list_tenants_handler(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ApiResult<Json<EntityPage<TenantResponse>>> {
    let query = ListQuery::from_pairs(&pairs)?;
    let session = state.open_session().await?;

    let (tenants, total_count) = state
        .tenant_service
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
        tenants.into_iter().map(TenantResponse::from).collect(),
        total_count,
    )))
}

pub async fn create_tenant_handler(
    State(state): State<AppState>,
    Json(payload): Json<CreateTenantRequest>,
) -> ApiResult<(StatusCode, Json<TenantResponse>)> {
    let input = payload.validate()?;
    let session = state.open_session().await?;
    let tenant = state.tenant_service.create(&session, &input).await?;

    Ok((StatusCode::CREATED, Json(TenantResponse::from(tenant))))
}

pub async fn get_tenant_handler(
    State(state): State<AppState>,
    Path(tenant_id): Path<i64>,
    Query(query): Query<SelectLoadQuery>,
) -> ApiResult<Json<TenantResponse>> {
    let relations = query.relations();
    let relations: Vec<&str> = relations.iter().map(String::as_str).collect();
    let session = state.open_session().await?;

    let tenant = state
        .tenant_service
        .get(&session, tenant_id, &relations)
        .await?;

    Ok(Json(TenantResponse::from(tenant)))
}
