use serde::Serialize;
use ts_rs::TS;

/// Health response payload.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/health-response.ts"
)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
}

/// One page of a list endpoint.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/entity-page.ts"
)]
pub struct EntityPage<T: TS> {
    pub items: Vec<T>,
    /// Number of matches before pagination.
    #[ts(type = "number")]
    pub total_count: u64,
}

impl<T: TS> EntityPage<T> {
    pub fn new(items: Vec<T>, total_count: u64) -> Self {
        Self { items, total_count }
    }
}
