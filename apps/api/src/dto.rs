mod common;
mod tenants;
mod users;

pub use common::{EntityPage, HealthResponse};
pub use tenants::{CreateTenantRequest, TenantResponse, TenantSummaryResponse};
pub use users::{CreateUserRequest, UpdateUserRequest, UserResponse};
