use std::sync::Arc;

use tessera_application::{GenericService, Session, SessionFactory, UserService};
use tessera_core::AppResult;
use tessera_domain::Tenant;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<dyn SessionFactory>,
    pub store_kind: &'static str,
    pub user_service: UserService,
    pub tenant_service: GenericService<Tenant>,
}

impl AppState {
    pub fn new(sessions: Arc<dyn SessionFactory>, store_kind: &'static str) -> Self {
        Self {
            sessions,
            store_kind,
            user_service: UserService::new(),
            tenant_service: GenericService::new(),
        }
    }

    /// Opens the unit of work for one request.
    pub async fn open_session(&self) -> AppResult<Session> {
        Session::open(self.sessions.as_ref()).await
    }
}
