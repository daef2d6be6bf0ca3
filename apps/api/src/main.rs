//! Tessera API composition root.

#![forbid(unsafe_code)]

mod api_config;
mod api_router;
mod dto;
mod error;
mod handlers;
mod query_params;
mod state;

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tessera_application::SessionFactory;
use tessera_core::AppError;
use tessera_infrastructure::{InMemoryStore, PostgresStore};
use tracing::{info, warn};

use crate::api_config::{ApiConfig, init_tracing};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ApiConfig::load()?;

    let (sessions, store_kind): (Arc<dyn SessionFactory>, &'static str) =
        match &config.database_url {
            Some(database_url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.database_max_connections)
                    .connect(database_url)
                    .await
                    .map_err(|error| {
                        AppError::Internal(format!("failed to connect to database: {error}"))
                    })?;

                sqlx::migrate!("../../crates/infrastructure/migrations")
                    .run(&pool)
                    .await
                    .map_err(|error| {
                        AppError::Internal(format!("failed to run migrations: {error}"))
                    })?;

                if config.migrate_only {
                    info!("database migrations applied successfully");
                    return Ok(());
                }

                (Arc::new(PostgresStore::new(pool)), "postgres")
            }
            None => {
                warn!("DATABASE_URL is not set, serving from a process-local in-memory store");
                (Arc::new(InMemoryStore::new()), "memory")
            }
        };

    let app = api_router::build_router(AppState::new(sessions, store_kind), &config.frontend_url)?;

    let address = config.socket_address()?;
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(%address, store = store_kind, "tessera-api listening");

    axum::serve(listener, app)
        .await
        .map_err(|error| AppError::Internal(format!("api server error: {error}")))
}
