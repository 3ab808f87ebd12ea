// src/bin/api_server.rs

use relational_import::infra::config::{self, DatabaseConfig, ServerConfig};
use relational_import::infra::telemetry;
use relational_import::transport;
use relational_import::{ImportService, LoaderOptions, MemoryStore, PgStore, Store};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_dotenv();
    telemetry::init_tracing(false).ok();

    let in_memory = std::env::args().skip(1).any(|a| a == "--memory");
    let server = ServerConfig::from_env()?;

    // --- Store Initialization ---
    let store: Arc<dyn Store> = if in_memory {
        tracing::warn!("using the in-memory store; nothing survives a restart");
        Arc::new(MemoryStore::new())
    } else {
        let db = DatabaseConfig::from_env()?;
        let store = PgStore::connect(&db).await?;
        // The registry is warm-started from `loader_models`, so a restarted
        // server can import into previously bootstrapped tables right away.
        let models = store.registry().await.list_models();
        if models.is_empty() {
            tracing::info!("no models registered yet; use POST /bootstrap/apply-schema");
        } else {
            tracing::info!(?models, "warm-started model registry");
        }
        Arc::new(store)
    };

    let service = ImportService::with_options(
        store,
        LoaderOptions {
            timeout: server.load_timeout,
        },
    );
    let app_state = transport::http::AppState::new(service);

    // --- API Server Initialization ---
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let app = transport::http::create_router(app_state)
        .merge(
            SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", transport::http::ApiDoc::openapi()),
        )
        .layer(cors);
    let listener = tokio::net::TcpListener::bind(&server.bind_addr).await?;
    tracing::info!(addr = %server.bind_addr, "API server listening");
    tracing::info!("Swagger UI available at /swagger-ui");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}
