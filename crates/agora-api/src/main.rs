//! Agora API Server

use agora_api::{create_router, notify::TracingNotifier, session, state::AppState};
use agora_core::{
    AppConfig, IdentityBackend, IdentityStore, LoggingConfig, MemoryIdentityStore, PgIdentityStore,
    SessionBackend, SystemClock,
};
use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // AGORA_CONFIG points at a TOML file; env vars still take precedence
    let config = match std::env::var("AGORA_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };

    init_tracing(&config.logging);

    config.validate().context("Invalid configuration")?;
    if config.tokens.uses_development_secrets() {
        tracing::warn!("Using built-in development signing secrets; set JWT_ACCESS_SECRET and JWT_REFRESH_SECRET");
    }

    let sessions: Arc<dyn session::SessionStore> = match config.session_store.backend {
        SessionBackend::Memory => {
            tracing::warn!("In-memory session store: sessions are lost on restart and not shared between instances");
            Arc::new(session::MemorySessionStore::default())
        }
        SessionBackend::Redis => Arc::new(
            session::RedisSessionStore::connect(&config.session_store.redis_url)
                .await
                .context("Failed to connect to session store")?,
        ),
    };

    let identities: Arc<dyn IdentityStore> = match config.database.backend {
        IdentityBackend::Memory => Arc::new(MemoryIdentityStore::new()),
        IdentityBackend::Postgres => {
            let store =
                PgIdentityStore::connect(&config.database.postgres_url, config.database.pool_size)
                    .await
                    .context("Failed to connect to identity store")?;
            store
                .ensure_schema()
                .await
                .context("Failed to prepare identity schema")?;
            Arc::new(store)
        }
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = Arc::new(AppState::new(
        config,
        identities,
        sessions,
        Arc::new(TracingNotifier),
        Arc::new(SystemClock),
    ));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Agora API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", logging.level)));

    if logging.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Gracefully shutdown");
}
