use std::{sync::Arc, time::Duration};

use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tune_time::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    repository::{MemoryRepository, PostgresRepository, RepositoryState},
};

/// main
///
/// Entry point: configuration, logging, document store, then the HTTP server.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail fast on missing production secrets)
    dotenv::dotenv().ok();
    let config = AppConfig::load().expect("FATAL: invalid configuration");

    // 2. Logging. RUST_LOG wins over the defaults below.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tune_time=debug,tower_http=info,axum=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Document store. The pool connects lazily: an unreachable database is logged here
    // and then fails individual requests, it does not keep the listener from starting.
    let repo: RepositoryState = match PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect_lazy(&config.db_url)
    {
        Ok(pool) => {
            let repo = PostgresRepository::new(pool);
            match repo.ensure_schema().await {
                Ok(()) => tracing::info!("Document store ready"),
                Err(e) => tracing::error!(error = %e, "Failed to prepare the document store"),
            }
            Arc::new(repo)
        }
        Err(e) => {
            tracing::error!(error = %e, "Invalid DATABASE_URL; store operations will fail");
            Arc::new(MemoryRepository::new_failing())
        }
    };

    // 4. Unified state, router and server.
    let port = config.port;
    let app = create_router(AppState { repo, config });

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .expect("FATAL: failed to bind the HTTP listener");

    tracing::info!("Listening on port {}", port);
    tracing::info!("API Documentation (Swagger UI) available at: http://localhost:{}/swagger-ui", port);

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated");
}
