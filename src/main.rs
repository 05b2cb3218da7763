use anyhow::Result;
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let (cfg, migrate_only) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting portal-store with config: {:?}", cfg);

    // SQLx needs the SQLite file and its parent directory to exist.
    let db_path = cfg
        .database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    if db_path != ":memory:" {
        let db_path_obj = Path::new(db_path);
        if let Some(parent) = db_path_obj.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
        if let Err(e) = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(db_path)
        {
            tracing::warn!("Failed to pre-create database file {}: {}", db_path, e);
        }
    }

    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&cfg.database_url)
            .await?,
    );

    services::batch_store::apply_migrations(&db).await?;
    if migrate_only {
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    let state = state::AppState::new(db, cfg.limits());
    let app: Router = routes::routes::routes(cfg.limits()).with_state(state);

    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
