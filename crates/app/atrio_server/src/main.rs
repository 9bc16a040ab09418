//! Atrio API server binary.
//!
//! Connects to PostgreSQL, runs migrations, and serves the auth and RBAC
//! routes from `atrio_api`.

use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use atrio_core::auth::service::LogMailer;
use atrio_core::cache::MemoryCache;

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "atrio_server", about = "Atrio API server")]
struct Args {
    /// Address to bind the HTTP listener.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3200")]
    bind_addr: String,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/atrio"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,atrio_api=debug,atrio_core=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    info!(
        bind_addr = %args.bind_addr,
        max_connections = args.max_connections,
        "starting atrio_server"
    );

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&args.database_url)
        .await?;

    info!("running database migrations");
    atrio_api::migrate(&pool).await?;

    let mut config = atrio_api::config::ApiConfig::from_env();
    config.bind_addr = args.bind_addr;
    config.pg_connection_url = args.database_url;

    let state = atrio_api::AppState::new(
        pool,
        config.clone(),
        Arc::new(MemoryCache::new()),
        Arc::new(LogMailer),
    );
    let app = atrio_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app).await?;

    Ok(())
}
