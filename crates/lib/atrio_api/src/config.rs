//! API server configuration.

use tracing::warn;

/// Fallback secret for local development only.
const DEV_JWT_SECRET: &str = "atrio-dev-secret-change-in-production";

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3200").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// JWT signing secret.
    pub jwt_secret: String,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                     | Default                               |
    /// |------------------------------|---------------------------------------|
    /// | `BIND_ADDR`                  | `127.0.0.1:3200`                      |
    /// | `DATABASE_URL`               | `postgres://localhost:5432/atrio`     |
    /// | `JWT_SECRET` / `AUTH_SECRET` | dev fallback, with a loud warning     |
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3200".into()),
            pg_connection_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/atrio".into()),
            jwt_secret: resolve_jwt_secret(),
        }
    }
}

/// `JWT_SECRET` wins, `AUTH_SECRET` is the legacy alias, otherwise a fixed
/// dev value with a warning — tokens signed with it are worthless the moment
/// the process restarts with a real secret, which is the point.
fn resolve_jwt_secret() -> String {
    std::env::var("JWT_SECRET")
        .or_else(|_| std::env::var("AUTH_SECRET"))
        .unwrap_or_else(|_| {
            warn!("JWT_SECRET not set, using development fallback");
            DEV_JWT_SECRET.into()
        })
}
