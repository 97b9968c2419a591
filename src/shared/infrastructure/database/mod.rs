use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::config::AppConfig;

pub async fn connect(config: &AppConfig) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database_url())
        .await?;

    info!(
        host = %config.database.host,
        database = %config.database.name,
        "connected to database"
    );
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!().run(pool).await
}

/// Liveness probe used by the health endpoint; abstracted so router tests
/// can run without a database behind them.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn ping(&self) -> bool;
}

pub struct PgHealthProbe {
    pool: PgPool,
}

impl PgHealthProbe {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HealthProbe for PgHealthProbe {
    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

/// Probe with a scripted answer, for tests and storeless setups.
pub struct StaticHealthProbe {
    healthy: bool,
}

impl StaticHealthProbe {
    pub fn new(healthy: bool) -> Self {
        Self { healthy }
    }
}

#[async_trait]
impl HealthProbe for StaticHealthProbe {
    async fn ping(&self) -> bool {
        self.healthy
    }
}
