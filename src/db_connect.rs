// db_connect.rs

use anyhow::{Context, Result};
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use log::info;
use std::time::Duration;
use tokio_postgres::{Config, NoTls};

use crate::config::StoreConfig;

/// Type alias for the PostgreSQL connection pool.
/// This uses `bb8` for connection pooling with `tokio_postgres`.
pub type PgPool = Pool<PostgresConnectionManager<NoTls>>;

/// Builds the PostgreSQL connection configuration from the store settings.
fn build_pg_config(store: &StoreConfig) -> Config {
    let mut config = Config::new();
    info!(
        "DB Config: Host={}, Port={}, DB={}, User={}",
        store.host, store.port, store.dbname, store.user
    );
    config
        .host(&store.host)
        .port(store.port)
        .dbname(&store.dbname)
        .user(&store.user)
        .password(&store.password);
    config.application_name("eurovision_stats");
    config.connect_timeout(Duration::from_secs(10));
    config
}

/// Establishes the connection pool and checks it with `SELECT 1`.
///
/// The pipeline writes sequentially, so the pool stays small: `pool_size`
/// connections at most, one kept idle.
pub async fn connect(store: &StoreConfig) -> Result<PgPool> {
    let config = build_pg_config(store);
    info!("Connecting to PostgreSQL database...");
    let manager = PostgresConnectionManager::new(config, NoTls);

    let pool_idle_timeout = Some(Duration::from_secs(180));
    let pool = Pool::builder()
        .max_size(store.pool_size)
        .min_idle(Some(1))
        .idle_timeout(pool_idle_timeout)
        .connection_timeout(Duration::from_secs(40))
        .build(manager)
        .await
        .context("Failed to build database connection pool")?;

    let conn = pool
        .get()
        .await
        .context("Failed to get test connection from pool")?;
    conn.query_one("SELECT 1", &[])
        .await
        .context("Test query 'SELECT 1' failed")?;
    drop(conn);
    info!(
        "Database connection pool initialized with max_size: {}, idle_timeout: {:?}.",
        store.pool_size, pool_idle_timeout,
    );
    Ok(pool)
}

/// Returns `(total, idle, in_use)` connection counts.
pub fn get_pool_status(pool: &PgPool) -> (usize, usize, usize) {
    let state = pool.state();
    let total_connections = state.connections as usize;
    let idle_connections = state.idle_connections as usize;
    (total_connections, idle_connections, total_connections - idle_connections)
}
