//! Storage for play sessions and their telemetry.
//!
//! - [`store`] -- the [`PlayStore`] trait and its record types.
//! - [`memory`] -- in-process store used by tests and when no database is configured.
//! - [`postgres`] -- PostgreSQL store (migrations in `crates/db/migrations`).
//! - [`aggregator`] -- compare-and-set merging of per-state range summaries.

use sqlx::postgres::PgPoolOptions;

pub mod aggregator;
pub mod memory;
pub mod postgres;
pub mod store;

pub use aggregator::{AggregateError, RangeAggregator, MAX_CAS_ATTEMPTS};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{InsertOutcome, PlayStore, RangeEntry, StoreError, Versioned};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Apply the bundled migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Verify the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
