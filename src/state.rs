use diesel::{
    SqliteConnection,
    r2d2::{ConnectionManager, Pool},
};
use diesel_migrations::MigrationHarness;
use tokio::task::spawn_blocking;
use tracing::info;

use crate::{MIGRATIONS, error::EngineError};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

/// Builds a connection pool for `db_url` and brings the schema up to date.
///
/// Every `:memory:` connection is its own database, so in that case the pool
/// is limited to a single connection.
pub fn make_pool(db_url: &str) -> Result<DbPool, EngineError> {
    let pool: DbPool = Pool::builder()
        .max_size(if db_url == ":memory:" { 1 } else { 10 })
        .build(ConnectionManager::<SqliteConnection>::new(db_url))?;

    run_migrations(&pool)?;

    Ok(pool)
}

pub fn run_migrations(pool: &DbPool) -> Result<(), EngineError> {
    let mut conn = pool.get()?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| EngineError::Migration(e.to_string()))?;
    if !applied.is_empty() {
        info!(count = applied.len(), "applied pending migrations");
    }
    Ok(())
}

/// Runs `f` against a pooled connection on the blocking thread pool.
///
/// The connection is returned to the pool when `f` finishes, so callers never
/// hold one across an `.await`.
pub async fn with_conn<T, F>(pool: &DbPool, f: F) -> Result<T, EngineError>
where
    T: Send + 'static,
    F: FnOnce(&mut SqliteConnection) -> Result<T, EngineError> + Send + 'static,
{
    let pool = pool.clone();
    spawn_blocking(move || {
        let mut conn = pool.get()?;
        f(&mut conn)
    })
    .await?
}
