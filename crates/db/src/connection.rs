//! SQLite pool construction for the tenant database. Every connection comes
//! up with foreign keys on, WAL journaling, and a 5s busy timeout; the
//! webhook handlers and sweep loops share one pool per process.

use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

pub type DbPool = sqlx::SqlitePool;

/// Pool sized from `[database]` config. Zero values are clamped to 1.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}

#[cfg(test)]
mod tests {
    use super::connect_with_settings;

    #[tokio::test]
    async fn zero_settings_clamp_to_a_working_pool() {
        let pool = connect_with_settings("sqlite::memory:", 0, 0).await.expect("pool");
        let row: (i64,) =
            sqlx::query_as("PRAGMA foreign_keys").fetch_one(&pool).await.expect("pragma");
        assert_eq!(row.0, 1);
    }
}
