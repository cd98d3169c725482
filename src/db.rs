use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::Result;

/// Path sentinel for an in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Open a connection pool for the database at `path`.
///
/// File-backed databases run in WAL mode so reads snapshot without blocking
/// the single writer. `:memory:` is accepted and pinned to one connection,
/// since every pooled connection would otherwise see its own empty database.
/// Foreign keys are enabled on every connection.
pub async fn connect(path: &Path) -> Result<SqlitePool> {
    if path.as_os_str() == MEMORY_PATH {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        return Ok(pool);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Default on-disk database location: `<data dir>/Folio/folio.sqlite`.
///
/// Resolves to the platform application-support directory (e.g.
/// `~/Library/Application Support` on macOS, `~/.local/share` on Linux),
/// falling back to the current directory when the platform offers none.
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Folio")
        .join("folio.sqlite")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_path_shape() {
        let path = default_db_path();
        assert!(path.ends_with("Folio/folio.sqlite"));
    }

    #[tokio::test]
    async fn test_memory_pool_is_single_connection() {
        let pool = connect(Path::new(MEMORY_PATH)).await.unwrap();
        sqlx::query("CREATE TABLE t (x INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        // A second acquire must observe the same database.
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE name = 't'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1);
    }
}
