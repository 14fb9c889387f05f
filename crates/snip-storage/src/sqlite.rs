use async_trait::async_trait;
use snip_core::{
    BatchEntry, ReadRepository, Repository, Result, ShortCode, StorageError, StorageStats,
    UrlRecord,
};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Connection, Row};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const MAX_CONNECTIONS: u32 = 8;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const INSERT_SQL: &str = r#"
    INSERT INTO short2orig (short_url, orig_url, user_id)
    VALUES (?, ?, ?)
    ON CONFLICT (orig_url) DO NOTHING
"#;

/// SQLite implementation of the repository contract.
///
/// Conflict detection relies on the table constraints: the UNIQUE
/// constraint on `orig_url` turns a duplicate URL into a zero-row insert,
/// and the primary key turns a reused short code into a unique violation.
/// `put_batch` is all-or-nothing; `mark_deleted` commits whatever updates
/// succeeded.
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Creates a repository from an existing pool. The schema is assumed to
    /// be in place; see [`SqliteRepository::migrate`].
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens a pool for the given connection string and applies migrations.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(dsn).map_err(map_sqlx_error)?;
        Self::connect_with(options).await
    }

    /// Opens (creating if needed) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect_with(SqliteConnectOptions::new().filename(path)).await
    }

    async fn connect_with(options: SqliteConnectOptions) -> Result<Self> {
        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(map_sqlx_error)?;

        let repository = Self::new(pool);
        repository.migrate().await?;
        info!("connected to database");
        Ok(repository)
    }

    /// Applies pending schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        sqlx::Error::Migrate(_) => StorageError::Migration(message),
        _ => StorageError::Query(message),
    }
}

fn map_insert_error(err: sqlx::Error, code: &ShortCode) -> StorageError {
    if is_unique_violation(&err) {
        StorageError::CodeCollision(code.to_string())
    } else {
        map_sqlx_error(err)
    }
}

fn count(value: i64) -> usize {
    usize::try_from(value).unwrap_or_default()
}

#[async_trait]
impl ReadRepository for SqliteRepository {
    async fn get(&self, code: &ShortCode) -> Result<Option<String>> {
        let row = sqlx::query(
            r#"
            SELECT orig_url, is_deleted
            FROM short2orig
            WHERE short_url = ?
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let deleted: bool = row.try_get("is_deleted").map_err(map_sqlx_error)?;
        if deleted {
            return Err(StorageError::Deleted(code.to_string()));
        }

        let original_url: String = row.try_get("orig_url").map_err(map_sqlx_error)?;
        Ok(Some(original_url))
    }

    async fn get_by_original_url(&self, original_url: &str) -> Result<Option<ShortCode>> {
        let row = sqlx::query("SELECT short_url FROM short2orig WHERE orig_url = ?")
            .bind(original_url)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(|row| {
            row.try_get::<String, _>("short_url")
                .map(ShortCode::new)
                .map_err(map_sqlx_error)
        })
        .transpose()
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<UrlRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT short_url, orig_url, is_deleted
            FROM short2orig
            WHERE user_id = ?
            ORDER BY rowid
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| -> Result<UrlRecord> {
                Ok(UrlRecord {
                    short_code: ShortCode::new(
                        row.try_get::<String, _>("short_url")
                            .map_err(map_sqlx_error)?,
                    ),
                    original_url: row.try_get("orig_url").map_err(map_sqlx_error)?,
                    owner: owner.to_owned(),
                    deleted: row.try_get("is_deleted").map_err(map_sqlx_error)?,
                })
            })
            .collect()
    }

    async fn stats(&self) -> Result<StorageStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS urls, COUNT(DISTINCT NULLIF(user_id, '')) AS users
            FROM short2orig
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let urls: i64 = row.try_get("urls").map_err(map_sqlx_error)?;
        let users: i64 = row.try_get("users").map_err(map_sqlx_error)?;
        Ok(StorageStats {
            urls: count(urls),
            users: count(users),
        })
    }

    async fn health_check(&self, deadline: Duration) -> Result<()> {
        let probe = async {
            let mut conn = self.pool.acquire().await?;
            conn.ping().await
        };

        match tokio::time::timeout(deadline, probe).await {
            Ok(result) => result.map_err(map_sqlx_error),
            Err(_) => Err(StorageError::Timeout(format!(
                "health check exceeded {}ms",
                deadline.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn put(&self, code: &ShortCode, original_url: &str, owner: &str) -> Result<()> {
        let result = sqlx::query(INSERT_SQL)
            .bind(code.as_str())
            .bind(original_url)
            .bind(owner)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => {
                Err(StorageError::Conflict(original_url.to_owned()))
            }
            Ok(_) => Ok(()),
            // Both keys taken at once: the URL conflict is the one callers resolve.
            Err(err) if is_unique_violation(&err) => {
                match self.get_by_original_url(original_url).await? {
                    Some(_) => Err(StorageError::Conflict(original_url.to_owned())),
                    None => Err(StorageError::CodeCollision(code.to_string())),
                }
            }
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn put_batch(&self, entries: &[BatchEntry], owner: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // Any failing item returns early; dropping `tx` rolls the batch back.
        for entry in entries {
            let result = sqlx::query(INSERT_SQL)
                .bind(entry.short_code.as_str())
                .bind(entry.original_url.as_str())
                .bind(owner)
                .execute(&mut *tx)
                .await
                .map_err(|err| map_insert_error(err, &entry.short_code))?;

            if result.rows_affected() == 0 {
                debug!(
                    code = %entry.short_code,
                    original_url = %entry.original_url,
                    "batch item conflicts, rolling back"
                );
                return Err(StorageError::Conflict(entry.original_url.clone()));
            }
        }

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn mark_deleted(&self, codes: &[ShortCode], owner: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for code in codes {
            let result = sqlx::query(
                r#"
                UPDATE short2orig
                SET is_deleted = TRUE
                WHERE short_url = ? AND user_id = ?
                "#,
            )
            .bind(code.as_str())
            .bind(owner)
            .execute(&mut *tx)
            .await;

            if let Err(err) = result {
                error!(code = %code, owner = %owner, error = %err, "failed to mark short code deleted");
            }
        }

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn shutdown(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
