use std::path::Path;
use std::sync::Arc;

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection, Row, SqliteConnection};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::errors::AppError;
use crate::models::{ChatTurn, StoredExchange};

const CREATE_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS messages (id INTEGER PRIMARY KEY, message_list TEXT NOT NULL)";

/// Append-only log of exchanges backed by one SQLite connection.
///
/// The connection sits behind an async mutex, so reads and writes from
/// concurrent requests run one at a time and never interleave.
#[derive(Clone)]
pub struct MessageStore {
    conn: Arc<Mutex<SqliteConnection>>,
}

impl MessageStore {
    /// Opens (or creates) the log file at `path`, creating missing parent directories.
    pub async fn open(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let store = Self::connect(options).await?;
        info!("Message store opened at {}", path.display());
        Ok(store)
    }

    /// Private in-memory log, used by tests.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, AppError> {
        use std::str::FromStr;
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(AppError::DatabaseConnectionFailed)?;
        Self::connect(options).await
    }

    /// Runs a raw statement, bypassing the exchange encoding.
    #[cfg(test)]
    pub(crate) async fn execute_raw(&self, sql: &str) -> Result<(), AppError> {
        let mut conn = self.conn.lock().await;
        sqlx::query(sql)
            .execute(&mut *conn)
            .await
            .map_err(|e| AppError::db_query("Failed to run raw statement", e))?;
        Ok(())
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self, AppError> {
        let conn = options.connect().await.map_err(|e| {
            error!("Failed to open message store: {e}");
            AppError::DatabaseConnectionFailed(e)
        })?;
        let store = Self { conn: Arc::new(Mutex::new(conn)) };
        store.init().await?;
        Ok(store)
    }

    /// Creates the table if absent. Safe to run against an existing log.
    pub async fn init(&self) -> Result<(), AppError> {
        let mut conn = self.conn.lock().await;
        sqlx::query(CREATE_TABLE)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                error!("Failed to create messages table: {e}");
                AppError::db_query("Failed to create messages table", e)
            })?;
        Ok(())
    }

    /// Appends one exchange as a single row.
    pub async fn append(&self, exchange: &StoredExchange) -> Result<(), AppError> {
        let encoded = serde_json::to_string(exchange).map_err(AppError::Encode)?;
        let mut conn = self.conn.lock().await;
        sqlx::query("INSERT INTO messages (message_list) VALUES (?)")
            .bind(encoded)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                error!("Failed to append exchange: {e}");
                AppError::db_query("Failed to append exchange", e)
            })?;
        Ok(())
    }

    /// Every stored turn, oldest first. Any unreadable row fails the whole call.
    pub async fn get_all(&self) -> Result<Vec<ChatTurn>, AppError> {
        let rows = {
            let mut conn = self.conn.lock().await;
            sqlx::query("SELECT id, message_list FROM messages ORDER BY id")
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| {
                    error!("Failed to fetch stored exchanges: {e}");
                    AppError::db_query("Failed to fetch stored exchanges", e)
                })?
        };

        let mut turns = Vec::new();
        for row in rows {
            let row_id: i64 = row
                .try_get("id")
                .map_err(|e| AppError::db_query("Failed to read id", e))?;
            let raw: String = row
                .try_get("message_list")
                .map_err(|e| AppError::db_query("Failed to read message_list", e))?;
            let exchange: StoredExchange = serde_json::from_str(&raw).map_err(|e| {
                error!("Stored exchange {row_id} does not parse: {e}");
                AppError::CorruptRecord { row_id, reason: e.to_string() }
            })?;
            for turn in &exchange.turns {
                turn.check()
                    .map_err(|reason| AppError::CorruptRecord { row_id, reason })?;
            }
            turns.extend(exchange.turns);
        }
        Ok(turns)
    }

    /// Number of stored exchanges (rows, not turns).
    pub async fn count(&self) -> Result<i64, AppError> {
        let mut conn = self.conn.lock().await;
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages")
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| AppError::db_query("Failed to count stored exchanges", e))
    }

    /// Closes the underlying connection once no other handle is using it.
    pub async fn close(self) -> Result<(), AppError> {
        match Arc::try_unwrap(self.conn) {
            Ok(mutex) => mutex
                .into_inner()
                .close()
                .await
                .map_err(|e| AppError::db_query("Failed to close message store", e)),
            // Other handles still alive; the connection closes when the last one drops.
            Err(conn) => {
                debug!(
                    handles = Arc::strong_count(&conn),
                    "Message store still shared, skipping explicit close"
                );
                Ok(())
            }
        }
    }
}
