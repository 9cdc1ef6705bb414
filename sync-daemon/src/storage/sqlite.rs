//! SQLite storage backend for sync-daemon.

use super::{LedgerUpdate, SyncStorage};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqliteConnection;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use sync_core::{plan_live_offset, plan_replay_completed, plan_replay_progress, LedgerOp};
use sync_types::{Measurement, MeasurementValue, Offset, ReplayWindow};

/// SQLite-based measurement store and offset ledger.
///
/// Uses WAL mode for concurrent reads/writes.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) the database at `path`.
    pub async fn new(path: &Path) -> StorageResult<Self> {
        Self::connect(path, true).await
    }

    /// Open the database at `path`, failing if it does not exist.
    pub async fn open_existing(path: &Path) -> StorageResult<Self> {
        Self::connect(path, false).await
    }

    async fn connect(path: &Path, create_if_missing: bool) -> StorageResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Create an in-memory SQLite storage (for testing).
    pub async fn in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(StorageError::Database)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // A single connection that never expires: the database lives in it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Close all connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS measurement (
                sensor_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                numeric_value REAL,
                string_value TEXT,
                PRIMARY KEY (sensor_id, timestamp)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        // to_offset = '' marks the potential window
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS replay (
                from_offset TEXT NOT NULL,
                to_offset TEXT NOT NULL,
                PRIMARY KEY (from_offset, to_offset)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }

    async fn upsert(conn: &mut SqliteConnection, measurement: &Measurement) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO measurement (sensor_id, timestamp, numeric_value, string_value)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(sensor_id, timestamp) DO UPDATE SET
                numeric_value = excluded.numeric_value,
                string_value = excluded.string_value
            "#,
        )
        .bind(measurement.sensor_id.as_str())
        .bind(measurement.timestamp)
        .bind(measurement.numeric_value())
        .bind(measurement.string_value())
        .execute(&mut *conn)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }

    async fn potential_in(conn: &mut SqliteConnection) -> StorageResult<Option<ReplayWindow>> {
        let rows = sqlx::query_as::<_, ReplayRow>(
            "SELECT from_offset, to_offset FROM replay WHERE to_offset = '' ORDER BY rowid",
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(StorageError::Database)?;

        match rows.len() {
            0 => Ok(None),
            1 => rows.into_iter().next().map(ReplayWindow::try_from).transpose(),
            count => Err(StorageError::MultiplePotentialWindows { count }),
        }
    }

    async fn apply(conn: &mut SqliteConnection, op: &LedgerOp) -> StorageResult<()> {
        let (operation, window, sql) = match op {
            LedgerOp::Insert(window) => (
                "insert",
                window,
                "INSERT INTO replay (from_offset, to_offset) VALUES (?1, ?2)",
            ),
            LedgerOp::Delete(window) => (
                "delete",
                window,
                "DELETE FROM replay WHERE from_offset = ?1 AND to_offset = ?2",
            ),
        };

        let result = sqlx::query(sql)
            .bind(window.from.as_str())
            .bind(window.to_str())
            .execute(&mut *conn)
            .await
            .map_err(StorageError::Database)?;

        match result.rows_affected() {
            1 => Ok(()),
            rows => Err(StorageError::UnexpectedRowCount {
                operation,
                window: window.to_string(),
                rows,
            }),
        }
    }

    async fn plan(conn: &mut SqliteConnection, update: LedgerUpdate) -> StorageResult<Vec<LedgerOp>> {
        let ops = match update {
            LedgerUpdate::None => Vec::new(),
            LedgerUpdate::Live {
                offset,
                first_since_restart,
            } => {
                let potential = Self::potential_in(conn).await?;
                plan_live_offset(potential.as_ref(), &offset, first_since_restart)
            }
            LedgerUpdate::ReplayProgress { window, offset } => {
                plan_replay_progress(&window, &offset).1
            }
            LedgerUpdate::ReplayCompleted { window } => plan_replay_completed(&window),
        };
        Ok(ops)
    }
}

#[async_trait]
impl SyncStorage for SqliteStorage {
    async fn commit(
        &self,
        measurements: &[Measurement],
        update: LedgerUpdate,
    ) -> StorageResult<()> {
        if measurements.is_empty() && update == LedgerUpdate::None {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(StorageError::Database)?;

        for measurement in measurements {
            Self::upsert(&mut tx, measurement).await?;
        }

        for op in Self::plan(&mut tx, update).await? {
            tracing::debug!("Ledger: {:?}", op);
            Self::apply(&mut tx, &op).await?;
        }

        tx.commit().await.map_err(StorageError::Database)?;
        Ok(())
    }

    async fn delete_window(&self, window: &ReplayWindow) -> StorageResult<()> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::Database)?;
        Self::apply(&mut conn, &LedgerOp::Delete(window.clone())).await
    }

    async fn potential_window(&self) -> StorageResult<Option<ReplayWindow>> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::Database)?;
        Self::potential_in(&mut conn).await
    }

    async fn pending_windows(&self) -> StorageResult<Vec<ReplayWindow>> {
        let rows = sqlx::query_as::<_, ReplayRow>(
            "SELECT from_offset, to_offset FROM replay WHERE to_offset <> '' ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        rows.into_iter().map(ReplayWindow::try_from).collect()
    }

    async fn first_pending_window(&self) -> StorageResult<Option<ReplayWindow>> {
        let row = sqlx::query_as::<_, ReplayRow>(
            "SELECT from_offset, to_offset FROM replay WHERE to_offset <> '' ORDER BY rowid LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        row.map(ReplayWindow::try_from).transpose()
    }

    async fn measurement_count(&self) -> StorageResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM measurement")
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(count as u64)
    }

    async fn measurements(&self, sensor_id: &str) -> StorageResult<Vec<Measurement>> {
        let rows = sqlx::query_as::<_, MeasurementRow>(
            r#"
            SELECT sensor_id, timestamp, numeric_value, string_value
            FROM measurement
            WHERE sensor_id = ?1
            ORDER BY timestamp ASC
            "#,
        )
        .bind(sensor_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        rows.into_iter().map(Measurement::try_from).collect()
    }
}

/// Internal row type for the `replay` table.
#[derive(sqlx::FromRow)]
struct ReplayRow {
    from_offset: String,
    to_offset: String,
}

impl TryFrom<ReplayRow> for ReplayWindow {
    type Error = StorageError;

    fn try_from(row: ReplayRow) -> Result<Self, Self::Error> {
        let from = Offset::new(row.from_offset).ok_or_else(|| StorageError::Corrupt {
            table: "replay",
            reason: "empty from_offset".to_string(),
        })?;

        Ok(ReplayWindow {
            from,
            to: Offset::new(row.to_offset),
        })
    }
}

/// Internal row type for the `measurement` table.
#[derive(sqlx::FromRow)]
struct MeasurementRow {
    sensor_id: String,
    timestamp: DateTime<Utc>,
    numeric_value: Option<f64>,
    string_value: Option<String>,
}

impl TryFrom<MeasurementRow> for Measurement {
    type Error = StorageError;

    fn try_from(row: MeasurementRow) -> Result<Self, Self::Error> {
        let value = match (row.numeric_value, row.string_value) {
            (Some(v), None) => MeasurementValue::Numeric(v),
            (None, Some(v)) => MeasurementValue::Text(v),
            _ => {
                return Err(StorageError::Corrupt {
                    table: "measurement",
                    reason: format!(
                        "{} at {} must have exactly one value",
                        row.sensor_id, row.timestamp
                    ),
                })
            }
        };

        Ok(Measurement::new(row.sensor_id, row.timestamp, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn offset(s: &str) -> Offset {
        Offset::new(s).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn numeric(sensor: &str, secs: i64, value: f64) -> Measurement {
        Measurement::new(sensor, at(secs), MeasurementValue::Numeric(value))
    }

    async fn seed(storage: &SqliteStorage, window: ReplayWindow) {
        let mut conn = storage.pool.acquire().await.unwrap();
        SqliteStorage::apply(&mut conn, &LedgerOp::Insert(window))
            .await
            .unwrap();
    }

    // ===== Measurement Store Tests =====

    #[tokio::test]
    async fn commit_persists_measurements() {
        let storage = SqliteStorage::in_memory().await.unwrap();

        storage
            .commit(
                &[numeric("s1", 0, 1.0), numeric("s1", 1, 2.0), numeric("s2", 0, 3.0)],
                LedgerUpdate::None,
            )
            .await
            .unwrap();

        assert_eq!(storage.measurement_count().await.unwrap(), 3);
        let stored = storage.measurements("s1").await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].timestamp, at(0));
        assert_eq!(stored[1].value, MeasurementValue::Numeric(2.0));
    }

    #[tokio::test]
    async fn upsert_is_last_write_wins() {
        let storage = SqliteStorage::in_memory().await.unwrap();

        storage
            .commit(&[numeric("s1", 0, 1.0)], LedgerUpdate::None)
            .await
            .unwrap();
        storage
            .commit(
                &[Measurement::new("s1", at(0), MeasurementValue::Text("off".into()))],
                LedgerUpdate::None,
            )
            .await
            .unwrap();

        let stored = storage.measurements("s1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].value, MeasurementValue::Text("off".into()));
    }

    #[tokio::test]
    async fn duplicates_within_one_batch_keep_the_last() {
        let storage = SqliteStorage::in_memory().await.unwrap();

        storage
            .commit(
                &[numeric("s1", 0, 1.0), numeric("s1", 0, 9.0)],
                LedgerUpdate::None,
            )
            .await
            .unwrap();

        let stored = storage.measurements("s1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].numeric_value(), Some(9.0));
    }

    // ===== Ledger Tests =====

    #[tokio::test]
    async fn first_live_offset_creates_potential_window() {
        let storage = SqliteStorage::in_memory().await.unwrap();

        storage
            .commit(
                &[numeric("s1", 0, 1.0)],
                LedgerUpdate::Live {
                    offset: offset("off1"),
                    first_since_restart: true,
                },
            )
            .await
            .unwrap();

        assert_eq!(
            storage.potential_window().await.unwrap(),
            Some(ReplayWindow::potential(offset("off1")))
        );
        assert!(storage.pending_windows().await.unwrap().is_empty());
        assert_eq!(storage.latest_offset().await.unwrap(), Some(offset("off1")));
    }

    #[tokio::test]
    async fn restart_offset_creates_pending_window() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        seed(&storage, ReplayWindow::potential(offset("p0"))).await;

        storage
            .commit(
                &[],
                LedgerUpdate::Live {
                    offset: offset("p1"),
                    first_since_restart: true,
                },
            )
            .await
            .unwrap();

        assert_eq!(
            storage.potential_window().await.unwrap(),
            Some(ReplayWindow::potential(offset("p1")))
        );
        assert_eq!(
            storage.pending_windows().await.unwrap(),
            vec![ReplayWindow::pending(offset("p0"), offset("p1"))]
        );
    }

    #[tokio::test]
    async fn replay_progress_and_completion() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let window = ReplayWindow::pending(offset("p0"), offset("p1"));
        seed(&storage, window.clone()).await;

        storage
            .commit(
                &[numeric("s1", 0, 1.0)],
                LedgerUpdate::ReplayProgress {
                    window: window.clone(),
                    offset: offset("mid"),
                },
            )
            .await
            .unwrap();

        let shrunk = ReplayWindow::pending(offset("mid"), offset("p1"));
        assert_eq!(
            storage.first_pending_window().await.unwrap(),
            Some(shrunk.clone())
        );

        storage
            .commit(
                &[numeric("s1", 1, 2.0)],
                LedgerUpdate::ReplayCompleted { window: shrunk },
            )
            .await
            .unwrap();

        assert!(storage.first_pending_window().await.unwrap().is_none());
        assert_eq!(storage.measurement_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn failed_ledger_update_rolls_back_measurements() {
        let storage = SqliteStorage::in_memory().await.unwrap();

        // The window does not exist, so the delete affects no rows.
        let err = storage
            .commit(
                &[numeric("s1", 0, 1.0)],
                LedgerUpdate::ReplayCompleted {
                    window: ReplayWindow::pending(offset("a"), offset("b")),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StorageError::UnexpectedRowCount {
                operation: "delete",
                rows: 0,
                ..
            }
        ));
        assert_eq!(storage.measurement_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_window_requires_existing_row() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let window = ReplayWindow::pending(offset("a"), offset("b"));
        seed(&storage, window.clone()).await;

        storage.delete_window(&window).await.unwrap();
        let err = storage.delete_window(&window).await.unwrap_err();

        assert!(matches!(err, StorageError::UnexpectedRowCount { rows: 0, .. }));
    }

    #[tokio::test]
    async fn pending_windows_keep_insertion_order() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        seed(&storage, ReplayWindow::pending(offset("z"), offset("y"))).await;
        seed(&storage, ReplayWindow::potential(offset("y"))).await;
        seed(&storage, ReplayWindow::pending(offset("a"), offset("b"))).await;

        assert_eq!(
            storage.pending_windows().await.unwrap(),
            vec![
                ReplayWindow::pending(offset("z"), offset("y")),
                ReplayWindow::pending(offset("a"), offset("b")),
            ]
        );
        assert_eq!(
            storage.first_pending_window().await.unwrap(),
            Some(ReplayWindow::pending(offset("z"), offset("y")))
        );
    }

    #[tokio::test]
    async fn two_potential_windows_are_reported() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        seed(&storage, ReplayWindow::potential(offset("a"))).await;
        seed(&storage, ReplayWindow::potential(offset("b"))).await;

        let err = storage.potential_window().await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::MultiplePotentialWindows { count: 2 }
        ));
    }

    #[tokio::test]
    async fn open_existing_does_not_create_a_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("typo.db");

        let result = SqliteStorage::open_existing(&path).await;

        assert!(matches!(result, Err(StorageError::Database(_))));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn open_existing_reads_a_created_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("measurements.db");

        let storage = SqliteStorage::new(&path).await.unwrap();
        storage
            .commit(&[numeric("s1", 0, 1.0)], LedgerUpdate::None)
            .await
            .unwrap();
        storage.close().await;

        let reopened = SqliteStorage::open_existing(&path).await.unwrap();
        assert_eq!(reopened.measurement_count().await.unwrap(), 1);
        reopened.close().await;
    }

    #[tokio::test]
    async fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("measurements.db");

        let storage = SqliteStorage::new(&path).await.unwrap();
        storage
            .commit(
                &[numeric("s1", 0, 1.0)],
                LedgerUpdate::Live {
                    offset: offset("o1"),
                    first_since_restart: true,
                },
            )
            .await
            .unwrap();
        storage.close().await;

        let reopened = SqliteStorage::new(&path).await.unwrap();
        assert_eq!(reopened.measurement_count().await.unwrap(), 1);
        assert_eq!(reopened.latest_offset().await.unwrap(), Some(offset("o1")));
    }
}
