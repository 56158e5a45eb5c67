//! SQLite storage backend implementation
//!
//! This module provides a SQLite-based implementation of the `StorageBackend` trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Connection pooling**: Runners for different monitors write concurrently
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Timestamps are stored as Unix milliseconds. Payloads are stored as JSON
//! text and only parsed back into `serde_json::Value`.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, QueryRange, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{EventRow, MonitorRecord, MonitorStatus, NotificationRecord, SampleRow, UptimeStats};

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Create a new SQLite backend
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run migrations to create tables
    /// 3. Configure SQLite for WAL mode and foreign keys
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use uptime_monitor::storage::sqlite::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./uptime.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn parse_payload(raw: &str) -> StorageResult<serde_json::Value> {
        serde_json::from_str(raw)
            .map_err(|e| StorageError::SerializationError(format!("failed to deserialize payload: {e}")))
    }

    async fn notification_ids_for(&self, monitor_id: &str) -> StorageResult<Vec<String>> {
        let ids: Vec<(String,)> = sqlx::query_as(
            "SELECT notification_id FROM monitor_notifications WHERE monitor_id = ? ORDER BY position ASC",
        )
        .bind(monitor_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn monitors_from_rows(&self, rows: Vec<SqliteRow>) -> StorageResult<Vec<MonitorRecord>> {
        let mut monitors = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            let notification_ids = self.notification_ids_for(&id).await?;
            let payload: String = row.try_get("payload")?;
            let interval: i64 = row.try_get("interval_secs")?;

            monitors.push(MonitorRecord {
                workspace_id: row.try_get("workspace_id")?,
                name: row.try_get("name")?,
                probe_type: row.try_get("probe_type")?,
                active: row.try_get("active")?,
                interval_secs: interval.max(0) as u64,
                payload: Self::parse_payload(&payload)?,
                notification_ids,
                created_at: Self::millis_to_timestamp(row.try_get("created_at")?),
                updated_at: Self::millis_to_timestamp(row.try_get("updated_at")?),
                id,
            });
        }
        Ok(monitors)
    }

    fn notification_from_row(row: &SqliteRow) -> StorageResult<NotificationRecord> {
        let payload: String = row.try_get("payload")?;
        Ok(NotificationRecord {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            channel_type: row.try_get("channel_type")?,
            payload: Self::parse_payload(&payload)?,
        })
    }

    fn sample_from_row(row: &SqliteRow) -> StorageResult<SampleRow> {
        Ok(SampleRow {
            monitor_id: row.try_get("monitor_id")?,
            value: row.try_get("value")?,
            created_at: Self::millis_to_timestamp(row.try_get("created_at")?),
        })
    }

    fn event_from_row(row: &SqliteRow) -> StorageResult<EventRow> {
        let kind: String = row.try_get("kind")?;
        Ok(EventRow {
            monitor_id: row.try_get("monitor_id")?,
            kind: kind.parse::<MonitorStatus>().map_err(StorageError::SerializationError)?,
            message: row.try_get("message")?,
            created_at: Self::millis_to_timestamp(row.try_get("created_at")?),
        })
    }
}

const MONITOR_COLUMNS: &str =
    "id, workspace_id, name, probe_type, active, interval_secs, payload, created_at, updated_at";

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self, monitor), fields(monitor_id = %monitor.id))]
    async fn upsert_monitor(&self, monitor: &MonitorRecord) -> StorageResult<()> {
        let payload = serde_json::to_string(&monitor.payload)?;
        let interval = i64::try_from(monitor.interval_secs).map_err(|_| {
            StorageError::SerializationError(format!("interval {} out of range", monitor.interval_secs))
        })?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO monitors (
                id, workspace_id, name, probe_type, active,
                interval_secs, payload, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                workspace_id = excluded.workspace_id,
                name = excluded.name,
                probe_type = excluded.probe_type,
                active = excluded.active,
                interval_secs = excluded.interval_secs,
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&monitor.id)
        .bind(&monitor.workspace_id)
        .bind(&monitor.name)
        .bind(&monitor.probe_type)
        .bind(monitor.active)
        .bind(interval)
        .bind(payload)
        .bind(Self::timestamp_to_millis(&monitor.created_at))
        .bind(Self::timestamp_to_millis(&monitor.updated_at))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM monitor_notifications WHERE monitor_id = ?")
            .bind(&monitor.id)
            .execute(&mut *tx)
            .await?;

        for (position, notification_id) in monitor.notification_ids.iter().enumerate() {
            sqlx::query(
                "INSERT OR IGNORE INTO monitor_notifications (monitor_id, notification_id, position) VALUES (?, ?, ?)",
            )
            .bind(&monitor.id)
            .bind(notification_id)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_monitor(&self, id: &str) -> StorageResult<Option<MonitorRecord>> {
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = ?");
        let rows = sqlx::query(&sql).bind(id).fetch_all(&self.pool).await?;
        Ok(self.monitors_from_rows(rows).await?.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn list_monitors(&self, workspace_id: Option<&str>) -> StorageResult<Vec<MonitorRecord>> {
        let rows = match workspace_id {
            Some(ws) => {
                let sql = format!(
                    "SELECT {MONITOR_COLUMNS} FROM monitors WHERE workspace_id = ? ORDER BY created_at ASC, id ASC"
                );
                sqlx::query(&sql).bind(ws).fetch_all(&self.pool).await?
            }
            None => {
                let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors ORDER BY created_at ASC, id ASC");
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
        };
        self.monitors_from_rows(rows).await
    }

    #[instrument(skip(self))]
    async fn list_active_monitors(&self) -> StorageResult<Vec<MonitorRecord>> {
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE active = 1 ORDER BY created_at ASC, id ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        self.monitors_from_rows(rows).await
    }

    #[instrument(skip(self))]
    async fn delete_monitor(&self, id: &str) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM monitors WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, notification), fields(notification_id = %notification.id))]
    async fn upsert_notification(&self, notification: &NotificationRecord) -> StorageResult<()> {
        let payload = serde_json::to_string(&notification.payload)?;

        sqlx::query(
            r#"
            INSERT INTO notifications (id, name, channel_type, payload)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                channel_type = excluded.channel_type,
                payload = excluded.payload
            "#,
        )
        .bind(&notification.id)
        .bind(&notification.name)
        .bind(&notification.channel_type)
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_notification(&self, id: &str) -> StorageResult<Option<NotificationRecord>> {
        let row = sqlx::query("SELECT id, name, channel_type, payload FROM notifications WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::notification_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn list_notifications(&self) -> StorageResult<Vec<NotificationRecord>> {
        let rows = sqlx::query("SELECT id, name, channel_type, payload FROM notifications ORDER BY name ASC, id ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::notification_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn delete_notification(&self, id: &str) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, sample), fields(monitor_id = %sample.monitor_id, value = sample.value))]
    async fn insert_sample(&self, sample: &SampleRow) -> StorageResult<()> {
        sqlx::query("INSERT INTO samples (monitor_id, value, created_at) VALUES (?, ?, ?)")
            .bind(&sample.monitor_id)
            .bind(sample.value)
            .bind(Self::timestamp_to_millis(&sample.created_at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(monitor_id = %query.monitor_id))]
    async fn query_samples(&self, query: QueryRange) -> StorageResult<Vec<SampleRow>> {
        debug!(
            "querying samples for {} from {} to {}",
            query.monitor_id, query.start, query.end
        );

        let limit_clause = query.limit.map(|l| format!("LIMIT {l}")).unwrap_or_default();

        let sql = format!(
            r#"
            SELECT monitor_id, value, created_at
            FROM samples
            WHERE monitor_id = ? AND created_at >= ? AND created_at <= ?
            ORDER BY created_at ASC, id ASC
            {limit_clause}
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(&query.monitor_id)
            .bind(Self::timestamp_to_millis(&query.start))
            .bind(Self::timestamp_to_millis(&query.end))
            .fetch_all(&self.pool)
            .await?;

        let samples: Vec<SampleRow> = rows.iter().map(Self::sample_from_row).collect::<StorageResult<_>>()?;
        debug!("query returned {} samples", samples.len());
        Ok(samples)
    }

    #[instrument(skip(self))]
    async fn query_latest_samples(&self, monitor_id: &str, limit: usize) -> StorageResult<Vec<SampleRow>> {
        let rows = sqlx::query(
            r#"
            SELECT monitor_id, value, created_at
            FROM samples
            WHERE monitor_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(monitor_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut samples: Vec<SampleRow> = rows.iter().map(Self::sample_from_row).collect::<StorageResult<_>>()?;
        // Oldest first
        samples.reverse();
        Ok(samples)
    }

    #[instrument(skip(self), fields(since = %since))]
    async fn calculate_uptime(&self, monitor_id: &str, since: DateTime<Utc>) -> StorageResult<UptimeStats> {
        let row: (Option<f64>, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                AVG(value),
                COALESCE(SUM(CASE WHEN value >= 0 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN value < 0 THEN 1 ELSE 0 END), 0)
            FROM samples
            WHERE monitor_id = ? AND created_at >= ?
            "#,
        )
        .bind(monitor_id)
        .bind(Self::timestamp_to_millis(&since))
        .fetch_one(&self.pool)
        .await?;

        Ok(match row {
            (Some(average_value), up, down) => UptimeStats {
                average_value,
                up_count: up.max(0) as u64,
                down_count: down.max(0) as u64,
            },
            (None, _, _) => UptimeStats::empty(),
        })
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn cleanup_old_samples(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        info!("cleaning up samples older than {}", before);

        let result = sqlx::query("DELETE FROM samples WHERE created_at < ?")
            .bind(Self::timestamp_to_millis(&before))
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() as usize;
        info!("deleted {} old samples", deleted);
        Ok(deleted)
    }

    #[instrument(skip(self, event), fields(monitor_id = %event.monitor_id, kind = %event.kind))]
    async fn insert_event(&self, event: &EventRow) -> StorageResult<()> {
        sqlx::query("INSERT INTO events (monitor_id, kind, message, created_at) VALUES (?, ?, ?, ?)")
            .bind(&event.monitor_id)
            .bind(event.kind.to_string())
            .bind(&event.message)
            .bind(Self::timestamp_to_millis(&event.created_at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn query_recent_events(&self, monitor_id: Option<&str>, limit: usize) -> StorageResult<Vec<EventRow>> {
        let rows = match monitor_id {
            Some(id) => {
                sqlx::query(
                    r#"
                    SELECT monitor_id, kind, message, created_at FROM events
                    WHERE monitor_id = ?
                    ORDER BY created_at DESC, id DESC
                    LIMIT ?
                    "#,
                )
                .bind(id)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT monitor_id, kind, message, created_at FROM events
                    ORDER BY created_at DESC, id DESC
                    LIMIT ?
                    "#,
                )
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(Self::event_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn latest_event(&self, monitor_id: &str) -> StorageResult<Option<EventRow>> {
        Ok(self.query_recent_events(Some(monitor_id), 1).await?.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(HealthStatus {
                healthy: true,
                message: "SQLite backend operational".to_string(),
                metadata: HashMap::from([
                    ("backend".to_string(), "sqlite".to_string()),
                    ("db_path".to_string(), self.db_path.clone()),
                ]),
            }),
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {e}"),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
