use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Row, params};

use super::models::{
    ConnectionType, HttpHeader, Monitor, MonitorCheck, MonitorId, MonitorSpec, NotificationConfig,
};
use crate::notification::Platform;
use crate::pool::{LibsqlManager, LibsqlPool};

/// Number of recent checks preloaded with every monitor
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Persistence boundary used by the monitor manager.
///
/// Implementations must be safe to call concurrently from every runner.
#[async_trait]
pub trait Store: Send + Sync {
    /// Load every monitor with its recent history preloaded
    async fn load_all(&self) -> Result<Vec<Monitor>>;

    /// Load a single monitor with its recent history
    async fn find_by_id(&self, id: MonitorId) -> Result<Option<Monitor>>;

    /// Insert a new monitor (with headers and notification settings) and
    /// return the assigned id
    async fn create(&self, spec: &MonitorSpec) -> Result<MonitorId>;

    /// Persist configuration and statistics of an existing monitor.
    ///
    /// The notification settings are left untouched, see
    /// [`Store::upsert_notification`].
    async fn save(&self, monitor: &Monitor) -> Result<()>;

    /// Persist health, last result and counters, leaving configuration alone
    async fn save_state(&self, monitor: &Monitor) -> Result<()>;

    /// Persist only the health flag
    async fn set_health(&self, id: MonitorId, healthy: Option<bool>) -> Result<()>;

    /// Delete a monitor and everything hanging off it
    async fn delete(&self, id: MonitorId) -> Result<()>;

    /// Append one history row
    async fn append_check(&self, check: &MonitorCheck) -> Result<i64>;

    /// Insert or replace the notification settings of a monitor
    async fn upsert_notification(&self, id: MonitorId, config: &NotificationConfig) -> Result<()>;

    /// Delete history rows created before `before`, returning how many went
    async fn prune_checks(&self, before: DateTime<Utc>) -> Result<u64>;
}

const MONITOR_SELECT: &str = "SELECT m.id, m.name, m.enabled, m.connection, m.connection_type, \
     m.http_method, m.timeout_seconds, m.interval_seconds, m.always_save, m.body, m.healthy, \
     m.checked_at, m.result, m.total_checks, m.successful_checks, n.enabled, n.platform, \
     n.webhook, n.issue_title, n.issue_body, n.recovery_title, n.recovery_body \
     FROM monitors m LEFT JOIN notifications n ON n.monitor_id = m.id";

/// LibSQL backed store
pub struct DatabaseImpl {
    pool: LibsqlPool,
    history_limit: usize,
}

impl DatabaseImpl {
    /// Create a new store from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool, history_limit: DEFAULT_HISTORY_LIMIT }
    }

    /// Override how many recent checks are loaded with each monitor
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        self.pool.get().await.map_err(|e| anyhow!("failed to get database connection: {e}"))
    }

    async fn hydrate(&self, conn: &Connection, mut monitor: Monitor) -> Result<Monitor> {
        monitor.spec.headers = load_headers(conn, monitor.id).await?;
        monitor.checks = load_recent_checks(conn, monitor.id, self.history_limit).await?;
        Ok(monitor)
    }
}

#[async_trait]
impl Store for DatabaseImpl {
    async fn load_all(&self) -> Result<Vec<Monitor>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(&format!("{MONITOR_SELECT} ORDER BY m.id"), ()).await?;

        let mut monitors = Vec::new();
        while let Some(row) = rows.next().await? {
            monitors.push(monitor_from_row(&row)?);
        }

        let mut hydrated = Vec::with_capacity(monitors.len());
        for monitor in monitors {
            hydrated.push(self.hydrate(&conn, monitor).await?);
        }
        Ok(hydrated)
    }

    async fn find_by_id(&self, id: MonitorId) -> Result<Option<Monitor>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(&format!("{MONITOR_SELECT} WHERE m.id = ?"), params![id]).await?;

        let monitor = match rows.next().await? {
            Some(row) => monitor_from_row(&row)?,
            None => return Ok(None),
        };
        Ok(Some(self.hydrate(&conn, monitor).await?))
    }

    async fn create(&self, spec: &MonitorSpec) -> Result<MonitorId> {
        let conn = self.get_conn().await?;
        let tx = conn.transaction().await?;

        tx.execute(
            "INSERT INTO monitors (name, enabled, connection, connection_type, http_method, timeout_seconds, interval_seconds, always_save, body) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                spec.name.clone(),
                spec.enabled as i64,
                spec.connection.clone(),
                spec.connection_type.as_str(),
                spec.http_method.clone(),
                spec.timeout as i64,
                spec.interval as i64,
                spec.always_save as i64,
                spec.body.clone()
            ],
        )
        .await?;
        let id = tx.last_insert_rowid();

        replace_headers(&tx, id, &spec.headers).await?;
        write_notification(&tx, id, &spec.notification).await?;

        tx.commit().await?;
        Ok(id)
    }

    async fn save(&self, monitor: &Monitor) -> Result<()> {
        let conn = self.get_conn().await?;
        let tx = conn.transaction().await?;
        let spec = &monitor.spec;

        let changed = tx
            .execute(
                "UPDATE monitors SET name = ?, enabled = ?, connection = ?, connection_type = ?, http_method = ?, timeout_seconds = ?, interval_seconds = ?, always_save = ?, body = ?, healthy = ?, checked_at = ?, result = ?, total_checks = ?, successful_checks = ? WHERE id = ?",
                params![
                    spec.name.clone(),
                    spec.enabled as i64,
                    spec.connection.clone(),
                    spec.connection_type.as_str(),
                    spec.http_method.clone(),
                    spec.timeout as i64,
                    spec.interval as i64,
                    spec.always_save as i64,
                    spec.body.clone(),
                    monitor.healthy.map(i64::from),
                    monitor.checked.map(|t| t.timestamp_millis()),
                    monitor.result.clone(),
                    monitor.total_checks as i64,
                    monitor.successful_checks as i64,
                    monitor.id
                ],
            )
            .await?;

        if changed == 0 {
            return Err(anyhow!("monitor {} is not persisted", monitor.id));
        }

        replace_headers(&tx, monitor.id, &spec.headers).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn save_state(&self, monitor: &Monitor) -> Result<()> {
        let conn = self.get_conn().await?;
        let changed = conn
            .execute(
                "UPDATE monitors SET healthy = ?, checked_at = ?, result = ?, total_checks = ?, successful_checks = ? WHERE id = ?",
                params![
                    monitor.healthy.map(i64::from),
                    monitor.checked.map(|t| t.timestamp_millis()),
                    monitor.result.clone(),
                    monitor.total_checks as i64,
                    monitor.successful_checks as i64,
                    monitor.id
                ],
            )
            .await?;

        if changed == 0 {
            return Err(anyhow!("monitor {} is not persisted", monitor.id));
        }
        Ok(())
    }

    async fn set_health(&self, id: MonitorId, healthy: Option<bool>) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE monitors SET healthy = ? WHERE id = ?",
            params![healthy.map(i64::from), id],
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, id: MonitorId) -> Result<()> {
        let conn = self.get_conn().await?;
        let tx = conn.transaction().await?;

        // Cascades cover this too, but only when the pragma is on for the connection
        tx.execute("DELETE FROM monitor_checks WHERE monitor_id = ?", params![id]).await?;
        tx.execute("DELETE FROM monitor_headers WHERE monitor_id = ?", params![id]).await?;
        tx.execute("DELETE FROM notifications WHERE monitor_id = ?", params![id]).await?;
        tx.execute("DELETE FROM monitors WHERE id = ?", params![id]).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn append_check(&self, check: &MonitorCheck) -> Result<i64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO monitor_checks (monitor_id, created_at, success, result, response_time_ms) VALUES (?, ?, ?, ?, ?)",
            params![
                check.monitor_id,
                check.created.timestamp_millis(),
                check.success as i64,
                check.result.clone(),
                check.response_time_ms as i64
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn upsert_notification(&self, id: MonitorId, config: &NotificationConfig) -> Result<()> {
        let conn = self.get_conn().await?;
        write_notification(&conn, id, config).await
    }

    async fn prune_checks(&self, before: DateTime<Utc>) -> Result<u64> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute(
                "DELETE FROM monitor_checks WHERE created_at < ?",
                params![before.timestamp_millis()],
            )
            .await?;
        Ok(deleted)
    }
}

async fn replace_headers(conn: &Connection, id: MonitorId, headers: &[HttpHeader]) -> Result<()> {
    conn.execute("DELETE FROM monitor_headers WHERE monitor_id = ?", params![id]).await?;
    for header in headers {
        conn.execute(
            "INSERT INTO monitor_headers (monitor_id, key, value) VALUES (?, ?, ?)",
            params![id, header.key.clone(), header.value.clone()],
        )
        .await?;
    }
    Ok(())
}

async fn write_notification(conn: &Connection, id: MonitorId, config: &NotificationConfig) -> Result<()> {
    conn.execute(
        "INSERT INTO notifications (monitor_id, enabled, platform, webhook, issue_title, issue_body, recovery_title, recovery_body) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(monitor_id) DO UPDATE SET enabled = excluded.enabled, platform = excluded.platform, webhook = excluded.webhook, issue_title = excluded.issue_title, issue_body = excluded.issue_body, recovery_title = excluded.recovery_title, recovery_body = excluded.recovery_body",
        params![
            id,
            config.enabled as i64,
            config.platform.as_str(),
            config.webhook.clone(),
            config.issue_title.clone(),
            config.issue_body.clone(),
            config.recovery_title.clone(),
            config.recovery_body.clone()
        ],
    )
    .await?;
    Ok(())
}

async fn load_headers(conn: &Connection, id: MonitorId) -> Result<Vec<HttpHeader>> {
    let mut rows = conn
        .query("SELECT key, value FROM monitor_headers WHERE monitor_id = ? ORDER BY id", params![id])
        .await?;

    let mut headers = Vec::new();
    while let Some(row) = rows.next().await? {
        headers.push(HttpHeader { key: row.get(0)?, value: row.get(1)? });
    }
    Ok(headers)
}

async fn load_recent_checks(conn: &Connection, id: MonitorId, limit: usize) -> Result<Vec<MonitorCheck>> {
    let mut rows = conn
        .query(
            "SELECT created_at, success, result, response_time_ms FROM monitor_checks WHERE monitor_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
            params![id, limit as i64],
        )
        .await?;

    let mut checks = Vec::new();
    while let Some(row) = rows.next().await? {
        checks.push(MonitorCheck {
            monitor_id: id,
            created: millis_to_datetime(row.get(0)?)?,
            success: row.get::<i64>(1)? != 0,
            result: row.get(2)?,
            response_time_ms: row.get::<i64>(3)?.max(0) as u64,
        });
    }
    checks.reverse();
    Ok(checks)
}

fn monitor_from_row(row: &Row) -> Result<Monitor> {
    let connection_type: String = row.get(4)?;
    let connection_type = connection_type.parse::<ConnectionType>().map_err(|e| anyhow!(e))?;

    let platform = match row.get::<Option<String>>(16)? {
        Some(raw) => raw.parse::<Platform>().map_err(|e| anyhow!(e))?,
        None => Platform::default(),
    };

    let notification = NotificationConfig {
        enabled: row.get::<Option<i64>>(15)?.unwrap_or(0) != 0,
        platform,
        webhook: row.get::<Option<String>>(17)?.unwrap_or_default(),
        issue_title: row.get(18)?,
        issue_body: row.get(19)?,
        recovery_title: row.get(20)?,
        recovery_body: row.get(21)?,
    };

    let spec = MonitorSpec {
        name: row.get(1)?,
        enabled: row.get::<i64>(2)? != 0,
        connection: row.get(3)?,
        connection_type,
        http_method: row.get(5)?,
        timeout: row.get::<i64>(6)?.max(0) as u64,
        interval: row.get::<i64>(7)?.max(0) as u64,
        always_save: row.get::<i64>(8)? != 0,
        body: row.get(9)?,
        headers: Vec::new(),
        notification,
    };

    let checked = row.get::<Option<i64>>(11)?.map(millis_to_datetime).transpose()?;

    Ok(Monitor {
        id: row.get(0)?,
        spec,
        healthy: row.get::<Option<i64>>(10)?.map(|v| v != 0),
        checked,
        result: row.get(12)?,
        total_checks: row.get::<i64>(13)?.max(0) as u64,
        successful_checks: row.get::<i64>(14)?.max(0) as u64,
        checks: Vec::new(),
    })
}

fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| anyhow!("timestamp out of range: {millis}"))
}
