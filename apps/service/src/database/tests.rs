/// Round trips through the libsql store on a throwaway database file
use anyhow::Result;
use chrono::{Duration, Utc};
use tempfile::{TempDir, tempdir};

use super::models::{ConnectionType, HttpHeader, MonitorCheck, MonitorSpec, NotificationConfig};
use super::{DatabaseImpl, Store};
use crate::notification::Platform;
use crate::pool::open_pool;

/// Helper to create a migrated store; the directory must outlive the store
async fn create_test_store() -> Result<(DatabaseImpl, TempDir)> {
    let temp_dir = tempdir()?;
    let pool = open_pool(temp_dir.path().join("test.db"), 4).await?;

    let conn = pool.get().await.map_err(|e| anyhow::anyhow!("{e}"))?;
    super::initialize_database(&conn).await?;
    drop(conn);

    Ok((DatabaseImpl::new_from_pool(pool).with_history_limit(3), temp_dir))
}

fn http_spec(name: &str, url: &str) -> MonitorSpec {
    let mut spec = MonitorSpec::new(name, ConnectionType::Http, url, 30);
    spec.headers = vec![HttpHeader { key: "Accept".into(), value: "text/plain".into() }];
    spec.notification = NotificationConfig {
        enabled: true,
        platform: Platform::Slack,
        webhook: "https://hooks.slack.com/services/T/B/X".into(),
        ..NotificationConfig::default()
    };
    spec
}

fn check(monitor_id: i64, success: bool, minutes_ago: i64) -> MonitorCheck {
    MonitorCheck {
        monitor_id,
        created: Utc::now() - Duration::minutes(minutes_ago),
        success,
        result: if success { String::new() } else { "HTTP 503".into() },
        response_time_ms: 42,
    }
}

#[tokio::test]
async fn test_create_and_find_monitor() -> Result<()> {
    let (store, _dir) = create_test_store().await?;

    let spec = http_spec("site", "https://example.com");
    let id = store.create(&spec).await?;

    let monitor = store.find_by_id(id).await?.expect("monitor persisted");
    assert_eq!(monitor.id, id);
    assert_eq!(monitor.spec, spec);
    assert_eq!(monitor.healthy, None);
    assert_eq!(monitor.total_checks, 0);

    assert!(store.find_by_id(id + 100).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_save_persists_statistics_and_keeps_notification() -> Result<()> {
    let (store, _dir) = create_test_store().await?;
    let id = store.create(&http_spec("site", "https://example.com")).await?;

    let mut monitor = store.find_by_id(id).await?.unwrap();
    monitor.record(check(id, false, 0), 10);
    monitor.spec.interval = 5;
    monitor.spec.headers.clear();
    // save() must not touch the notification row
    monitor.spec.notification.enabled = false;
    store.save(&monitor).await?;

    let loaded = store.find_by_id(id).await?.unwrap();
    assert_eq!(loaded.healthy, Some(false));
    assert_eq!(loaded.total_checks, 1);
    assert_eq!(loaded.successful_checks, 0);
    assert_eq!(loaded.result, "HTTP 503");
    assert_eq!(loaded.spec.interval, 5);
    assert!(loaded.spec.headers.is_empty());
    assert!(loaded.spec.notification.enabled);
    Ok(())
}

#[tokio::test]
async fn test_save_state_leaves_configuration_alone() -> Result<()> {
    let (store, _dir) = create_test_store().await?;
    let id = store.create(&http_spec("site", "https://example.com")).await?;

    let mut current = store.find_by_id(id).await?.unwrap();
    current.spec.connection = "https://example.org".into();
    store.save(&current).await?;

    // A check of the earlier configuration finishing late
    let mut stale = store.find_by_id(id).await?.unwrap();
    stale.spec.connection = "https://example.com".into();
    stale.record(check(id, true, 0), 10);
    store.save_state(&stale).await?;

    let loaded = store.find_by_id(id).await?.unwrap();
    assert_eq!(loaded.spec.connection, "https://example.org");
    assert_eq!(loaded.healthy, Some(true));
    assert_eq!(loaded.total_checks, 1);
    assert_eq!(loaded.successful_checks, 1);
    assert!(loaded.checked.is_some());

    stale.id = id + 100;
    assert!(store.save_state(&stale).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_upsert_notification_replaces_row() -> Result<()> {
    let (store, _dir) = create_test_store().await?;
    let id = store.create(&http_spec("site", "https://example.com")).await?;

    let config = NotificationConfig {
        enabled: true,
        platform: Platform::Discord,
        webhook: "https://discord.com/api/webhooks/1/abc".into(),
        issue_title: Some("{{ name }} down".into()),
        ..NotificationConfig::default()
    };
    store.upsert_notification(id, &config).await?;
    store.upsert_notification(id, &config).await?;

    let loaded = store.find_by_id(id).await?.unwrap();
    assert_eq!(loaded.spec.notification, config);
    Ok(())
}

#[tokio::test]
async fn test_history_is_bounded_and_ordered() -> Result<()> {
    let (store, _dir) = create_test_store().await?;
    let id = store.create(&http_spec("site", "https://example.com")).await?;

    for minutes_ago in (0..5).rev() {
        store.append_check(&check(id, minutes_ago % 2 == 0, minutes_ago)).await?;
    }

    let loaded = store.find_by_id(id).await?.unwrap();
    assert_eq!(loaded.checks.len(), 3);
    assert!(loaded.checks.windows(2).all(|w| w[0].created <= w[1].created));
    assert!(loaded.checks.iter().all(|c| c.monitor_id == id));
    Ok(())
}

#[tokio::test]
async fn test_set_health_and_load_all() -> Result<()> {
    let (store, _dir) = create_test_store().await?;
    let a = store.create(&http_spec("a", "https://a.example.com")).await?;
    let b = store.create(&MonitorSpec::new("b", ConnectionType::Tcp, "example.com:22", 10)).await?;

    store.set_health(a, Some(true)).await?;
    store.set_health(b, None).await?;

    let all = store.load_all().await?;
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, a);
    assert_eq!(all[0].healthy, Some(true));
    assert_eq!(all[1].spec.connection_type, ConnectionType::Tcp);
    assert!(!all[1].spec.notification.enabled);
    Ok(())
}

#[tokio::test]
async fn test_delete_removes_monitor_and_history() -> Result<()> {
    let (store, _dir) = create_test_store().await?;
    let id = store.create(&http_spec("site", "https://example.com")).await?;
    store.append_check(&check(id, true, 0)).await?;

    store.delete(id).await?;

    assert!(store.find_by_id(id).await?.is_none());
    assert_eq!(store.prune_checks(Utc::now() + Duration::days(1)).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_prune_checks_keeps_recent_rows() -> Result<()> {
    let (store, _dir) = create_test_store().await?;
    let id = store.create(&http_spec("site", "https://example.com")).await?;

    store.append_check(&check(id, true, 60 * 24 * 10)).await?;
    store.append_check(&check(id, true, 60 * 24 * 9)).await?;
    store.append_check(&check(id, false, 1)).await?;

    let deleted = store.prune_checks(Utc::now() - Duration::days(7)).await?;
    assert_eq!(deleted, 2);

    let loaded = store.find_by_id(id).await?.unwrap();
    assert_eq!(loaded.checks.len(), 1);
    assert!(!loaded.checks[0].success);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_name_is_rejected_by_schema() -> Result<()> {
    let (store, _dir) = create_test_store().await?;
    store.create(&http_spec("site", "https://a.example.com")).await?;
    assert!(store.create(&http_spec("site", "https://b.example.com")).await.is_err());
    Ok(())
}
