use std::fs;
use std::path::Path;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;

use wlan_health_monitor::health::aggregate;
use wlan_health_monitor::history::{HistoryStore, ReportKind};
use wlan_health_monitor::models::{
    HealthSnapshot, HealthStatus, Indicator, OverallTrend, Scope, Severity, SeverityCounts, Signal,
};
use wlan_health_monitor::monitor::Monitor;
use wlan_health_monitor::severity::ThresholdTable;
use wlan_health_monitor::source::FixtureSource;
use wlan_health_monitor::trend::TrendEngine;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 20, 12, 0, 0).unwrap()
}

fn write_json(root: &Path, relative: &str, value: serde_json::Value) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_vec_pretty(&value).unwrap()).unwrap();
}

fn three_sites(root: &Path) {
    write_json(
        root,
        "sites.json",
        json!([
            {"id": "s1", "name": "Headquarters"},
            {"id": "s2", "name": "Warehouse"},
            {"id": "s3", "name": "Retail"}
        ]),
    );
}

fn fixture_monitor(fixtures: &Path, history: &Path) -> Monitor<FixtureSource> {
    Monitor::new(
        FixtureSource::new(fixtures),
        ThresholdTable::default(),
        HistoryStore::new(history, 7),
        "org-42",
    )
}

#[tokio::test]
async fn quiet_network_is_healthy() {
    let fixtures = TempDir::new().unwrap();
    let history = TempDir::new().unwrap();
    three_sites(fixtures.path());
    write_json(fixtures.path(), "insights.json", json!([]));

    let outcome = fixture_monitor(fixtures.path(), history.path())
        .run_cycle_at(now())
        .await;

    let snapshot = &outcome.snapshot;
    assert_eq!(snapshot.overall_status(), HealthStatus::Healthy);
    assert_eq!(snapshot.total_sites, 3);
    assert_eq!(snapshot.severity_counts, SeverityCounts::default());
    for site in snapshot.sites_status.values() {
        assert_eq!(site.status, HealthStatus::Healthy);
        assert_eq!(site.insight_count, 0);
    }
    assert!(!outcome.trends.has_previous_data);
    assert!(outcome.saved_to.is_some());
}

#[tokio::test]
async fn low_percentage_metric_marks_site_critical() {
    let fixtures = TempDir::new().unwrap();
    let history = TempDir::new().unwrap();
    three_sites(fixtures.path());
    write_json(
        fixtures.path(),
        "sle/s2/successful-connect.json",
        json!({
            "sle": {
                "samples": {"value": [60.0, 70.0, null, 65.0]},
                "y_label": "%"
            },
            "classifiers": []
        }),
    );

    let outcome = fixture_monitor(fixtures.path(), history.path())
        .run_cycle_at(now())
        .await;

    let snapshot = &outcome.snapshot;
    assert_eq!(snapshot.severity_counts.critical, 1);
    assert_eq!(snapshot.sites_status["Warehouse"].status, HealthStatus::Critical);
    assert_eq!(snapshot.sites_status["Headquarters"].status, HealthStatus::Healthy);
    assert_eq!(snapshot.overall_status(), HealthStatus::Critical);
    assert_eq!(
        snapshot.sites_status["Warehouse"].sle_degraded["successful_connect"],
        35.0
    );
}

fn critical_snapshot(critical: usize, at: DateTime<Utc>) -> HealthSnapshot {
    let signals: Vec<Signal> = (0..critical)
        .map(|_| Signal::categorical(Scope::Organization, "ap_offline", Severity::Critical))
        .collect();
    aggregate("org-42", &signals, &[], at)
}

#[test]
fn rising_critical_count_is_a_degradation() {
    let history = TempDir::new().unwrap();
    let store = HistoryStore::new(history.path(), 7);
    let day_one = now() - Duration::days(1);

    store
        .try_save_at(&critical_snapshot(2, day_one), ReportKind::HealthDashboard, day_one)
        .unwrap();
    let current = critical_snapshot(5, now());
    let previous = store.try_load_previous_at(1, now()).unwrap();

    let report = TrendEngine::default().compare(&current, previous.as_ref());
    assert!(report.has_previous_data);
    let trend = &report.metrics_trend["critical_insights"];
    assert_eq!(trend.indicator, Indicator::Rising);
    assert!(trend.is_degrading);
    assert_eq!(trend.change_percent, 150.0);
    assert_eq!(report.overall_trend, OverallTrend::Worsening);
    assert_eq!(report.timestamp, current.timestamp);
}

fn surviving_buckets(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(root)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn retention_keeps_the_last_week() {
    let history = TempDir::new().unwrap();
    let store = HistoryStore::new(history.path(), 7);
    for days_back in 1..=10 {
        let at = now() - Duration::days(days_back);
        store
            .try_save_at(&critical_snapshot(0, at), ReportKind::HealthDashboard, at)
            .unwrap();
    }

    let removed = store.cleanup_at(now());
    assert_eq!(removed, 4);

    let expected: Vec<String> = (1..=6)
        .rev()
        .map(|days_back| {
            (now() - Duration::days(days_back))
                .format("%Y-%m-%d")
                .to_string()
        })
        .collect();
    assert_eq!(surviving_buckets(history.path()), expected);

    // Idempotent with no saves in between.
    assert_eq!(store.cleanup_at(now()), 0);
    assert_eq!(surviving_buckets(history.path()), expected);
}

#[test]
fn snapshot_files_round_trip_through_history() {
    let history = TempDir::new().unwrap();
    let store = HistoryStore::new(history.path(), 7);
    let snapshot = critical_snapshot(3, now());
    store
        .try_save_at(&snapshot, ReportKind::HealthDashboard, now())
        .unwrap();
    let loaded = store.try_load_previous_at(0, now()).unwrap();
    assert_eq!(loaded, Some(snapshot));
}
