use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::SourceError;
use crate::health::{aggregate, InsightBreakdown};
use crate::history::{HistoryStore, ReportKind};
use crate::models::{HealthSnapshot, Scope, Site, TrendReport};
use crate::normalize::{PlatformPayloads, SignalNormalizer, SiteMetricSummary};
use crate::payload::{RawInsight, SleMetric};
use crate::severity::ThresholdTable;
use crate::source::PlatformSource;
use crate::trend::TrendEngine;

/// Lookback requested for every SLE summary.
const DEFAULT_WINDOW_HOURS: i64 = 24;

/// Everything one monitoring cycle produced.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub snapshot: HealthSnapshot,
    pub trends: TrendReport,
    pub breakdown: InsightBreakdown,
    pub saved_to: Option<PathBuf>,
}

/// Runs fetch, normalize, aggregate, persist and compare against one source.
pub struct Monitor<S> {
    source: S,
    thresholds: ThresholdTable,
    history: HistoryStore,
    trend: TrendEngine,
    organization_id: String,
    compare_days_ago: u32,
    window: Duration,
    metrics: Vec<SleMetric>,
}

impl<S: PlatformSource> Monitor<S> {
    pub fn new(
        source: S,
        thresholds: ThresholdTable,
        history: HistoryStore,
        organization_id: impl Into<String>,
    ) -> Self {
        Self {
            source,
            thresholds,
            history,
            trend: TrendEngine::default(),
            organization_id: organization_id.into(),
            compare_days_ago: 1,
            window: Duration::hours(DEFAULT_WINDOW_HOURS),
            metrics: SleMetric::ALL.to_vec(),
        }
    }

    pub fn with_trend_engine(mut self, trend: TrendEngine) -> Self {
        self.trend = trend;
        self
    }

    pub fn with_compare_days_ago(mut self, days: u32) -> Self {
        self.compare_days_ago = days;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Restrict polling to `metrics`.
    pub fn with_metrics(mut self, metrics: Vec<SleMetric>) -> Self {
        self.metrics = metrics;
        self
    }

    pub async fn run_cycle(&self) -> CycleOutcome {
        self.run_cycle_at(Utc::now()).await
    }

    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleOutcome {
        let span = info_span!("cycle", cycle_id = %Uuid::new_v4());
        self.cycle(now).instrument(span).await
    }

    async fn cycle(&self, now: DateTime<Utc>) -> CycleOutcome {
        info!(organization_id = %self.organization_id, "monitoring cycle started");

        let (sites, payloads) = self.fetch().await;
        let signals = SignalNormalizer::new(&self.thresholds).normalize(&payloads, &sites);
        let breakdown = InsightBreakdown::from_signals(&signals);
        let snapshot = aggregate(&self.organization_id, &signals, &sites, now);

        // Read before writing so a same-day comparison never sees this cycle.
        let previous = self.history.load_previous_at(self.compare_days_ago, now);
        let saved_to = self
            .history
            .save_at(&snapshot, ReportKind::HealthDashboard, now);
        let trends = self.trend.compare(&snapshot, previous.as_ref());

        info!(
            overall_status = %snapshot.overall_status(),
            sites = snapshot.total_sites,
            signals = signals.len(),
            overall_trend = %trends.overall_trend,
            degradation_alerts = trends.degradation_alerts.len(),
            saved = saved_to.is_some(),
            "monitoring cycle finished"
        );

        CycleOutcome {
            snapshot,
            trends,
            breakdown,
            saved_to,
        }
    }

    async fn fetch(&self) -> (Vec<Site>, PlatformPayloads) {
        let sites = match self.source.list_sites().await {
            Ok(sites) => sites,
            Err(err) => {
                warn!(error = %err, "failed to list sites, continuing without them");
                Vec::new()
            }
        };

        let insights: Vec<RawInsight> = match self.source.list_insights(&Scope::Organization).await
        {
            Ok(insights) => insights,
            Err(SourceError::NotFound { resource }) => {
                debug!(%resource, "no insights available");
                Vec::new()
            }
            Err(err) => {
                warn!(error = %err, "failed to list insights");
                Vec::new()
            }
        };

        let mut summaries = Vec::with_capacity(sites.len() * self.metrics.len());
        for site in &sites {
            for metric in self.metrics.iter().copied() {
                let payload = match self
                    .source
                    .get_metric_summary(&site.id, metric, self.window)
                    .await
                {
                    Ok(payload) => Some(payload),
                    Err(SourceError::NotFound { .. }) => {
                        debug!(site_id = %site.id, metric = %metric, "metric unavailable");
                        None
                    }
                    Err(err) => {
                        warn!(site_id = %site.id, metric = %metric, error = %err, "failed to fetch metric");
                        None
                    }
                };
                summaries.push(SiteMetricSummary {
                    site_id: site.id.clone(),
                    metric,
                    payload,
                });
            }
        }

        (sites, PlatformPayloads { insights, summaries })
    }
}

impl<S: PlatformSource + 'static> Monitor<S> {
    /// Run cycles every `interval` until `shutdown` fires. Cancellation is
    /// observed only between cycles; a cycle that panics is logged and the
    /// loop carries on. Returns the number of completed cycles.
    pub async fn run_daemon<F>(
        self: Arc<Self>,
        interval: std::time::Duration,
        shutdown: CancellationToken,
        mut on_cycle: F,
    ) -> usize
    where
        F: FnMut(&CycleOutcome),
    {
        info!(interval_secs = interval.as_secs(), "monitor daemon started");
        let mut completed = 0;

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let monitor = Arc::clone(&self);
            match tokio::spawn(async move { monitor.run_cycle().await }).await {
                Ok(outcome) => {
                    completed += 1;
                    on_cycle(&outcome);
                }
                Err(err) => error!(error = %err, "monitoring cycle aborted"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("monitor shutdown requested");
                    break;
                }
                _ = sleep(interval) => {}
            }
        }

        info!(cycles = completed, "monitor daemon stopped");
        completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HealthStatus, OverallTrend};
    use crate::payload::MetricPayload;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    struct StaticSource {
        sites: Vec<Site>,
        insights: Vec<RawInsight>,
        capacity_score: Option<f64>,
    }

    #[async_trait]
    impl PlatformSource for StaticSource {
        async fn list_sites(&self) -> Result<Vec<Site>, SourceError> {
            Ok(self.sites.clone())
        }

        async fn list_insights(&self, _scope: &Scope) -> Result<Vec<RawInsight>, SourceError> {
            Ok(self.insights.clone())
        }

        async fn get_metric_summary(
            &self,
            site_id: &str,
            metric: SleMetric,
            _window: Duration,
        ) -> Result<MetricPayload, SourceError> {
            match (metric, self.capacity_score) {
                (SleMetric::Capacity, Some(score)) => {
                    Ok(serde_json::from_value(json!({ "score": score })).unwrap())
                }
                _ => Err(SourceError::NotFound {
                    resource: format!("{site_id}/{metric}"),
                }),
            }
        }
    }

    struct PanickingSource;

    #[async_trait]
    impl PlatformSource for PanickingSource {
        async fn list_sites(&self) -> Result<Vec<Site>, SourceError> {
            panic!("platform client bug");
        }

        async fn list_insights(&self, _scope: &Scope) -> Result<Vec<RawInsight>, SourceError> {
            Ok(Vec::new())
        }

        async fn get_metric_summary(
            &self,
            _site_id: &str,
            _metric: SleMetric,
            _window: Duration,
        ) -> Result<MetricPayload, SourceError> {
            Err(SourceError::NotFound {
                resource: "none".into(),
            })
        }
    }

    fn insight(severity: &str, site_id: &str) -> RawInsight {
        RawInsight {
            severity: Some(severity.to_string()),
            kind: Some("ap_offline".to_string()),
            site_id: Some(site_id.to_string()),
            ..RawInsight::default()
        }
    }

    fn monitor(dir: &TempDir, source: StaticSource) -> Monitor<StaticSource> {
        Monitor::new(
            source,
            ThresholdTable::default(),
            HistoryStore::new(dir.path(), 7),
            "org-1",
        )
    }

    #[tokio::test]
    async fn first_cycle_has_no_trend_and_persists() {
        let dir = TempDir::new().unwrap();
        let source = StaticSource {
            sites: vec![Site::new("s1", "HQ")],
            insights: vec![insight("critical", "s1")],
            capacity_score: Some(65.0),
        };
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 8, 0, 0).unwrap();
        let outcome = monitor(&dir, source).run_cycle_at(now).await;

        assert_eq!(outcome.snapshot.overall_status(), HealthStatus::Critical);
        assert_eq!(outcome.snapshot.severity_counts.critical, 2);
        assert_eq!(outcome.snapshot.sites_status["HQ"].sle_degraded["capacity"], 35.0);
        assert!(!outcome.trends.has_previous_data);
        assert!(outcome.saved_to.as_ref().is_some_and(|path| path.exists()));
    }

    #[tokio::test]
    async fn second_day_compares_against_previous() {
        let dir = TempDir::new().unwrap();
        let yesterday = Utc.with_ymd_and_hms(2026, 5, 9, 8, 0, 0).unwrap();
        let today = Utc.with_ymd_and_hms(2026, 5, 10, 8, 0, 0).unwrap();

        let calm = StaticSource {
            sites: vec![Site::new("s1", "HQ")],
            insights: vec![insight("critical", "s1")],
            capacity_score: None,
        };
        monitor(&dir, calm).run_cycle_at(yesterday).await;

        let noisy = StaticSource {
            sites: vec![Site::new("s1", "HQ")],
            insights: vec![insight("critical", "s1"), insight("critical", "s1")],
            capacity_score: None,
        };
        let outcome = monitor(&dir, noisy).run_cycle_at(today).await;

        assert!(outcome.trends.has_previous_data);
        assert_eq!(outcome.trends.overall_trend, OverallTrend::Worsening);
        let trend = &outcome.trends.metrics_trend["critical_insights"];
        assert_eq!(trend.change_percent, 100.0);
    }

    struct RecordingSource {
        requests: std::sync::Mutex<Vec<(SleMetric, i64)>>,
    }

    #[async_trait]
    impl PlatformSource for RecordingSource {
        async fn list_sites(&self) -> Result<Vec<Site>, SourceError> {
            Ok(vec![Site::new("s1", "HQ")])
        }

        async fn list_insights(&self, _scope: &Scope) -> Result<Vec<RawInsight>, SourceError> {
            Ok(Vec::new())
        }

        async fn get_metric_summary(
            &self,
            _site_id: &str,
            metric: SleMetric,
            window: Duration,
        ) -> Result<MetricPayload, SourceError> {
            self.requests.lock().unwrap().push((metric, window.num_hours()));
            Ok(serde_json::from_value(json!({ "score": 95.0 })).unwrap())
        }
    }

    #[tokio::test]
    async fn polls_configured_metrics_over_configured_window() {
        let dir = TempDir::new().unwrap();
        let source = RecordingSource {
            requests: std::sync::Mutex::new(Vec::new()),
        };
        let monitor = Monitor::new(
            source,
            ThresholdTable::default(),
            HistoryStore::new(dir.path(), 7),
            "org-1",
        )
        .with_window(Duration::hours(6))
        .with_metrics(vec![SleMetric::Coverage, SleMetric::Roaming])
        .with_trend_engine(
            TrendEngine::new().with_direction("HQ_roaming", crate::trend::MetricDirection::HigherIsWorse),
        );
        let outcome = monitor.run_cycle().await;

        let requests = monitor.source.requests.lock().unwrap().clone();
        assert_eq!(
            requests,
            vec![(SleMetric::Coverage, 6), (SleMetric::Roaming, 6)]
        );
        assert_eq!(outcome.snapshot.severity_counts.info, 2);
    }

    #[tokio::test]
    async fn unwritable_history_still_completes_the_cycle() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("history");
        std::fs::write(&root, "not a directory").unwrap();
        let monitor = Monitor::new(
            StaticSource {
                sites: vec![Site::new("s1", "HQ")],
                insights: vec![insight("major", "s1")],
                capacity_score: None,
            },
            ThresholdTable::default(),
            HistoryStore::new(&root, 7),
            "org-1",
        );
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 8, 0, 0).unwrap();
        let outcome = monitor.run_cycle_at(now).await;

        assert!(outcome.saved_to.is_none());
        assert_eq!(outcome.snapshot.overall_status(), HealthStatus::Unhealthy);
        assert!(!outcome.trends.has_previous_data);
        assert_eq!(outcome.trends.timestamp, now);
    }

    #[tokio::test]
    async fn failing_source_yields_empty_healthy_snapshot() {
        struct Offline;

        #[async_trait]
        impl PlatformSource for Offline {
            async fn list_sites(&self) -> Result<Vec<Site>, SourceError> {
                Err(SourceError::Io {
                    path: PathBuf::from("sites.json"),
                    source: std::io::Error::other("connection reset"),
                })
            }

            async fn list_insights(&self, _scope: &Scope) -> Result<Vec<RawInsight>, SourceError> {
                Err(SourceError::NotFound {
                    resource: "insights".into(),
                })
            }

            async fn get_metric_summary(
                &self,
                _site_id: &str,
                _metric: SleMetric,
                _window: Duration,
            ) -> Result<MetricPayload, SourceError> {
                unreachable!("no sites were listed")
            }
        }

        let dir = TempDir::new().unwrap();
        let monitor = Monitor::new(
            Offline,
            ThresholdTable::default(),
            HistoryStore::new(dir.path(), 7),
            "org-1",
        );
        let outcome = monitor.run_cycle().await;
        assert_eq!(outcome.snapshot.overall_status(), HealthStatus::Healthy);
        assert_eq!(outcome.snapshot.total_sites, 0);
    }

    #[tokio::test]
    async fn daemon_stops_between_cycles_on_cancel() {
        let dir = TempDir::new().unwrap();
        let source = StaticSource {
            sites: vec![Site::new("s1", "HQ")],
            insights: Vec::new(),
            capacity_score: None,
        };
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let completed = Arc::new(monitor(&dir, source))
            .run_daemon(std::time::Duration::from_secs(3600), shutdown, move |_| {
                token.cancel()
            })
            .await;
        assert_eq!(completed, 1);
    }

    #[tokio::test]
    async fn daemon_survives_a_panicking_cycle() {
        let dir = TempDir::new().unwrap();
        let monitor = Arc::new(Monitor::new(
            PanickingSource,
            ThresholdTable::default(),
            HistoryStore::new(dir.path(), 7),
            "org-1",
        ));
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        tokio::spawn(async move {
            sleep(std::time::Duration::from_millis(50)).await;
            token.cancel();
        });
        let completed = monitor
            .run_daemon(std::time::Duration::from_millis(5), shutdown, |_| {})
            .await;
        assert_eq!(completed, 0);
    }
}
