use std::collections::BTreeMap;

use tracing::debug;

use crate::models::{
    HealthSnapshot, Indicator, MetricTrend, OverallTrend, TrendAlert, TrendReport,
};

/// Change reported when the previous value was zero and the current one is not.
pub const SATURATION_PERCENT: f64 = 100.0;

/// Which way a metric moves when things get worse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricDirection {
    HigherIsWorse,
    LowerIsWorse,
}

/// Day-over-day comparison of health snapshots.
///
/// Every tracked metric is a count or a degradation percentage, so the
/// default direction is higher-is-worse. Metrics listed in the direction
/// table use their own direction, and only those report improvements.
#[derive(Debug, Clone, Default)]
pub struct TrendEngine {
    directions: BTreeMap<String, MetricDirection>,
}

impl TrendEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_direction(mut self, metric_id: impl Into<String>, direction: MetricDirection) -> Self {
        self.directions.insert(metric_id.into(), direction);
        self
    }

    pub fn direction(&self, metric_id: &str) -> MetricDirection {
        self.directions
            .get(metric_id)
            .copied()
            .unwrap_or(MetricDirection::HigherIsWorse)
    }

    pub fn compare(&self, current: &HealthSnapshot, previous: Option<&HealthSnapshot>) -> TrendReport {
        let Some(previous) = previous else {
            debug!("no previous snapshot, trend unavailable");
            return TrendReport::without_history(current.timestamp);
        };

        let current_metrics = extract_metrics(current);
        let previous_metrics = extract_metrics(previous);

        let mut report = TrendReport {
            has_previous_data: true,
            ..TrendReport::without_history(current.timestamp)
        };

        for (metric_id, current_value) in &current_metrics {
            let Some(previous_value) = previous_metrics.get(metric_id) else {
                continue;
            };
            let trend = self.metric_trend(metric_id, *previous_value, *current_value);
            if trend.is_degrading {
                report.degradation_alerts.push(TrendAlert::from(&trend));
            } else if self.improved(&trend) {
                report.improvement_alerts.push(TrendAlert::from(&trend));
            }
            report.metrics_trend.insert(metric_id.clone(), trend);
        }

        report.overall_trend = if !report.degradation_alerts.is_empty() {
            OverallTrend::Worsening
        } else if !report.improvement_alerts.is_empty() {
            OverallTrend::Improving
        } else {
            OverallTrend::Stable
        };

        debug!(
            compared = report.metrics_trend.len(),
            degrading = report.degradation_alerts.len(),
            improving = report.improvement_alerts.len(),
            overall = %report.overall_trend,
            "trend comparison complete"
        );
        report
    }

    pub fn metric_trend(&self, metric_id: &str, previous: f64, current: f64) -> MetricTrend {
        let indicator = if current > previous {
            Indicator::Rising
        } else if current < previous {
            Indicator::Falling
        } else {
            Indicator::Stable
        };
        let is_degrading = match self.direction(metric_id) {
            MetricDirection::HigherIsWorse => indicator == Indicator::Rising,
            MetricDirection::LowerIsWorse => indicator == Indicator::Falling,
        };
        MetricTrend {
            metric_id: metric_id.to_string(),
            previous_value: previous,
            current_value: current,
            change_percent: change_percent(previous, current),
            indicator,
            is_degrading,
        }
    }

    fn improved(&self, trend: &MetricTrend) -> bool {
        let Some(direction) = self.directions.get(&trend.metric_id) else {
            return false;
        };
        match direction {
            MetricDirection::HigherIsWorse => trend.indicator == Indicator::Falling,
            MetricDirection::LowerIsWorse => trend.indicator == Indicator::Rising,
        }
    }
}

/// Percent change from `previous` to `current`, rounded to two decimals.
pub fn change_percent(previous: f64, current: f64) -> f64 {
    if previous == 0.0 {
        return if current == 0.0 { 0.0 } else { SATURATION_PERCENT };
    }
    let change = (current - previous) / previous * 100.0;
    (change * 100.0).round() / 100.0
}

/// Flatten a snapshot into the metric set the trend engine compares.
pub fn extract_metrics(snapshot: &HealthSnapshot) -> BTreeMap<String, f64> {
    let counts = snapshot.severity_counts;
    let mut metrics = BTreeMap::from([
        ("critical_insights".to_string(), counts.critical as f64),
        ("major_insights".to_string(), counts.major as f64),
        ("warning_insights".to_string(), counts.warning as f64),
    ]);
    for (site_name, site) in &snapshot.sites_status {
        metrics.insert(format!("{site_name}_insight_count"), site.insight_count as f64);
        for (key, degraded) in &site.sle_degraded {
            metrics.insert(format!("{site_name}_{key}"), *degraded);
        }
    }
    metrics
}
