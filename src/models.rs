use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity tiers, ordered so that `Critical` is the maximum.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Major,
    Critical,
}

impl Severity {
    /// Worst first.
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::Major,
        Severity::Warning,
        Severity::Info,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Major => "major",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }

    pub fn status(self) -> HealthStatus {
        match self {
            Severity::Critical => HealthStatus::Critical,
            Severity::Major => HealthStatus::Unhealthy,
            Severity::Warning => HealthStatus::Degraded,
            Severity::Info => HealthStatus::Healthy,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Critical,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Healthy => "HEALTHY",
            HealthStatus::Degraded => "DEGRADED",
            HealthStatus::Unhealthy => "UNHEALTHY",
            HealthStatus::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "site_id", rename_all = "lowercase")]
pub enum Scope {
    Organization,
    Site(String),
}

impl Scope {
    pub fn site_id(&self) -> Option<&str> {
        match self {
            Scope::Organization => None,
            Scope::Site(id) => Some(id),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Organization => f.write_str("org"),
            Scope::Site(id) => write!(f, "site:{id}"),
        }
    }
}

/// Numeric reading behind a signal. `raw` is in the series unit (percent or
/// dBm), `normalized` is the derived quality in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub raw: f64,
    pub normalized: f64,
}

impl Score {
    pub fn percent(&self) -> f64 {
        self.normalized * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubClassifierBreakdown {
    pub name: String,
    pub degraded_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impacted_users: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impacted_aps: Option<u64>,
}

/// One classified observation from a polling cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub scope: Scope,
    pub metric_id: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Score>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_classifiers: Vec<SubClassifierBreakdown>,
}

impl Signal {
    pub fn categorical(scope: Scope, metric_id: impl Into<String>, severity: Severity) -> Self {
        Self {
            scope,
            metric_id: metric_id.into(),
            severity,
            score: None,
            sub_classifiers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub name: String,
}

impl Site {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub major: usize,
    pub warning: usize,
    pub info: usize,
}

impl SeverityCounts {
    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::Major => self.major,
            Severity::Warning => self.warning,
            Severity::Info => self.info,
        }
    }

    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::Major => self.major += 1,
            Severity::Warning => self.warning += 1,
            Severity::Info => self.info += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.major + self.warning + self.info
    }

    /// critical > major > warning precedence; info alone is healthy.
    pub fn status(&self) -> HealthStatus {
        if self.critical > 0 {
            HealthStatus::Critical
        } else if self.major > 0 {
            HealthStatus::Unhealthy
        } else if self.warning > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteStatus {
    pub site_id: String,
    pub status: HealthStatus,
    pub insight_count: usize,
    /// SLE key -> percentage of degraded experience (100 - quality score).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sle_degraded: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredSnapshot")]
pub struct HealthSnapshot {
    pub timestamp: DateTime<Utc>,
    pub organization_id: String,
    overall_status: HealthStatus,
    pub total_sites: usize,
    pub severity_counts: SeverityCounts,
    pub sites_status: BTreeMap<String, SiteStatus>,
}

impl HealthSnapshot {
    pub fn new(
        timestamp: DateTime<Utc>,
        organization_id: impl Into<String>,
        total_sites: usize,
        severity_counts: SeverityCounts,
        sites_status: BTreeMap<String, SiteStatus>,
    ) -> Self {
        Self {
            timestamp,
            organization_id: organization_id.into(),
            overall_status: severity_counts.status(),
            total_sites,
            severity_counts,
            sites_status,
        }
    }

    pub fn overall_status(&self) -> HealthStatus {
        self.overall_status
    }

    /// Sites ordered CRITICAL first, then by name.
    pub fn sites_by_priority(&self) -> Vec<(&str, &SiteStatus)> {
        let mut sites: Vec<(&str, &SiteStatus)> = self
            .sites_status
            .iter()
            .map(|(name, status)| (name.as_str(), status))
            .collect();
        sites.sort_by(|a, b| b.1.status.cmp(&a.1.status).then_with(|| a.0.cmp(b.0)));
        sites
    }
}

/// On-disk form of a snapshot. The stored `overall_status` is ignored and
/// derived again from the counts.
#[derive(Deserialize)]
struct StoredSnapshot {
    timestamp: DateTime<Utc>,
    organization_id: String,
    total_sites: usize,
    severity_counts: SeverityCounts,
    #[serde(default)]
    sites_status: BTreeMap<String, SiteStatus>,
}

impl From<StoredSnapshot> for HealthSnapshot {
    fn from(stored: StoredSnapshot) -> Self {
        HealthSnapshot::new(
            stored.timestamp,
            stored.organization_id,
            stored.total_sites,
            stored.severity_counts,
            stored.sites_status,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Indicator {
    Rising,
    Falling,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallTrend {
    Worsening,
    Improving,
    Stable,
}

impl fmt::Display for OverallTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallTrend::Worsening => f.write_str("worsening"),
            OverallTrend::Improving => f.write_str("improving"),
            OverallTrend::Stable => f.write_str("stable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricTrend {
    pub metric_id: String,
    pub previous_value: f64,
    pub current_value: f64,
    pub change_percent: f64,
    pub indicator: Indicator,
    pub is_degrading: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAlert {
    pub metric_id: String,
    pub previous: f64,
    pub current: f64,
    pub change_percent: f64,
    pub indicator: Indicator,
}

impl From<&MetricTrend> for TrendAlert {
    fn from(trend: &MetricTrend) -> Self {
        Self {
            metric_id: trend.metric_id.clone(),
            previous: trend.previous_value,
            current: trend.current_value,
            change_percent: trend.change_percent,
            indicator: trend.indicator,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub timestamp: DateTime<Utc>,
    pub has_previous_data: bool,
    pub overall_trend: OverallTrend,
    pub metrics_trend: BTreeMap<String, MetricTrend>,
    pub degradation_alerts: Vec<TrendAlert>,
    pub improvement_alerts: Vec<TrendAlert>,
}

impl TrendReport {
    pub fn without_history(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            has_previous_data: false,
            overall_trend: OverallTrend::Stable,
            metrics_trend: BTreeMap::new(),
            degradation_alerts: Vec::new(),
            improvement_alerts: Vec::new(),
        }
    }

    pub fn stable_count(&self) -> usize {
        self.metrics_trend
            .values()
            .filter(|trend| trend.indicator == Indicator::Stable)
            .count()
    }
}
