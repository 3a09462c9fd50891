use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::models::{
    HealthSnapshot, HealthStatus, Scope, Severity, SeverityCounts, Signal, Site, SiteStatus,
};

/// Roll signals up into an organization snapshot. Pure: the same inputs
/// always produce the same snapshot.
pub fn aggregate(
    organization_id: &str,
    signals: &[Signal],
    sites: &[Site],
    timestamp: DateTime<Utc>,
) -> HealthSnapshot {
    let mut counts = SeverityCounts::default();
    let mut per_site: HashMap<&str, SiteAccumulator> = HashMap::new();

    for signal in signals {
        counts.record(signal.severity);
        if let Scope::Site(site_id) = &signal.scope {
            per_site.entry(site_id.as_str()).or_default().add(signal);
        }
    }

    let mut sites_status = BTreeMap::new();
    for site in sites {
        let status = match per_site.get(site.id.as_str()) {
            Some(acc) => acc.to_status(&site.id),
            None => SiteStatus {
                site_id: site.id.clone(),
                status: HealthStatus::Healthy,
                insight_count: 0,
                sle_degraded: BTreeMap::new(),
            },
        };

        let mut key = site.name.clone();
        if sites_status.contains_key(&key) {
            warn!(site = %site.name, site_id = %site.id, "duplicate site name, keying by id");
            key = format!("{} ({})", site.name, site.id);
        }
        sites_status.insert(key, status);
    }

    HealthSnapshot::new(timestamp, organization_id, sites.len(), counts, sites_status)
}

#[derive(Default)]
struct SiteAccumulator {
    worst: Option<Severity>,
    count: usize,
    sle_degraded: BTreeMap<String, f64>,
}

impl SiteAccumulator {
    fn add(&mut self, signal: &Signal) {
        self.count += 1;
        self.worst = self.worst.max(Some(signal.severity));
        if let Some(score) = signal.score {
            let degraded = round2(100.0 - score.percent());
            self.sle_degraded
                .entry(signal.metric_id.clone())
                .and_modify(|current| *current = current.max(degraded))
                .or_insert(degraded);
        }
    }

    fn to_status(&self, site_id: &str) -> SiteStatus {
        SiteStatus {
            site_id: site_id.to_string(),
            status: self.worst.map(Severity::status).unwrap_or(HealthStatus::Healthy),
            insight_count: self.count,
            sle_degraded: self.sle_degraded.clone(),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Counts by insight type and scope, with the follow-up actions they call for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsightBreakdown {
    pub by_type: BTreeMap<String, usize>,
    pub by_scope: BTreeMap<String, usize>,
    high_severity_by_scope: BTreeMap<String, usize>,
    counts: SeverityCounts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recommendation {
    Urgent { critical: usize },
    ReviewMajor { major: usize },
    RepeatedType { kind: String, occurrences: usize },
    SiteFocus { scope: String, high_severity: usize },
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recommendation::Urgent { critical } => {
                write!(f, "URGENT: address {critical} critical insight(s) immediately")
            }
            Recommendation::ReviewMajor { major } => {
                write!(f, "Review and address {major} major insights to prevent degradation")
            }
            Recommendation::RepeatedType { kind, occurrences } => write!(
                f,
                "Pattern detected: multiple '{kind}' insights ({occurrences} occurrences), investigate root cause"
            ),
            Recommendation::SiteFocus {
                scope,
                high_severity,
            } => write!(
                f,
                "{scope} has {high_severity} high-severity insights, prioritize investigation"
            ),
        }
    }
}

impl InsightBreakdown {
    pub fn from_signals(signals: &[Signal]) -> Self {
        let mut breakdown = Self::default();
        for signal in signals {
            breakdown.counts.record(signal.severity);
            *breakdown.by_type.entry(signal.metric_id.clone()).or_insert(0) += 1;
            let scope = signal.scope.to_string();
            if signal.severity >= Severity::Major {
                *breakdown.high_severity_by_scope.entry(scope.clone()).or_insert(0) += 1;
            }
            *breakdown.by_scope.entry(scope).or_insert(0) += 1;
        }
        breakdown
    }

    pub fn recommendations(&self) -> Vec<Recommendation> {
        let mut actions = Vec::new();
        if self.counts.critical > 0 {
            actions.push(Recommendation::Urgent {
                critical: self.counts.critical,
            });
        }
        if self.counts.major > 3 {
            actions.push(Recommendation::ReviewMajor {
                major: self.counts.major,
            });
        }
        for (kind, occurrences) in &self.by_type {
            if *occurrences > 2 {
                actions.push(Recommendation::RepeatedType {
                    kind: kind.clone(),
                    occurrences: *occurrences,
                });
            }
        }
        for (scope, high_severity) in &self.high_severity_by_scope {
            if *high_severity > 2 {
                actions.push(Recommendation::SiteFocus {
                    scope: scope.clone(),
                    high_severity: *high_severity,
                });
            }
        }
        actions
    }
}
