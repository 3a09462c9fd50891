use std::collections::HashSet;

use tracing::{debug, warn};

use crate::models::{Score, Scope, Signal, Site, SubClassifierBreakdown};
use crate::payload::{MetricPayload, RawClassifier, RawInsight, Reading, SeriesUnit, SleMetric};
use crate::severity::{classify_label, dbm_to_quality, MetricFamily, ThresholdTable};

/// One site's answer for one SLE metric. `payload` is `None` when the
/// platform had nothing for it.
#[derive(Debug, Clone)]
pub struct SiteMetricSummary {
    pub site_id: String,
    pub metric: SleMetric,
    pub payload: Option<MetricPayload>,
}

/// Raw data gathered in one polling cycle.
#[derive(Debug, Clone, Default)]
pub struct PlatformPayloads {
    pub insights: Vec<RawInsight>,
    pub summaries: Vec<SiteMetricSummary>,
}

pub struct SignalNormalizer<'a> {
    thresholds: &'a ThresholdTable,
}

impl<'a> SignalNormalizer<'a> {
    pub fn new(thresholds: &'a ThresholdTable) -> Self {
        Self { thresholds }
    }

    pub fn normalize(&self, payloads: &PlatformPayloads, known_sites: &[Site]) -> Vec<Signal> {
        let known: HashSet<&str> = known_sites.iter().map(|site| site.id.as_str()).collect();
        let mut signals = Vec::with_capacity(payloads.insights.len() + payloads.summaries.len());

        for insight in &payloads.insights {
            let signal = self.insight_signal(insight);
            if let Some(site_id) = signal.scope.site_id() {
                if !known.contains(site_id) {
                    debug!(site_id, metric = %signal.metric_id, "insight for unlisted site");
                }
            }
            signals.push(signal);
        }

        for summary in &payloads.summaries {
            if !known.contains(summary.site_id.as_str()) {
                debug!(site_id = %summary.site_id, metric = %summary.metric, "summary for unlisted site");
            }
            if let Some(signal) = self.summary_signal(summary) {
                signals.push(signal);
            }
        }

        debug!(
            insights = payloads.insights.len(),
            summaries = payloads.summaries.len(),
            signals = signals.len(),
            "normalized platform payloads"
        );
        signals
    }

    pub fn insight_signal(&self, insight: &RawInsight) -> Signal {
        let severity = insight
            .severity
            .as_deref()
            .map(classify_label)
            .unwrap_or_default();
        let scope = match insight.site_id.as_deref() {
            Some(id) if !id.is_empty() => Scope::Site(id.to_string()),
            _ => Scope::Organization,
        };
        let metric_id = insight
            .kind
            .clone()
            .filter(|kind| !kind.is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        Signal::categorical(scope, metric_id, severity)
    }

    pub fn summary_signal(&self, summary: &SiteMetricSummary) -> Option<Signal> {
        let Some(payload) = summary.payload.as_ref() else {
            debug!(site_id = %summary.site_id, metric = %summary.metric, "metric unavailable, skipping");
            return None;
        };

        let (values, unit) = match payload.reading(summary.metric) {
            Reading::Samples { values, unit } => (values, unit),
            Reading::Absent(reason) => {
                debug!(
                    site_id = %summary.site_id,
                    metric = %summary.metric,
                    ?reason,
                    "no usable samples, skipping"
                );
                return None;
            }
        };

        let raw = mean(&values)?;
        let (family, quality) = match unit {
            SeriesUnit::Dbm => {
                let qualities: Vec<f64> = values.iter().map(|v| dbm_to_quality(*v)).collect();
                (MetricFamily::SignalStrength, mean(&qualities)?)
            }
            SeriesUnit::Fraction => (MetricFamily::Percentage, raw * 100.0),
            SeriesUnit::Percent => (MetricFamily::Percentage, raw),
        };
        let quality = quality.clamp(0.0, 100.0);
        let severity = self.thresholds.classify_percent(quality, family);

        Some(Signal {
            scope: Scope::Site(summary.site_id.clone()),
            metric_id: summary.metric.key().to_string(),
            severity,
            score: Some(Score {
                raw,
                normalized: quality / 100.0,
            }),
            sub_classifiers: breakdown(summary, payload.classifiers()),
        })
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Expected classifiers first in catalogue order, then any the platform
/// added that the catalogue does not know about.
fn breakdown(summary: &SiteMetricSummary, classifiers: &[RawClassifier]) -> Vec<SubClassifierBreakdown> {
    if classifiers.is_empty() {
        return Vec::new();
    }
    let expected = summary.metric.expected_classifiers();
    let mut result = Vec::with_capacity(classifiers.len());

    for name in expected {
        match classifiers.iter().find(|c| c.name == *name) {
            Some(classifier) => result.push(sub_classifier(classifier)),
            None => warn!(
                site_id = %summary.site_id,
                metric = %summary.metric,
                classifier = *name,
                "expected classifier missing"
            ),
        }
    }

    for classifier in classifiers {
        if !expected.contains(&classifier.name.as_str()) {
            warn!(
                site_id = %summary.site_id,
                metric = %summary.metric,
                classifier = %classifier.name,
                "unexpected classifier"
            );
            result.push(sub_classifier(classifier));
        }
    }

    result
}

fn sub_classifier(classifier: &RawClassifier) -> SubClassifierBreakdown {
    let degraded: f64 = classifier.samples.degraded.iter().flatten().sum();
    let total: f64 = classifier.samples.total.iter().flatten().sum();
    let degraded_percent = if total > 0.0 {
        (degraded / total * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };
    let impact = classifier.impact.clone().unwrap_or_default();
    SubClassifierBreakdown {
        name: classifier.name.clone(),
        degraded_percent,
        impacted_users: impact.num_users,
        impacted_aps: impact.num_aps,
    }
}
