//! Inbound payload shapes from the management platform.
//!
//! Every optional key is defaulted so that partially populated responses
//! decode instead of failing; absence is surfaced as a typed value.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::Site;
use crate::severity::MetricFamily;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawSite {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl From<RawSite> for Site {
    fn from(raw: RawSite) -> Self {
        Site {
            id: raw.id,
            name: raw.name.unwrap_or_else(|| "Unknown".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawInsight {
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub site_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

/// SLE metrics polled per site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SleMetric {
    TimeToConnect,
    SuccessfulConnect,
    Throughput,
    Capacity,
    Roaming,
    Coverage,
}

impl SleMetric {
    pub const ALL: [SleMetric; 6] = [
        SleMetric::TimeToConnect,
        SleMetric::SuccessfulConnect,
        SleMetric::Throughput,
        SleMetric::Capacity,
        SleMetric::Roaming,
        SleMetric::Coverage,
    ];

    /// Path segment used by the platform API.
    pub fn api_name(self) -> &'static str {
        match self {
            SleMetric::TimeToConnect => "time-to-connect",
            SleMetric::SuccessfulConnect => "successful-connect",
            SleMetric::Throughput => "throughput",
            SleMetric::Capacity => "capacity",
            SleMetric::Roaming => "roaming",
            SleMetric::Coverage => "coverage",
        }
    }

    /// Key used in signals and snapshots.
    pub fn key(self) -> &'static str {
        match self {
            SleMetric::TimeToConnect => "time_to_connect",
            SleMetric::SuccessfulConnect => "successful_connect",
            SleMetric::Throughput => "throughput",
            SleMetric::Capacity => "capacity",
            SleMetric::Roaming => "roaming",
            SleMetric::Coverage => "coverage",
        }
    }

    pub fn from_api_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|metric| metric.api_name() == name)
    }

    /// Family used when the series carries no unit label.
    pub fn default_family(self) -> MetricFamily {
        match self {
            SleMetric::Coverage => MetricFamily::SignalStrength,
            _ => MetricFamily::Percentage,
        }
    }

    /// Root-cause classifiers the platform reports for this metric, in
    /// display order.
    pub fn expected_classifiers(self) -> &'static [&'static str] {
        match self {
            SleMetric::TimeToConnect => &["association", "authorization", "dhcp", "internet-services"],
            SleMetric::SuccessfulConnect => &[
                "association",
                "authorization",
                "dhcp-nack",
                "dhcp-stuck",
                "dhcp-unresponsive",
                "arp",
                "dns",
            ],
            SleMetric::Throughput => &["capacity", "coverage", "device-capability", "network-issues"],
            SleMetric::Capacity => &[
                "wifi-interference",
                "non-wifi-interference",
                "client-usage",
                "client-count",
            ],
            SleMetric::Roaming => &["signal-quality", "latency", "stability"],
            SleMetric::Coverage => &["weak-signal", "asymmetry-uplink", "asymmetry-downlink"],
        }
    }
}

impl fmt::Display for SleMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_name())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SleSamples {
    #[serde(default)]
    pub value: Vec<Option<f64>>,
    #[serde(default)]
    pub degraded: Vec<Option<f64>>,
    #[serde(default)]
    pub total: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SleSeries {
    #[serde(default)]
    pub samples: SleSamples,
    #[serde(default)]
    pub y_label: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClassifierSamples {
    #[serde(default)]
    pub degraded: Vec<Option<f64>>,
    #[serde(default)]
    pub total: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClassifierImpact {
    #[serde(default)]
    pub num_users: Option<u64>,
    #[serde(default)]
    pub num_aps: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawClassifier {
    pub name: String,
    #[serde(default)]
    pub samples: ClassifierSamples,
    #[serde(default)]
    pub impact: Option<ClassifierImpact>,
}

/// Windowed SLE summary with its classifier breakdown.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricSummary {
    pub sle: SleSeries,
    #[serde(default)]
    pub classifiers: Vec<RawClassifier>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NestedScore {
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub value: Option<f64>,
}

/// The shapes a metric endpoint is known to answer with. Each variant but the
/// last has a required key; `Empty` takes any other object.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MetricPayload {
    Summary(MetricSummary),
    Score { score: f64 },
    Value { value: f64 },
    Nested { summary: NestedScore },
    /// Any other object: the endpoint answered without a usable key.
    Empty {},
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesUnit {
    Percent,
    Fraction,
    Dbm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsentReason {
    EmptySeries,
    NoScore,
    MissingKeys,
}

/// Samples extracted from a payload, or why there are none.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Samples { values: Vec<f64>, unit: SeriesUnit },
    Absent(AbsentReason),
}

impl MetricPayload {
    pub fn reading(&self, metric: SleMetric) -> Reading {
        match self {
            MetricPayload::Summary(summary) => summary.reading(metric),
            MetricPayload::Score { score } => single(*score),
            MetricPayload::Value { value } => single(*value),
            MetricPayload::Nested { summary } => match summary.score.or(summary.value) {
                Some(value) => single(value),
                None => Reading::Absent(AbsentReason::NoScore),
            },
            MetricPayload::Empty {} => Reading::Absent(AbsentReason::MissingKeys),
        }
    }

    pub fn classifiers(&self) -> &[RawClassifier] {
        match self {
            MetricPayload::Summary(summary) => &summary.classifiers,
            _ => &[],
        }
    }
}

fn single(value: f64) -> Reading {
    if !value.is_finite() {
        return Reading::Absent(AbsentReason::NoScore);
    }
    let unit = if (0.0..=1.0).contains(&value) {
        SeriesUnit::Fraction
    } else {
        SeriesUnit::Percent
    };
    Reading::Samples {
        values: vec![value],
        unit,
    }
}

impl MetricSummary {
    fn reading(&self, metric: SleMetric) -> Reading {
        let samples = &self.sle.samples;
        let values: Vec<f64> = samples
            .value
            .iter()
            .flatten()
            .copied()
            .filter(|v| v.is_finite())
            .collect();

        if values.is_empty() {
            // Fall back to the success ratio implied by degraded/total counts.
            let degraded: f64 = samples.degraded.iter().flatten().sum();
            let total: f64 = samples.total.iter().flatten().sum();
            if total > 0.0 {
                return Reading::Samples {
                    values: vec![(1.0 - degraded / total).clamp(0.0, 1.0)],
                    unit: SeriesUnit::Fraction,
                };
            }
            return Reading::Absent(AbsentReason::EmptySeries);
        }

        let unit = match self.sle.y_label.as_deref().map(str::to_lowercase) {
            Some(label) if label.contains("dbm") => SeriesUnit::Dbm,
            None if metric.default_family() == MetricFamily::SignalStrength
                && values.iter().all(|v| *v < 0.0) =>
            {
                SeriesUnit::Dbm
            }
            _ if values.iter().all(|v| (0.0..=1.0).contains(v)) => SeriesUnit::Fraction,
            _ => SeriesUnit::Percent,
        };
        Reading::Samples { values, unit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_full_summary_shape() {
        let payload: MetricPayload = serde_json::from_value(json!({
            "sle": {
                "samples": {"value": [0.9, null, 0.8], "degraded": [1, 2, 3], "total": [10, 10, 10]},
                "y_label": "%"
            },
            "classifiers": [
                {"name": "weak-signal", "samples": {"degraded": [1], "total": [4]}, "impact": {"num_users": 3}}
            ]
        }))
        .unwrap();
        assert!(matches!(payload, MetricPayload::Summary(_)));
        assert_eq!(payload.classifiers().len(), 1);
        assert_eq!(
            payload.reading(SleMetric::Coverage),
            Reading::Samples {
                values: vec![0.9, 0.8],
                unit: SeriesUnit::Fraction
            }
        );
    }

    #[test]
    fn decodes_flat_and_nested_scores() {
        let score: MetricPayload = serde_json::from_value(json!({"score": 92.5})).unwrap();
        assert!(matches!(score, MetricPayload::Score { .. }));
        let value: MetricPayload = serde_json::from_value(json!({"value": 0.75})).unwrap();
        assert!(matches!(value, MetricPayload::Value { .. }));
        let nested: MetricPayload =
            serde_json::from_value(json!({"summary": {"value": 88.0}})).unwrap();
        assert_eq!(
            nested.reading(SleMetric::Capacity),
            Reading::Samples {
                values: vec![88.0],
                unit: SeriesUnit::Percent
            }
        );
    }

    #[test]
    fn empty_nested_summary_is_absent() {
        let nested: MetricPayload = serde_json::from_value(json!({"summary": {}})).unwrap();
        assert_eq!(
            nested.reading(SleMetric::Roaming),
            Reading::Absent(AbsentReason::NoScore)
        );
    }

    #[test]
    fn objects_without_known_keys_decode_as_absent() {
        for body in [json!({}), json!({"classifiers": [{"name": "asymmetry"}]})] {
            let payload: MetricPayload = serde_json::from_value(body).unwrap();
            assert!(matches!(payload, MetricPayload::Empty {}));
            assert!(payload.classifiers().is_empty());
            assert_eq!(
                payload.reading(SleMetric::Capacity),
                Reading::Absent(AbsentReason::MissingKeys)
            );
        }
    }

    #[test]
    fn empty_series_falls_back_to_degraded_ratio() {
        let payload: MetricPayload = serde_json::from_value(json!({
            "sle": {"samples": {"degraded": [5, 5], "total": [50, 50]}}
        }))
        .unwrap();
        match payload.reading(SleMetric::TimeToConnect) {
            Reading::Samples { values, unit } => {
                assert_eq!(unit, SeriesUnit::Fraction);
                assert!((values[0] - 0.9).abs() < 1e-9);
            }
            other => panic!("unexpected reading {other:?}"),
        }
    }

    #[test]
    fn empty_samples_are_absent() {
        let payload: MetricPayload = serde_json::from_value(json!({"sle": {}})).unwrap();
        assert_eq!(
            payload.reading(SleMetric::Throughput),
            Reading::Absent(AbsentReason::EmptySeries)
        );
    }

    #[test]
    fn dbm_label_selects_signal_strength_unit() {
        let payload: MetricPayload = serde_json::from_value(json!({
            "sle": {"samples": {"value": [-65.0, -70.0]}, "y_label": "dBm"}
        }))
        .unwrap();
        assert!(matches!(
            payload.reading(SleMetric::Coverage),
            Reading::Samples { unit: SeriesUnit::Dbm, .. }
        ));
    }

    #[test]
    fn api_names_round_trip_through_catalogue() {
        for metric in SleMetric::ALL {
            assert_eq!(SleMetric::from_api_name(metric.api_name()), Some(metric));
            assert!(!metric.expected_classifiers().is_empty());
        }
        assert_eq!(SleMetric::from_api_name("jitter"), None);
    }
}
