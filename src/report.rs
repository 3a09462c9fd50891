use std::fmt::Write;

use crate::health::InsightBreakdown;
use crate::models::{HealthSnapshot, Indicator, Severity, TrendReport};

pub fn build_report(
    snapshot: &HealthSnapshot,
    trends: &TrendReport,
    breakdown: &InsightBreakdown,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Wireless Network Health Report");
    let _ = writeln!(
        output,
        "Organization {} at {} - overall status **{}**",
        snapshot.organization_id,
        snapshot.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        snapshot.overall_status()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Severity Counts");
    for severity in Severity::ALL {
        let _ = writeln!(
            output,
            "- {}: {}",
            severity,
            snapshot.severity_counts.get(severity)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Sites ({})", snapshot.total_sites);

    if snapshot.sites_status.is_empty() {
        let _ = writeln!(output, "No sites reported this cycle.");
    } else {
        for (name, site) in snapshot.sites_by_priority() {
            let _ = write!(
                output,
                "- {} ({}): {} with {} signals",
                name, site.site_id, site.status, site.insight_count
            );
            if let Some((metric, degraded)) = site
                .sle_degraded
                .iter()
                .max_by(|a, b| a.1.total_cmp(b.1))
            {
                let _ = write!(output, ", worst SLE {metric} {degraded:.1}% degraded");
            }
            let _ = writeln!(output);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Trend");

    if !trends.has_previous_data {
        let _ = writeln!(output, "No trend available: no previous snapshot to compare.");
    } else {
        let _ = writeln!(
            output,
            "Overall {} across {} metrics ({} stable).",
            trends.overall_trend,
            trends.metrics_trend.len(),
            trends.stable_count()
        );
        for alert in &trends.degradation_alerts {
            let _ = writeln!(
                output,
                "- degrading {}: {} -> {} ({:+.2}%)",
                alert.metric_id, alert.previous, alert.current, alert.change_percent
            );
        }
        for alert in &trends.improvement_alerts {
            let arrow = match alert.indicator {
                Indicator::Rising => "up",
                Indicator::Falling => "down",
                Indicator::Stable => "flat",
            };
            let _ = writeln!(
                output,
                "- improving {} ({arrow}): {} -> {} ({:+.2}%)",
                alert.metric_id, alert.previous, alert.current, alert.change_percent
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Insight Mix");

    if breakdown.by_type.is_empty() {
        let _ = writeln!(output, "No signals recorded this cycle.");
    } else {
        let mut types: Vec<(&String, &usize)> = breakdown.by_type.iter().collect();
        types.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (kind, count) in types {
            let _ = writeln!(output, "- {kind}: {count}");
        }
    }

    let recommendations = breakdown.recommendations();
    if !recommendations.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Recommendations");
        for recommendation in recommendations {
            let _ = writeln!(output, "- {recommendation}");
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::aggregate;
    use crate::models::{Scope, Signal, Site};
    use crate::trend::TrendEngine;
    use chrono::{TimeZone, Utc};

    #[test]
    fn first_report_says_no_trend() {
        let ts = Utc.with_ymd_and_hms(2026, 7, 1, 6, 30, 0).unwrap();
        let sites = vec![Site::new("s1", "HQ"), Site::new("s2", "Depot")];
        let signals = vec![Signal::categorical(
            Scope::Site("s2".into()),
            "ap_offline",
            Severity::Critical,
        )];
        let snapshot = aggregate("org-9", &signals, &sites, ts);
        let trends = TrendEngine::new().compare(&snapshot, None);
        let breakdown = InsightBreakdown::from_signals(&signals);

        let report = build_report(&snapshot, &trends, &breakdown);
        assert!(report.contains("overall status **CRITICAL**"));
        assert!(report.contains("No trend available"));
        assert!(report.contains("- ap_offline: 1"));
        assert!(report.contains("URGENT"));
        let depot = report.find("Depot").unwrap();
        let hq = report.find("HQ").unwrap();
        assert!(depot < hq, "critical site listed first");
    }

    #[test]
    fn report_lists_degradations() {
        let ts = Utc.with_ymd_and_hms(2026, 7, 2, 6, 30, 0).unwrap();
        let critical = |n: usize| -> Vec<Signal> {
            (0..n)
                .map(|_| Signal::categorical(Scope::Organization, "license", Severity::Critical))
                .collect()
        };
        let previous = aggregate("org-9", &critical(2), &[], ts);
        let current = aggregate("org-9", &critical(5), &[], ts);
        let trends = TrendEngine::new().compare(&current, Some(&previous));

        let report = build_report(&current, &trends, &InsightBreakdown::default());
        assert!(report.contains("Overall worsening"));
        assert!(report.contains("- degrading critical_insights: 2 -> 5 (+150.00%)"));
        assert!(report.contains("No signals recorded this cycle."));
    }
}
