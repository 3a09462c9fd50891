use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ConfigError;
use crate::models::Severity;

/// Which threshold table a numeric reading is classified against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFamily {
    Insight,
    Percentage,
    SignalStrength,
}

impl MetricFamily {
    pub const ALL: [MetricFamily; 3] = [
        MetricFamily::Insight,
        MetricFamily::Percentage,
        MetricFamily::SignalStrength,
    ];
}

/// Percentage boundaries: below `critical_below` is critical, below
/// `major_below` major, below `warning_below` warning, everything else info.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentBands {
    pub critical_below: f64,
    pub major_below: f64,
    pub warning_below: f64,
}

impl Default for PercentBands {
    fn default() -> Self {
        Self {
            critical_below: 70.0,
            major_below: 80.0,
            warning_below: 90.0,
        }
    }
}

impl PercentBands {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let values = [self.critical_below, self.major_below, self.warning_below];
        if values.iter().any(|v| !v.is_finite() || *v < 0.0 || *v > 100.0) {
            return Err(ConfigError::ThresholdOutOfRange {
                critical: self.critical_below,
                major: self.major_below,
                warning: self.warning_below,
            });
        }
        if !(self.critical_below < self.major_below && self.major_below < self.warning_below) {
            return Err(ConfigError::ThresholdsNotAscending {
                critical: self.critical_below,
                major: self.major_below,
                warning: self.warning_below,
            });
        }
        Ok(())
    }

    pub fn classify(&self, percent: f64) -> Severity {
        if percent < self.critical_below {
            Severity::Critical
        } else if percent < self.major_below {
            Severity::Major
        } else if percent < self.warning_below {
            Severity::Warning
        } else {
            Severity::Info
        }
    }
}

/// Threshold table keyed by family, checked for completeness when built.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdTable {
    bands: BTreeMap<MetricFamily, PercentBands>,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self::uniform(PercentBands::default())
    }
}

impl ThresholdTable {
    pub fn new(bands: BTreeMap<MetricFamily, PercentBands>) -> Result<Self, ConfigError> {
        for family in MetricFamily::ALL {
            let Some(entry) = bands.get(&family) else {
                return Err(ConfigError::MissingThresholds { family });
            };
            entry.validate()?;
        }
        Ok(Self { bands })
    }

    /// Same bands for every family. Callers validate `bands` first.
    pub fn uniform(bands: PercentBands) -> Self {
        Self {
            bands: MetricFamily::ALL.iter().map(|family| (*family, bands)).collect(),
        }
    }

    pub fn bands(&self, family: MetricFamily) -> PercentBands {
        self.bands.get(&family).copied().unwrap_or_default()
    }

    /// Classify a raw reading. Percentage values are on the 0-100 scale,
    /// signal strength is in dBm. Non-finite input degrades to info.
    pub fn classify(&self, value: f64, family: MetricFamily) -> Severity {
        if !value.is_finite() {
            warn!(value, ?family, "unclassifiable reading, defaulting to info");
            return Severity::Info;
        }
        let percent = match family {
            MetricFamily::SignalStrength => dbm_to_quality(value),
            MetricFamily::Insight | MetricFamily::Percentage => value,
        };
        self.classify_percent(percent, family)
    }

    /// Classify a reading that is already on the 0-100 quality scale.
    pub fn classify_percent(&self, percent: f64, family: MetricFamily) -> Severity {
        if !percent.is_finite() {
            warn!(percent, ?family, "unclassifiable score, defaulting to info");
            return Severity::Info;
        }
        self.bands(family).classify(percent)
    }
}

/// Map a vendor severity label onto the tier vocabulary.
pub fn classify_label(label: &str) -> Severity {
    match label.trim().to_lowercase().as_str() {
        "critical" => Severity::Critical,
        "major" => Severity::Major,
        "warning" | "minor" => Severity::Warning,
        "info" => Severity::Info,
        other => {
            warn!(label = other, "unrecognized severity label, defaulting to info");
            Severity::Info
        }
    }
}

/// dBm breakpoints and the quality percentage each maps to. Readings between
/// two breakpoints are interpolated linearly.
const DBM_BREAKPOINTS: [(f64, f64); 6] = [
    (-30.0, 100.0),
    (-50.0, 90.0),
    (-60.0, 80.0),
    (-70.0, 70.0),
    (-80.0, 50.0),
    (-100.0, 0.0),
];

/// Convert a signal strength reading to a 0-100 quality score.
pub fn dbm_to_quality(dbm: f64) -> f64 {
    if !dbm.is_finite() {
        debug!(dbm, "non-finite dBm reading");
        return 0.0;
    }
    let (top_dbm, top_quality) = DBM_BREAKPOINTS[0];
    if dbm >= top_dbm {
        return top_quality;
    }
    for pair in DBM_BREAKPOINTS.windows(2) {
        let (upper_dbm, upper_quality) = pair[0];
        let (lower_dbm, lower_quality) = pair[1];
        if dbm >= lower_dbm {
            let fraction = (dbm - lower_dbm) / (upper_dbm - lower_dbm);
            let quality = lower_quality + fraction * (upper_quality - lower_quality);
            return quality.clamp(0.0, 100.0);
        }
    }
    0.0
}
