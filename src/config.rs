//! Runtime configuration.
//!
//! Values come from an optional `.env` file overlaid by `WLAN_HEALTH_*`
//! environment variables; CLI flags override individual fields afterwards.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::payload::SleMetric;
use crate::severity::{MetricFamily, PercentBands, ThresholdTable};
use crate::trend::{MetricDirection, TrendEngine};

const ENV_PREFIX: &str = "WLAN_HEALTH_";

/// Upper bound for retention and comparison offsets, about ten years.
pub const MAX_DAYS: u32 = 3650;
/// Longest SLE lookback the platform serves.
pub const MAX_WINDOW_HOURS: u32 = 24 * 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub history_dir: PathBuf,
    pub keep_days: u32,
    pub compare_days_ago: u32,
    pub organization_id: String,
    pub interval_secs: u64,
    pub log_level: String,
    pub log_format: LogFormat,
    pub thresholds: PercentBands,
    pub fixtures_dir: Option<PathBuf>,
    pub window_hours: u32,
    pub sle_metrics: Vec<SleMetric>,
    /// Metric ids whose increase counts as improvement.
    pub lower_is_worse: Vec<String>,
    /// Metric ids declared higher-is-worse; their decreases are reported as improvements.
    pub higher_is_worse: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            history_dir: PathBuf::from("reports/history"),
            keep_days: 7,
            compare_days_ago: 1,
            organization_id: "unknown".to_string(),
            interval_secs: 3600,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            thresholds: PercentBands::default(),
            fixtures_dir: None,
            window_hours: 24,
            sle_metrics: SleMetric::ALL.to_vec(),
            lower_is_worse: Vec::new(),
            higher_is_worse: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keep_days == 0 || self.keep_days > MAX_DAYS {
            return Err(ConfigError::InvalidKeepDays(self.keep_days));
        }
        if self.compare_days_ago > MAX_DAYS {
            return Err(ConfigError::InvalidCompareDays(self.compare_days_ago));
        }
        if self.interval_secs == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        if self.window_hours == 0 || self.window_hours > MAX_WINDOW_HOURS {
            return Err(ConfigError::InvalidWindow(self.window_hours));
        }
        if self.sle_metrics.is_empty() {
            return Err(ConfigError::NoSleMetrics);
        }
        self.thresholds.validate()
    }

    pub fn trend_engine(&self) -> TrendEngine {
        let engine = self
            .higher_is_worse
            .iter()
            .fold(TrendEngine::new(), |engine, metric| {
                engine.with_direction(metric.as_str(), MetricDirection::HigherIsWorse)
            });
        self.lower_is_worse.iter().fold(engine, |engine, metric| {
            engine.with_direction(metric.as_str(), MetricDirection::LowerIsWorse)
        })
    }

    /// Threshold table for every metric family, built from the configured bands.
    pub fn threshold_table(&self) -> Result<ThresholdTable, ConfigError> {
        let bands: BTreeMap<MetricFamily, PercentBands> = MetricFamily::ALL
            .iter()
            .map(|family| (*family, self.thresholds))
            .collect();
        ThresholdTable::new(bands)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
    #[error("keep_days must be between 1 and 3650, got {0}")]
    InvalidKeepDays(u32),
    #[error("compare_days_ago must be at most 3650, got {0}")]
    InvalidCompareDays(u32),
    #[error("interval_secs must be at least 1")]
    InvalidInterval,
    #[error("window_hours must be between 1 and 720, got {0}")]
    InvalidWindow(u32),
    #[error("at least one SLE metric must be polled")]
    NoSleMetrics,
    #[error("thresholds must lie within 0-100 (critical {critical}, major {major}, warning {warning})")]
    ThresholdOutOfRange {
        critical: f64,
        major: f64,
        warning: f64,
    },
    #[error("thresholds must be strictly ascending (critical {critical} < major {major} < warning {warning})")]
    ThresholdsNotAscending {
        critical: f64,
        major: f64,
        warning: f64,
    },
    #[error("no thresholds configured for metric family {family:?}")]
    MissingThresholds { family: MetricFamily },
}

pub struct ConfigLoader {
    env_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Reads `.env` from the working directory when it exists.
    pub fn new() -> Self {
        Self {
            env_file: Some(PathBuf::from(".env")),
        }
    }

    pub fn with_env_file(path: impl Into<PathBuf>) -> Self {
        Self {
            env_file: Some(path.into()),
        }
    }

    pub fn without_env_file() -> Self {
        Self { env_file: None }
    }

    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut layered = BTreeMap::new();
        if let Some(path) = self.env_file.as_deref() {
            layered.extend(read_env_file(path)?);
        }
        // Process environment wins over the file.
        layered.extend(env::vars());
        Self::from_vars(layered)
    }

    /// Build a config from `KEY=value` pairs; only `WLAN_HEALTH_*` keys are read.
    pub fn from_vars<I>(vars: I) -> Result<AppConfig, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut values: BTreeMap<String, String> = vars
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(ENV_PREFIX)
                    .map(|stripped| (stripped.to_string(), value))
            })
            .filter(|(_, value)| !value.trim().is_empty())
            .collect();

        let mut config = AppConfig::default();
        if let Some(dir) = values.remove("HISTORY_DIR") {
            config.history_dir = PathBuf::from(dir);
        }
        if let Some(org) = values.remove("ORG_ID") {
            config.organization_id = org;
        }
        if let Some(level) = values.remove("LOG_LEVEL") {
            config.log_level = level;
        }
        if let Some(format) = values.remove("LOG_FORMAT") {
            config.log_format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" | "text" | "plain" => LogFormat::Pretty,
                _ => return Err(invalid("LOG_FORMAT", &format)),
            };
        }
        if let Some(dir) = values.remove("FIXTURES_DIR") {
            config.fixtures_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = values.remove("SLE_METRICS") {
            config.sle_metrics = split_list(&raw)
                .map(|name| SleMetric::from_api_name(&name).ok_or_else(|| invalid("SLE_METRICS", &raw)))
                .collect::<Result<_, _>>()?;
        }
        if let Some(raw) = values.remove("LOWER_IS_WORSE") {
            config.lower_is_worse = split_list(&raw).collect();
        }
        if let Some(raw) = values.remove("HIGHER_IS_WORSE") {
            config.higher_is_worse = split_list(&raw).collect();
        }
        parse_into(&mut values, "KEEP_DAYS", &mut config.keep_days)?;
        parse_into(&mut values, "COMPARE_DAYS_AGO", &mut config.compare_days_ago)?;
        parse_into(&mut values, "INTERVAL_SECS", &mut config.interval_secs)?;
        parse_into(&mut values, "WINDOW_HOURS", &mut config.window_hours)?;
        parse_into(&mut values, "CRITICAL_BELOW", &mut config.thresholds.critical_below)?;
        parse_into(&mut values, "MAJOR_BELOW", &mut config.thresholds.major_below)?;
        parse_into(&mut values, "WARNING_BELOW", &mut config.thresholds.warning_below)?;

        config.validate()?;
        Ok(config)
    }
}

fn read_env_file(path: &Path) -> Result<Vec<(String, String)>, ConfigError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let iter = dotenvy::from_path_iter(path).map_err(|source| ConfigError::EnvFile {
        path: path.to_path_buf(),
        source,
    })?;
    iter.collect::<Result<Vec<_>, _>>()
        .map_err(|source| ConfigError::EnvFile {
            path: path.to_path_buf(),
            source,
        })
}

fn split_list(raw: &str) -> impl Iterator<Item = String> + '_ {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
}

fn parse_into<T: std::str::FromStr>(
    values: &mut BTreeMap<String, String>,
    key: &str,
    target: &mut T,
) -> Result<(), ConfigError> {
    if let Some(raw) = values.remove(key) {
        *target = raw.trim().parse().map_err(|_| invalid(key, &raw))?;
    }
    Ok(())
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: format!("{ENV_PREFIX}{key}"),
        value: value.to_string(),
    }
}
