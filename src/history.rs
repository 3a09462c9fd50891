//! Date-bucketed snapshot history.
//!
//! Layout: `{root}/{YYYY-MM-DD}/{KIND}_{YYYYmmdd_HHMMSS_mmm}.json`. The
//! timestamp in the file name sorts lexically, so the newest file in a
//! bucket is the greatest name. Writes go through a `.tmp` file and a
//! rename, so a bucket never holds a half-written snapshot.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::HistoryError;
use crate::models::HealthSnapshot;

const BUCKET_FORMAT: &str = "%Y-%m-%d";
const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    HealthDashboard,
    SummaryReport,
}

impl ReportKind {
    pub fn prefix(self) -> &'static str {
        match self {
            ReportKind::HealthDashboard => "HEALTH_DASHBOARD",
            ReportKind::SummaryReport => "SUMMARY_REPORT",
        }
    }

    fn matches(self, file_name: &str) -> bool {
        file_name
            .strip_prefix(self.prefix())
            .and_then(|rest| rest.strip_prefix('_'))
            .is_some_and(|rest| rest.ends_with(".json"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistorySummary {
    pub total_days: usize,
    pub date_range: Option<String>,
    pub report_count: usize,
    pub dates: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SnapshotRow<'a> {
    bucket: &'a str,
    timestamp: String,
    organization_id: &'a str,
    overall_status: &'static str,
    total_sites: usize,
    critical: usize,
    major: usize,
    warning: usize,
    info: usize,
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    root: PathBuf,
    keep_days: u32,
}

impl HistoryStore {
    pub fn new(root: impl Into<PathBuf>, keep_days: u32) -> Self {
        Self {
            root: root.into(),
            keep_days,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist a snapshot and prune expired buckets. Failures are logged;
    /// returns the written path on success.
    pub fn save(&self, snapshot: &HealthSnapshot, kind: ReportKind) -> Option<PathBuf> {
        self.save_at(snapshot, kind, Utc::now())
    }

    pub fn save_at(
        &self,
        snapshot: &HealthSnapshot,
        kind: ReportKind,
        now: DateTime<Utc>,
    ) -> Option<PathBuf> {
        let saved = match self.try_save_at(snapshot, kind, now) {
            Ok(path) => {
                info!(path = %path.display(), "saved snapshot to history");
                Some(path)
            }
            Err(err) => {
                error!(error = %err, "failed to save snapshot to history");
                None
            }
        };
        self.cleanup_at(now);
        saved
    }

    pub fn try_save_at(
        &self,
        snapshot: &HealthSnapshot,
        kind: ReportKind,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, HistoryError> {
        let bucket = self.bucket_dir(now.date_naive());
        fs::create_dir_all(&bucket).map_err(|err| HistoryError::io(&bucket, err))?;

        let file_name = format!("{}_{}.json", kind.prefix(), now.format(FILE_TIMESTAMP_FORMAT));
        let path = bucket.join(file_name);
        let tmp = path.with_extension("json.tmp");

        let body = serde_json::to_vec_pretty(snapshot).map_err(|source| HistoryError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&tmp, body).map_err(|err| HistoryError::io(&tmp, err))?;
        fs::rename(&tmp, &path).map_err(|err| HistoryError::io(&path, err))?;
        Ok(path)
    }

    /// Most recent health snapshot saved `days_ago` days before now.
    pub fn load_previous(&self, days_ago: u32) -> Option<HealthSnapshot> {
        self.load_previous_at(days_ago, Utc::now())
    }

    pub fn load_previous_at(&self, days_ago: u32, now: DateTime<Utc>) -> Option<HealthSnapshot> {
        match self.try_load_previous_at(days_ago, now) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!(error = %err, days_ago, "failed to read previous snapshot");
                None
            }
        }
    }

    pub fn try_load_previous_at(
        &self,
        days_ago: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<HealthSnapshot>, HistoryError> {
        let Some(date) = now.date_naive().checked_sub_days(Days::new(u64::from(days_ago))) else {
            debug!(days_ago, "comparison date out of range");
            return Ok(None);
        };
        let bucket = self.bucket_dir(date);
        if !bucket.is_dir() {
            debug!(bucket = %bucket.display(), "no history for date");
            return Ok(None);
        }

        let Some(latest) = latest_file(&bucket, ReportKind::HealthDashboard)? else {
            debug!(bucket = %bucket.display(), "history bucket is empty");
            return Ok(None);
        };
        read_snapshot(&latest).map(Some)
    }

    /// Delete expired buckets; returns how many were removed.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Utc::now())
    }

    pub fn cleanup_at(&self, now: DateTime<Utc>) -> usize {
        match self.try_cleanup_at(now) {
            Ok(removed) => removed,
            Err(err) => {
                error!(error = %err, "history cleanup failed");
                0
            }
        }
    }

    /// A bucket expires once its start of day is older than `now - keep_days`.
    pub fn try_cleanup_at(&self, now: DateTime<Utc>) -> Result<usize, HistoryError> {
        if !self.root.is_dir() {
            return Ok(0);
        }
        let Some(cutoff) = now.checked_sub_days(Days::new(u64::from(self.keep_days))) else {
            debug!(keep_days = self.keep_days, "retention window reaches past the calendar, nothing expires");
            return Ok(0);
        };
        let mut removed = 0;

        for (date, path) in self.buckets()? {
            let Some(start) = date.and_hms_opt(0, 0, 0) else {
                continue;
            };
            if start.and_utc() < cutoff {
                match fs::remove_dir_all(&path) {
                    Ok(()) => {
                        info!(bucket = %date, "removed expired history bucket");
                        removed += 1;
                    }
                    Err(err) => {
                        warn!(bucket = %path.display(), error = %err, "failed to remove history bucket")
                    }
                }
            }
        }
        Ok(removed)
    }

    pub fn summary(&self) -> Result<HistorySummary, HistoryError> {
        let mut summary = HistorySummary::default();
        if !self.root.is_dir() {
            return Ok(summary);
        }
        let buckets = self.buckets()?;
        for (date, path) in &buckets {
            summary.dates.push(date.format(BUCKET_FORMAT).to_string());
            summary.report_count += snapshot_files(path)?.len();
        }
        summary.total_days = buckets.len();
        if let (Some(first), Some(last)) = (summary.dates.first(), summary.dates.last()) {
            summary.date_range = Some(format!("{first} to {last}"));
        }
        Ok(summary)
    }

    /// Write one CSV row per stored health snapshot, oldest first.
    pub fn export_csv(&self, out: &Path) -> Result<usize, HistoryError> {
        let mut writer = csv::Writer::from_path(out)?;
        let mut rows = 0;
        if self.root.is_dir() {
            for (date, path) in self.buckets()? {
                let bucket = date.format(BUCKET_FORMAT).to_string();
                let mut files = snapshot_files(&path)?;
                files.retain(|file| {
                    file_name(file).is_some_and(|name| ReportKind::HealthDashboard.matches(name))
                });
                for file in files {
                    let snapshot = match read_snapshot(&file) {
                        Ok(snapshot) => snapshot,
                        Err(err) => {
                            warn!(error = %err, "skipping unreadable snapshot");
                            continue;
                        }
                    };
                    let counts = snapshot.severity_counts;
                    writer.serialize(SnapshotRow {
                        bucket: &bucket,
                        timestamp: snapshot.timestamp.to_rfc3339(),
                        organization_id: &snapshot.organization_id,
                        overall_status: snapshot.overall_status().as_str(),
                        total_sites: snapshot.total_sites,
                        critical: counts.critical,
                        major: counts.major,
                        warning: counts.warning,
                        info: counts.info,
                    })?;
                    rows += 1;
                }
            }
        }
        writer.flush().map_err(|err| HistoryError::io(out, err))?;
        Ok(rows)
    }

    fn bucket_dir(&self, date: NaiveDate) -> PathBuf {
        self.root.join(date.format(BUCKET_FORMAT).to_string())
    }

    /// Date buckets sorted oldest first. Directories whose name is not a
    /// date are skipped.
    fn buckets(&self) -> Result<Vec<(NaiveDate, PathBuf)>, HistoryError> {
        let entries = fs::read_dir(&self.root).map_err(|err| HistoryError::io(&self.root, err))?;
        let mut buckets = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| HistoryError::io(&self.root, err))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = file_name(&path) else {
                continue;
            };
            match NaiveDate::parse_from_str(name, BUCKET_FORMAT) {
                Ok(date) => buckets.push((date, path)),
                Err(_) => debug!(dir = name, "skipping non-date directory in history"),
            }
        }
        buckets.sort();
        Ok(buckets)
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

/// Finished snapshot files in a bucket, sorted by name.
fn snapshot_files(bucket: &Path) -> Result<Vec<PathBuf>, HistoryError> {
    let entries = fs::read_dir(bucket).map_err(|err| HistoryError::io(bucket, err))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|err| HistoryError::io(bucket, err))?.path();
        if path.is_file() && file_name(&path).is_some_and(|name| name.ends_with(".json")) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn latest_file(bucket: &Path, kind: ReportKind) -> Result<Option<PathBuf>, HistoryError> {
    Ok(snapshot_files(bucket)?
        .into_iter()
        .filter(|path| file_name(path).is_some_and(|name| kind.matches(name)))
        .max())
}

fn read_snapshot(path: &Path) -> Result<HealthSnapshot, HistoryError> {
    let body = fs::read(path).map_err(|err| HistoryError::io(path, err))?;
    serde_json::from_slice(&body).map_err(|source| HistoryError::Json {
        path: path.to_path_buf(),
        source,
    })
}
