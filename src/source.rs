//! Read side of the management platform.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Duration;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::models::{Scope, Site};
use crate::payload::{MetricPayload, RawInsight, RawSite, SleMetric};

#[async_trait]
pub trait PlatformSource: Send + Sync {
    async fn list_sites(&self) -> Result<Vec<Site>, SourceError>;

    async fn list_insights(&self, scope: &Scope) -> Result<Vec<RawInsight>, SourceError>;

    async fn get_metric_summary(
        &self,
        site_id: &str,
        metric: SleMetric,
        window: Duration,
    ) -> Result<MetricPayload, SourceError>;
}

/// Serves platform responses from a directory of JSON dumps:
///
/// ```text
/// sites.json
/// insights.json
/// sle/{site_id}/{metric}.json
/// ```
#[derive(Debug, Clone)]
pub struct FixtureSource {
    root: PathBuf,
}

impl FixtureSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read_json<T: DeserializeOwned>(&self, path: PathBuf) -> Result<T, SourceError> {
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::NotFound {
                    resource: path.display().to_string(),
                });
            }
            Err(source) => return Err(SourceError::Io { path, source }),
        };
        serde_json::from_slice(&bytes).map_err(|source| SourceError::Decode { path, source })
    }
}

#[async_trait]
impl PlatformSource for FixtureSource {
    async fn list_sites(&self) -> Result<Vec<Site>, SourceError> {
        let raw: Vec<RawSite> = self.read_json(self.root.join("sites.json")).await?;
        Ok(raw.into_iter().map(Site::from).collect())
    }

    async fn list_insights(&self, scope: &Scope) -> Result<Vec<RawInsight>, SourceError> {
        let path = self.root.join("insights.json");
        let entries: Vec<serde_json::Value> = self.read_json(path.clone()).await?;

        let mut insights = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            match serde_json::from_value::<RawInsight>(entry) {
                Ok(insight) => insights.push(insight),
                Err(err) => {
                    warn!(path = %path.display(), index, error = %err, "skipping malformed insight");
                }
            }
        }

        if let Scope::Site(site_id) = scope {
            insights.retain(|insight| insight.site_id.as_deref() == Some(site_id.as_str()));
        }
        Ok(insights)
    }

    async fn get_metric_summary(
        &self,
        site_id: &str,
        metric: SleMetric,
        window: Duration,
    ) -> Result<MetricPayload, SourceError> {
        // Dumps are captured for a fixed window already.
        debug!(site_id, metric = %metric, window_hours = window.num_hours(), "reading metric fixture");
        let path = self
            .root
            .join("sle")
            .join(site_id)
            .join(format!("{}.json", metric.api_name()));
        self.read_json(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &Path, relative: &str, value: serde_json::Value) {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_vec_pretty(&value).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn lists_sites_with_default_names() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "sites.json",
            json!([{"id": "s1", "name": "HQ"}, {"id": "s2"}]),
        );
        let sites = FixtureSource::new(dir.path()).list_sites().await.unwrap();
        assert_eq!(sites, vec![Site::new("s1", "HQ"), Site::new("s2", "Unknown")]);
    }

    #[tokio::test]
    async fn malformed_insights_are_skipped() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "insights.json",
            json!([
                {"severity": "critical", "type": "ap_offline", "site_id": "s1"},
                {"severity": 3, "type": ["bad"]},
                {"severity": "warning", "type": "dhcp", "site_id": "s2"}
            ]),
        );
        let source = FixtureSource::new(dir.path());
        let all = source.list_insights(&Scope::Organization).await.unwrap();
        assert_eq!(all.len(), 2);
        let site = source.list_insights(&Scope::Site("s2".into())).await.unwrap();
        assert_eq!(site.len(), 1);
        assert_eq!(site[0].kind.as_deref(), Some("dhcp"));
    }

    #[tokio::test]
    async fn missing_metric_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = FixtureSource::new(dir.path())
            .get_metric_summary("s1", SleMetric::Capacity, Duration::hours(24))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn reads_metric_summary_by_api_name() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "sle/s1/time-to-connect.json", json!({"score": 92.5}));
        let payload = FixtureSource::new(dir.path())
            .get_metric_summary("s1", SleMetric::TimeToConnect, Duration::hours(24))
            .await
            .unwrap();
        assert!(matches!(payload, MetricPayload::Score { .. }));
    }

    #[tokio::test]
    async fn keyless_metric_file_is_not_a_decode_error() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "sle/s1/roaming.json", json!({}));
        let payload = FixtureSource::new(dir.path())
            .get_metric_summary("s1", SleMetric::Roaming, Duration::hours(24))
            .await
            .unwrap();
        assert!(matches!(payload, MetricPayload::Empty {}));
    }

    #[tokio::test]
    async fn undecodable_file_is_a_decode_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("sites.json"), b"{not json").unwrap();
        let err = FixtureSource::new(dir.path()).list_sites().await.unwrap_err();
        assert!(matches!(err, SourceError::Decode { .. }));
    }
}
