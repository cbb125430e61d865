//! Counters recorded through the `metrics` facade.
//!
//! Nothing is exported unless the embedding process installs a recorder.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    CatalogFetchSuccess,
    CatalogFetchError,
    DatasetsSelected,
    DateParseErrors,
    ArtifactsDownloaded,
    ArtifactsFailed,
    ArtifactsTransformed,
    ArtifactsLeftRaw,
    WatermarkSaveErrors,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricName::CatalogFetchSuccess => "cms_sync_catalog_fetch_success_total",
            MetricName::CatalogFetchError => "cms_sync_catalog_fetch_error_total",
            MetricName::DatasetsSelected => "cms_sync_datasets_selected_total",
            MetricName::DateParseErrors => "cms_sync_date_parse_errors_total",
            MetricName::ArtifactsDownloaded => "cms_sync_artifacts_downloaded_total",
            MetricName::ArtifactsFailed => "cms_sync_artifacts_failed_total",
            MetricName::ArtifactsTransformed => "cms_sync_artifacts_transformed_total",
            MetricName::ArtifactsLeftRaw => "cms_sync_artifacts_left_raw_total",
            MetricName::WatermarkSaveErrors => "cms_sync_watermark_save_errors_total",
        };
        write!(f, "{}", name)
    }
}

pub fn increment(metric: MetricName) {
    increment_by(metric, 1);
}

pub fn increment_by(metric: MetricName, n: u64) {
    ::metrics::counter!(metric.to_string()).increment(n);
}
