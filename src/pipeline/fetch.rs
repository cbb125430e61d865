use crate::app::ports::HttpClientPort;
use crate::constants::CSV_MEDIA_TYPE;
use crate::error::{Result, SyncError};
use crate::metrics::{self, MetricName};
use crate::types::DownloadJob;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Downloads one artifact into the output directory.
#[derive(Clone)]
pub struct ArtifactFetcher {
    http: Arc<dyn HttpClientPort>,
    output_dir: PathBuf,
    media_type: String,
}

impl ArtifactFetcher {
    pub fn new(http: Arc<dyn HttpClientPort>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            http,
            output_dir: output_dir.into(),
            media_type: CSV_MEDIA_TYPE.to_string(),
        }
    }

    /// Media type the catalog advertised for every job this fetcher runs.
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Fetch `job.url` and write the whole body to `output_dir/job.file_name`,
    /// replacing any existing file. Nothing is written on failure.
    pub async fn fetch(&self, job: &DownloadJob) -> Result<PathBuf> {
        match self.try_fetch(job).await {
            Ok(path) => {
                info!(file = %job.file_name, "Downloaded: {}", job.file_name);
                metrics::increment(MetricName::ArtifactsDownloaded);
                Ok(path)
            }
            Err(e) => {
                warn!(file = %job.file_name, url = %job.url, "Failed to download {}: {}", job.file_name, e);
                metrics::increment(MetricName::ArtifactsFailed);
                Err(e)
            }
        }
    }

    async fn try_fetch(&self, job: &DownloadJob) -> Result<PathBuf> {
        let resp = self.http.get(&job.url).await?;
        if !resp.is_ok() {
            return Err(SyncError::Status {
                url: job.url.clone(),
                status: resp.status,
            });
        }
        if !content_type_matches(&resp.content_type, &self.media_type) {
            debug!(
                file = %job.file_name,
                content_type = %resp.content_type,
                expected = %self.media_type,
                "Server labelled {} with an unexpected content type",
                job.file_name
            );
        }
        let path = self.output_dir.join(&job.file_name);
        tokio::fs::write(&path, &resp.bytes).await?;
        Ok(path)
    }
}

/// Compare a `Content-Type` header against a bare media type, ignoring parameters
/// such as `charset` and letter case.
pub fn content_type_matches(content_type: &str, media_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    essence.eq_ignore_ascii_case(media_type.trim())
}
