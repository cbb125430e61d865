use crate::app::ports::HttpClientPort;
use crate::error::{Result, SyncError};
use crate::metrics::{self, MetricName};
use crate::types::DatasetDescriptor;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Decoded catalog plus the number of records the endpoint returned.
#[derive(Debug, Default)]
pub struct Catalog {
    pub entries: Vec<DatasetDescriptor>,
    /// Length of the JSON array, including elements that failed to decode.
    pub total_records: usize,
}

impl Catalog {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn malformed(&self) -> usize {
        self.total_records - self.entries.len()
    }
}

/// Reads the dataset catalog from the metastore endpoint.
pub struct CatalogClient {
    http: Arc<dyn HttpClientPort>,
    url: String,
}

impl CatalogClient {
    pub fn new(http: Arc<dyn HttpClientPort>, url: impl Into<String>) -> Self {
        Self { http, url: url.into() }
    }

    /// Fetch every catalog entry. Any failure degrades to an empty catalog.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn fetch_catalog(&self) -> Catalog {
        match self.try_fetch().await {
            Ok(catalog) => {
                info!(
                    malformed = catalog.malformed(),
                    "Successfully fetched {} datasets", catalog.total_records
                );
                metrics::increment(MetricName::CatalogFetchSuccess);
                catalog
            }
            Err(e) => {
                warn!("Failed to fetch datasets: {}", e);
                metrics::increment(MetricName::CatalogFetchError);
                Catalog::default()
            }
        }
    }

    async fn try_fetch(&self) -> Result<Catalog> {
        let resp = self.http.get(&self.url).await?;
        if !resp.is_ok() {
            return Err(SyncError::Status {
                url: self.url.clone(),
                status: resp.status,
            });
        }
        let raw: Vec<Value> = serde_json::from_slice(&resp.bytes)?;
        let total_records = raw.len();
        Ok(Catalog {
            entries: parse_entries(raw),
            total_records,
        })
    }
}

/// Decode entries one at a time so a single malformed element is skipped, not fatal.
fn parse_entries(raw: Vec<Value>) -> Vec<DatasetDescriptor> {
    raw.into_iter()
        .enumerate()
        .filter_map(|(i, value)| match serde_json::from_value::<DatasetDescriptor>(value) {
            Ok(ds) => Some(ds),
            Err(e) => {
                warn!(index = i, "Skipping malformed catalog entry: {}", e);
                None
            }
        })
        .collect()
}
