use crate::error::{Result, SyncError};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Treat an explicit JSON `null` the same as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One entry of the metastore catalog.
///
/// Every field is optional on the wire; absent or `null` values deserialize to empty so
/// a sparse entry is simply irrelevant rather than fatal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetDescriptor {
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(rename = "theme", deserialize_with = "null_as_default")]
    pub themes: Vec<String>,
    pub modified: Option<String>,
    #[serde(rename = "distribution", deserialize_with = "null_as_default")]
    pub distributions: Vec<DistributionRef>,
}

impl DatasetDescriptor {
    pub fn modified_at(&self) -> Result<DateTime<Utc>> {
        let raw = self
            .modified
            .as_deref()
            .ok_or_else(|| SyncError::Timestamp("<missing>".to_string()))?;
        parse_timestamp(raw)
    }
}

/// One downloadable representation of a dataset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionRef {
    #[serde(rename = "mediaType", deserialize_with = "null_as_default")]
    pub media_type: String,
    #[serde(rename = "downloadURL", deserialize_with = "null_as_default")]
    pub download_url: String,
}

/// A single artifact to fetch and normalize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub url: String,
    pub file_name: String,
}

impl DownloadJob {
    /// Build a job named after the final path segment of `url`.
    ///
    /// Returns `None` when the URL has no usable final segment (e.g. it ends in `/`).
    pub fn from_url(url: &str) -> Option<Self> {
        let file_name = url.rsplit('/').next()?.trim();
        if file_name.is_empty() || file_name == "." || file_name == ".." {
            return None;
        }
        Some(Self {
            url: url.to_string(),
            file_name: file_name.to_string(),
        })
    }
}

/// Occurrence count per theme across a whole catalog, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThemeTally {
    counts: HashMap<String, usize>,
    order: Vec<String>,
}

impl ThemeTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, theme: &str) {
        match self.counts.get_mut(theme) {
            Some(count) => *count += 1,
            None => {
                self.counts.insert(theme.to_string(), 1);
                self.order.push(theme.to_string());
            }
        }
    }

    pub fn get(&self, theme: &str) -> usize {
        self.counts.get(theme).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.order
            .iter()
            .map(move |theme| (theme.as_str(), self.counts[theme]))
    }
}

/// Lenient ISO-8601 parsing onto the UTC timeline.
///
/// Accepts RFC 3339 with any offset, a naive date-time (taken as UTC) and a bare date
/// (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(SyncError::Timestamp(raw.to_string()))
}
