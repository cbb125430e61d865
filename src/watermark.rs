use crate::error::Result;
use crate::types::parse_timestamp;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// "Processed through" instant of the last successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark(DateTime<Utc>);

impl Watermark {
    /// The value used when no prior run is on record.
    pub fn epoch() -> Self {
        Self(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn at(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.0
    }

    /// Move forward to `instant`. Never moves backwards.
    pub fn advanced_to(self, instant: DateTime<Utc>) -> Self {
        Self(self.0.max(instant))
    }

    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rfc3339())
    }
}

/// On-disk shape: `{"last_run": "<ISO-8601>"}`. Other keys survive a rewrite.
#[derive(Debug, Serialize, Deserialize)]
struct WatermarkRecord {
    last_run: String,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

pub struct WatermarkStore {
    path: PathBuf,
}

impl WatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored watermark, degrading to the epoch on any problem.
    pub fn load(&self) -> Watermark {
        match self.try_load() {
            Ok(Some(wm)) => {
                info!(path = %self.path.display(), "Last run time: {}", wm);
                wm
            }
            Ok(None) => {
                info!(path = %self.path.display(), "No previous run recorded, starting from epoch");
                Watermark::epoch()
            }
            Err(e) => {
                warn!(path = %self.path.display(), "Error loading watermark file, starting from epoch: {}", e);
                Watermark::epoch()
            }
        }
    }

    pub fn try_load(&self) -> Result<Option<Watermark>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let record = self.read_record()?;
        Ok(Some(Watermark::at(parse_timestamp(&record.last_run)?)))
    }

    /// Persist `wm`. A failure is logged and reported as `false`; the next run then
    /// reprocesses the same window.
    pub fn save(&self, wm: Watermark) -> bool {
        match self.try_save(wm) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Saved watermark {}", wm);
                true
            }
            Err(e) => {
                warn!(path = %self.path.display(), "Error saving watermark: {}", e);
                crate::metrics::increment(crate::metrics::MetricName::WatermarkSaveErrors);
                false
            }
        }
    }

    pub fn try_save(&self, wm: Watermark) -> Result<()> {
        // Keep whatever else lives in the file; a corrupt file is simply replaced.
        let extra = self.read_record().map(|r| r.extra).unwrap_or_default();
        let record = WatermarkRecord {
            last_run: wm.to_rfc3339(),
            extra,
        };
        let body = serde_json::to_vec(&record)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        // Replace via rename so a failed write leaves the previous value intact
        let tmp = self.tmp_path();
        fs::write(&tmp, body)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn read_record(&self) -> Result<WatermarkRecord> {
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
