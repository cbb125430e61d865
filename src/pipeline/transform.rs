use crate::error::{Result, SyncError};
use crate::metrics::{self, MetricName};
use crate::pipeline::columns::normalize_header;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Rewrite the CSV at `path` with a normalized header row.
///
/// Returns whether the file was transformed. On any load or parse problem the
/// downloaded file is left exactly as it was.
pub async fn normalize_in_place(path: PathBuf) -> bool {
    let file = display_name(&path);
    let result = tokio::task::spawn_blocking(move || rewrite_header(&path))
        .await
        .map_err(|e| SyncError::Transport(format!("transform task failed: {}", e)))
        .and_then(|r| r);

    match result {
        Ok(()) => {
            info!(%file, "Processed: {}", file);
            metrics::increment(MetricName::ArtifactsTransformed);
            true
        }
        Err(e) => {
            warn!(%file, "Error processing {}, keeping the raw download: {}", file, e);
            metrics::increment(MetricName::ArtifactsLeftRaw);
            false
        }
    }
}

/// Synchronous core of the transform: parse fully into a sibling file, then rename.
pub fn rewrite_header(path: &Path) -> Result<()> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(File::open(path)?);

    let header = normalize_header(reader.headers()?.iter());
    if header.is_empty() {
        return Err(SyncError::EmptyFile(display_name(path)));
    }

    let tmp = tmp_path(path);
    let written = write_with_header(&mut reader, &header, &tmp)
        .and_then(|_| fs::rename(&tmp, path).map_err(SyncError::from));
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

fn write_with_header(reader: &mut csv::Reader<File>, header: &[String], dest: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(dest)?;
    writer.write_record(header)?;
    let mut record = csv::ByteRecord::new();
    while reader.read_byte_record(&mut record)? {
        writer.write_byte_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
