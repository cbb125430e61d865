use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use cms_hospital_sync::app::ports::{HttpClientPort, HttpGetResult};
use cms_hospital_sync::config::Config;
use cms_hospital_sync::error::SyncError;
use cms_hospital_sync::pipeline::tasks::ArtifactPolicy;
use cms_hospital_sync::pipeline::{Pipeline, RunOutcome};
use cms_hospital_sync::watermark::{Watermark, WatermarkStore};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::{tempdir, TempDir};

const CATALOG_URL: &str = "https://catalog.test/items";

/// In-memory stand-in for the network. Unknown URLs fail at the transport level.
#[derive(Default)]
struct FakeHttp {
    routes: Mutex<HashMap<String, (u16, Vec<u8>)>>,
    requests: Mutex<Vec<String>>,
}

impl FakeHttp {
    fn route(&self, url: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.routes.lock().unwrap().insert(url.to_string(), (status, body.into()));
    }

    fn catalog(&self, entries: Value) {
        self.route(CATALOG_URL, 200, serde_json::to_vec(&entries).unwrap());
    }

    fn requests_for(&self, suffix: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|u| u.ends_with(suffix)).count()
    }
}

#[async_trait]
impl HttpClientPort for FakeHttp {
    async fn get(&self, url: &str) -> cms_hospital_sync::error::Result<HttpGetResult> {
        self.requests.lock().unwrap().push(url.to_string());
        match self.routes.lock().unwrap().get(url) {
            Some((status, bytes)) => Ok(HttpGetResult {
                status: *status,
                bytes: bytes.clone(),
                content_type: "application/octet-stream".to_string(),
            }),
            None => Err(SyncError::Transport(format!("no route to {}", url))),
        }
    }
}

struct Harness {
    dir: TempDir,
    http: Arc<FakeHttp>,
    config: Config,
}

impl Harness {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let config = Config {
            catalog_url: CATALOG_URL.to_string(),
            output_dir: dir.path().join("hospital_data"),
            watermark_path: dir.path().join("last_run_metadata.json"),
            workers: 2,
            ..Config::default()
        };
        Self {
            dir,
            http: Arc::new(FakeHttp::default()),
            config,
        }
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.http.clone(), &self.config)
    }

    fn output(&self, name: &str) -> std::path::PathBuf {
        self.config.output_dir.join(name)
    }

    fn stored_watermark(&self) -> Option<Watermark> {
        WatermarkStore::new(&self.config.watermark_path).try_load().unwrap()
    }
}

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

fn csv_dataset(title: &str, themes: &[&str], modified: &str, urls: &[&str]) -> Value {
    json!({
        "title": title,
        "description": "",
        "theme": themes,
        "modified": modified,
        "distribution": urls
            .iter()
            .map(|u| json!({"mediaType": "text/csv", "downloadURL": u}))
            .collect::<Vec<_>>(),
    })
}

#[tokio::test]
async fn new_hospital_dataset_is_downloaded_and_normalized() -> Result<()> {
    let h = Harness::new();
    h.http.catalog(json!([csv_dataset("Hospital X", &["Hospital"], "2024-01-02T00:00:00Z", &["https://x/a.csv"])]));
    h.http.route("https://x/a.csv", 200, "Facility ID,Hospital Name,Score (Linear)\n010001,SOUTHEAST,87\n");
    fs::write(&h.config.watermark_path, r#"{"last_run": "1970-01-01T00:00:00Z"}"#)?;

    let started = at(2024, 2, 1);
    let summary = h.pipeline().run_at(started).await?;

    assert_eq!(summary.outcome, RunOutcome::Synced);
    assert_eq!(summary.catalog_size, 1);
    assert_eq!(summary.selected, 1);
    assert_eq!(summary.dispatch.dispatched, 1);
    assert_eq!(summary.dispatch.transformed, 1);
    assert_eq!(
        fs::read_to_string(h.output("a.csv"))?,
        "facility_id,hospital_name,score_linear\n010001,SOUTHEAST,87\n"
    );
    assert_eq!(h.stored_watermark(), Some(Watermark::at(started)));
    assert!(summary.watermark_saved);
    Ok(())
}

#[tokio::test]
async fn second_run_without_catalog_changes_dispatches_nothing() -> Result<()> {
    let h = Harness::new();
    h.http.catalog(json!([csv_dataset("Hospital X", &["Hospital"], "2024-01-02", &["https://x/a.csv"])]));
    h.http.route("https://x/a.csv", 200, "A\n1\n");

    let first = h.pipeline().run_at(at(2024, 2, 1)).await?;
    assert_eq!(first.dispatch.dispatched, 1);

    let second = h.pipeline().run_at(at(2024, 2, 2)).await?;
    assert_eq!(second.outcome, RunOutcome::NothingNew);
    assert_eq!(second.dispatch.dispatched, 0);
    assert_eq!(h.http.requests_for("a.csv"), 1);
    assert_eq!(h.stored_watermark(), Some(Watermark::at(at(2024, 2, 2))));
    Ok(())
}

#[tokio::test]
async fn empty_catalog_leaves_everything_untouched() -> Result<()> {
    let h = Harness::new();
    h.http.catalog(json!([]));
    let seeded = r#"{"last_run": "2024-01-01T00:00:00Z"}"#;
    fs::write(&h.config.watermark_path, seeded)?;

    let summary = h.pipeline().run_at(at(2024, 2, 1)).await?;

    assert_eq!(summary.outcome, RunOutcome::EmptyCatalog);
    assert!(summary.watermark.is_none());
    assert_eq!(fs::read_to_string(&h.config.watermark_path)?, seeded);
    assert!(!h.config.output_dir.exists());
    Ok(())
}

#[tokio::test]
async fn unreachable_catalog_is_a_quiet_no_op() -> Result<()> {
    let h = Harness::new();
    h.http.route(CATALOG_URL, 500, "oops");

    let summary = h.pipeline().run_at(at(2024, 2, 1)).await?;

    assert_eq!(summary.outcome, RunOutcome::EmptyCatalog);
    assert!(h.stored_watermark().is_none());
    assert!(!h.config.output_dir.exists());
    Ok(())
}

#[tokio::test]
async fn nothing_relevant_still_advances_the_watermark() -> Result<()> {
    let h = Harness::new();
    h.http.catalog(json!([
        csv_dataset("Nursing Home Inspections", &["Nursing homes"], "2024-01-02", &["https://x/n.csv"]),
        csv_dataset("Dialysis Facilities", &["Dialysis facilities"], "2024-01-03", &["https://x/d.csv"]),
    ]));

    let started = at(2024, 2, 1);
    let summary = h.pipeline().run_at(started).await?;

    assert_eq!(summary.outcome, RunOutcome::NothingNew);
    assert_eq!(summary.selected, 0);
    assert_eq!(summary.dispatch.dispatched, 0);
    assert_eq!(summary.themes.get("Nursing homes"), 1);
    assert_eq!(h.stored_watermark(), Some(Watermark::at(started)));
    assert_eq!(h.http.requests_for(".csv"), 0);
    Ok(())
}

#[tokio::test]
async fn theme_tally_counts_entries_filtered_out_by_recency() -> Result<()> {
    let h = Harness::new();
    h.http.catalog(json!([
        csv_dataset("Hospital Old", &["Hospital", "Quality"], "2023-01-01", &[]),
        csv_dataset("Hospital New", &["Hospital"], "2024-06-01", &[]),
    ]));
    WatermarkStore::new(&h.config.watermark_path).try_save(Watermark::at(at(2024, 1, 1)))?;

    let summary = h.pipeline().run_at(at(2024, 7, 1)).await?;

    assert_eq!(summary.selected, 1);
    let tally: Vec<_> = summary.themes.iter().collect();
    assert_eq!(tally, vec![("Hospital", 2), ("Quality", 1)]);
    Ok(())
}

#[tokio::test]
async fn one_failed_download_does_not_stop_the_others() -> Result<()> {
    let h = Harness::new();
    h.http.catalog(json!([
        csv_dataset("Hospital A", &["Hospital"], "2024-01-02", &["https://x/a.csv"]),
        csv_dataset("Hospital B", &["Hospital"], "2024-01-02", &["https://x/b.csv", "https://x/c.csv"]),
    ]));
    h.http.route("https://x/a.csv", 200, "Col A\n1\n");
    h.http.route("https://x/b.csv", 404, "missing");
    h.http.route("https://x/c.csv", 200, "Col C\n3\n");

    let started = at(2024, 2, 1);
    let summary = h.pipeline().run_at(started).await?;

    assert_eq!(summary.dispatch.dispatched, 3);
    assert_eq!(summary.dispatch.downloaded, 2);
    assert_eq!(summary.dispatch.failed, 1);
    assert!(h.output("a.csv").exists());
    assert!(h.output("c.csv").exists());
    assert!(!h.output("b.csv").exists());
    assert_eq!(h.stored_watermark(), Some(Watermark::at(started)));
    Ok(())
}

#[tokio::test]
async fn all_or_nothing_policy_holds_the_watermark() -> Result<()> {
    let mut h = Harness::new();
    h.config.artifact_policy = ArtifactPolicy::AllOrNothing;
    h.http.catalog(json!([csv_dataset("Hospital A", &["Hospital"], "2024-01-02", &["https://x/gone.csv"])]));

    let summary = h.pipeline().run_at(at(2024, 2, 1)).await?;

    assert_eq!(summary.dispatch.failed, 1);
    assert!(summary.watermark.is_none());
    assert!(h.stored_watermark().is_none());
    Ok(())
}

#[tokio::test]
async fn unparseable_download_is_kept_raw() -> Result<()> {
    let h = Harness::new();
    h.http.catalog(json!([csv_dataset("Hospital A", &["Hospital"], "2024-01-02", &["https://x/ragged.csv"])]));
    let raw = "Col A,Col B\n1,2\n3\n";
    h.http.route("https://x/ragged.csv", 200, raw);

    let summary = h.pipeline().run_at(at(2024, 2, 1)).await?;

    assert_eq!(summary.dispatch.downloaded, 1);
    assert_eq!(summary.dispatch.transformed, 0);
    assert_eq!(fs::read_to_string(h.output("ragged.csv"))?, raw);
    Ok(())
}

#[tokio::test]
async fn unwritable_watermark_is_reported_not_fatal() -> Result<()> {
    let mut h = Harness::new();
    let blocker = h.dir.path().join("not_a_dir");
    fs::write(&blocker, "")?;
    h.config.watermark_path = blocker.join("last_run_metadata.json");
    h.http.catalog(json!([csv_dataset("Other", &[], "2024-01-02", &[])]));

    let summary = h.pipeline().run_at(at(2024, 2, 1)).await?;

    assert!(summary.watermark.is_some());
    assert!(!summary.watermark_saved);
    Ok(())
}

#[tokio::test]
async fn output_directory_that_cannot_be_created_is_fatal() {
    let mut h = Harness::new();
    let blocker = h.dir.path().join("file");
    fs::write(&blocker, "").unwrap();
    h.config.output_dir = blocker.join("hospital_data");
    h.http.catalog(json!([csv_dataset("Hospital A", &["Hospital"], "2024-01-02", &[])]));

    let result = h.pipeline().run_at(at(2024, 2, 1)).await;

    assert!(matches!(result, Err(SyncError::Io(_))));
    assert!(!Path::new(&h.config.watermark_path).exists());
}

#[tokio::test]
async fn catalog_size_counts_entries_that_fail_to_decode() -> Result<()> {
    let h = Harness::new();
    h.http.catalog(json!([
        {"title": 42, "modified": "2024-01-02"},
        csv_dataset("Hospital A", &["Hospital"], "2024-01-02", &[]),
    ]));

    let summary = h.pipeline().run_at(at(2024, 2, 1)).await?;

    assert_eq!(summary.catalog_size, 2);
    assert_eq!(summary.malformed_entries, 1);
    assert_eq!(summary.selected, 1);
    Ok(())
}

#[tokio::test]
async fn shared_file_name_is_downloaded_once_from_the_later_url() -> Result<()> {
    let h = Harness::new();
    h.http.catalog(json!([
        csv_dataset("Hospital 2023", &["Hospital"], "2024-01-02", &["https://x/2023/data.csv"]),
        csv_dataset("Hospital 2024", &["Hospital"], "2024-01-02", &["https://x/2024/data.csv"]),
    ]));
    h.http.route("https://x/2023/data.csv", 200, "Year\n2023\n");
    h.http.route("https://x/2024/data.csv", 200, "Year\n2024\n");

    let summary = h.pipeline().run_at(at(2024, 2, 1)).await?;

    assert_eq!(summary.dispatch.dispatched, 1);
    assert_eq!(h.http.requests_for("2023/data.csv"), 0);
    assert_eq!(fs::read_to_string(h.output("data.csv"))?, "year\n2024\n");
    assert!(!h.output("data.csv.partial").exists());
    Ok(())
}
