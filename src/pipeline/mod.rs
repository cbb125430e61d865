// Incremental sync: catalog, selection, dispatch, bookmark

pub mod catalog;
pub mod columns;
pub mod fetch;
pub mod selector;
pub mod tasks;
pub mod transform;

use crate::app::ports::HttpClientPort;
use crate::config::Config;
use crate::error::Result;
use crate::infra::http_client::ReqwestHttp;
use crate::types::ThemeTally;
use crate::watermark::{Watermark, WatermarkStore};
use catalog::CatalogClient;
use chrono::{DateTime, Utc};
use fetch::ArtifactFetcher;
use selector::{ChangeSelector, RelevanceRule};
use std::sync::Arc;
use tasks::{build_jobs, ArtifactPolicy, DispatchReport, WorkerPool};
use tracing::{debug, info, instrument, warn};

/// Stages of one run. There are no backward transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Init,
    CatalogFetched,
    Selected,
    Dispatching,
    Finalizing,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Catalog unreachable or empty; nothing was touched.
    EmptyCatalog,
    /// Catalog observed but nothing relevant changed.
    NothingNew,
    /// At least one job was dispatched.
    Synced,
}

/// Result of a complete sync run
#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub started_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    /// Records returned by the catalog endpoint, decodable or not.
    pub catalog_size: usize,
    pub malformed_entries: usize,
    pub selected: usize,
    pub unparseable_dates: usize,
    pub themes: ThemeTally,
    pub dispatch: DispatchReport,
    pub previous_watermark: Option<Watermark>,
    /// Set when the run advanced the watermark in memory.
    pub watermark: Option<Watermark>,
    pub watermark_saved: bool,
}

impl SyncSummary {
    fn empty(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            outcome: RunOutcome::EmptyCatalog,
            catalog_size: 0,
            malformed_entries: 0,
            selected: 0,
            unparseable_dates: 0,
            themes: ThemeTally::new(),
            dispatch: DispatchReport::default(),
            previous_watermark: None,
            watermark: None,
            watermark_saved: false,
        }
    }
}

/// Composes catalog client, selector, worker pool and watermark store.
pub struct Pipeline {
    catalog: CatalogClient,
    selector: ChangeSelector,
    store: WatermarkStore,
    fetcher: ArtifactFetcher,
    workers: usize,
    media_type: String,
    policy: ArtifactPolicy,
}

impl Pipeline {
    pub fn new(http: Arc<dyn HttpClientPort>, config: &Config) -> Self {
        Self {
            catalog: CatalogClient::new(http.clone(), config.catalog_url.clone()),
            selector: ChangeSelector::new(RelevanceRule::new(
                config.relevance_theme.clone(),
                config.relevance_keyword.clone(),
            )),
            store: WatermarkStore::new(config.watermark_path.clone()),
            fetcher: ArtifactFetcher::new(http, config.output_dir.clone())
                .with_media_type(config.media_type.clone()),
            workers: config.workers.max(1),
            media_type: config.media_type.clone(),
            policy: config.artifact_policy,
        }
    }

    /// Build a pipeline talking to the real network.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = ReqwestHttp::new(config.request_timeout())?;
        Ok(Self::new(Arc::new(http), config))
    }

    pub async fn run(&self) -> Result<SyncSummary> {
        self.run_at(Utc::now()).await
    }

    /// Run once, treating `started_at` as the run's start instant. Only failing to
    /// create the output directory is an error.
    #[instrument(skip(self))]
    pub async fn run_at(&self, started_at: DateTime<Utc>) -> Result<SyncSummary> {
        let mut summary = SyncSummary::empty(started_at);
        stage(RunStage::Init);

        let catalog = self.catalog.fetch_catalog().await;
        if catalog.is_empty() {
            info!("No datasets available.");
            stage(RunStage::Done);
            return Ok(summary);
        }
        summary.catalog_size = catalog.total_records;
        summary.malformed_entries = catalog.malformed();
        stage(RunStage::CatalogFetched);

        let previous = self.store.load();
        summary.previous_watermark = Some(previous);

        tokio::fs::create_dir_all(self.fetcher.output_dir()).await?;

        let selection = self.selector.select(catalog.entries, previous);
        summary.selected = selection.selected.len();
        summary.unparseable_dates = selection.unparseable;
        summary.themes = selection.themes;
        stage(RunStage::Selected);

        info!("Filtered datasets ({} total):", selection.selected.len());
        for ds in &selection.selected {
            info!(
                "- Title: {}, Modified: {}",
                ds.title,
                ds.modified.as_deref().unwrap_or_default()
            );
        }

        let jobs = build_jobs(&selection.selected, &self.media_type);

        if jobs.is_empty() {
            info!("No new datasets to download.");
            summary.outcome = RunOutcome::NothingNew;
        } else {
            stage(RunStage::Dispatching);
            info!("Dispatching {} downloads to {} workers", jobs.len(), self.workers);
            let pool = WorkerPool::new(self.workers, self.fetcher.clone());
            summary.dispatch = pool.run(jobs).await;
            summary.outcome = RunOutcome::Synced;
        }

        stage(RunStage::Finalizing);
        if self.policy.allows_advance(&summary.dispatch) {
            let next = previous.advanced_to(started_at);
            summary.watermark = Some(next);
            summary.watermark_saved = self.store.save(next);
        } else {
            warn!(
                failed = summary.dispatch.failed,
                "Holding the watermark at {} after failed downloads", previous
            );
        }

        log_summary(&summary);
        stage(RunStage::Done);
        Ok(summary)
    }
}

fn stage(stage: RunStage) {
    debug!(?stage, "Sync stage");
}

fn log_summary(summary: &SyncSummary) {
    info!("Processing complete!");
    info!("Total records retrieved: {}", summary.catalog_size);
    if summary.malformed_entries > 0 {
        warn!("Skipped {} malformed catalog entries", summary.malformed_entries);
    }
    info!("Theme counts:");
    for (theme, count) in summary.themes.iter() {
        info!("- {}: {}", theme, count);
    }
    info!("Hospitals processed: {}", summary.selected);
    info!(
        dispatched = summary.dispatch.dispatched,
        downloaded = summary.dispatch.downloaded,
        transformed = summary.dispatch.transformed,
        failed = summary.dispatch.failed,
        "Artifacts"
    );
}
