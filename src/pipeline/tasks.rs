use crate::pipeline::fetch::ArtifactFetcher;
use crate::pipeline::transform;
use crate::types::{DatasetDescriptor, DownloadJob};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// One job per distribution of `media_type`, in catalog order.
///
/// File names are unique across the returned jobs: when two URLs resolve to the same
/// name, the later URL replaces the earlier job in its slot.
pub fn build_jobs(selected: &[DatasetDescriptor], media_type: &str) -> Vec<DownloadJob> {
    let mut jobs: Vec<DownloadJob> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();

    for ds in selected {
        for dist in ds.distributions.iter().filter(|d| d.media_type == media_type) {
            let Some(job) = DownloadJob::from_url(&dist.download_url) else {
                warn!(title = %ds.title, url = %dist.download_url, "No file name in download URL, skipping");
                continue;
            };
            match slots.get(&job.file_name) {
                Some(&slot) => {
                    warn!(
                        file = %job.file_name,
                        dropped = %jobs[slot].url,
                        kept = %job.url,
                        "Two downloads share a file name, keeping the later one"
                    );
                    jobs[slot] = job;
                }
                None => {
                    slots.insert(job.file_name.clone(), jobs.len());
                    jobs.push(job);
                }
            }
        }
    }
    jobs
}

/// What became of a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Downloaded and header normalized.
    Transformed,
    /// Downloaded, but the transform failed so the raw file was kept.
    LeftRaw,
    /// Nothing written.
    FetchFailed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub dispatched: usize,
    pub downloaded: usize,
    pub transformed: usize,
    pub failed: usize,
}

impl DispatchReport {
    fn record(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Transformed => {
                self.downloaded += 1;
                self.transformed += 1;
            }
            JobOutcome::LeftRaw => self.downloaded += 1,
            JobOutcome::FetchFailed => self.failed += 1,
        }
    }
}

/// How per-artifact failures relate to advancing the watermark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactPolicy {
    /// Failed artifacts are logged and dropped; the watermark advances regardless.
    #[default]
    BestEffort,
    /// Any failed download holds the watermark back so the window is retried.
    ///
    /// Opt-in only. Under the default contract job results never feed the watermark;
    /// this variant departs from that and lets a single failed download block the
    /// bookmark, so a permanently broken URL stalls every later run.
    AllOrNothing,
}

impl ArtifactPolicy {
    pub fn allows_advance(&self, report: &DispatchReport) -> bool {
        match self {
            ArtifactPolicy::BestEffort => true,
            ArtifactPolicy::AllOrNothing => report.failed == 0,
        }
    }
}

/// Fixed-size pool running fetch then transform for every job.
pub struct WorkerPool {
    workers: usize,
    fetcher: ArtifactFetcher,
}

impl WorkerPool {
    pub fn new(workers: usize, fetcher: ArtifactFetcher) -> Self {
        Self {
            workers: workers.max(1),
            fetcher,
        }
    }

    /// Run every job to completion. Completion order is unspecified; individual
    /// failures never surface as errors here.
    pub async fn run(&self, jobs: Vec<DownloadJob>) -> DispatchReport {
        let mut report = DispatchReport {
            dispatched: jobs.len(),
            ..Default::default()
        };
        let permits = Arc::new(Semaphore::new(self.workers));
        let mut set = JoinSet::new();

        for job in jobs {
            let permits = permits.clone();
            let fetcher = self.fetcher.clone();
            set.spawn(async move {
                // Held for both phases so at most `workers` jobs are in flight
                let _permit = match permits.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => return JobOutcome::FetchFailed,
                };
                run_job(&fetcher, &job).await
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    error!("Download worker aborted: {}", e);
                    report.record(JobOutcome::FetchFailed);
                }
            }
        }
        debug!(?report, "Dispatch finished");
        report
    }
}

/// Fetch, then transform only if the fetch succeeded.
pub async fn run_job(fetcher: &ArtifactFetcher, job: &DownloadJob) -> JobOutcome {
    match fetcher.fetch(job).await {
        Ok(path) => {
            if transform::normalize_in_place(path).await {
                JobOutcome::Transformed
            } else {
                JobOutcome::LeftRaw
            }
        }
        Err(_) => JobOutcome::FetchFailed,
    }
}
