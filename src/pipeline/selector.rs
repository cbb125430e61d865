use crate::constants;
use crate::metrics::{self, MetricName};
use crate::types::{DatasetDescriptor, ThemeTally};
use crate::watermark::Watermark;
use tracing::{debug, warn};

/// Which catalog entries belong to the domain being synced.
#[derive(Debug, Clone)]
pub struct RelevanceRule {
    /// Exact, case-sensitive theme tag.
    pub theme: String,
    /// Case-insensitive substring looked up in title and description.
    pub keyword: String,
}

impl Default for RelevanceRule {
    fn default() -> Self {
        Self::new(constants::HOSPITAL_THEME, constants::HOSPITAL_KEYWORD)
    }
}

impl RelevanceRule {
    pub fn new(theme: impl Into<String>, keyword: impl Into<String>) -> Self {
        Self {
            theme: theme.into(),
            keyword: keyword.into().to_lowercase(),
        }
    }

    pub fn matches(&self, ds: &DatasetDescriptor) -> bool {
        ds.themes.iter().any(|t| *t == self.theme)
            || ds.title.to_lowercase().contains(&self.keyword)
            || ds.description.to_lowercase().contains(&self.keyword)
    }
}

/// Output of one pass over the catalog.
#[derive(Debug, Default)]
pub struct Selection {
    /// Relevant entries modified after the watermark, in catalog order.
    pub selected: Vec<DatasetDescriptor>,
    /// Theme occurrences across the whole catalog.
    pub themes: ThemeTally,
    /// Relevant entries dropped because their modified date did not parse.
    pub unparseable: usize,
}

pub struct ChangeSelector {
    rule: RelevanceRule,
}

impl ChangeSelector {
    pub fn new(rule: RelevanceRule) -> Self {
        Self { rule }
    }

    pub fn select(&self, catalog: Vec<DatasetDescriptor>, watermark: Watermark) -> Selection {
        let mut selection = Selection::default();

        for ds in catalog {
            for theme in &ds.themes {
                selection.themes.record(theme);
            }

            if !self.rule.matches(&ds) {
                continue;
            }

            match ds.modified_at() {
                // Both sides are UTC instants; equal is not newer
                Ok(modified) if modified > watermark.instant() => selection.selected.push(ds),
                Ok(modified) => {
                    debug!(title = %ds.title, %modified, "Unchanged since last run");
                }
                Err(e) => {
                    warn!(title = %ds.title, "Error parsing modified date: {}", e);
                    metrics::increment(MetricName::DateParseErrors);
                    selection.unparseable += 1;
                }
            }
        }

        metrics::increment_by(MetricName::DatasetsSelected, selection.selected.len() as u64);
        selection
    }
}

impl Default for ChangeSelector {
    fn default() -> Self {
        Self::new(RelevanceRule::default())
    }
}
