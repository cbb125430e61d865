/// Defaults for a sync run. Every one of these can be overridden through `Config`.

// CMS provider-data metastore: one JSON array of every published dataset
pub const CATALOG_URL: &str =
    "https://data.cms.gov/provider-data/api/1/metastore/schemas/dataset/items";

pub const OUTPUT_DIR: &str = "hospital_data";
pub const WATERMARK_PATH: &str = "last_run_metadata.json";
pub const LOG_DIR: &str = "logs";
pub const CONFIG_PATH: &str = "config.toml";

// Parallel downloads
pub const NUM_WORKERS: usize = 4;
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

// Relevance signals
pub const HOSPITAL_THEME: &str = "Hospital";
pub const HOSPITAL_KEYWORD: &str = "hospital";

pub const CSV_MEDIA_TYPE: &str = "text/csv";

// Environment overrides
pub const ENV_CATALOG_URL: &str = "CMS_SYNC_CATALOG_URL";
pub const ENV_OUTPUT_DIR: &str = "CMS_SYNC_OUTPUT_DIR";
pub const ENV_WATERMARK_PATH: &str = "CMS_SYNC_WATERMARK_PATH";
pub const ENV_WORKERS: &str = "CMS_SYNC_WORKERS";
