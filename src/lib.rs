pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod types;
pub mod watermark;

// Ports the pipeline depends on, and their adapters
pub mod app;
pub mod infra;
