// Narrow interfaces the pipeline calls through
pub mod ports;
