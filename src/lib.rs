pub mod analysis;
pub mod batch;
pub mod config;
pub mod container;
pub mod convert;
pub mod series;
pub mod table;

/// Container file extension picked up by batch discovery
pub const CONTAINER_EXTENSION: &str = "wav";

/// Batch ledger file name, written under the output root
pub const LEDGER_FILE_NAME: &str = "batch_conversion_results.json";

/// Application name for XDG paths
pub const APP_NAME: &str = "sensorwav";
