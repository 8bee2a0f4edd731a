use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::analysis::ranges::{CustomSignalRange, SignalRangeTable};
use crate::table::format::{FloatFormat, FloatFormatParseError};
use crate::table::{DEFAULT_CHUNK_SIZE, TableOptions};

/// Application configuration loaded from TOML config file.
/// All fields have defaults; the config file is optional.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Raw recordings, one directory per subject.
    pub input_dir: PathBuf,
    /// Converted tables, mirroring the input layout.
    pub output_dir: PathBuf,
    /// Per-subject summary CSVs.
    pub analysis_dir: PathBuf,
    /// Number of parallel workers. 0 = auto-detect (cores / 2, min 1).
    pub workers: usize,
    /// Table output settings.
    pub table: TableConfig,
    /// Custom signal ranges (merged with the built-in table).
    #[serde(rename = "signals")]
    pub custom_signals: Vec<CustomSignalRange>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data/raw_smartshirt_data"),
            output_dir: PathBuf::from("data/processed_smartshirt_data"),
            analysis_dir: PathBuf::from("data/analysis_summaries"),
            workers: 0,
            table: TableConfig::default(),
            custom_signals: Vec::new(),
        }
    }
}

/// CSV output configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Rows formatted per write.
    pub chunk_size: usize,
    /// printf-style cell format (`%.7g`, `%.4f`, `%.3e`).
    pub float_format: String,
    /// Emit the `Time_s,Ch1` header row.
    pub include_header: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            float_format: FloatFormat::default().to_string(),
            include_header: true,
        }
    }
}

impl TableConfig {
    pub fn to_options(&self) -> Result<TableOptions, FloatFormatParseError> {
        Ok(TableOptions {
            chunk_size: self.chunk_size.max(1),
            float_format: self.float_format.parse()?,
            include_header: self.include_header,
        })
    }
}

impl AppConfig {
    /// Config from `~/.config/sensorwav/config.toml`, or defaults when there is none.
    pub fn load() -> Self {
        match Self::config_path().filter(|p| p.is_file()) {
            Some(path) => Self::load_from(&path),
            None => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Read and parse `path`. Any failure is logged and yields the defaults.
    pub fn load_from(path: &Path) -> Self {
        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|text| Self::from_toml(&text).map_err(|e| e.to_string()));
        match parsed {
            Ok(config) => {
                log::info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Ignoring config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Worker count; 0 means half the available cores, at least one.
    pub fn resolve_workers(&self) -> usize {
        match self.workers {
            0 => std::thread::available_parallelism().map_or(1, |n| (n.get() / 2).max(1)),
            n => n,
        }
    }

    /// Built-in signal ranges with `[[signals]]` entries applied.
    pub fn signal_ranges(&self) -> SignalRangeTable {
        SignalRangeTable::with_custom(&self.custom_signals)
    }

    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
