//
// config.rs
// Dicom-Redact-rs
//
// TOML configuration for output layout, the unannotated-series policy, HTTP and logging.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// What to do with a series that has no bounding box on any slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UnannotatedPolicy {
    /// Fetch every slice and emit it untouched.
    #[default]
    Emit,
    /// Leave the series out entirely: nothing is fetched or emitted.
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Folder inserted between the output root and the series directories.
    #[serde(default = "default_bucket_folder")]
    pub bucket_folder: String,

    #[serde(default)]
    pub unannotated: UnannotatedPolicy,

    /// Default tracing filter, overridden by `RUST_LOG`.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Whole-request timeout. Absent means calls may block indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            bucket_folder: default_bucket_folder(),
            unannotated: UnannotatedPolicy::default(),
            log_filter: default_log_filter(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: None,
            connect_timeout_secs: None,
        }
    }
}

fn default_output_root() -> PathBuf {
    PathBuf::from("./dicom")
}

fn default_bucket_folder() -> String {
    "Pixel-redaction-complete".to_string()
}

fn default_log_filter() -> String {
    "dicom_redact=info".to_string()
}

fn default_user_agent() -> String {
    format!("dicom-redact/{}", env!("CARGO_PKG_VERSION"))
}

impl Config {
    /// Load from `path`, or fall back to defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {:?}", path))?;
                Self::from_toml(&content).with_context(|| format!("Invalid config {:?}", path))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
