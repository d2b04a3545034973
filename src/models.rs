//
// models.rs
// Dicom-Redact-rs
//
// Defines serializable reports describing what happened to every slice and series.
//
// Thales Matheus Mendonça Santos - November 2025

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SliceStatus {
    /// Decoded, zeroed and re-encoded.
    Redacted,
    /// Emitted byte for byte (series without annotations).
    Passthrough,
    /// Not fetched because of the unannotated-series policy.
    Skipped,
    /// Not emitted; see `detail`.
    Failed,
}

/// Outcome of one slice.
#[derive(Debug, Clone, Serialize)]
pub struct SliceReport {
    pub filename: String,
    pub status: SliceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rectangles_applied: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bits_stored: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SliceReport {
    pub fn skipped(filename: &str) -> Self {
        Self::bare(filename, SliceStatus::Skipped)
    }

    pub fn failed(filename: &str, detail: String) -> Self {
        Self {
            detail: Some(detail),
            ..Self::bare(filename, SliceStatus::Failed)
        }
    }

    pub fn emitted(filename: &str, status: SliceStatus, path: String, sha256: String) -> Self {
        Self {
            path: Some(path),
            sha256: Some(sha256),
            ..Self::bare(filename, status)
        }
    }

    fn bare(filename: &str, status: SliceStatus) -> Self {
        Self {
            filename: filename.to_string(),
            status,
            path: None,
            sha256: None,
            rectangles_applied: None,
            bits_stored: None,
            detail: None,
        }
    }
}

/// Outcome of one series.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesReport {
    pub series_id: String,
    pub rectangles: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub slices: Vec<SliceReport>,
}

impl SeriesReport {
    pub fn new(series_id: &str, rectangles: usize) -> Self {
        Self {
            series_id: series_id.to_string(),
            rectangles,
            started_at: Utc::now(),
            finished_at: None,
            slices: Vec::new(),
        }
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn count(&self, status: SliceStatus) -> usize {
        self.slices.iter().filter(|s| s.status == status).count()
    }

    pub fn emitted(&self) -> usize {
        self.count(SliceStatus::Redacted) + self.count(SliceStatus::Passthrough)
    }
}

/// A series that stopped before completion (fetch or emit failure, bad label row).
#[derive(Debug, Clone, Serialize)]
pub struct SeriesFailure {
    pub source: String,
    pub error: String,
}

/// Outcome of a batch run over many label rows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub series: Vec<SeriesReport>,
    pub failures: Vec<SeriesFailure>,
}
