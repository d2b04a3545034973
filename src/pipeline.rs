//
// pipeline.rs
// Dicom-Redact-rs
//
// Per-series orchestration: aggregate annotations once, then fetch, redact, re-encode and emit every slice.
//
// Thales Matheus Mendonça Santos - November 2025

use std::error::Error as StdError;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::aggregate::{aggregate, RedactionContext, SliceMeta};
use crate::codec::{default_encoder, Jpeg2000Encoder};
use crate::config::UnannotatedPolicy;
use crate::fetch::SliceFetcher;
use crate::labels::SliceLabel;
use crate::models::{SeriesReport, SliceReport, SliceStatus};
use crate::redact::{redact_slice_bytes, DatasetRedaction, RedactError};
use crate::storage::{Artifact, ArtifactSink};

type BoxError = Box<dyn StdError + Send + Sync>;

/// Failures that stop a whole series.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("series {series}: failed to fetch {filename}")]
    Fetch {
        series: String,
        filename: String,
        #[source]
        source: BoxError,
    },
    #[error("series {series}: failed to emit {path}")]
    Emit {
        series: String,
        path: String,
        #[source]
        source: BoxError,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    pub unannotated: UnannotatedPolicy,
}

/// A slice that made it through redaction (or passthrough) and can be emitted.
#[derive(Debug)]
pub struct ProcessedSlice {
    pub bytes: Vec<u8>,
    pub status: SliceStatus,
    pub redaction: Option<DatasetRedaction>,
}

pub struct Pipeline {
    options: PipelineOptions,
    encoder: Box<dyn Jpeg2000Encoder>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineOptions::default())
    }
}

impl Pipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            encoder: default_encoder(),
        }
    }

    pub fn with_encoder(mut self, encoder: Box<dyn Jpeg2000Encoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Redact and emit every slice of one series.
    ///
    /// Slice-local decode/encode failures are recorded in the report and the
    /// series goes on; fetch and emit failures abort the series.
    pub fn process(
        &self,
        series_id: &str,
        slices: &[SliceLabel],
        fetcher: &dyn SliceFetcher,
        sink: &dyn ArtifactSink,
    ) -> Result<SeriesReport, PipelineError> {
        // The whole redaction set exists before the first slice is touched.
        let context = aggregate(slices);
        let mut report = SeriesReport::new(series_id, context.rectangles.len());

        info!(
            series = series_id,
            slices = context.slices.len(),
            rectangles = context.rectangles.len(),
            "processing series"
        );

        if !context.has_rectangles() && self.options.unannotated == UnannotatedPolicy::Skip {
            info!(series = series_id, "no bounding boxes, series skipped");
            report.slices = context
                .slices
                .iter()
                .map(|meta| SliceReport::skipped(&meta.filename))
                .collect();
            return Ok(report.finish());
        }

        for meta in &context.slices {
            let slice_report = self.process_one(series_id, meta, &context, fetcher, sink)?;
            report.slices.push(slice_report);
        }

        let report = report.finish();
        info!(
            series = series_id,
            emitted = report.emitted(),
            failed = report.count(SliceStatus::Failed),
            "series complete"
        );
        Ok(report)
    }

    fn process_one(
        &self,
        series_id: &str,
        meta: &SliceMeta,
        context: &RedactionContext,
        fetcher: &dyn SliceFetcher,
        sink: &dyn ArtifactSink,
    ) -> Result<SliceReport, PipelineError> {
        debug!(series = series_id, slice = %meta.filename, "fetching slice");
        let bytes = fetcher
            .fetch(&meta.uri)
            .map_err(|source| PipelineError::Fetch {
                series: series_id.to_string(),
                filename: meta.filename.clone(),
                source: source.into(),
            })?;

        let processed = match self.process_slice(bytes, context) {
            Ok(processed) => processed,
            Err(e) => {
                warn!(series = series_id, slice = %meta.filename, "slice not emitted: {e}");
                return Ok(SliceReport::failed(&meta.filename, e.to_string()));
            }
        };

        let artifact = Artifact {
            relative_path: format!("{}/{}", series_id, meta.filename),
            bytes: processed.bytes,
        };
        sink.emit(&artifact).map_err(|source| PipelineError::Emit {
            series: series_id.to_string(),
            path: artifact.relative_path.clone(),
            source: source.into(),
        })?;

        let digest = hex::encode(Sha256::digest(&artifact.bytes));
        let mut slice_report = SliceReport::emitted(
            &meta.filename,
            processed.status,
            artifact.relative_path,
            digest,
        );
        if let Some(redaction) = processed.redaction {
            slice_report.rectangles_applied = Some(redaction.rectangles_applied);
            slice_report.bits_stored = Some(redaction.bits_stored_after);
        }
        Ok(slice_report)
    }

    /// Redact one fetched slice, or pass it through when the series has nothing to redact.
    pub fn process_slice(
        &self,
        bytes: Vec<u8>,
        context: &RedactionContext,
    ) -> Result<ProcessedSlice, RedactError> {
        if !context.has_rectangles() {
            return Ok(ProcessedSlice {
                bytes,
                status: SliceStatus::Passthrough,
                redaction: None,
            });
        }

        let (bytes, redaction) =
            redact_slice_bytes(&bytes, &context.rectangles, self.encoder.as_ref())?;
        Ok(ProcessedSlice {
            bytes,
            status: SliceStatus::Redacted,
            redaction: Some(redaction),
        })
    }
}

/// Process one series with default options and the default JPEG 2000 encoder.
pub fn process(
    series_id: &str,
    slices: &[SliceLabel],
    fetcher: &dyn SliceFetcher,
    sink: &dyn ArtifactSink,
) -> Result<SeriesReport, PipelineError> {
    Pipeline::default().process(series_id, slices, fetcher, sink)
}
