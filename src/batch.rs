use anyhow::Result;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use walkdir::WalkDir;

use crate::fetch::SliceFetcher;
use crate::labels::LabelRow;
use crate::models::{BatchReport, SeriesFailure};
use crate::pipeline::Pipeline;
use crate::storage::ArtifactSink;

/// Label-row exports (`*.json`) found under `dir`, in a stable order.
pub fn collect_label_rows(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().map_or(false, |ext| ext == "json"))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Process every label row under `dir`, one series per file.
///
/// Series run in parallel; slices inside a series stay sequential. A series that
/// fails is recorded and does not stop the others.
pub fn process_directory(
    dir: &Path,
    pipeline: &Pipeline,
    fetcher: &dyn SliceFetcher,
    sink: &dyn ArtifactSink,
) -> Result<BatchReport> {
    let files = collect_label_rows(dir);
    info!(directory = ?dir, label_rows = files.len(), "starting batch");

    let outcomes: Vec<_> = files
        .par_iter()
        .map(|path| {
            let row = LabelRow::from_path(path).map_err(anyhow::Error::from)?;
            pipeline
                .process(row.series_id(), &row.slices, fetcher, sink)
                .map_err(anyhow::Error::from)
        })
        .collect();

    let mut report = BatchReport::default();
    for (path, outcome) in files.iter().zip(outcomes) {
        match outcome {
            Ok(series) => report.series.push(series),
            Err(e) => {
                error!(label_row = ?path, "series failed: {e:#}");
                report.failures.push(SeriesFailure {
                    source: path.display().to_string(),
                    error: format!("{e:#}"),
                });
            }
        }
    }

    Ok(report)
}
