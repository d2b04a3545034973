//
// cli.rs
// Dicom-Redact-rs
//
// Defines the CLI surface with Clap and dispatches user-selected commands to the corresponding modules.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};
use dicom::dictionary_std::tags;
use dicom::object::open_file;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, UnannotatedPolicy};
use crate::dicom_access::ElementAccess;
use crate::fetch::UriFetcher;
use crate::geometry::{map_bounding_box, NormalizedBoundingBox};
use crate::labels::LabelRow;
use crate::models::{SeriesReport, SliceStatus};
use crate::pipeline::{Pipeline, PipelineOptions};
use crate::storage::DirectorySink;
use crate::{batch, codec, image, redact};

/// Command-line interface glue code: defines the available verbs and dispatches to modules.
#[derive(Parser)]
#[command(name = "dicom-redact")]
#[command(about = "Redact annotated regions from DICOM series", long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Redact one series from an exported label row
    Series {
        #[arg(short, long)]
        labels: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Redact every label row (*.json) found in a directory
    Batch {
        #[arg(short, long)]
        directory: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Redact a single local DICOM file with explicit boxes
    File {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Normalized box, repeatable
        #[arg(long = "box", value_name = "X,Y,W,H", required = true, value_parser = parse_box)]
        boxes: Vec<NormalizedBoundingBox>,
        /// Also render the first redacted frame to this image
        #[arg(long)]
        preview: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct OutputArgs {
    /// Output root (overrides `output_root`)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Folder between the root and the series directories (overrides `bucket_folder`)
    #[arg(long)]
    pub folder: Option<String>,
    /// What to do with series that carry no bounding box
    #[arg(long, value_enum)]
    pub unannotated: Option<UnannotatedPolicy>,
    /// Write a JSON report here
    #[arg(long)]
    pub report: Option<PathBuf>,
}

pub fn run() -> anyhow::Result<()> {
    // Parse the raw CLI arguments once and dispatch to a subcommand handler.
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    init_tracing(&config.log_filter);

    match cli.command {
        Commands::Series { labels, output } => {
            let row = LabelRow::from_path(&labels)?;
            let (pipeline, sink, fetcher) = build_pipeline(&config, &output)?;
            let report = pipeline.process(row.series_id(), &row.slices, &fetcher, &sink)?;
            print_series(&report);
            write_report(output.report.as_deref(), &report)?;
        }
        Commands::Batch { directory, output } => {
            let (pipeline, sink, fetcher) = build_pipeline(&config, &output)?;
            let report = batch::process_directory(&directory, &pipeline, &fetcher, &sink)?;
            for series in &report.series {
                print_series(series);
            }
            for failure in &report.failures {
                eprintln!("Failed {}: {}", failure.source, failure.error);
            }
            write_report(output.report.as_deref(), &report)?;
            if !report.failures.is_empty() {
                bail!("{} series failed", report.failures.len());
            }
        }
        Commands::File {
            input,
            output,
            boxes,
            preview,
        } => redact_file(&input, &output, &boxes, preview.as_deref())?,
    }

    Ok(())
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // Ignore the error raised when a subscriber is already installed (tests, embedding).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_pipeline(
    config: &Config,
    args: &OutputArgs,
) -> anyhow::Result<(Pipeline, DirectorySink, UriFetcher)> {
    let root = args.output.as_ref().unwrap_or(&config.output_root);
    let folder = args.folder.as_deref().unwrap_or(&config.bucket_folder);
    let sink = DirectorySink::new(root, Some(folder))?;
    let fetcher = UriFetcher::new(&config.http)?;
    let pipeline = Pipeline::new(PipelineOptions {
        unannotated: args.unannotated.unwrap_or(config.unannotated),
    });
    Ok((pipeline, sink, fetcher))
}

fn redact_file(
    input: &Path,
    output: &Path,
    boxes: &[NormalizedBoundingBox],
    preview: Option<&Path>,
) -> anyhow::Result<()> {
    let obj = open_file(input).context("Failed to open DICOM file")?;
    let columns = obj
        .element_u16(tags::COLUMNS)
        .ok_or_else(|| anyhow!("Missing Columns"))?;
    let rows = obj
        .element_u16(tags::ROWS)
        .ok_or_else(|| anyhow!("Missing Rows"))?;

    let rectangles: Vec<_> = boxes
        .iter()
        .map(|b| map_bounding_box(b, u32::from(columns), u32::from(rows)))
        .collect();

    let encoder = codec::default_encoder();
    let (obj, summary) = redact::redact_dataset(obj, &rectangles, encoder.as_ref())?;
    obj.write_to_file(output)
        .context("Failed to write output file")?;
    println!(
        "Redacted {} region(s) over {} frame(s): {:?}",
        summary.rectangles_applied, summary.frames, output
    );
    if summary.bits_stored_after != summary.bits_stored_before {
        println!(
            "  BitsStored corrected {} -> {}",
            summary.bits_stored_before, summary.bits_stored_after
        );
    }

    if let Some(preview) = preview {
        image::save_preview(&obj, 0, preview)?;
        println!("Preview saved to: {:?}", preview);
    }

    Ok(())
}

fn parse_box(value: &str) -> Result<NormalizedBoundingBox, String> {
    let parts = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid number in {:?}: {}", value, e))?;
    match parts.as_slice() {
        &[x, y, w, h] => Ok(NormalizedBoundingBox { x, y, w, h }),
        _ => Err(format!("expected X,Y,W,H, got {:?}", value)),
    }
}

fn print_series(report: &SeriesReport) {
    println!(
        "Series {} | rectangles: {} | redacted: {} | passthrough: {} | skipped: {} | failed: {}",
        report.series_id,
        report.rectangles,
        report.count(SliceStatus::Redacted),
        report.count(SliceStatus::Passthrough),
        report.count(SliceStatus::Skipped),
        report.count(SliceStatus::Failed),
    );
    for slice in report
        .slices
        .iter()
        .filter(|s| s.status == SliceStatus::Failed)
    {
        println!(
            "  {} failed: {}",
            slice.filename,
            slice.detail.as_deref().unwrap_or("unknown error")
        );
    }
}

fn write_report<T: Serialize>(path: Option<&Path>, report: &T) -> anyhow::Result<()> {
    if let Some(path) = path {
        let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
        std::fs::write(path, json).context("Failed to write report")?;
        println!("Report saved to {:?}", path);
    }
    Ok(())
}
