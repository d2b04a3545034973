//
// lib.rs
// Dicom-Redact-rs
//
// Exposes the redaction engine, its collaborators and the CLI entry point for both binary and library consumers.
//
// Thales Matheus Mendonça Santos - November 2025

// Redaction engine, leaf-first.
pub mod geometry;
pub mod labels;
pub mod aggregate;
pub mod encoding;
pub mod codec;
pub mod redact;
pub mod pipeline;

// Collaborators and outer surfaces.
pub mod batch;
pub mod cli;
pub mod config;
pub mod dicom_access;
pub mod fetch;
pub mod image;
pub mod models;
pub mod storage;

pub use aggregate::{aggregate, RedactionContext, SliceMeta};
pub use cli::{run as run_cli, Cli, Commands};
pub use geometry::{map_bounding_box, NormalizedBoundingBox, PixelRectangle};
pub use pipeline::{process, Pipeline, PipelineError, PipelineOptions};
pub use redact::{redact_dataset, RedactError};
