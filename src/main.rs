//
// main.rs
// Dicom-Redact-rs
//
// Binary entry point that hands off execution to the CLI layer.
//
// Thales Matheus Mendonça Santos - November 2025

use dicom_redact::cli;

fn main() -> anyhow::Result<()> {
    // Everything is blocking (downloads included), so no async runtime is involved.
    cli::run()
}
