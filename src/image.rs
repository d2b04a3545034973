//
// image.rs
// Dicom-Redact-rs
//
// Renders a frame of a (redacted) slice to a standard image so the zeroed regions can be checked by eye.
//
// Thales Matheus Mendonça Santos - November 2025

use anyhow::{bail, Context, Result};
use dicom::object::DefaultDicomObject;
use dicom::pixeldata::PixelDecoder;
use dicom_pixeldata::{ConvertOptions, VoiLutOption};
use image::DynamicImage;
use std::path::Path;

fn render_frame(obj: &DefaultDicomObject, frame: u32) -> Result<DynamicImage> {
    let decoded = obj
        .decode_pixel_data()
        .context("Failed to decode pixel data")?;
    let frames = decoded.number_of_frames();
    if frame >= frames {
        bail!("Requested frame {} but slice has {} frame(s)", frame, frames);
    }

    // Normalize over the actual sample range so blacked-out boxes stand out
    // regardless of the stored window.
    let options = ConvertOptions::new().with_voi_lut(VoiLutOption::Normalize);
    decoded
        .to_dynamic_image_with_options(frame, &options)
        .context("Failed to render frame")
}

/// Save `frame` of `obj` to `output`; the format follows the file extension.
pub fn save_preview(obj: &DefaultDicomObject, frame: u32, output: &Path) -> Result<()> {
    let image = render_frame(obj, frame)?;
    image
        .save(output)
        .with_context(|| format!("Failed to save preview to {:?}", output))?;
    Ok(())
}
