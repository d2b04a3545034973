//
// geometry.rs
// Dicom-Redact-rs
//
// Maps normalized annotation boxes onto pixel rectangles and clips them against image bounds.
//
// Thales Matheus Mendonça Santos - November 2025

use serde::{Deserialize, Serialize};

/// Annotation region expressed as fractions of the slice it was drawn on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBoundingBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// Half-open pixel rectangle `[x1, x2) x [y1, y2)`.
///
/// Coordinates are signed because boxes are never re-validated: a box drawn
/// slightly outside the slice maps to negative or oversized values, which are
/// dealt with by [`PixelRectangle::clip`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRectangle {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
}

/// Rectangle already intersected with the image, ready for slicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClippedRectangle {
    pub x1: usize,
    pub y1: usize,
    pub x2: usize,
    pub y2: usize,
}

/// Convert a normalized box into pixel space for a slice of `width` x `height`.
///
/// Each product is rounded half-to-even on its own, and the extent is added to
/// the rounded origin (`x2 = round(x*W) + round(w*W)`), never derived from
/// `round((x + w) * W)`. Both choices shift edges by a pixel on ties, so they
/// must stay exactly like this to reproduce previously redacted output.
pub fn map_bounding_box(bbox: &NormalizedBoundingBox, width: u32, height: u32) -> PixelRectangle {
    let width = f64::from(width);
    let height = f64::from(height);

    let x1 = round_half_even(bbox.x * width);
    let y1 = round_half_even(bbox.y * height);

    PixelRectangle {
        x1,
        y1,
        x2: x1 + round_half_even(bbox.w * width),
        y2: y1 + round_half_even(bbox.h * height),
    }
}

fn round_half_even(value: f64) -> i64 {
    // `as` saturates on overflow and maps NaN to 0, which is fine for garbage boxes.
    value.round_ties_even() as i64
}

impl PixelRectangle {
    pub fn is_empty(&self) -> bool {
        self.x2 <= self.x1 || self.y2 <= self.y1
    }

    /// Intersect with a `columns` x `rows` image. Returns `None` when nothing is left.
    pub fn clip(&self, columns: u32, rows: u32) -> Option<ClippedRectangle> {
        let x1 = self.x1.clamp(0, i64::from(columns));
        let x2 = self.x2.clamp(0, i64::from(columns));
        let y1 = self.y1.clamp(0, i64::from(rows));
        let y2 = self.y2.clamp(0, i64::from(rows));

        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        Some(ClippedRectangle {
            x1: x1 as usize,
            y1: y1 as usize,
            x2: x2 as usize,
            y2: y2 as usize,
        })
    }
}

impl ClippedRectangle {
    pub fn area(&self) -> usize {
        (self.x2 - self.x1) * (self.y2 - self.y1)
    }
}
