//
// aggregate.rs
// Dicom-Redact-rs
//
// Collects every bounding box of a series into one redaction context shared by all of its slices.
//
// Thales Matheus Mendonça Santos - November 2025

use serde::Serialize;

use crate::geometry::{map_bounding_box, PixelRectangle};
use crate::labels::SliceLabel;

/// What the pipeline needs to know about a slice before fetching it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SliceMeta {
    pub uri: String,
    pub filename: String,
    pub width: u32,
    pub height: u32,
}

/// Series-wide redaction set plus the ordered slice descriptors.
///
/// Every rectangle is applied to every slice, whichever slice the annotation
/// was drawn on. Built once per series and only read afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RedactionContext {
    pub rectangles: Vec<PixelRectangle>,
    pub slices: Vec<SliceMeta>,
}

impl RedactionContext {
    pub fn has_rectangles(&self) -> bool {
        !self.rectangles.is_empty()
    }
}

/// Output filename for a slice instance.
pub fn instance_filename(dicom_instance_uid: &str) -> String {
    format!("{}.dcm", dicom_instance_uid)
}

pub fn aggregate(slices: &[SliceLabel]) -> RedactionContext {
    let mut context = RedactionContext::default();

    for slice in slices {
        let meta = &slice.metadata;
        context.slices.push(SliceMeta {
            uri: meta.file_uri.clone(),
            filename: instance_filename(&meta.dicom_instance_uid),
            width: meta.width,
            height: meta.height,
        });

        // Mapped with the dimensions of the slice the box was drawn on. Duplicates are kept.
        context.rectangles.extend(
            slice
                .objects
                .iter()
                .filter_map(|object| object.bounding_box.as_ref())
                .map(|bbox| map_bounding_box(bbox, meta.width, meta.height)),
        );
    }

    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::NormalizedBoundingBox;
    use crate::labels::{AnnotationObject, SliceMetadata};

    fn slice(uid: &str, width: u32, height: u32, boxes: &[(f64, f64, f64, f64)]) -> SliceLabel {
        SliceLabel {
            key: uid.to_string(),
            metadata: SliceMetadata {
                width,
                height,
                file_uri: format!("file:///series/{}.dcm", uid),
                dicom_instance_uid: uid.to_string(),
            },
            objects: boxes
                .iter()
                .map(|&(x, y, w, h)| AnnotationObject {
                    object_hash: None,
                    bounding_box: Some(NormalizedBoundingBox { x, y, w, h }),
                })
                .collect(),
        }
    }

    #[test]
    fn collects_boxes_from_every_slice_and_keeps_order() {
        let slices = vec![
            slice("1.1", 200, 200, &[]),
            slice("1.2", 200, 200, &[(0.0, 0.0, 0.5, 0.5)]),
            slice("1.3", 100, 50, &[(0.5, 0.5, 0.5, 0.5)]),
        ];

        let context = aggregate(&slices);

        assert_eq!(
            context.rectangles,
            vec![
                PixelRectangle {
                    x1: 0,
                    y1: 0,
                    x2: 100,
                    y2: 100
                },
                PixelRectangle {
                    x1: 50,
                    y1: 25,
                    x2: 100,
                    y2: 50
                },
            ]
        );
        let names: Vec<_> = context.slices.iter().map(|s| s.filename.as_str()).collect();
        assert_eq!(names, vec!["1.1.dcm", "1.2.dcm", "1.3.dcm"]);
    }

    #[test]
    fn duplicates_are_not_merged() {
        let slices = vec![
            slice("a", 10, 10, &[(0.0, 0.0, 0.5, 0.5)]),
            slice("b", 10, 10, &[(0.0, 0.0, 0.5, 0.5)]),
        ];
        assert_eq!(aggregate(&slices).rectangles.len(), 2);
    }

    #[test]
    fn objects_without_boxes_are_ignored() {
        let mut labelled = slice("a", 10, 10, &[]);
        labelled.objects.push(AnnotationObject {
            object_hash: Some("poly".into()),
            bounding_box: None,
        });
        let context = aggregate(&[labelled]);
        assert!(!context.has_rectangles());
        assert_eq!(context.slices.len(), 1);
    }
}
