//
// labels.rs
// Dicom-Redact-rs
//
// Typed view of an exported label row: data units, per-slice metadata and annotation objects.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::geometry::NormalizedBoundingBox;

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("failed to read label row {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid label row JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("label row {0} has no data unit")]
    NoDataUnit(String),
    #[error("slice {key}: {reason}")]
    MalformedSlice { key: String, reason: String },
}

/// One exported label row, i.e. one series.
#[derive(Debug, Clone)]
pub struct LabelRow {
    pub data_hash: String,
    pub data_title: Option<String>,
    pub slices: Vec<SliceLabel>,
}

/// Per-slice entry of a label row, in slice order.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceLabel {
    pub key: String,
    pub metadata: SliceMetadata,
    pub objects: Vec<AnnotationObject>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SliceMetadata {
    pub width: u32,
    pub height: u32,
    pub file_uri: String,
    pub dicom_instance_uid: String,
}

/// Annotation object reduced to the only shape redaction cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationObject {
    pub object_hash: Option<String>,
    pub bounding_box: Option<NormalizedBoundingBox>,
}

#[derive(Deserialize)]
struct RawLabelRow {
    data_hash: String,
    #[serde(default)]
    data_title: Option<String>,
    #[serde(default)]
    data_units: BTreeMap<String, RawDataUnit>,
}

#[derive(Deserialize)]
struct RawDataUnit {
    #[serde(default)]
    labels: BTreeMap<String, RawSliceLabel>,
}

#[derive(Deserialize)]
struct RawSliceLabel {
    metadata: Option<Value>,
    #[serde(default)]
    objects: Vec<Value>,
}

impl LabelRow {
    pub fn from_json_str(json: &str) -> Result<Self, LabelError> {
        let raw: RawLabelRow = serde_json::from_str(json)?;
        Self::from_raw(raw)
    }

    pub fn from_path(path: &Path) -> Result<Self, LabelError> {
        let content = std::fs::read_to_string(path).map_err(|source| LabelError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Series key used for output paths: the data title when present, else the data hash.
    pub fn series_id(&self) -> &str {
        self.data_title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.data_hash)
    }

    fn from_raw(raw: RawLabelRow) -> Result<Self, LabelError> {
        // A DICOM series is exported as a single data unit holding every slice.
        let unit = raw
            .data_units
            .into_values()
            .next()
            .ok_or_else(|| LabelError::NoDataUnit(raw.data_hash.clone()))?;

        let mut entries: Vec<(String, RawSliceLabel)> = unit.labels.into_iter().collect();
        entries.sort_by(|(a, _), (b, _)| slice_order(a).cmp(&slice_order(b)));

        let slices = entries
            .into_iter()
            .map(|(key, raw)| parse_slice(key, raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            data_hash: raw.data_hash,
            data_title: raw.data_title,
            slices,
        })
    }
}

// Slice keys are frame indices serialized as strings; "10" must sort after "9".
fn slice_order(key: &str) -> (u64, &str) {
    (key.parse::<u64>().unwrap_or(u64::MAX), key)
}

fn parse_slice(key: String, raw: RawSliceLabel) -> Result<SliceLabel, LabelError> {
    let metadata = raw.metadata.ok_or_else(|| LabelError::MalformedSlice {
        key: key.clone(),
        reason: "missing metadata".to_string(),
    })?;
    let metadata: SliceMetadata =
        serde_json::from_value(metadata).map_err(|e| LabelError::MalformedSlice {
            key: key.clone(),
            reason: e.to_string(),
        })?;

    let objects = raw
        .objects
        .iter()
        .map(|object| parse_object(&key, object))
        .collect();

    Ok(SliceLabel {
        key,
        metadata,
        objects,
    })
}

fn parse_object(slice_key: &str, object: &Value) -> AnnotationObject {
    let object_hash = object
        .get("objectHash")
        .and_then(Value::as_str)
        .map(str::to_owned);

    let bounding_box = object.get("boundingBox").and_then(|bbox| {
        match NormalizedBoundingBox::deserialize(bbox) {
            Ok(bbox) => Some(bbox),
            Err(e) => {
                warn!(
                    slice = slice_key,
                    object = object_hash.as_deref().unwrap_or("?"),
                    "skipping malformed bounding box: {e}"
                );
                None
            }
        }
    });

    AnnotationObject {
        object_hash,
        bounding_box,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROW: &str = r#"{
        "label_hash": "lh-1",
        "data_hash": "dh-1",
        "data_title": "CT-HEAD-001",
        "data_units": {
            "dh-1": {
                "data_type": "dicom",
                "labels": {
                    "10": {
                        "metadata": {"width": 64, "height": 32, "file_uri": "https://example/10", "dicom_instance_uid": "1.2.10"},
                        "objects": []
                    },
                    "2": {
                        "metadata": {"width": 64, "height": 32, "file_uri": "https://example/2", "dicom_instance_uid": "1.2.2"},
                        "objects": [
                            {"objectHash": "a", "boundingBox": {"x": 0.1, "y": 0.2, "w": 0.3, "h": 0.4}},
                            {"objectHash": "b", "polygon": {"0": {"x": 0.1, "y": 0.1}}},
                            {"objectHash": "c", "boundingBox": {"x": "left", "y": 0.2, "w": 0.3, "h": 0.4}}
                        ]
                    },
                    "9": {
                        "metadata": {"width": 64, "height": 32, "file_uri": "https://example/9", "dicom_instance_uid": "1.2.9"}
                    }
                }
            }
        }
    }"#;

    #[test]
    fn slices_are_ordered_numerically() {
        let row = LabelRow::from_json_str(ROW).expect("parse");
        let keys: Vec<_> = row.slices.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["2", "9", "10"]);
        assert_eq!(row.series_id(), "CT-HEAD-001");
    }

    #[test]
    fn only_well_formed_boxes_survive() {
        let row = LabelRow::from_json_str(ROW).expect("parse");
        let objects = &row.slices[0].objects;
        assert_eq!(objects.len(), 3);
        assert_eq!(
            objects[0].bounding_box,
            Some(NormalizedBoundingBox {
                x: 0.1,
                y: 0.2,
                w: 0.3,
                h: 0.4
            })
        );
        assert!(objects[1].bounding_box.is_none());
        assert!(objects[2].bounding_box.is_none());
        assert!(row.slices[1].objects.is_empty());
    }

    #[test]
    fn series_id_falls_back_to_data_hash() {
        let row = LabelRow::from_json_str(
            r#"{"data_hash": "dh-2", "data_units": {"dh-2": {"labels": {}}}}"#,
        )
        .expect("parse");
        assert_eq!(row.series_id(), "dh-2");
        assert!(row.slices.is_empty());
    }

    #[test]
    fn missing_slice_metadata_is_rejected() {
        let err = LabelRow::from_json_str(
            r#"{"data_hash": "dh", "data_units": {"dh": {"labels": {"0": {"objects": []}}}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, LabelError::MalformedSlice { ref key, .. } if key == "0"));

        let err = LabelRow::from_json_str(
            r#"{"data_hash": "dh", "data_units": {"dh": {"labels": {"0": {"metadata": {"width": 1}}}}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, LabelError::MalformedSlice { .. }));
    }

    #[test]
    fn row_without_data_unit_is_rejected() {
        let err = LabelRow::from_json_str(r#"{"data_hash": "dh"}"#).unwrap_err();
        assert!(matches!(err, LabelError::NoDataUnit(_)));
    }
}
