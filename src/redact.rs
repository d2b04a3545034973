//
// redact.rs
// Dicom-Redact-rs
//
// Zeroes rectangles in decoded pixel data and writes the result back using the slice's original encoding.
//
// Thales Matheus Mendonça Santos - November 2025

use std::io::Cursor;

use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::dictionary_std::tags;
use dicom::object::{DefaultDicomObject, FileDicomObject, FileMetaTableBuilder};
use dicom::pixeldata::{DecodedPixelData, PixelDecoder};
use dicom::transfer_syntax::entries::EXPLICIT_VR_LITTLE_ENDIAN;
use dicom_pixeldata::PixelRepresentation;
use ndarray::{s, ArrayViewMut3, ArrayViewMut4};
use thiserror::Error;
use tracing::debug;

use crate::codec::{encapsulate, EncapsulatedPixelData, Jpeg2000Encoder, Jpeg2000Frame};
use crate::dicom_access::ElementAccess;
use crate::encoding::{has_native_pixel_data, is_native_little_endian, PixelEncoding};
use crate::geometry::{ClippedRectangle, PixelRectangle};

/// Failures confined to a single slice.
#[derive(Debug, Error)]
pub enum RedactError {
    #[error("failed to parse DICOM data: {0}")]
    Parse(String),
    #[error("failed to decode pixel data: {0}")]
    Decode(String),
    #[error("unsupported pixel layout: {0}")]
    Layout(String),
    #[error("failed to encode pixel data: {0}")]
    Encode(String),
}

/// Decoded samples of every frame of a slice, kept as raw little-endian bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub rows: u32,
    pub columns: u32,
    pub frames: u32,
    pub samples_per_pixel: u16,
    pub bytes_per_sample: usize,
    /// Colour planes stored one after the other (PlanarConfiguration 1).
    pub planar: bool,
    pub signed: bool,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rows: u32,
        columns: u32,
        frames: u32,
        samples_per_pixel: u16,
        bytes_per_sample: usize,
        planar: bool,
        signed: bool,
        mut data: Vec<u8>,
    ) -> Result<Self, RedactError> {
        if bytes_per_sample == 0 || samples_per_pixel == 0 {
            return Err(RedactError::Layout(format!(
                "{} samples per pixel of {} bytes",
                samples_per_pixel, bytes_per_sample
            )));
        }

        let mut buffer = Self {
            rows,
            columns,
            frames: frames.max(1),
            samples_per_pixel,
            bytes_per_sample,
            planar,
            signed,
            data: Vec::new(),
        };

        let expected = buffer.frame_len() * buffer.frames as usize;
        if data.len() < expected {
            return Err(RedactError::Layout(format!(
                "pixel data holds {} bytes, expected {}",
                data.len(),
                expected
            )));
        }
        // Odd-length pixel data carries one padding byte.
        data.truncate(expected);
        buffer.data = data;
        Ok(buffer)
    }

    /// Take ownership of the samples produced by dicom-pixeldata.
    pub fn from_decoded(decoded: &DecodedPixelData<'_>, planar: bool) -> Result<Self, RedactError> {
        let bits_allocated = decoded.bits_allocated();
        if bits_allocated % 8 != 0 {
            return Err(RedactError::Layout(format!(
                "BitsAllocated {} is not byte aligned",
                bits_allocated
            )));
        }

        Self::new(
            decoded.rows(),
            decoded.columns(),
            decoded.number_of_frames(),
            decoded.samples_per_pixel(),
            usize::from(bits_allocated / 8),
            planar && decoded.samples_per_pixel() > 1,
            decoded.pixel_representation() == PixelRepresentation::Signed,
            decoded.data().to_vec(),
        )
    }

    pub fn frame_len(&self) -> usize {
        self.rows as usize
            * self.columns as usize
            * usize::from(self.samples_per_pixel)
            * self.bytes_per_sample
    }

    pub fn frame(&self, index: u32) -> &[u8] {
        let len = self.frame_len();
        let start = index as usize * len;
        &self.data[start..start + len]
    }

    /// Zero every rectangle in every frame and sample plane.
    ///
    /// Rectangles are clipped to the image first; those left empty are skipped.
    /// Returns how many rectangles touched the image.
    pub fn zero_rectangles(&mut self, rectangles: &[PixelRectangle]) -> Result<usize, RedactError> {
        let frames = self.frames as usize;
        let rows = self.rows as usize;
        let columns = self.columns as usize;
        let samples = usize::from(self.samples_per_pixel);
        let width = self.bytes_per_sample;

        let clipped: Vec<_> = rectangles
            .iter()
            .filter_map(|r| r.clip(self.columns, self.rows))
            .collect();
        if clipped.is_empty() {
            return Ok(0);
        }

        if self.planar {
            let mut planes =
                ArrayViewMut4::from_shape((frames, samples, rows, columns * width), &mut self.data[..])
                    .map_err(|e| RedactError::Layout(e.to_string()))?;
            for r in &clipped {
                planes
                    .slice_mut(s![.., .., r.y1..r.y2, r.x1 * width..r.x2 * width])
                    .fill(0);
            }
        } else {
            let stride = samples * width;
            let mut pixels =
                ArrayViewMut3::from_shape((frames, rows, columns * stride), &mut self.data[..])
                    .map_err(|e| RedactError::Layout(e.to_string()))?;
            for r in &clipped {
                pixels
                    .slice_mut(s![.., r.y1..r.y2, r.x1 * stride..r.x2 * stride])
                    .fill(0);
            }
        }

        let zeroed: usize = clipped.iter().map(ClippedRectangle::area).sum();
        debug!(rectangles = clipped.len(), pixels_per_frame = zeroed, "rectangles zeroed");
        Ok(clipped.len())
    }
}

/// Pixel data ready to be stored in the dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixelPayload {
    Native { bytes: Vec<u8>, vr: VR },
    Encapsulated(EncapsulatedPixelData),
}

/// Outcome of redacting one decoded slice.
#[derive(Debug, Clone)]
pub struct Redaction {
    pub pixels: PixelBuffer,
    pub payload: PixelPayload,
    pub rectangles_applied: usize,
}

/// Zero `rectangles` in `pixels` and re-serialize them for `encoding`.
///
/// `bits_stored` is the already corrected value (see
/// [`PixelEncoding::corrected_bits_stored`]); it is the precision handed to the
/// JPEG 2000 encoder.
pub fn redact_pixels(
    mut pixels: PixelBuffer,
    rectangles: &[PixelRectangle],
    encoding: PixelEncoding,
    bits_stored: u16,
    encoder: &dyn Jpeg2000Encoder,
) -> Result<Redaction, RedactError> {
    let rectangles_applied = pixels.zero_rectangles(rectangles)?;

    let payload = match encoding {
        PixelEncoding::Raw => encode_raw(&pixels),
        PixelEncoding::Jpeg2000Lossless => encode_jpeg2000(&pixels, bits_stored, encoder)?,
    };

    Ok(Redaction {
        pixels,
        payload,
        rectangles_applied,
    })
}

fn encode_raw(pixels: &PixelBuffer) -> PixelPayload {
    let vr = if pixels.bytes_per_sample > 1 {
        VR::OW
    } else {
        VR::OB
    };
    PixelPayload::Native {
        bytes: pixels.data.clone(),
        vr,
    }
}

fn encode_jpeg2000(
    pixels: &PixelBuffer,
    bits_stored: u16,
    encoder: &dyn Jpeg2000Encoder,
) -> Result<PixelPayload, RedactError> {
    if pixels.planar {
        return Err(RedactError::Layout(
            "planar colour data cannot be JPEG 2000 encoded".to_string(),
        ));
    }

    let codestreams = (0..pixels.frames)
        .map(|index| {
            encoder.encode_frame(&Jpeg2000Frame {
                rows: pixels.rows,
                columns: pixels.columns,
                samples_per_pixel: pixels.samples_per_pixel,
                bytes_per_sample: pixels.bytes_per_sample,
                bits_stored,
                signed: pixels.signed,
                data: pixels.frame(index),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PixelPayload::Encapsulated(encapsulate(codestreams)))
}

/// Summary of a dataset-level redaction, used for logging and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetRedaction {
    pub encoding: PixelEncoding,
    pub bits_stored_before: u16,
    pub bits_stored_after: u16,
    pub rectangles_applied: usize,
    pub frames: u32,
}

/// Redact a whole slice: BitsStored correction, decode, zero, re-encode, store.
///
/// Everything but PixelData (and the corrected BitsStored) is left as is,
/// except when raw samples replace a non-native encoding: the file meta is then
/// switched to Explicit VR Little Endian so the payload stays readable.
pub fn redact_dataset(
    mut obj: DefaultDicomObject,
    rectangles: &[PixelRectangle],
    encoder: &dyn Jpeg2000Encoder,
) -> Result<(DefaultDicomObject, DatasetRedaction), RedactError> {
    let source_ts = obj.meta().transfer_syntax().to_string();
    let encoding = PixelEncoding::from_transfer_syntax(&source_ts);

    let bits_stored_before = obj
        .element_u16(tags::BITS_STORED)
        .ok_or_else(|| RedactError::Decode("missing BitsStored".to_string()))?;
    let bits_stored_after = encoding.corrected_bits_stored(bits_stored_before);
    if bits_stored_after != bits_stored_before {
        // Must land before any pixel access so metadata and decoded width agree.
        obj.put(DataElement::new(
            tags::BITS_STORED,
            VR::US,
            PrimitiveValue::from(bits_stored_after),
        ));
    }

    let native_source = has_native_pixel_data(&source_ts);
    let planar = native_source && obj.element_u16(tags::PLANAR_CONFIGURATION) == Some(1);

    let pixels = {
        let decoded = obj
            .decode_pixel_data()
            .map_err(|e| RedactError::Decode(e.to_string()))?;
        PixelBuffer::from_decoded(&decoded, planar)?
    };
    let frames = pixels.frames;
    let samples_per_pixel = pixels.samples_per_pixel;

    let redaction = redact_pixels(pixels, rectangles, encoding, bits_stored_after, encoder)?;
    debug!(
        ?encoding,
        applied = redaction.rectangles_applied,
        frames,
        "pixel data redacted"
    );

    match redaction.payload {
        PixelPayload::Encapsulated(encapsulated) => {
            obj.put(encapsulated.into_element());
        }
        PixelPayload::Native { bytes, vr } => {
            obj.put(DataElement::new(
                tags::PIXEL_DATA,
                vr,
                PrimitiveValue::from(bytes),
            ));
        }
    }

    if encoding == PixelEncoding::Raw && !is_native_little_endian(&source_ts) {
        if samples_per_pixel == 3 && !native_source {
            // Colour decoders hand back interleaved RGB.
            obj.put(DataElement::new(
                tags::PHOTOMETRIC_INTERPRETATION,
                VR::CS,
                PrimitiveValue::from("RGB"),
            ));
            obj.put(DataElement::new(
                tags::PLANAR_CONFIGURATION,
                VR::US,
                PrimitiveValue::from(0_u16),
            ));
        }
        obj = with_transfer_syntax(obj, EXPLICIT_VR_LITTLE_ENDIAN.uid())?;
    }

    Ok((
        obj,
        DatasetRedaction {
            encoding,
            bits_stored_before,
            bits_stored_after,
            rectangles_applied: redaction.rectangles_applied,
            frames,
        },
    ))
}

/// Rebuild the file meta group around the same dataset with another transfer syntax.
fn with_transfer_syntax(
    obj: DefaultDicomObject,
    ts_uid: &str,
) -> Result<DefaultDicomObject, RedactError> {
    let sop_class_uid = trim_uid(&obj.meta().media_storage_sop_class_uid).to_string();
    let sop_instance_uid = trim_uid(&obj.meta().media_storage_sop_instance_uid).to_string();

    let file_meta = FileMetaTableBuilder::new()
        .transfer_syntax(ts_uid)
        .media_storage_sop_class_uid(sop_class_uid)
        .media_storage_sop_instance_uid(sop_instance_uid)
        .build()
        .map_err(|e| RedactError::Encode(e.to_string()))?;

    let mut file_obj = FileDicomObject::new_empty_with_dict_and_meta(
        dicom::dictionary_std::StandardDataDictionary,
        file_meta,
    );
    for elem in obj.into_inner() {
        file_obj.put(elem);
    }
    Ok(file_obj)
}

fn trim_uid(uid: &str) -> &str {
    uid.trim_end_matches(['\0', ' '])
}

/// Parse a DICOM file held in memory, with or without the 128-byte preamble.
pub fn read_dicom(bytes: &[u8]) -> Result<DefaultDicomObject, RedactError> {
    let start = if bytes.len() >= 132 && &bytes[128..132] == b"DICM" {
        128
    } else {
        0
    };
    dicom::object::from_reader(Cursor::new(bytes[start..].to_vec()))
        .map_err(|e| RedactError::Parse(e.to_string()))
}

/// Serialize a DICOM file (preamble, file meta group and dataset).
pub fn write_dicom(obj: &DefaultDicomObject) -> Result<Vec<u8>, RedactError> {
    let mut bytes = Vec::new();
    obj.write_all(&mut bytes)
        .map_err(|e| RedactError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Decode, redact and re-serialize one slice held in memory.
pub fn redact_slice_bytes(
    bytes: &[u8],
    rectangles: &[PixelRectangle],
    encoder: &dyn Jpeg2000Encoder,
) -> Result<(Vec<u8>, DatasetRedaction), RedactError> {
    let obj = read_dicom(bytes)?;
    let (obj, summary) = redact_dataset(obj, rectangles, encoder)?;
    Ok((write_dicom(&obj)?, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn rect(x1: i64, y1: i64, x2: i64, y2: i64) -> PixelRectangle {
        PixelRectangle { x1, y1, x2, y2 }
    }

    fn gray16(rows: u32, columns: u32, frames: u32) -> PixelBuffer {
        let count = (rows * columns * frames) as u16;
        let data = (1..=count).flat_map(|v| v.to_le_bytes()).collect();
        PixelBuffer::new(rows, columns, frames, 1, 2, false, false, data).expect("buffer")
    }

    fn sample16(buffer: &PixelBuffer, frame: u32, y: usize, x: usize) -> u16 {
        let f = buffer.frame(frame);
        let i = (y * buffer.columns as usize + x) * 2;
        u16::from_le_bytes([f[i], f[i + 1]])
    }

    /// Stores frames verbatim so the "codestream" can be compared with the input.
    #[derive(Default)]
    struct RecordingEncoder {
        precisions: Mutex<Vec<u16>>,
    }

    impl Jpeg2000Encoder for RecordingEncoder {
        fn encode_frame(&self, frame: &Jpeg2000Frame<'_>) -> Result<Vec<u8>, RedactError> {
            self.precisions.lock().unwrap().push(frame.bits_stored);
            Ok(frame.data.to_vec())
        }
    }

    #[test]
    fn zeroes_half_open_interior_in_every_frame() {
        let mut buffer = gray16(4, 4, 2);
        let applied = buffer.zero_rectangles(&[rect(1, 1, 3, 2)]).expect("zero");
        assert_eq!(applied, 1);

        for frame in 0..2 {
            for y in 0..4 {
                for x in 0..4 {
                    let inside = (1..3).contains(&x) && y == 1;
                    assert_eq!(sample16(&buffer, frame, y, x) == 0, inside, "({x},{y})");
                }
            }
        }
    }

    #[test]
    fn out_of_bounds_rectangles_are_clipped_or_skipped() {
        let mut buffer = gray16(3, 3, 1);
        let applied = buffer
            .zero_rectangles(&[rect(-2, -2, 1, 1), rect(10, 10, 12, 12), rect(2, 2, 1, 3)])
            .expect("zero");
        assert_eq!(applied, 1);
        assert_eq!(sample16(&buffer, 0, 0, 0), 0);
        assert_ne!(sample16(&buffer, 0, 0, 1), 0);
        assert_ne!(sample16(&buffer, 0, 2, 2), 0);
    }

    #[test]
    fn interleaved_colour_zeroes_all_samples() {
        let data: Vec<u8> = (1..=2 * 2 * 3).collect();
        let mut buffer = PixelBuffer::new(2, 2, 1, 3, 1, false, false, data).expect("buffer");
        buffer.zero_rectangles(&[rect(1, 0, 2, 1)]).expect("zero");
        assert_eq!(buffer.data, vec![1, 2, 3, 0, 0, 0, 7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn planar_colour_zeroes_every_plane() {
        // Three 2x2 planes: R = 1..=4, G = 5..=8, B = 9..=12.
        let data: Vec<u8> = (1..=12).collect();
        let mut buffer = PixelBuffer::new(2, 2, 1, 3, 1, true, false, data).expect("buffer");
        buffer.zero_rectangles(&[rect(0, 1, 1, 2)]).expect("zero");
        assert_eq!(buffer.data, vec![1, 2, 0, 4, 5, 6, 0, 8, 9, 10, 0, 12]);
    }

    #[test]
    fn redaction_is_idempotent() {
        let rects = [rect(0, 0, 2, 2), rect(1, 1, 4, 3)];
        let mut once = gray16(4, 4, 1);
        once.zero_rectangles(&rects).expect("zero");
        let mut twice = once.clone();
        twice.zero_rectangles(&rects).expect("zero");
        assert_eq!(once, twice);
    }

    #[test]
    fn raw_payload_matches_buffer_and_width() {
        let redaction = redact_pixels(
            gray16(2, 2, 1),
            &[rect(0, 0, 1, 1)],
            PixelEncoding::Raw,
            16,
            &RecordingEncoder::default(),
        )
        .expect("redact");
        match redaction.payload {
            PixelPayload::Native { bytes, vr } => {
                assert_eq!(vr, VR::OW);
                assert_eq!(bytes, redaction.pixels.data);
                assert_eq!(&bytes[..2], &[0, 0]);
            }
            other => panic!("expected native payload, got {other:?}"),
        }
    }

    #[test]
    fn untouched_buffer_keeps_original_bytes() {
        let original = gray16(3, 3, 1);
        let redaction = redact_pixels(
            original.clone(),
            &[rect(5, 5, 9, 9)],
            PixelEncoding::Raw,
            16,
            &RecordingEncoder::default(),
        )
        .expect("redact");
        assert_eq!(redaction.rectangles_applied, 0);
        assert_eq!(redaction.pixels, original);
    }

    #[test]
    fn jpeg2000_payload_has_one_fragment_per_frame() {
        let encoder = RecordingEncoder::default();
        let redaction = redact_pixels(
            gray16(2, 2, 3),
            &[rect(0, 0, 2, 1)],
            PixelEncoding::Jpeg2000Lossless,
            16,
            &encoder,
        )
        .expect("redact");

        let PixelPayload::Encapsulated(encapsulated) = redaction.payload else {
            panic!("expected encapsulated payload");
        };
        assert_eq!(encapsulated.fragments.len(), 3);
        assert_eq!(encapsulated.offset_table, vec![0, 16, 32]);
        for (index, fragment) in encapsulated.fragments.iter().enumerate() {
            // The recording encoder is the identity, so decoding is reading the fragment back.
            assert_eq!(fragment.as_slice(), redaction.pixels.frame(index as u32));
            assert_eq!(&fragment[..4], &[0, 0, 0, 0]);
        }
        assert_eq!(*encoder.precisions.lock().unwrap(), vec![16, 16, 16]);
    }

    #[test]
    fn encoder_failure_fails_the_slice() {
        let result = redact_pixels(
            gray16(2, 2, 1),
            &[rect(0, 0, 1, 1)],
            PixelEncoding::Jpeg2000Lossless,
            16,
            &crate::codec::UnavailableEncoder,
        );
        assert!(matches!(result, Err(RedactError::Encode(_))));
    }

    #[test]
    fn short_pixel_data_is_rejected() {
        let result = PixelBuffer::new(2, 2, 1, 1, 2, false, false, vec![0; 7]);
        assert!(matches!(result, Err(RedactError::Layout(_))));

        let padded = PixelBuffer::new(1, 3, 1, 1, 1, false, false, vec![1, 2, 3, 0]).expect("padded");
        assert_eq!(padded.data, vec![1, 2, 3]);
    }

    #[test]
    fn garbage_bytes_fail_to_parse() {
        assert!(matches!(read_dicom(b"not a dicom file"), Err(RedactError::Parse(_))));
    }
}
