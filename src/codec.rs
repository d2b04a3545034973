//
// codec.rs
// Dicom-Redact-rs
//
// JPEG 2000 encoder seam and the encapsulated (fragment sequence) pixel data container.
//
// Thales Matheus Mendonça Santos - November 2025

#[cfg(feature = "openjpeg")]
pub mod openjpeg;

use dicom::core::value::PixelFragmentSequence;
use dicom::core::{DataElement, VR};
use dicom::dictionary_std::tags;
use dicom::object::mem::InMemElement;
use dicom::object::StandardDataDictionary;

use crate::redact::RedactError;

/// One decoded frame handed to a JPEG 2000 encoder.
///
/// Samples are little-endian, `bytes_per_sample` wide and interleaved
/// (`R G B R G B ...` for colour images).
#[derive(Debug, Clone, Copy)]
pub struct Jpeg2000Frame<'a> {
    pub rows: u32,
    pub columns: u32,
    pub samples_per_pixel: u16,
    pub bytes_per_sample: usize,
    pub bits_stored: u16,
    pub signed: bool,
    pub data: &'a [u8],
}

/// Produces a raw JPEG 2000 codestream for a single frame.
///
/// Implementations must be mathematically lossless: decoding the result has
/// to give back `frame.data` bit for bit.
pub trait Jpeg2000Encoder: Send + Sync {
    fn encode_frame(&self, frame: &Jpeg2000Frame<'_>) -> Result<Vec<u8>, RedactError>;
}

/// Placeholder used when the crate is built without a JPEG 2000 encoder.
///
/// Fails every frame, so JPEG 2000 slices are reported as failed instead of
/// being emitted with their original (unredacted) pixels.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableEncoder;

impl Jpeg2000Encoder for UnavailableEncoder {
    fn encode_frame(&self, _frame: &Jpeg2000Frame<'_>) -> Result<Vec<u8>, RedactError> {
        Err(RedactError::Encode(
            "no JPEG 2000 encoder available (build with the `openjpeg` feature)".to_string(),
        ))
    }
}

/// Encoder used when the caller does not supply one.
pub fn default_encoder() -> Box<dyn Jpeg2000Encoder> {
    #[cfg(feature = "openjpeg")]
    {
        Box::new(openjpeg::OpenJpegEncoder::default())
    }
    #[cfg(not(feature = "openjpeg"))]
    {
        Box::new(UnavailableEncoder)
    }
}

/// Compressed frames laid out as DICOM encapsulated pixel data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncapsulatedPixelData {
    /// Basic offset table: byte offset of each frame's first item, relative to the first item.
    pub offset_table: Vec<u32>,
    pub fragments: Vec<Vec<u8>>,
}

/// Wrap one codestream per frame into an encapsulated fragment sequence.
pub fn encapsulate(frames: Vec<Vec<u8>>) -> EncapsulatedPixelData {
    let mut offset_table = Vec::with_capacity(frames.len());
    let mut fragments = Vec::with_capacity(frames.len());
    let mut offset = 0u32;

    for mut fragment in frames {
        // Item values have even length; JPEG 2000 decoders ignore the trailing pad byte.
        if fragment.len() % 2 == 1 {
            fragment.push(0);
        }
        offset_table.push(offset);
        // 8 bytes of item tag + item length precede every fragment.
        offset += 8 + fragment.len() as u32;
        fragments.push(fragment);
    }

    EncapsulatedPixelData {
        offset_table,
        fragments,
    }
}

impl EncapsulatedPixelData {
    pub fn into_element(self) -> InMemElement<StandardDataDictionary> {
        DataElement::new(
            tags::PIXEL_DATA,
            VR::OB,
            PixelFragmentSequence::new(self.offset_table, self.fragments),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encapsulation_pads_fragments_and_builds_offset_table() {
        let encapsulated = encapsulate(vec![vec![1, 2, 3], vec![4, 5, 6, 7]]);
        assert_eq!(encapsulated.fragments[0], vec![1, 2, 3, 0]);
        assert_eq!(encapsulated.fragments[1], vec![4, 5, 6, 7]);
        assert_eq!(encapsulated.offset_table, vec![0, 12]);
    }

    #[test]
    fn encapsulated_element_is_a_pixel_sequence() {
        let element = encapsulate(vec![vec![0xFF, 0x4F, 0xFF, 0xD9]]).into_element();
        assert_eq!(element.header().tag, tags::PIXEL_DATA);
        assert_eq!(element.vr(), VR::OB);
        let fragments = element.value().fragments().expect("pixel sequence");
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0], vec![0xFF, 0x4F, 0xFF, 0xD9]);
        assert_eq!(element.value().offset_table(), Some(&[0u32][..]));
    }

    #[test]
    fn unavailable_encoder_refuses_frames() {
        let frame = Jpeg2000Frame {
            rows: 1,
            columns: 1,
            samples_per_pixel: 1,
            bytes_per_sample: 1,
            bits_stored: 8,
            signed: false,
            data: &[7],
        };
        assert!(matches!(
            UnavailableEncoder.encode_frame(&frame),
            Err(RedactError::Encode(_))
        ));
    }
}
