//
// encoding.rs
// Dicom-Redact-rs
//
// Classifies a slice's transfer syntax into the pixel encodings the redactor knows how to write back.
//
// Thales Matheus Mendonça Santos - November 2025

use dicom::transfer_syntax::entries::{EXPLICIT_VR_LITTLE_ENDIAN, IMPLICIT_VR_LITTLE_ENDIAN};
use dicom::encoding::transfer_syntax::Codec;
use dicom::encoding::TransferSyntaxIndex;
use dicom::transfer_syntax::TransferSyntaxRegistry;

/// JPEG 2000 Image Compression (Lossless Only).
pub const JPEG_2000_LOSSLESS: &str = "1.2.840.10008.1.2.4.90";

/// How redacted pixel data is serialized back into the dataset.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PixelEncoding {
    /// Flat native samples. Everything that is not JPEG 2000 Lossless ends up here.
    Raw,
    /// Reversible JPEG 2000, one encapsulated fragment per frame.
    Jpeg2000Lossless,
}

impl PixelEncoding {
    pub fn from_transfer_syntax(uid: &str) -> Self {
        if normalize_uid(uid) == JPEG_2000_LOSSLESS {
            PixelEncoding::Jpeg2000Lossless
        } else {
            PixelEncoding::Raw
        }
    }

    /// BitsStored the dataset must declare once pixels are decoded.
    ///
    /// 12-bit JPEG 2000 Lossless streams decode into 16-bit samples, so the
    /// dataset is widened to match the buffer that is actually re-encoded.
    pub fn corrected_bits_stored(self, bits_stored: u16) -> u16 {
        match (self, bits_stored) {
            (PixelEncoding::Jpeg2000Lossless, 12) => 16,
            _ => bits_stored,
        }
    }
}

/// Whether raw samples can be written under `uid` without changing the transfer syntax.
pub fn is_native_little_endian(uid: &str) -> bool {
    let uid = normalize_uid(uid);
    uid == EXPLICIT_VR_LITTLE_ENDIAN.uid() || uid == IMPLICIT_VR_LITTLE_ENDIAN.uid()
}

/// Whether pixel data under `uid` is stored unencapsulated, so decoding hands
/// back the samples in their stored layout (planar configuration included).
///
/// Holds for every native syntax regardless of byte order. Unknown UIDs are
/// treated as encapsulated.
pub fn has_native_pixel_data(uid: &str) -> bool {
    TransferSyntaxRegistry
        .get(normalize_uid(uid))
        .map_or(false, |ts| !matches!(ts.codec(), Codec::EncapsulatedPixelData(..)))
}

// UIDs read from file meta may carry the trailing NUL used for even-length padding.
fn normalize_uid(uid: &str) -> &str {
    uid.trim_end_matches(['\0', ' '])
}
