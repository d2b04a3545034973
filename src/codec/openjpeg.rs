//
// openjpeg.rs
// Dicom-Redact-rs
//
// Reversible (5/3 wavelet, single quality layer) JPEG 2000 encoding through OpenJPEG.
//
// Thales Matheus Mendonça Santos - November 2025

use std::ffi::c_void;
use std::os::raw::c_int;
use std::ptr;

use openjpeg_sys as opj;

use super::{Jpeg2000Encoder, Jpeg2000Frame};
use crate::redact::RedactError;

const STREAM_CHUNK_SIZE: usize = 1 << 20;
const MAX_RESOLUTIONS: u32 = 6;

/// Lossless J2K codestream encoder backed by libopenjp2.
#[derive(Debug, Clone, Copy)]
pub struct OpenJpegEncoder {
    pub resolutions: u32,
}

impl Default for OpenJpegEncoder {
    fn default() -> Self {
        Self {
            resolutions: MAX_RESOLUTIONS,
        }
    }
}

impl Jpeg2000Encoder for OpenJpegEncoder {
    fn encode_frame(&self, frame: &Jpeg2000Frame<'_>) -> Result<Vec<u8>, RedactError> {
        let components = usize::from(frame.samples_per_pixel);
        let pixels = frame.rows as usize * frame.columns as usize;
        let expected = pixels * components * frame.bytes_per_sample;
        if frame.data.len() != expected {
            return Err(RedactError::Encode(format!(
                "frame holds {} bytes, expected {}",
                frame.data.len(),
                expected
            )));
        }
        if !(1..=2).contains(&frame.bytes_per_sample) {
            return Err(RedactError::Encode(format!(
                "{}-byte samples are not supported by the JPEG 2000 encoder",
                frame.bytes_per_sample
            )));
        }

        let resolutions = self
            .resolutions
            .min(max_resolutions(frame.columns, frame.rows))
            .max(1);

        // SAFETY: every OpenJPEG handle is owned by `Handles` and released on drop;
        // component buffers are sized by opj_image_create from the parameters below.
        unsafe {
            let mut parameters: opj::opj_cparameters_t = std::mem::zeroed();
            opj::opj_set_default_encoder_parameters(&mut parameters);
            parameters.tcp_numlayers = 1;
            parameters.tcp_rates[0] = 0.0;
            parameters.cp_disto_alloc = 1;
            parameters.irreversible = 0;
            parameters.numresolution = resolutions as c_int;
            parameters.tcp_mct = if components == 3 { 1 } else { 0 };

            let mut component_parameters: Vec<opj::opj_image_cmptparm_t> = (0..components)
                .map(|_| {
                    let mut p: opj::opj_image_cmptparm_t = std::mem::zeroed();
                    p.dx = 1;
                    p.dy = 1;
                    p.w = frame.columns as _;
                    p.h = frame.rows as _;
                    p.prec = u32::from(frame.bits_stored) as _;
                    p.sgnd = u32::from(frame.signed) as _;
                    p
                })
                .collect();

            let color_space = if components == 3 {
                opj::COLOR_SPACE::OPJ_CLRSPC_SRGB
            } else {
                opj::COLOR_SPACE::OPJ_CLRSPC_GRAY
            };

            let mut handles = Handles::default();
            handles.image = opj::opj_image_create(
                components as _,
                component_parameters.as_mut_ptr(),
                color_space,
            );
            if handles.image.is_null() {
                return Err(RedactError::Encode("opj_image_create failed".to_string()));
            }

            let image = &mut *handles.image;
            image.x0 = 0;
            image.y0 = 0;
            image.x1 = frame.columns as _;
            image.y1 = frame.rows as _;

            let comps = std::slice::from_raw_parts_mut(image.comps, components);
            for (c, comp) in comps.iter_mut().enumerate() {
                let data = std::slice::from_raw_parts_mut(comp.data, pixels);
                for (i, sample) in data.iter_mut().enumerate() {
                    let offset = (i * components + c) * frame.bytes_per_sample;
                    *sample = read_sample(frame, offset);
                }
            }

            handles.codec = opj::opj_create_compress(opj::CODEC_FORMAT::OPJ_CODEC_J2K);
            if handles.codec.is_null() {
                return Err(RedactError::Encode("opj_create_compress failed".to_string()));
            }
            if opj::opj_setup_encoder(handles.codec, &mut parameters, handles.image) == 0 {
                return Err(RedactError::Encode("opj_setup_encoder failed".to_string()));
            }

            let mut output = Box::new(OutputBuffer::default());
            handles.stream = opj::opj_stream_create(STREAM_CHUNK_SIZE, 0);
            if handles.stream.is_null() {
                return Err(RedactError::Encode("opj_stream_create failed".to_string()));
            }
            opj::opj_stream_set_user_data(
                handles.stream,
                output.as_mut() as *mut OutputBuffer as *mut c_void,
                None,
            );
            opj::opj_stream_set_write_function(handles.stream, Some(write_callback));
            opj::opj_stream_set_skip_function(handles.stream, Some(skip_callback));
            opj::opj_stream_set_seek_function(handles.stream, Some(seek_callback));

            if opj::opj_start_compress(handles.codec, handles.image, handles.stream) == 0
                || opj::opj_encode(handles.codec, handles.stream) == 0
                || opj::opj_end_compress(handles.codec, handles.stream) == 0
            {
                return Err(RedactError::Encode("OpenJPEG compression failed".to_string()));
            }

            // The stream flushes into `output` on destroy, so release it before reading.
            drop(handles);
            Ok(output.bytes)
        }
    }
}

// 2^(resolutions - 1) may not exceed the smallest image dimension.
fn max_resolutions(columns: u32, rows: u32) -> u32 {
    let smallest = columns.min(rows).max(1);
    32 - smallest.leading_zeros()
}

fn read_sample(frame: &Jpeg2000Frame<'_>, offset: usize) -> i32 {
    let data = frame.data;
    match (frame.bytes_per_sample, frame.signed) {
        (1, false) => i32::from(data[offset]),
        (1, true) => i32::from(data[offset] as i8),
        (_, false) => i32::from(u16::from_le_bytes([data[offset], data[offset + 1]])),
        (_, true) => i32::from(i16::from_le_bytes([data[offset], data[offset + 1]])),
    }
}

struct Handles {
    image: *mut opj::opj_image_t,
    codec: *mut opj::opj_codec_t,
    stream: *mut opj::opj_stream_t,
}

impl Default for Handles {
    fn default() -> Self {
        Self {
            image: ptr::null_mut(),
            codec: ptr::null_mut(),
            stream: ptr::null_mut(),
        }
    }
}

impl Drop for Handles {
    fn drop(&mut self) {
        // SAFETY: pointers are either null or were returned by the matching OpenJPEG constructor.
        unsafe {
            if !self.stream.is_null() {
                opj::opj_stream_destroy(self.stream);
            }
            if !self.codec.is_null() {
                opj::opj_destroy_codec(self.codec);
            }
            if !self.image.is_null() {
                opj::opj_image_destroy(self.image);
            }
        }
    }
}

#[derive(Default)]
struct OutputBuffer {
    bytes: Vec<u8>,
    position: usize,
}

impl OutputBuffer {
    fn write(&mut self, chunk: &[u8]) {
        let end = self.position + chunk.len();
        if end > self.bytes.len() {
            self.bytes.resize(end, 0);
        }
        self.bytes[self.position..end].copy_from_slice(chunk);
        self.position = end;
    }
}

unsafe extern "C" fn write_callback(
    buffer: *mut c_void,
    len: usize,
    user_data: *mut c_void,
) -> usize {
    let output = &mut *(user_data as *mut OutputBuffer);
    let chunk = std::slice::from_raw_parts(buffer as *const u8, len);
    output.write(chunk);
    len
}

unsafe extern "C" fn skip_callback(len: i64, user_data: *mut c_void) -> i64 {
    let output = &mut *(user_data as *mut OutputBuffer);
    let target = output.position as i64 + len;
    if target < 0 {
        return -1;
    }
    output.position = target as usize;
    if output.position > output.bytes.len() {
        output.bytes.resize(output.position, 0);
    }
    len
}

unsafe extern "C" fn seek_callback(position: i64, user_data: *mut c_void) -> c_int {
    let output = &mut *(user_data as *mut OutputBuffer);
    if position < 0 {
        return 0;
    }
    output.position = position as usize;
    if output.position > output.bytes.len() {
        output.bytes.resize(output.position, 0);
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_levels_follow_image_size() {
        assert_eq!(max_resolutions(512, 512), 10);
        assert_eq!(max_resolutions(4, 8), 3);
        assert_eq!(max_resolutions(1, 1), 1);
    }

    #[test]
    fn encodes_a_codestream() {
        let data: Vec<u8> = (0..64u16).flat_map(|v| (v * 64).to_le_bytes()).collect();
        let frame = Jpeg2000Frame {
            rows: 8,
            columns: 8,
            samples_per_pixel: 1,
            bytes_per_sample: 2,
            bits_stored: 16,
            signed: false,
            data: &data,
        };
        let codestream = OpenJpegEncoder::default()
            .encode_frame(&frame)
            .expect("encode");
        // SOC marker followed by SIZ.
        assert_eq!(&codestream[..4], &[0xFF, 0x4F, 0xFF, 0x51]);
    }
}
