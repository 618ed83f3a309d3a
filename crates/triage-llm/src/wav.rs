//! Raw PCM to WAV container wrapping.
//!
//! One-shot inference endpoints reject headerless PCM, so each window's
//! audio is wrapped in a minimal RIFF/WAVE header describing its format.

use std::io::Cursor;

use crate::error::{InferenceError, InferenceResult};

/// Format of the raw little-endian PCM stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PcmFormat {
    /// Samples per second.
    pub sample_rate: u32,
    /// Interleaved channels.
    pub channels: u16,
    /// Bits per sample.
    pub bits_per_sample: u16,
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            bits_per_sample: 16,
        }
    }
}

impl PcmFormat {
    /// Bytes per interleaved frame.
    pub fn frame_bytes(&self) -> usize {
        usize::from(self.channels) * usize::from(self.bits_per_sample / 8)
    }

    /// Playback duration of `len` bytes, in milliseconds.
    pub fn duration_ms(&self, len: usize) -> u64 {
        let frame = self.frame_bytes();
        if frame == 0 || self.sample_rate == 0 {
            return 0;
        }
        (len / frame) as u64 * 1000 / u64::from(self.sample_rate)
    }
}

/// Wrap `pcm` in a WAV container.
///
/// A trailing partial frame is dropped.
pub fn pcm_to_wav(pcm: &[u8], format: PcmFormat) -> InferenceResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: format.bits_per_sample,
        sample_format: hound::SampleFormat::Int,
    };
    let encoding = |e: hound::Error| InferenceError::Encoding(e.to_string());

    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(encoding)?;
        match format.bits_per_sample {
            8 => {
                for &b in pcm {
                    // WAV stores 8-bit as unsigned; hound takes signed and offsets
                    writer.write_sample(b.wrapping_sub(128) as i8).map_err(encoding)?;
                }
            }
            16 => {
                for chunk in pcm.chunks_exact(2) {
                    writer
                        .write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))
                        .map_err(encoding)?;
                }
            }
            24 => {
                for chunk in pcm.chunks_exact(3) {
                    let v = i32::from_le_bytes([0, chunk[0], chunk[1], chunk[2]]) >> 8;
                    writer.write_sample(v).map_err(encoding)?;
                }
            }
            32 => {
                for chunk in pcm.chunks_exact(4) {
                    writer
                        .write_sample(i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                        .map_err(encoding)?;
                }
            }
            other => {
                return Err(InferenceError::Encoding(format!(
                    "unsupported bit depth {other}"
                )));
            }
        }
        writer.finalize().map_err(encoding)?;
    }
    Ok(cursor.into_inner())
}
