//! Sample decode/encode between storage formats and the internal `f64`
//! pipeline representation.
//!
//! All format, channel, and rate conversion happens on `f64` samples and
//! only the edges touch storage formats. `f64` represents every supported
//! format exactly (including `Signed32`), so a conversion chain loses
//! precision only at the final requantization step.

use crate::convert::DitherMode;
use crate::{FrameBuffer, SampleFormat};

const U8_SCALE: f64 = 128.0;
const S16_SCALE: f64 = 32768.0;
const S24_SCALE: f64 = 8_388_608.0;
const S32_SCALE: f64 = 2_147_483_648.0;

/// Decodes a buffer's samples to interleaved `f64` in [-1.0, 1.0).
pub(crate) fn to_f64(buf: &FrameBuffer) -> Vec<f64> {
    let bytes = buf.as_bytes();
    match buf.format() {
        SampleFormat::Unsigned8 => bytes
            .iter()
            .map(|&b| (f64::from(b) - 128.0) / U8_SCALE)
            .collect(),
        SampleFormat::Signed16 => bytes
            .chunks_exact(2)
            .map(|b| f64::from(i16::from_le_bytes([b[0], b[1]])) / S16_SCALE)
            .collect(),
        SampleFormat::Signed24 => bytes
            .chunks_exact(3)
            .map(|b| {
                // Sign-extend 3 little-endian bytes through the top of an i32
                let v = i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8;
                f64::from(v) / S24_SCALE
            })
            .collect(),
        SampleFormat::Signed32 => bytes
            .chunks_exact(4)
            .map(|b| f64::from(i32::from_le_bytes([b[0], b[1], b[2], b[3]])) / S32_SCALE)
            .collect(),
        SampleFormat::Float32 => bytes
            .chunks_exact(4)
            .map(|b| f64::from(f32::from_le_bytes([b[0], b[1], b[2], b[3]])))
            .collect(),
    }
}

/// Requantizes `f64` pipeline samples into a storage format, optionally
/// applying dither noise before rounding.
///
/// Carries the dither noise generator state so that a streaming conversion
/// consuming samples block by block produces exactly the same bytes as one
/// bulk pass.
pub(crate) struct Requantizer {
    format: SampleFormat,
    dither: DitherMode,
    lcg: u32,
}

impl Requantizer {
    /// Creates a requantizer for `format`.
    ///
    /// Dither is applied only when `dither` is not `None`, the target is an
    /// integer format, and the target bit depth is below `source_depth`
    /// (requantizing upward or to float never dithers).
    pub(crate) fn new(format: SampleFormat, dither: DitherMode, source_depth: u32) -> Self {
        let applies = dither != DitherMode::None
            && format != SampleFormat::Float32
            && format.bit_depth() < source_depth;
        Self {
            format,
            dither: if applies { dither } else { DitherMode::None },
            lcg: 12345,
        }
    }

    fn next_uniform(&mut self) -> f64 {
        self.lcg = self.lcg.wrapping_mul(1_103_515_245).wrapping_add(12345);
        f64::from(self.lcg >> 16) / 65536.0
    }

    /// Dither noise in units of one target LSB.
    fn noise(&mut self) -> f64 {
        match self.dither {
            DitherMode::None => 0.0,
            DitherMode::Rectangle => self.next_uniform() - 0.5,
            DitherMode::Triangle => (self.next_uniform() + self.next_uniform()) - 1.0,
        }
    }

    /// Encodes the samples into a new buffer with `channels` channels.
    ///
    /// `samples.len()` must be a multiple of `channels`; callers construct
    /// whole frames only.
    pub(crate) fn encode(&mut self, samples: &[f64], channels: u16) -> FrameBuffer {
        match self.format {
            SampleFormat::Unsigned8 => {
                let mut bytes = Vec::with_capacity(samples.len());
                for &x in samples {
                    let v = (x * U8_SCALE + self.noise()).round() + 128.0;
                    bytes.push(v.clamp(0.0, 255.0) as u8);
                }
                buffer(bytes, SampleFormat::Unsigned8, channels)
            }
            SampleFormat::Signed16 => {
                let mut bytes = Vec::with_capacity(samples.len() * 2);
                for &x in samples {
                    let v = (x * S16_SCALE + self.noise())
                        .round()
                        .clamp(-32768.0, 32767.0) as i16;
                    bytes.extend_from_slice(&v.to_le_bytes());
                }
                buffer(bytes, SampleFormat::Signed16, channels)
            }
            SampleFormat::Signed24 => {
                let mut bytes = Vec::with_capacity(samples.len() * 3);
                for &x in samples {
                    let v = (x * S24_SCALE + self.noise())
                        .round()
                        .clamp(-8_388_608.0, 8_388_607.0) as i32;
                    bytes.extend_from_slice(&v.to_le_bytes()[..3]);
                }
                buffer(bytes, SampleFormat::Signed24, channels)
            }
            SampleFormat::Signed32 => {
                let mut bytes = Vec::with_capacity(samples.len() * 4);
                for &x in samples {
                    let v = (x * S32_SCALE + self.noise())
                        .round()
                        .clamp(f64::from(i32::MIN), f64::from(i32::MAX))
                        as i32;
                    bytes.extend_from_slice(&v.to_le_bytes());
                }
                buffer(bytes, SampleFormat::Signed32, channels)
            }
            SampleFormat::Float32 => {
                let mut bytes = Vec::with_capacity(samples.len() * 4);
                for &x in samples {
                    bytes.extend_from_slice(&(x as f32).to_le_bytes());
                }
                buffer(bytes, SampleFormat::Float32, channels)
            }
        }
    }
}

fn buffer(bytes: Vec<u8>, format: SampleFormat, channels: u16) -> FrameBuffer {
    // Whole frames by construction: samples.len() is a channel multiple
    FrameBuffer::from_bytes(bytes, format, channels).unwrap_or_else(|_| {
        debug_assert!(false, "encoder produced a partial frame");
        FrameBuffer::empty(format, channels)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s16_decode_encode_exact() {
        let samples = vec![0i16, 1, -1, 1000, -1000, i16::MAX, i16::MIN];
        let buf = FrameBuffer::from_i16(&samples, 1);
        let f = to_f64(&buf);
        let mut rq = Requantizer::new(SampleFormat::Signed16, DitherMode::None, 16);
        let back = rq.encode(&f, 1);
        assert_eq!(back.to_i16().unwrap(), samples);
    }

    #[test]
    fn test_s32_decode_encode_exact() {
        let samples = vec![0i32, 1, -1, i32::MAX, i32::MIN, 123_456_789];
        let buf = FrameBuffer::from_i32(&samples, 1);
        let f = to_f64(&buf);
        let mut rq = Requantizer::new(SampleFormat::Signed32, DitherMode::None, 32);
        let back = rq.encode(&f, 1);
        assert_eq!(back.to_i32().unwrap(), samples);
    }

    #[test]
    fn test_u8_bias() {
        let buf = FrameBuffer::from_bytes(vec![128, 0, 255], SampleFormat::Unsigned8, 1).unwrap();
        let f = to_f64(&buf);
        assert_eq!(f[0], 0.0);
        assert_eq!(f[1], -1.0);
        assert!((f[2] - 127.0 / 128.0).abs() < 1e-12);
    }

    #[test]
    fn test_s24_sign_extension() {
        // -1 as packed 24-bit little-endian
        let buf =
            FrameBuffer::from_bytes(vec![0xFF, 0xFF, 0xFF], SampleFormat::Signed24, 1).unwrap();
        let f = to_f64(&buf);
        assert!((f[0] + 1.0 / S24_SCALE).abs() < 1e-15);

        let mut rq = Requantizer::new(SampleFormat::Signed24, DitherMode::None, 24);
        let back = rq.encode(&f, 1);
        assert_eq!(back.as_bytes(), &[0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_float_encode_clamps_nothing() {
        // Float output passes values through unclamped
        let mut rq = Requantizer::new(SampleFormat::Float32, DitherMode::None, 32);
        let out = rq.encode(&[1.5, -2.0], 1);
        assert_eq!(out.to_f32().unwrap(), vec![1.5, -2.0]);
    }

    #[test]
    fn test_integer_encode_clamps() {
        let mut rq = Requantizer::new(SampleFormat::Signed16, DitherMode::None, 16);
        let out = rq.encode(&[1.5, -2.0], 1);
        assert_eq!(out.to_i16().unwrap(), vec![32767, -32768]);
    }

    #[test]
    fn test_dither_only_on_depth_reduction() {
        // 16 -> 16: no reduction, dither disabled even when requested
        let mut rq = Requantizer::new(SampleFormat::Signed16, DitherMode::Triangle, 16);
        let a = rq.encode(&[0.25; 64], 1);
        let mut rq = Requantizer::new(SampleFormat::Signed16, DitherMode::None, 16);
        let b = rq.encode(&[0.25; 64], 1);
        assert_eq!(a, b);

        // Float target never dithers
        let mut rq = Requantizer::new(SampleFormat::Float32, DitherMode::Triangle, 32);
        let out = rq.encode(&[0.25], 1);
        assert_eq!(out.to_f32().unwrap(), vec![0.25]);
    }

    #[test]
    fn test_dither_deterministic() {
        let input: Vec<f64> = (0..256).map(|i| (i as f64 / 256.0).sin() * 0.9).collect();
        let mut rq1 = Requantizer::new(SampleFormat::Unsigned8, DitherMode::Triangle, 16);
        let mut rq2 = Requantizer::new(SampleFormat::Unsigned8, DitherMode::Triangle, 16);
        assert_eq!(rq1.encode(&input, 1), rq2.encode(&input, 1));
    }

    #[test]
    fn test_dither_chunking_invariant() {
        let input: Vec<f64> = (0..90).map(|i| (i as f64 * 0.07).sin() * 0.8).collect();
        let mut bulk = Requantizer::new(SampleFormat::Unsigned8, DitherMode::Rectangle, 16);
        let expected = bulk.encode(&input, 1);

        let mut streamed = Requantizer::new(SampleFormat::Unsigned8, DitherMode::Rectangle, 16);
        let mut out = FrameBuffer::empty(SampleFormat::Unsigned8, 1);
        for chunk in input.chunks(7) {
            out.extend(&streamed.encode(chunk, 1)).unwrap();
        }
        assert_eq!(out, expected);
    }
}
