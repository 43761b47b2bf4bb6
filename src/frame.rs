//! PCM frame buffers and sample format descriptions.
//!
//! [`FrameBuffer`] is the fundamental unit of audio data passed through the
//! pipeline: a flat, channel-interleaved block of samples stored as raw
//! bytes together with its [`SampleFormat`] and channel count. It carries
//! no timing or rate information of its own; the rate lives in the
//! [`PcmSpec`] of whatever produced it.

use std::time::Duration;

use crate::AudioError;

/// In-memory PCM sample format.
///
/// Each format maps to a fixed byte width used for all buffer-size
/// arithmetic. `Signed24` is packed: 3 bytes per sample, little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Unsigned 8-bit (bias 128).
    Unsigned8,
    /// Signed 16-bit little-endian.
    Signed16,
    /// Signed 24-bit little-endian, packed (3 bytes per sample).
    Signed24,
    /// Signed 32-bit little-endian.
    Signed32,
    /// 32-bit IEEE float, nominal range [-1.0, 1.0].
    Float32,
}

impl SampleFormat {
    /// Returns the width of one sample in bytes (1, 2, 3, 4, 4).
    #[must_use]
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::Unsigned8 => 1,
            Self::Signed16 => 2,
            Self::Signed24 => 3,
            Self::Signed32 => 4,
            Self::Float32 => 4,
        }
    }

    /// Returns the bit depth used for dithering decisions.
    ///
    /// `Float32` counts as 32: converting int→float is always an expansion
    /// and never dithered.
    #[must_use]
    pub fn bit_depth(self) -> u32 {
        match self {
            Self::Unsigned8 => 8,
            Self::Signed16 => 16,
            Self::Signed24 => 24,
            Self::Signed32 => 32,
            Self::Float32 => 32,
        }
    }

    /// Returns a short human-readable name (`"s16"`, `"f32"`, ...).
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Unsigned8 => "u8",
            Self::Signed16 => "s16",
            Self::Signed24 => "s24",
            Self::Signed32 => "s32",
            Self::Float32 => "f32",
        }
    }
}

impl std::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A complete PCM stream description: sample format, channel count, rate.
///
/// This is the "format triple" every converter, decoder, and device is
/// configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmSpec {
    /// Sample format.
    pub format: SampleFormat,
    /// Number of interleaved channels (1 = mono, 2 = stereo).
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl PcmSpec {
    /// Creates a new spec.
    #[must_use]
    pub fn new(format: SampleFormat, channels: u16, sample_rate: u32) -> Self {
        Self {
            format,
            channels,
            sample_rate,
        }
    }

    /// Returns the size of one frame (one sample per channel) in bytes.
    #[must_use]
    pub fn frame_bytes(&self) -> usize {
        self.format.bytes_per_sample() * self.channels as usize
    }

    /// Converts a frame count to a byte count.
    #[must_use]
    pub fn frames_to_bytes(&self, frames: usize) -> usize {
        frames * self.frame_bytes()
    }

    /// Converts a byte count to a frame count (truncating any partial
    /// frame).
    #[must_use]
    pub fn bytes_to_frames(&self, bytes: usize) -> usize {
        bytes / self.frame_bytes()
    }
}

impl Default for PcmSpec {
    /// Signed 16-bit, stereo, 44100 Hz — the conventional decode target.
    fn default() -> Self {
        Self::new(SampleFormat::Signed16, 2, 44100)
    }
}

/// A flat, interleaved block of PCM samples.
///
/// Samples are stored as raw little-endian bytes. The byte length is always
/// an exact multiple of `format.bytes_per_sample() * channels`; constructors
/// enforce this. Typed access goes through total, copying conversion
/// functions ([`to_i16`](Self::to_i16), [`to_f32`](Self::to_f32), ...);
/// the raw byte view ([`as_bytes`](Self::as_bytes)) is free.
///
/// A `FrameBuffer` is exclusively owned by its producer until handed to a
/// consumer by value; it is never mutated after handoff.
///
/// # Example
///
/// ```
/// use pcm_stream::{FrameBuffer, SampleFormat};
///
/// let buf = FrameBuffer::from_i16(&[0, 100, -100, 200], 2);
/// assert_eq!(buf.frame_count(), 2);
/// assert_eq!(buf.to_i16().unwrap(), vec![0, 100, -100, 200]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    format: SampleFormat,
    channels: u16,
    bytes: Vec<u8>,
}

impl FrameBuffer {
    /// Creates an empty buffer with the given format and channel count.
    #[must_use]
    pub fn empty(format: SampleFormat, channels: u16) -> Self {
        Self {
            format,
            channels,
            bytes: Vec::new(),
        }
    }

    /// Creates a zero-filled buffer holding `frames` frames.
    ///
    /// For `Unsigned8` "zero" is the bias value 128 (digital silence), not
    /// byte zero.
    #[must_use]
    pub fn zeroed(format: SampleFormat, channels: u16, frames: usize) -> Self {
        let fill = if format == SampleFormat::Unsigned8 {
            128
        } else {
            0
        };
        Self {
            format,
            channels,
            bytes: vec![fill; frames * format.bytes_per_sample() * channels as usize],
        }
    }

    /// Wraps raw little-endian sample bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::FrameSizeMismatch`] if `bytes.len()` is not a
    /// multiple of the frame size, or if `channels` is zero.
    pub fn from_bytes(
        bytes: Vec<u8>,
        format: SampleFormat,
        channels: u16,
    ) -> Result<Self, AudioError> {
        if channels == 0 {
            return Err(AudioError::FrameSizeMismatch {
                reason: "channel count must be non-zero".to_string(),
            });
        }
        let frame = format.bytes_per_sample() * channels as usize;
        if bytes.len() % frame != 0 {
            return Err(AudioError::FrameSizeMismatch {
                reason: format!(
                    "{} bytes is not a multiple of the {} byte frame size ({} ch {})",
                    bytes.len(),
                    frame,
                    channels,
                    format
                ),
            });
        }
        Ok(Self {
            format,
            channels,
            bytes,
        })
    }

    /// Builds a `Signed16` buffer from typed samples.
    #[must_use]
    pub fn from_i16(samples: &[i16], channels: u16) -> Self {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        Self {
            format: SampleFormat::Signed16,
            channels,
            bytes,
        }
    }

    /// Builds a `Signed32` buffer from typed samples.
    #[must_use]
    pub fn from_i32(samples: &[i32], channels: u16) -> Self {
        let mut bytes = Vec::with_capacity(samples.len() * 4);
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        Self {
            format: SampleFormat::Signed32,
            channels,
            bytes,
        }
    }

    /// Builds a `Float32` buffer from typed samples.
    #[must_use]
    pub fn from_f32(samples: &[f32], channels: u16) -> Self {
        let mut bytes = Vec::with_capacity(samples.len() * 4);
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        Self {
            format: SampleFormat::Float32,
            channels,
            bytes,
        }
    }

    /// Returns the sample format.
    #[must_use]
    pub fn format(&self) -> SampleFormat {
        self.format
    }

    /// Returns the channel count.
    #[must_use]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Returns the raw byte view (zero-copy).
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the buffer, returning its raw bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Returns the number of frames (one sample per channel).
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.bytes.len() / (self.format.bytes_per_sample() * self.channels as usize)
    }

    /// Returns the total number of samples across all channels.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.bytes.len() / self.format.bytes_per_sample()
    }

    /// Returns `true` if the buffer holds no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns the play time of this buffer at the given rate.
    #[must_use]
    pub fn duration(&self, sample_rate: u32) -> Duration {
        if sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_count() as f64 / f64::from(sample_rate))
    }

    /// Appends the frames of `other` to this buffer.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::FrameSizeMismatch`] if the formats or channel
    /// counts differ.
    pub fn extend(&mut self, other: &FrameBuffer) -> Result<(), AudioError> {
        if other.format != self.format || other.channels != self.channels {
            return Err(AudioError::FrameSizeMismatch {
                reason: format!(
                    "cannot extend {} x{} buffer with {} x{} buffer",
                    self.format, self.channels, other.format, other.channels
                ),
            });
        }
        self.bytes.extend_from_slice(&other.bytes);
        Ok(())
    }

    /// Copies out the samples as `i16` values.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::UnsupportedFormat`] unless the buffer format is
    /// `Signed16`. Other formats must be converted first.
    pub fn to_i16(&self) -> Result<Vec<i16>, AudioError> {
        if self.format != SampleFormat::Signed16 {
            return Err(AudioError::UnsupportedFormat {
                format: format!("{} (expected s16)", self.format),
            });
        }
        Ok(self
            .bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect())
    }

    /// Copies out the samples as `i32` values.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::UnsupportedFormat`] unless the buffer format is
    /// `Signed32`.
    pub fn to_i32(&self) -> Result<Vec<i32>, AudioError> {
        if self.format != SampleFormat::Signed32 {
            return Err(AudioError::UnsupportedFormat {
                format: format!("{} (expected s32)", self.format),
            });
        }
        Ok(self
            .bytes
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    /// Copies out the samples as `f32` values.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::UnsupportedFormat`] unless the buffer format is
    /// `Float32`.
    pub fn to_f32(&self) -> Result<Vec<f32>, AudioError> {
        if self.format != SampleFormat::Float32 {
            return Err(AudioError::UnsupportedFormat {
                format: format!("{} (expected f32)", self.format),
            });
        }
        Ok(self
            .bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    /// Splits off and returns the first `frames` frames, leaving the rest.
    ///
    /// Returns the whole buffer if it holds fewer than `frames` frames.
    pub(crate) fn split_front(&mut self, frames: usize) -> FrameBuffer {
        let frame = self.format.bytes_per_sample() * self.channels as usize;
        let take = (frames * frame).min(self.bytes.len());
        let rest = self.bytes.split_off(take);
        let front = std::mem::replace(&mut self.bytes, rest);
        FrameBuffer {
            format: self.format,
            channels: self.channels,
            bytes: front,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_widths() {
        assert_eq!(SampleFormat::Unsigned8.bytes_per_sample(), 1);
        assert_eq!(SampleFormat::Signed16.bytes_per_sample(), 2);
        assert_eq!(SampleFormat::Signed24.bytes_per_sample(), 3);
        assert_eq!(SampleFormat::Signed32.bytes_per_sample(), 4);
        assert_eq!(SampleFormat::Float32.bytes_per_sample(), 4);
    }

    #[test]
    fn test_spec_frame_bytes() {
        let spec = PcmSpec::new(SampleFormat::Signed24, 2, 48000);
        assert_eq!(spec.frame_bytes(), 6);
        assert_eq!(spec.frames_to_bytes(100), 600);
        assert_eq!(spec.bytes_to_frames(600), 100);
        assert_eq!(spec.bytes_to_frames(605), 100);
    }

    #[test]
    fn test_spec_default() {
        let spec = PcmSpec::default();
        assert_eq!(spec.format, SampleFormat::Signed16);
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 44100);
    }

    #[test]
    fn test_from_bytes_rejects_partial_frame() {
        // 5 bytes cannot hold whole s16 stereo frames (4 bytes each)
        let err = FrameBuffer::from_bytes(vec![0; 5], SampleFormat::Signed16, 2);
        assert!(matches!(err, Err(AudioError::FrameSizeMismatch { .. })));
    }

    #[test]
    fn test_from_bytes_rejects_zero_channels() {
        let err = FrameBuffer::from_bytes(vec![], SampleFormat::Signed16, 0);
        assert!(matches!(err, Err(AudioError::FrameSizeMismatch { .. })));
    }

    #[test]
    fn test_i16_round_trip() {
        let samples = vec![0i16, 1, -1, i16::MAX, i16::MIN];
        let buf = FrameBuffer::from_i16(&samples, 1);
        assert_eq!(buf.frame_count(), 5);
        assert_eq!(buf.to_i16().unwrap(), samples);
    }

    #[test]
    fn test_f32_round_trip() {
        let samples = vec![0.0f32, 0.5, -0.5, 1.0, -1.0];
        let buf = FrameBuffer::from_f32(&samples, 1);
        assert_eq!(buf.to_f32().unwrap(), samples);
    }

    #[test]
    fn test_typed_view_wrong_format() {
        let buf = FrameBuffer::from_i16(&[1, 2], 1);
        assert!(buf.to_f32().is_err());
        assert!(buf.to_i32().is_err());
    }

    #[test]
    fn test_frame_count_stereo() {
        let buf = FrameBuffer::from_i16(&[1, 2, 3, 4, 5, 6], 2);
        assert_eq!(buf.frame_count(), 3);
        assert_eq!(buf.sample_count(), 6);
    }

    #[test]
    fn test_zeroed_u8_is_bias() {
        let buf = FrameBuffer::zeroed(SampleFormat::Unsigned8, 1, 4);
        assert_eq!(buf.as_bytes(), &[128, 128, 128, 128]);
    }

    #[test]
    fn test_extend_same_format() {
        let mut a = FrameBuffer::from_i16(&[1, 2], 2);
        let b = FrameBuffer::from_i16(&[3, 4], 2);
        a.extend(&b).unwrap();
        assert_eq!(a.to_i16().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_extend_format_mismatch() {
        let mut a = FrameBuffer::from_i16(&[1, 2], 2);
        let b = FrameBuffer::from_f32(&[0.5, 0.5], 2);
        assert!(a.extend(&b).is_err());
    }

    #[test]
    fn test_duration() {
        let buf = FrameBuffer::zeroed(SampleFormat::Signed16, 1, 1600);
        assert_eq!(buf.duration(16000), Duration::from_millis(100));
        assert_eq!(buf.duration(0), Duration::ZERO);
    }

    #[test]
    fn test_split_front() {
        let mut buf = FrameBuffer::from_i16(&[1, 2, 3, 4, 5, 6], 2);
        let front = buf.split_front(2);
        assert_eq!(front.to_i16().unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(buf.to_i16().unwrap(), vec![5, 6]);

        // Asking for more than available takes everything
        let rest = buf.split_front(10);
        assert_eq!(rest.frame_count(), 1);
        assert!(buf.is_empty());
    }
}
