//! PCM format, channel, and sample-rate conversion.
//!
//! Two surfaces over one pipeline: the bulk functions
//! ([`convert_sample_format`], [`convert_frames`]) transform a whole
//! in-memory buffer, and [`StreamingConverter`] performs the same
//! transformation incrementally over a [`FrameProducer`]. Samples travel
//! internally as `f64`, get channel-mixed, then rate-converted, and are
//! requantized to the target format (with optional dither) only at the end.

mod channels;
mod resample;
pub(crate) mod sample;
mod stream;

pub use stream::StreamingConverter;

use crate::producer::FrameProducer;
use crate::{AudioError, FrameBuffer, PcmSpec};

/// Dither applied when requantizing to a lower bit depth.
///
/// Noise is generated from a fixed-seed LCG, so conversions are
/// deterministic and reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DitherMode {
    /// No dither.
    #[default]
    None,
    /// Rectangular (uniform) noise, ±0.5 LSB.
    Rectangle,
    /// Triangular (TPDF) noise, ±1 LSB.
    Triangle,
}

/// Policy for converting between channel counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelMixMode {
    /// Average-based mixing: mono fans out to every channel, surplus
    /// channels fold down by averaging, extra outputs carry the frame mean.
    #[default]
    Rectangular,
    /// Copy matching channel indices; extra outputs are silent, surplus
    /// inputs are dropped.
    Simple,
}

/// Returns the frame count a buffer of `frames` frames has after
/// resampling from `in_rate` to `out_rate` (truncating).
#[must_use]
pub fn frame_count_after_resampling(in_rate: u32, out_rate: u32, frames: u64) -> u64 {
    if in_rate == 0 {
        return 0;
    }
    frames * u64::from(out_rate) / u64::from(in_rate)
}

/// Converts every sample of `buf` to `to` format, leaving channel count and
/// frame count untouched.
///
/// Widening conversions (e.g. s16 → f32) are exact; narrowing ones round,
/// with `dither` noise added first when requested.
#[must_use]
pub fn convert_sample_format(
    buf: &FrameBuffer,
    to: crate::SampleFormat,
    dither: DitherMode,
) -> FrameBuffer {
    if to == buf.format() && dither == DitherMode::None {
        return buf.clone();
    }
    let decoded = sample::to_f64(buf);
    let mut rq = sample::Requantizer::new(to, dither, buf.format().bit_depth());
    rq.encode(&decoded, buf.channels())
}

/// Converts a whole buffer of `from_rate` Hz frames to the format, channel
/// count, and rate of `to`.
///
/// The output holds `frames * to.sample_rate / from_rate` frames
/// (truncating). A [`StreamingConverter`] with the same parameters produces
/// byte-identical output.
///
/// # Errors
///
/// Returns [`AudioError::UnsupportedConversion`] if either rate or the
/// target channel count is zero.
pub fn convert_frames(
    buf: &FrameBuffer,
    from_rate: u32,
    to: PcmSpec,
    dither: DitherMode,
    mix: ChannelMixMode,
) -> Result<FrameBuffer, AudioError> {
    let from = PcmSpec::new(buf.format(), buf.channels(), from_rate);
    stream::check_specs(&from, &to)?;

    let decoded = sample::to_f64(buf);
    let mixed = channels::mix(&decoded, from.channels, to.channels, mix);
    let resampled = resample::resample_bulk(&mixed, from_rate, to.sample_rate, to.channels);
    let mut rq = sample::Requantizer::new(to.format, dither, from.format.bit_depth());
    Ok(rq.encode(&resampled, to.channels))
}

/// Drains `producer` through a [`StreamingConverter`], concatenating every
/// block into one buffer.
///
/// # Errors
///
/// Propagates converter errors; see
/// [`StreamingConverter::convert_next`].
pub fn convert_all<P: FrameProducer>(
    from: PcmSpec,
    to: PcmSpec,
    producer: P,
    dither: DitherMode,
    mix: ChannelMixMode,
) -> Result<FrameBuffer, AudioError> {
    let mut conv = StreamingConverter::new(from, to, producer, dither, mix)?;
    let mut out = FrameBuffer::empty(to.format, to.channels);
    loop {
        let block = conv.convert_next(4096)?;
        if block.is_empty() {
            return Ok(out);
        }
        out.extend(&block)?;
    }
}
