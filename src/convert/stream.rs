//! Pull-based streaming format conversion.

use crate::convert::channels;
use crate::convert::resample::Resampler;
use crate::convert::sample::{self, Requantizer};
use crate::convert::{ChannelMixMode, DitherMode};
use crate::producer::FrameProducer;
use crate::{AudioError, FrameBuffer, PcmSpec};

/// Converts frames pulled from a producer to a target format, channel
/// count, and sample rate, on demand.
///
/// Each [`convert_next`](Self::convert_next) call performs at most one pull
/// on the upstream producer, sized to cover the requested output. A short or
/// `None` pull marks the upstream exhausted; the converter then flushes
/// whatever output the received input still supports, after which calls
/// return an empty buffer. Chunk boundaries never affect sample values: any
/// sequence of `convert_next` calls concatenates to exactly the bytes of the
/// equivalent bulk [`convert_frames`](crate::convert_frames) call.
///
/// # Example
///
/// ```no_run
/// use pcm_stream::{
///     BufferProducer, ChannelMixMode, DitherMode, FrameBuffer, PcmSpec, SampleFormat,
///     StreamingConverter,
/// };
///
/// let source = FrameBuffer::from_i16(&[0; 44100 * 2], 2);
/// let from = PcmSpec::new(SampleFormat::Signed16, 2, 44100);
/// let to = PcmSpec::new(SampleFormat::Float32, 1, 16000);
/// let mut conv = StreamingConverter::new(
///     from,
///     to,
///     BufferProducer::new(source),
///     DitherMode::None,
///     ChannelMixMode::Rectangular,
/// )
/// .unwrap();
/// loop {
///     let block = conv.convert_next(512).unwrap();
///     if block.is_empty() {
///         break;
///     }
///     // feed block downstream
/// }
/// ```
pub struct StreamingConverter<P: FrameProducer> {
    from: PcmSpec,
    to: PcmSpec,
    producer: P,
    mix_mode: ChannelMixMode,
    resampler: Resampler,
    requantizer: Requantizer,
    exhausted: bool,
    failed: bool,
}

impl<P: FrameProducer> StreamingConverter<P> {
    /// Creates a converter from `from` to `to` over `producer`.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::UnsupportedConversion`] if either spec has a
    /// zero sample rate or zero channels.
    pub fn new(
        from: PcmSpec,
        to: PcmSpec,
        producer: P,
        dither: DitherMode,
        mix_mode: ChannelMixMode,
    ) -> Result<Self, AudioError> {
        check_specs(&from, &to)?;
        Ok(Self {
            from,
            to,
            producer,
            mix_mode,
            resampler: Resampler::new(from.sample_rate, to.sample_rate, to.channels),
            requantizer: Requantizer::new(to.format, dither, from.format.bit_depth()),
            exhausted: false,
            failed: false,
        })
    }

    /// Returns the source stream description.
    #[must_use]
    pub fn from_spec(&self) -> PcmSpec {
        self.from
    }

    /// Returns the target stream description.
    #[must_use]
    pub fn to_spec(&self) -> PcmSpec {
        self.to
    }

    /// Returns a mutable reference to the upstream producer.
    pub fn producer_mut(&mut self) -> &mut P {
        &mut self.producer
    }

    /// Consumes the converter, returning the upstream producer.
    pub fn into_producer(self) -> P {
        self.producer
    }

    /// Total input frames consumed from the producer so far.
    #[must_use]
    pub fn frames_consumed(&self) -> u64 {
        self.resampler.input_frames()
    }

    /// Forgets all buffered input and position state and treats the
    /// upstream as fresh, e.g. after repositioning it.
    pub fn restart(&mut self) {
        self.resampler.reset();
        self.exhausted = false;
        self.failed = false;
    }

    /// Produces up to `frames` frames in the target format.
    ///
    /// Returns a short or empty buffer only when the upstream is exhausted;
    /// every call after the stream ends returns an empty buffer.
    ///
    /// # Errors
    ///
    /// [`AudioError::ProducerOverrun`] if the upstream returned more frames
    /// than requested, [`AudioError::FrameSizeMismatch`] if it returned a
    /// buffer that does not match the source spec. Both are fatal: the
    /// converter refuses further work with [`AudioError::InvalidState`].
    pub fn convert_next(&mut self, frames: usize) -> Result<FrameBuffer, AudioError> {
        if self.failed {
            return Err(AudioError::InvalidState {
                reason: "converter stopped after an upstream contract violation".to_string(),
            });
        }
        if frames == 0 {
            return Ok(FrameBuffer::empty(self.to.format, self.to.channels));
        }

        if !self.exhausted {
            let needed = self.resampler.input_needed(frames);
            if needed > 0 {
                match self.producer.next_frames(needed) {
                    None => self.exhausted = true,
                    Some(block) => {
                        self.ingest(block, needed)?;
                    }
                }
            }
        }

        let take = self.resampler.available(self.exhausted).min(frames);
        let mixed = self.resampler.pull(take, self.exhausted);
        Ok(self.requantizer.encode(&mixed, self.to.channels))
    }

    fn ingest(&mut self, block: FrameBuffer, requested: usize) -> Result<(), AudioError> {
        if block.frame_count() > requested {
            self.failed = true;
            return Err(AudioError::ProducerOverrun {
                returned: block.frame_count(),
                requested,
            });
        }
        if block.format() != self.from.format || block.channels() != self.from.channels {
            self.failed = true;
            return Err(AudioError::FrameSizeMismatch {
                reason: format!(
                    "producer returned {} x{} frames, converter expects {} x{}",
                    block.format(),
                    block.channels(),
                    self.from.format,
                    self.from.channels
                ),
            });
        }
        if block.frame_count() < requested {
            self.exhausted = true;
        }
        if !block.is_empty() {
            let decoded = sample::to_f64(&block);
            let mixed =
                channels::mix(&decoded, self.from.channels, self.to.channels, self.mix_mode);
            self.resampler.push(&mixed);
        }
        Ok(())
    }
}

impl<P: FrameProducer> FrameProducer for StreamingConverter<P> {
    fn next_frames(&mut self, frames: usize) -> Option<FrameBuffer> {
        match self.convert_next(frames) {
            Ok(block) if block.is_empty() => None,
            Ok(block) => Some(block),
            Err(err) => {
                tracing::error!(error = %err, "streaming conversion failed");
                None
            }
        }
    }
}

pub(crate) fn check_specs(from: &PcmSpec, to: &PcmSpec) -> Result<(), AudioError> {
    for (spec, side) in [(from, "source"), (to, "target")] {
        if spec.sample_rate == 0 {
            return Err(AudioError::UnsupportedConversion {
                reason: format!("{side} sample rate must be non-zero"),
            });
        }
        if spec.channels == 0 {
            return Err(AudioError::UnsupportedConversion {
                reason: format!("{side} channel count must be non-zero"),
            });
        }
    }
    Ok(())
}
