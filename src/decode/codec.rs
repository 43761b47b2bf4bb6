//! Container probing and packet decoding on top of symphonia.
//!
//! [`CodecStream`] owns the format reader and codec decoder for one encoded
//! stream and exposes it as a pull-based supply of interleaved PCM frames in
//! the stream's native format. Rate/format/channel conversion happens a
//! layer up, in [`Decoder`](crate::Decoder).

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder as SymphoniaDecoder, DecoderOptions, CODEC_TYPE_FLAC, CODEC_TYPE_MP3, CODEC_TYPE_NULL, CODEC_TYPE_VORBIS};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;

use crate::convert::sample::Requantizer;
use crate::convert::DitherMode;
use crate::producer::FrameProducer;
use crate::{DecodeError, FileFormat, FrameBuffer, PcmSpec, SampleFormat, SoundFileInfo};

/// A decoded-on-demand stream of native-format PCM frames.
pub(crate) struct CodecStream {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn SymphoniaDecoder>,
    track_id: u32,
    spec: PcmSpec,
    file_format: FileFormat,
    num_frames: Option<u64>,
    name: String,
    /// Decoded frames not yet handed out.
    pending: FrameBuffer,
    eof: bool,
}

impl CodecStream {
    /// Probes the stream and prepares a decoder for its default track.
    pub(crate) fn open(
        stream: MediaSourceStream,
        hint_format: FileFormat,
        name: impl Into<String>,
    ) -> Result<Self, DecodeError> {
        let mut hint = Hint::new();
        if let Some(ext) = hint_format.extension() {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| DecodeError::UnsupportedContainer {
                reason: e.to_string(),
            })?;
        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::UnsupportedContainer {
                reason: "no decodable audio track".to_string(),
            })?;
        let params = &track.codec_params;
        let track_id = track.id;

        let channels = params
            .channels
            .map(|c| c.count() as u16)
            .filter(|&c| c > 0)
            .ok_or_else(|| DecodeError::failed("track declares no channels"))?;
        let sample_rate = params
            .sample_rate
            .filter(|&r| r > 0)
            .ok_or_else(|| DecodeError::failed("track declares no sample rate"))?;
        let format = native_format(params);
        let file_format = if hint_format != FileFormat::Unknown {
            hint_format
        } else {
            match params.codec {
                CODEC_TYPE_MP3 => FileFormat::Mp3,
                CODEC_TYPE_FLAC => FileFormat::Flac,
                CODEC_TYPE_VORBIS => FileFormat::Vorbis,
                _ => FileFormat::Unknown,
            }
        };
        let num_frames = params.n_frames;

        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| DecodeError::UnsupportedContainer {
                reason: format!("no decoder for track codec: {e}"),
            })?;

        Ok(Self {
            reader,
            decoder,
            track_id,
            spec: PcmSpec::new(format, channels, sample_rate),
            file_format,
            num_frames,
            name: name.into(),
            pending: FrameBuffer::empty(format, channels),
            eof: false,
        })
    }

    /// The stream's native format triple.
    pub(crate) fn spec(&self) -> PcmSpec {
        self.spec
    }

    pub(crate) fn info(&self) -> SoundFileInfo {
        SoundFileInfo {
            name: self.name.clone(),
            file_format: self.file_format,
            nchannels: self.spec.channels,
            sample_rate: self.spec.sample_rate,
            sample_format: self.spec.format,
            num_frames: self.num_frames,
        }
    }

    /// Reads up to `frames` frames in the native format.
    ///
    /// A short or empty return means end of stream.
    pub(crate) fn read(&mut self, frames: usize) -> Result<FrameBuffer, DecodeError> {
        while self.pending.frame_count() < frames && !self.eof {
            self.decode_next_packet()?;
        }
        Ok(self.pending.split_front(frames))
    }

    /// Repositions to the given native frame index.
    ///
    /// Seeks the container to the nearest preceding sync point, then decodes
    /// and discards frames up to the exact target.
    pub(crate) fn seek_to_frame(&mut self, frame: u64) -> Result<(), DecodeError> {
        let seeked = self
            .reader
            .seek(
                SeekMode::Coarse,
                SeekTo::TimeStamp {
                    ts: frame,
                    track_id: self.track_id,
                },
            )
            .map_err(|e| DecodeError::SeekFailed {
                reason: e.to_string(),
            })?;
        self.decoder.reset();
        self.pending = FrameBuffer::empty(self.spec.format, self.spec.channels);
        self.eof = false;

        let mut skip = frame.saturating_sub(seeked.actual_ts);
        while skip > 0 {
            let chunk = 4096.min(skip) as usize;
            let got = self.read(chunk)?;
            if got.is_empty() {
                return Err(DecodeError::SeekFailed {
                    reason: format!("stream ended before frame {frame}"),
                });
            }
            skip -= got.frame_count() as u64;
        }
        Ok(())
    }

    fn decode_next_packet(&mut self) -> Result<(), DecodeError> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.eof = true;
                    return Ok(());
                }
                Err(SymphoniaError::IoError(e)) => {
                    return Err(DecodeError::SourceRead { source: e })
                }
                Err(e) => return Err(DecodeError::failed(e.to_string())),
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    append_decoded(&mut self.pending, self.spec, &decoded)?;
                    return Ok(());
                }
                // Corrupt packets are skipped, not fatal
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::warn!(error = %e, "skipping undecodable packet");
                    continue;
                }
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.eof = true;
                    return Ok(());
                }
                Err(e) => return Err(DecodeError::failed(e.to_string())),
            }
        }
    }

}

fn append_decoded(
    pending: &mut FrameBuffer,
    spec: PcmSpec,
    decoded: &AudioBufferRef<'_>,
) -> Result<(), DecodeError> {
    let channels = decoded.spec().channels.count();
    if channels != usize::from(spec.channels) {
        tracing::warn!(
            got = channels,
            expected = spec.channels,
            "skipping packet with unexpected channel layout"
        );
        return Ok(());
    }
    let samples = interleave_to_f64(decoded);
    // Dither never applies at this stage; the requantizer is a plain
    // rounding encoder to the native format
    let mut rq = Requantizer::new(spec.format, DitherMode::None, 64);
    let block = rq.encode(&samples, spec.channels);
    pending
        .extend(&block)
        .map_err(|e| DecodeError::failed(e.to_string()))
}

impl FrameProducer for CodecStream {
    fn next_frames(&mut self, frames: usize) -> Option<FrameBuffer> {
        match self.read(frames) {
            Ok(block) if block.is_empty() => None,
            Ok(block) => Some(block),
            Err(err) => {
                tracing::error!(error = %err, "decode failed mid-stream");
                None
            }
        }
    }
}

/// Resolves the in-memory format this stream decodes to.
fn native_format(params: &symphonia::core::codecs::CodecParameters) -> SampleFormat {
    use symphonia::core::sample::SampleFormat as Sf;
    if let Some(sf) = params.sample_format {
        return match sf {
            Sf::U8 | Sf::S8 => SampleFormat::Unsigned8,
            Sf::U16 | Sf::S16 => SampleFormat::Signed16,
            Sf::U24 | Sf::S24 => SampleFormat::Signed24,
            Sf::U32 | Sf::S32 => SampleFormat::Signed32,
            Sf::F32 | Sf::F64 => SampleFormat::Float32,
        };
    }
    if let Some(bits) = params.bits_per_sample {
        return match bits {
            0..=8 => SampleFormat::Unsigned8,
            9..=16 => SampleFormat::Signed16,
            17..=24 => SampleFormat::Signed24,
            _ => SampleFormat::Signed32,
        };
    }
    // Lossy codecs rarely declare a format; both decode targets here are
    // conventionally 16-bit
    match params.codec {
        CODEC_TYPE_MP3 | CODEC_TYPE_VORBIS => SampleFormat::Signed16,
        _ => SampleFormat::Float32,
    }
}

fn interleave_to_f64(decoded: &AudioBufferRef<'_>) -> Vec<f64> {
    match decoded {
        AudioBufferRef::U8(b) => interleave(b.as_ref(), |v| (f64::from(v) - 128.0) / 128.0),
        AudioBufferRef::U16(b) => interleave(b.as_ref(), |v| (f64::from(v) - 32768.0) / 32768.0),
        AudioBufferRef::U24(b) => {
            interleave(b.as_ref(), |v| (f64::from(v.inner()) - 8_388_608.0) / 8_388_608.0)
        }
        AudioBufferRef::U32(b) => {
            interleave(b.as_ref(), |v| (f64::from(v) - 2_147_483_648.0) / 2_147_483_648.0)
        }
        AudioBufferRef::S8(b) => interleave(b.as_ref(), |v| f64::from(v) / 128.0),
        AudioBufferRef::S16(b) => interleave(b.as_ref(), |v| f64::from(v) / 32768.0),
        AudioBufferRef::S24(b) => interleave(b.as_ref(), |v| f64::from(v.inner()) / 8_388_608.0),
        AudioBufferRef::S32(b) => interleave(b.as_ref(), |v| f64::from(v) / 2_147_483_648.0),
        AudioBufferRef::F32(b) => interleave(b.as_ref(), f64::from),
        AudioBufferRef::F64(b) => interleave(b.as_ref(), |v| v),
    }
}

fn interleave<S: Sample>(buf: &AudioBuffer<S>, to_f64: impl Fn(S) -> f64) -> Vec<f64> {
    let channels = buf.spec().channels.count();
    let frames = buf.frames();
    let mut out = Vec::with_capacity(frames * channels);
    for frame in 0..frames {
        for ch in 0..channels {
            out.push(to_f64(buf.chan(ch)[frame]));
        }
    }
    out
}
