//! Decoding encoded audio (WAV, FLAC, MP3, Ogg Vorbis) to PCM.
//!
//! Three levels of commitment:
//! - [`probe_file`] / [`probe`] read metadata only.
//! - [`read_file`] and [`decode_file`] / [`decode_memory`] materialize a whole
//!   file into a [`DecodedSoundFile`], either in the stream's native format
//!   or converted to a caller-chosen [`PcmSpec`].
//! - [`Decoder`] decodes incrementally with conversion, for streams too big
//!   to hold or destined for a device.

mod codec;

use std::fs::File;
use std::path::Path;

use symphonia::core::io::MediaSourceStream;

use codec::CodecStream;

use crate::byte_source::{ByteSource, MemorySource, SourceReader};
use crate::convert::{ChannelMixMode, DitherMode, StreamingConverter};
use crate::producer::FrameProducer;
use crate::{
    DecodeError, DecodedSoundFile, FileFormat, FrameBuffer, PcmSpec, SampleFormat, SoundFileInfo,
};

const READ_CHUNK_FRAMES: usize = 4096;

fn open_path(path: &Path) -> Result<CodecStream, DecodeError> {
    let file = File::open(path).map_err(|e| DecodeError::OpenFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());
    CodecStream::open(stream, FileFormat::from_path(path), path.display().to_string())
}

fn open_byte_source(
    source: Box<dyn ByteSource>,
    hint: FileFormat,
    name: &str,
) -> Result<CodecStream, DecodeError> {
    let stream = MediaSourceStream::new(Box::new(SourceReader::new(source)), Default::default());
    CodecStream::open(stream, hint, name)
}

/// Reads a file's metadata without decoding its audio.
///
/// # Errors
///
/// [`DecodeError::OpenFile`] if the file cannot be read,
/// [`DecodeError::UnsupportedContainer`] if it is not a recognized audio
/// format.
pub fn probe_file(path: impl AsRef<Path>) -> Result<SoundFileInfo, DecodeError> {
    Ok(open_path(path.as_ref())?.info())
}

/// Reads a byte source's metadata without decoding its audio.
///
/// # Errors
///
/// [`DecodeError::UnsupportedContainer`] if the bytes are not a recognized
/// audio format.
pub fn probe(source: Box<dyn ByteSource>) -> Result<SoundFileInfo, DecodeError> {
    Ok(open_byte_source(source, FileFormat::Unknown, "<stream>")?.info())
}

/// Reads an in-memory encoded file's metadata without decoding its audio.
///
/// # Errors
///
/// As for [`probe`].
pub fn probe_memory(data: Vec<u8>) -> Result<SoundFileInfo, DecodeError> {
    probe(Box::new(MemorySource::new(data)))
}

/// Decodes a whole file in its native sample format, rate, and channels.
///
/// # Errors
///
/// Open/probe/decode failures as for [`probe_file`];
/// [`DecodeError::NeedsConversion`] for an Ogg Vorbis stream whose decode
/// target is anything but signed 16-bit (use [`decode_file`] to pick a
/// format explicitly).
pub fn read_file(path: impl AsRef<Path>) -> Result<DecodedSoundFile, DecodeError> {
    let mut stream = open_path(path.as_ref())?;
    let mut info = stream.info();
    if info.file_format == FileFormat::Vorbis && info.sample_format != SampleFormat::Signed16 {
        return Err(DecodeError::NeedsConversion {
            format: info.sample_format.to_string(),
        });
    }

    let spec = stream.spec();
    let mut samples = FrameBuffer::empty(spec.format, spec.channels);
    loop {
        let block = stream.read(READ_CHUNK_FRAMES)?;
        if block.is_empty() {
            break;
        }
        samples
            .extend(&block)
            .map_err(|e| DecodeError::failed(e.to_string()))?;
    }
    info.num_frames = Some(samples.frame_count() as u64);
    Ok(DecodedSoundFile { info, samples })
}

fn decode_stream(
    stream: CodecStream,
    to: PcmSpec,
    dither: DitherMode,
) -> Result<DecodedSoundFile, DecodeError> {
    let mut info = stream.info();
    let native = stream.spec();
    let mut conv =
        StreamingConverter::new(native, to, stream, dither, ChannelMixMode::Rectangular)
            .map_err(|e| DecodeError::failed(e.to_string()))?;

    let mut samples = FrameBuffer::empty(to.format, to.channels);
    loop {
        let block = conv
            .convert_next(READ_CHUNK_FRAMES)
            .map_err(|e| DecodeError::failed(e.to_string()))?;
        if block.is_empty() {
            break;
        }
        samples
            .extend(&block)
            .map_err(|e| DecodeError::failed(e.to_string()))?;
    }

    info.sample_format = to.format;
    info.nchannels = to.channels;
    info.sample_rate = to.sample_rate;
    info.num_frames = Some(samples.frame_count() as u64);
    Ok(DecodedSoundFile { info, samples })
}

/// Decodes a whole file, converting to the given format triple.
///
/// `PcmSpec::default()` gives the conventional signed 16-bit stereo
/// 44100 Hz target. Dither applies only when the conversion reduces bit
/// depth.
///
/// # Errors
///
/// Open/probe/decode failures as for [`probe_file`].
pub fn decode_file(
    path: impl AsRef<Path>,
    to: PcmSpec,
    dither: DitherMode,
) -> Result<DecodedSoundFile, DecodeError> {
    decode_stream(open_path(path.as_ref())?, to, dither)
}

/// Decodes an in-memory encoded file, converting to the given format triple.
///
/// # Errors
///
/// As for [`decode_file`].
pub fn decode_memory(
    data: Vec<u8>,
    to: PcmSpec,
    dither: DitherMode,
) -> Result<DecodedSoundFile, DecodeError> {
    decode_stream(
        open_byte_source(Box::new(MemorySource::new(data)), FileFormat::Unknown, "<memory>")?,
        to,
        dither,
    )
}

/// An incremental decoder with built-in format conversion.
///
/// Pulls compressed packets on demand, so arbitrarily large files decode in
/// constant memory. Output frames are in the target [`PcmSpec`] handed to
/// the constructor; [`Decoder`] implements [`FrameProducer`] and can feed a
/// playback device directly.
///
/// # Example
///
/// ```no_run
/// use pcm_stream::{Decoder, DitherMode, PcmSpec};
///
/// let mut decoder = Decoder::open_file("music.flac", PcmSpec::default(), DitherMode::None)?;
/// loop {
///     let block = decoder.read(1024)?;
///     if block.is_empty() {
///         break;
///     }
///     // use block
/// }
/// # Ok::<(), pcm_stream::DecodeError>(())
/// ```
pub struct Decoder {
    conv: Option<StreamingConverter<CodecStream>>,
    info: SoundFileInfo,
    output: PcmSpec,
    position: u64,
}

impl Decoder {
    /// Opens a file for streaming decode to the `to` format.
    ///
    /// # Errors
    ///
    /// As for [`probe_file`].
    pub fn open_file(
        path: impl AsRef<Path>,
        to: PcmSpec,
        dither: DitherMode,
    ) -> Result<Self, DecodeError> {
        Self::from_stream(open_path(path.as_ref())?, to, dither)
    }

    /// Opens an in-memory encoded file for streaming decode.
    ///
    /// # Errors
    ///
    /// As for [`probe`].
    pub fn open_memory(
        data: Vec<u8>,
        to: PcmSpec,
        dither: DitherMode,
    ) -> Result<Self, DecodeError> {
        Self::from_stream(
            open_byte_source(Box::new(MemorySource::new(data)), FileFormat::Unknown, "<memory>")?,
            to,
            dither,
        )
    }

    /// Opens an arbitrary byte source for streaming decode.
    ///
    /// `hint` narrows the container probe for sources with no file name;
    /// `FileFormat::Unknown` probes by content alone. Forward-only sources
    /// decode fine; [`seek`](Self::seek) then fails recoverably.
    ///
    /// # Errors
    ///
    /// As for [`probe`].
    pub fn open_source(
        source: Box<dyn ByteSource>,
        hint: FileFormat,
        to: PcmSpec,
        dither: DitherMode,
    ) -> Result<Self, DecodeError> {
        Self::from_stream(open_byte_source(source, hint, "<stream>")?, to, dither)
    }

    fn from_stream(
        stream: CodecStream,
        to: PcmSpec,
        dither: DitherMode,
    ) -> Result<Self, DecodeError> {
        let info = stream.info();
        let native = stream.spec();
        let conv = StreamingConverter::new(native, to, stream, dither, ChannelMixMode::Rectangular)
            .map_err(|e| DecodeError::failed(e.to_string()))?;
        Ok(Self {
            conv: Some(conv),
            info,
            output: to,
            position: 0,
        })
    }

    /// The source's native metadata, as probed.
    #[must_use]
    pub fn info(&self) -> &SoundFileInfo {
        &self.info
    }

    /// The format frames come out in.
    #[must_use]
    pub fn output_spec(&self) -> PcmSpec {
        self.output
    }

    /// Output frames delivered since open or the last seek target.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Reads up to `frames` output frames.
    ///
    /// A short or empty buffer means the stream has ended; a closed decoder
    /// always returns an empty buffer.
    ///
    /// # Errors
    ///
    /// [`DecodeError::Failed`] on a mid-stream decode or conversion failure.
    pub fn read(&mut self, frames: usize) -> Result<FrameBuffer, DecodeError> {
        let Some(conv) = &mut self.conv else {
            return Ok(FrameBuffer::empty(self.output.format, self.output.channels));
        };
        let block = conv
            .convert_next(frames)
            .map_err(|e| DecodeError::failed(e.to_string()))?;
        self.position += block.frame_count() as u64;
        Ok(block)
    }

    /// Repositions so that the next [`read`](Self::read) starts at output
    /// frame `frame`.
    ///
    /// The target is in the *output* frame domain; it is mapped to the
    /// nearest source frame at the native rate.
    ///
    /// # Errors
    ///
    /// [`DecodeError::SeekFailed`] if the source cannot seek, the target is
    /// past the end, or the decoder is closed. The decoder remains usable
    /// for forward reads afterwards.
    pub fn seek(&mut self, frame: u64) -> Result<(), DecodeError> {
        let Some(conv) = &mut self.conv else {
            return Err(DecodeError::SeekFailed {
                reason: "decoder is closed".to_string(),
            });
        };
        let native_rate = u64::from(self.info.sample_rate);
        let out_rate = u64::from(self.output.sample_rate);
        let native_frame = frame * native_rate / out_rate;
        conv.producer_mut().seek_to_frame(native_frame)?;
        conv.restart();
        self.position = frame;
        Ok(())
    }

    /// Releases the underlying source. Safe to call more than once; further
    /// reads return empty buffers.
    pub fn close(&mut self) {
        self.conv = None;
    }
}

impl FrameProducer for Decoder {
    fn next_frames(&mut self, frames: usize) -> Option<FrameBuffer> {
        match self.read(frames) {
            Ok(block) if block.is_empty() => None,
            Ok(block) => Some(block),
            Err(err) => {
                tracing::error!(error = %err, "decoder failed mid-stream");
                None
            }
        }
    }
}
