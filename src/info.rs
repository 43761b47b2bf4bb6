//! Metadata about encoded audio sources.

use std::path::Path;
use std::time::Duration;

use crate::{FrameBuffer, SampleFormat};

/// Audio container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileFormat {
    /// RIFF WAVE.
    Wav,
    /// FLAC.
    Flac,
    /// MPEG layer III.
    Mp3,
    /// Ogg Vorbis.
    Vorbis,
    /// Unknown or to-be-probed.
    #[default]
    Unknown,
}

impl FileFormat {
    /// Guesses the container format from a file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("wav") => Self::Wav,
            Some("flac") => Self::Flac,
            Some("mp3") => Self::Mp3,
            Some("ogg" | "vorbis") => Self::Vorbis,
            _ => Self::Unknown,
        }
    }

    /// Returns the conventional file extension, used as a probe hint.
    #[must_use]
    pub fn extension(self) -> Option<&'static str> {
        match self {
            Self::Wav => Some("wav"),
            Self::Flac => Some("flac"),
            Self::Mp3 => Some("mp3"),
            Self::Vorbis => Some("ogg"),
            Self::Unknown => None,
        }
    }
}

/// Properties of an encoded audio source, produced by a one-shot probe.
///
/// Immutable once constructed. `num_frames` is `None` for sources whose
/// length is unknown up front (e.g. forward-only streams); `duration` is
/// derived from it and shares its optionality.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundFileInfo {
    /// Display name: the file path, or `"<memory>"` / `"<stream>"`.
    pub name: String,
    /// Container format.
    pub file_format: FileFormat,
    /// Number of channels.
    pub nchannels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// The sample format the codec natively decodes to.
    pub sample_format: SampleFormat,
    /// Total PCM frame count, if the container declares one.
    pub num_frames: Option<u64>,
}

impl SoundFileInfo {
    /// Returns the total play time, if the frame count is known.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        if self.sample_rate == 0 {
            return None;
        }
        self.num_frames
            .map(|n| Duration::from_secs_f64(n as f64 / f64::from(self.sample_rate)))
    }

    /// Returns the width of one native sample in bytes.
    #[must_use]
    pub fn sample_width(&self) -> usize {
        self.sample_format.bytes_per_sample()
    }
}

impl std::fmt::Display for SoundFileInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<SoundFileInfo: '{}' {:?} {} ch, {} hz, {}, ",
            self.name, self.file_format, self.nchannels, self.sample_rate, self.sample_format
        )?;
        match (self.num_frames, self.duration()) {
            (Some(n), Some(d)) => write!(f, "{} frames={:.2} sec.>", n, d.as_secs_f64()),
            _ => write!(f, "unknown length>"),
        }
    }
}

/// A fully decoded audio source: metadata plus the materialized samples.
///
/// Owns its sample buffer exclusively; dropping it releases everything.
#[derive(Debug, Clone)]
pub struct DecodedSoundFile {
    /// Source metadata. `num_frames` always matches `samples.frame_count()`.
    pub info: SoundFileInfo,
    /// The decoded, interleaved PCM frames.
    pub samples: FrameBuffer,
}

impl DecodedSoundFile {
    /// Builds the decoded file, deriving frame count and duration from the
    /// sample buffer.
    #[must_use]
    pub fn new(name: impl Into<String>, sample_rate: u32, samples: FrameBuffer) -> Self {
        let info = SoundFileInfo {
            name: name.into(),
            file_format: FileFormat::Unknown,
            nchannels: samples.channels(),
            sample_rate,
            sample_format: samples.format(),
            num_frames: Some(samples.frame_count() as u64),
        };
        Self { info, samples }
    }

    /// Returns the number of decoded frames.
    #[must_use]
    pub fn num_frames(&self) -> u64 {
        self.samples.frame_count() as u64
    }

    /// Returns the total play time.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.samples.duration(self.info.sample_rate)
    }
}
