//! Audio playback, capture, and full-duplex streaming with decoding of
//! WAV, FLAC, MP3, and Ogg Vorbis files to PCM.
//!
//! Three layers, usable independently:
//!
//! - **Decoding** ([`probe_file`], [`read_file`], [`decode_file`],
//!   [`Decoder`]): turn encoded audio into interleaved PCM, either
//!   materialized in one buffer or streamed in constant memory.
//! - **Conversion** ([`convert_frames`], [`StreamingConverter`]): change
//!   sample format, channel count, and sample rate, in bulk or pull-based.
//!   Streaming output is byte-identical to the bulk equivalent regardless
//!   of chunking.
//! - **Devices** ([`PlaybackDevice`], [`CaptureDevice`], [`DuplexDevice`],
//!   [`Devices`]): real-time streams on the system backend, fed through the
//!   pull/push traits in [`producer`].
//!
//! # Playing a file
//!
//! ```no_run
//! use pcm_stream::{
//!     decode_file, BufferProducer, DeviceConfig, DitherMode, PcmSpec, PlaybackDevice,
//! };
//!
//! let decoded = decode_file("music.flac", PcmSpec::default(), DitherMode::None)?;
//! let mut device = PlaybackDevice::new(DeviceConfig::default())?;
//! device.start(Box::new(BufferProducer::new(decoded.samples)), None)?;
//! while device.is_running() {
//!     std::thread::sleep(std::time::Duration::from_millis(50));
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Converting audio
//!
//! ```
//! use pcm_stream::{convert_frames, ChannelMixMode, DitherMode, FrameBuffer, PcmSpec, SampleFormat};
//!
//! let mono = FrameBuffer::from_i16(&[0, 1000, 2000, 3000], 1);
//! let to = PcmSpec::new(SampleFormat::Float32, 2, 88200);
//! let stereo = convert_frames(&mono, 44100, to, DitherMode::None, ChannelMixMode::Rectangular)?;
//! assert_eq!(stereo.frame_count(), 8);
//! # Ok::<(), pcm_stream::AudioError>(())
//! ```
//!
//! # Threading
//!
//! Device callbacks run on the backend's real-time thread. Producers,
//! consumers, and stop callbacks move into that thread at `start()`;
//! device handles themselves stay on the thread that created them. A
//! device that stops involuntarily (producer exhausted, hardware failure)
//! is observed through `is_running()` or the stop callback, never as an
//! error return.

#![warn(missing_docs)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

pub mod byte_source;
pub mod convert;
pub mod decode;
pub mod device;
mod error;
mod frame;
mod info;
pub mod producer;

pub use byte_source::{ByteSource, MemorySource, SeekOrigin};
pub use convert::{
    convert_all, convert_frames, convert_sample_format, frame_count_after_resampling,
    ChannelMixMode, DitherMode, StreamingConverter,
};
pub use decode::{decode_file, decode_memory, probe, probe_file, probe_memory, read_file, Decoder};
pub use device::{
    CaptureDevice, DeviceConfig, DeviceFormat, DeviceId, DeviceInfo, Devices, DuplexDevice,
    PlaybackDevice, RunState, StopCallback,
};
pub use error::{AudioError, DecodeError};
pub use frame::{FrameBuffer, PcmSpec, SampleFormat};
pub use info::{DecodedSoundFile, FileFormat, SoundFileInfo};
pub use producer::{
    BufferConsumer, BufferProducer, CallbackProducer, DuplexCallback, FrameConsumer, FrameProducer,
    HookedProducer,
};
