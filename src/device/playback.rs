//! Playback device built on the system audio backend.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};

use crate::device::bridge::PlaybackBridge;
use crate::device::{
    backend_format, resolve_output, DeviceConfig, RunState, StopCallback, StreamShared,
};
use crate::producer::FrameProducer;
use crate::{AudioError, PcmSpec};

/// Sample types that cross the backend boundary as little-endian bytes.
pub(crate) trait BackendSample: cpal::SizedSample + Send + 'static {
    const BYTES: usize;
    fn from_le(bytes: &[u8]) -> Self;
    fn write_le(self, out: &mut [u8]);
}

impl BackendSample for u8 {
    const BYTES: usize = 1;
    fn from_le(bytes: &[u8]) -> Self {
        bytes[0]
    }
    fn write_le(self, out: &mut [u8]) {
        out[0] = self;
    }
}

impl BackendSample for i16 {
    const BYTES: usize = 2;
    fn from_le(bytes: &[u8]) -> Self {
        i16::from_le_bytes([bytes[0], bytes[1]])
    }
    fn write_le(self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_le_bytes());
    }
}

impl BackendSample for i32 {
    const BYTES: usize = 4;
    fn from_le(bytes: &[u8]) -> Self {
        i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
    fn write_le(self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_le_bytes());
    }
}

impl BackendSample for f32 {
    const BYTES: usize = 4;
    fn from_le(bytes: &[u8]) -> Self {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
    fn write_le(self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_le_bytes());
    }
}

pub(crate) fn error_callback(shared: Arc<StreamShared>) -> impl FnMut(cpal::StreamError) {
    move |err| {
        tracing::error!(error = %err, "audio stream failed; stopping device");
        shared.signal_stop();
    }
}

fn build_stream<T: BackendSample>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut bridge: PlaybackBridge,
    shared: Arc<StreamShared>,
) -> Result<cpal::Stream, AudioError> {
    let mut scratch: Vec<u8> = Vec::new();
    device
        .build_output_stream::<T, _, _>(
            config,
            move |data, _| {
                scratch.resize(data.len() * T::BYTES, 0);
                bridge.fill(&mut scratch);
                for (sample, bytes) in data.iter_mut().zip(scratch.chunks_exact(T::BYTES)) {
                    *sample = T::from_le(bytes);
                }
            },
            error_callback(shared),
            None,
        )
        .map_err(|e| AudioError::Backend(e.to_string()))
}

/// Plays PCM audio pulled from a [`FrameProducer`].
///
/// The producer runs on the backend's real-time thread; when it returns a
/// short block or `None` the device plays what remains, pads the period
/// with silence, stops, and fires the stop callback registered at
/// [`start`](Self::start).
///
/// # Example
///
/// ```no_run
/// use pcm_stream::{decode_file, BufferProducer, DeviceConfig, DitherMode, PcmSpec, PlaybackDevice};
///
/// let decoded = decode_file("music.mp3", PcmSpec::default(), DitherMode::None)?;
/// let mut device = PlaybackDevice::new(DeviceConfig::default())?;
/// device.start(
///     Box::new(BufferProducer::new(decoded.samples)),
///     Some(Box::new(|| println!("finished"))),
/// )?;
/// // ... audio plays in the background until stopped or exhausted
/// device.stop();
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct PlaybackDevice {
    device: cpal::Device,
    config: DeviceConfig,
    shared: Arc<StreamShared>,
    stream: Option<cpal::Stream>,
}

impl PlaybackDevice {
    /// Opens the configured (or default) output device.
    ///
    /// # Errors
    ///
    /// [`AudioError::UnsupportedFormat`] for packed 24-bit specs,
    /// [`AudioError::NoDefaultDevice`] / [`AudioError::DeviceNotFound`] when
    /// device resolution fails.
    pub fn new(config: DeviceConfig) -> Result<Self, AudioError> {
        backend_format(config.spec.format)?;
        let host = cpal::default_host();
        let device = resolve_output(&host, config.device.as_ref())?;
        Ok(Self {
            device,
            config,
            shared: Arc::new(StreamShared::new()),
            stream: None,
        })
    }

    /// The stream format at the callback boundary.
    #[must_use]
    pub fn spec(&self) -> PcmSpec {
        self.config.spec
    }

    /// Whether the device is currently streaming.
    ///
    /// Flips to `false` on explicit [`stop`](Self::stop) and on involuntary
    /// stops alike.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.run_state() == RunState::Started
    }

    /// Starts playback, pulling frames from `producer`.
    ///
    /// `on_stop` fires exactly once when this run stops, whether through an
    /// explicit [`stop`](Self::stop) or involuntarily; it is discarded
    /// unfired only if this call fails.
    ///
    /// # Errors
    ///
    /// [`AudioError::InvalidState`] if the device is already started or
    /// closed, [`AudioError::Backend`] if the backend rejects the stream.
    pub fn start(
        &mut self,
        producer: Box<dyn FrameProducer>,
        on_stop: Option<StopCallback>,
    ) -> Result<(), AudioError> {
        match self.shared.run_state() {
            RunState::Started => {
                return Err(AudioError::InvalidState {
                    reason: "device is already started".to_string(),
                })
            }
            RunState::Closed => {
                return Err(AudioError::InvalidState {
                    reason: "device is closed".to_string(),
                })
            }
            RunState::Stopped => {}
        }

        // A stream left over from an involuntary stop must go before the
        // new run becomes observable as Started; its bridge gates on the
        // same shared state
        self.stream = None;

        self.shared.install_stop(on_stop);
        let bridge = PlaybackBridge::new(producer, self.config.spec, Arc::clone(&self.shared));
        let stream_config = super::stream_config(&self.config);
        let stream = match backend_format(self.config.spec.format)? {
            cpal::SampleFormat::U8 => {
                build_stream::<u8>(&self.device, &stream_config, bridge, Arc::clone(&self.shared))
            }
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&self.device, &stream_config, bridge, Arc::clone(&self.shared))
            }
            cpal::SampleFormat::I32 => {
                build_stream::<i32>(&self.device, &stream_config, bridge, Arc::clone(&self.shared))
            }
            _ => {
                build_stream::<f32>(&self.device, &stream_config, bridge, Arc::clone(&self.shared))
            }
        };
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                self.shared.clear_stop();
                return Err(e);
            }
        };

        // Started before play(): the first period can fire immediately
        self.shared.set_state(RunState::Started);
        if let Err(e) = stream.play() {
            self.shared.set_state(RunState::Stopped);
            self.shared.clear_stop();
            return Err(AudioError::Backend(e.to_string()));
        }
        self.stream = Some(stream);
        tracing::debug!(spec = ?self.config.spec, "playback started");
        Ok(())
    }

    /// Stops playback and discards the producer.
    ///
    /// Fires the stop callback from [`start`](Self::start) if the device
    /// was running; a no-op otherwise.
    pub fn stop(&mut self) {
        self.shared.signal_stop();
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                tracing::warn!(error = %e, "backend refused pause during stop");
            }
        }
    }

    /// Stops and permanently closes the device. Idempotent; dropping the
    /// device closes it too.
    pub fn close(&mut self) {
        self.stop();
        self.shared.set_state(RunState::Closed);
    }
}

impl Drop for PlaybackDevice {
    fn drop(&mut self) {
        self.close();
    }
}
