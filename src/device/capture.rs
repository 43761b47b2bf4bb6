//! Capture device built on the system audio backend.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};

use crate::device::bridge::CaptureBridge;
use crate::device::playback::{error_callback, BackendSample};
use crate::device::{
    backend_format, resolve_input, DeviceConfig, RunState, StopCallback, StreamShared,
};
use crate::producer::FrameConsumer;
use crate::{AudioError, PcmSpec};

fn build_stream<T: BackendSample>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut bridge: CaptureBridge,
    shared: Arc<StreamShared>,
) -> Result<cpal::Stream, AudioError> {
    let mut scratch: Vec<u8> = Vec::new();
    device
        .build_input_stream::<T, _, _>(
            config,
            move |data, _| {
                scratch.resize(data.len() * T::BYTES, 0);
                for (sample, bytes) in data.iter().zip(scratch.chunks_exact_mut(T::BYTES)) {
                    sample.write_le(bytes);
                }
                bridge.deliver(&scratch);
            },
            error_callback(shared),
            None,
        )
        .map_err(|e| AudioError::Backend(e.to_string()))
}

/// Records PCM audio, pushing each captured period into a
/// [`FrameConsumer`].
///
/// The consumer runs on the backend's real-time thread. A capture device
/// stops involuntarily only on backend failure; recording otherwise
/// continues until [`stop`](Self::stop).
pub struct CaptureDevice {
    device: cpal::Device,
    config: DeviceConfig,
    shared: Arc<StreamShared>,
    stream: Option<cpal::Stream>,
}

impl CaptureDevice {
    /// Opens the configured (or default) input device.
    ///
    /// # Errors
    ///
    /// As for [`PlaybackDevice::new`](crate::PlaybackDevice::new).
    pub fn new(config: DeviceConfig) -> Result<Self, AudioError> {
        backend_format(config.spec.format)?;
        let host = cpal::default_host();
        let device = resolve_input(&host, config.device.as_ref())?;
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

    /// Whether the device is currently recording.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.run_state() == RunState::Started
    }

    /// Starts recording into `consumer`.
    ///
    /// # Errors
    ///
    /// [`AudioError::InvalidState`] if already started or closed,
    /// [`AudioError::Backend`] if the backend rejects the stream.
    pub fn start(
        &mut self,
        consumer: Box<dyn FrameConsumer>,
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
        // new run becomes observable as Started
        self.stream = None;

        self.shared.install_stop(on_stop);
        let bridge = CaptureBridge::new(consumer, self.config.spec, Arc::clone(&self.shared));
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

        self.shared.set_state(RunState::Started);
        if let Err(e) = stream.play() {
            self.shared.set_state(RunState::Stopped);
            self.shared.clear_stop();
            return Err(AudioError::Backend(e.to_string()));
        }
        self.stream = Some(stream);
        tracing::debug!(spec = ?self.config.spec, "capture started");
        Ok(())
    }

    /// Stops recording, firing the stop callback if the device was running.
    /// A no-op otherwise.
    pub fn stop(&mut self) {
        self.shared.signal_stop();
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                tracing::warn!(error = %e, "backend refused pause during stop");
            }
        }
    }

    /// Stops and permanently closes the device. Idempotent.
    pub fn close(&mut self) {
        self.stop();
        self.shared.set_state(RunState::Closed);
    }
}

impl Drop for CaptureDevice {
    fn drop(&mut self) {
        self.close();
    }
}
