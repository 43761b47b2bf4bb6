//! Full-duplex device: simultaneous capture and playback through one
//! callback.
//!
//! The backend gives us two independent streams. Captured periods are
//! pushed into a lock-free SPSC ring by the input callback; the output
//! callback drains whatever has arrived, hands it to the
//! [`DuplexCallback`] together with the playback request, and plays the
//! returned frames. Capture therefore always reaches the callback before
//! the playback request it accompanies, offset by roughly one period.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::device::bridge::DuplexBridge;
use crate::device::playback::{error_callback, BackendSample};
use crate::device::{
    backend_format, resolve_input, resolve_output, DeviceConfig, DeviceId, RunState, StopCallback,
    StreamShared,
};
use crate::producer::DuplexCallback;
use crate::{AudioError, PcmSpec};

fn build_input<T: BackendSample>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut ring: HeapProd<u8>,
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
                let pushed = ring.push_slice(&scratch);
                if pushed < scratch.len() {
                    // Output side is stalled; oldest audio wins, newest drops
                    tracing::trace!(dropped = scratch.len() - pushed, "capture ring full");
                }
            },
            error_callback(Arc::clone(&shared)),
            None,
        )
        .map_err(|e| AudioError::Backend(e.to_string()))
}

fn build_output<T: BackendSample>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut bridge: DuplexBridge,
    mut ring: HeapCons<u8>,
    frame_bytes: usize,
    shared: Arc<StreamShared>,
) -> Result<cpal::Stream, AudioError> {
    let mut captured: Vec<u8> = Vec::new();
    let mut out: Vec<u8> = Vec::new();
    device
        .build_output_stream::<T, _, _>(
            config,
            move |data, _| {
                let out_bytes = data.len() * T::BYTES;
                // Hand over at most one period of capture, whole frames only
                captured.resize(out_bytes, 0);
                let got = ring.pop_slice(&mut captured);
                let whole = got / frame_bytes * frame_bytes;

                out.resize(out_bytes, 0);
                bridge.exchange(&captured[..whole], &mut out);
                for (sample, bytes) in data.iter_mut().zip(out.chunks_exact(T::BYTES)) {
                    *sample = T::from_le(bytes);
                }
            },
            error_callback(shared),
            None,
        )
        .map_err(|e| AudioError::Backend(e.to_string()))
}

/// Simultaneous capture and playback with one exchange callback.
///
/// Both directions run at the same [`PcmSpec`]. The callback receives each
/// captured period and returns the next playback period in one call; the
/// usual producer end-of-stream and contract rules apply to the returned
/// buffer.
pub struct DuplexDevice {
    playback: cpal::Device,
    capture: cpal::Device,
    config: DeviceConfig,
    shared: Arc<StreamShared>,
    streams: Option<(cpal::Stream, cpal::Stream)>,
}

impl DuplexDevice {
    /// Opens the configured (or default) output device together with the
    /// given (or default) input device.
    ///
    /// `config.device` selects the playback side; `capture_device` the
    /// capture side.
    ///
    /// # Errors
    ///
    /// As for [`PlaybackDevice::new`](crate::PlaybackDevice::new), for
    /// either side.
    pub fn new(config: DeviceConfig, capture_device: Option<DeviceId>) -> Result<Self, AudioError> {
        backend_format(config.spec.format)?;
        let host = cpal::default_host();
        let playback = resolve_output(&host, config.device.as_ref())?;
        let capture = resolve_input(&host, capture_device.as_ref())?;
        Ok(Self {
            playback,
            capture,
            config,
            shared: Arc::new(StreamShared::new()),
            streams: None,
        })
    }

    /// The stream format at the callback boundary, for both directions.
    #[must_use]
    pub fn spec(&self) -> PcmSpec {
        self.config.spec
    }

    /// Whether the device is currently streaming.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.run_state() == RunState::Started
    }

    /// Starts both directions.
    ///
    /// # Errors
    ///
    /// [`AudioError::InvalidState`] if already started or closed,
    /// [`AudioError::Backend`] if the backend rejects either stream.
    pub fn start(
        &mut self,
        callback: Box<dyn DuplexCallback>,
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

        // Streams left over from an involuntary stop must go before the
        // new run becomes observable as Started
        self.streams = None;

        self.shared.install_stop(on_stop);
        let spec = self.config.spec;
        let stream_config = super::stream_config(&self.config);
        // Room for a few periods of capture while the output side catches up
        let ring_capacity = spec.frames_to_bytes(self.config.buffer_frames() as usize * 4);
        let (prod, cons) = HeapRb::<u8>::new(ring_capacity.max(spec.frame_bytes())).split();
        let bridge = DuplexBridge::new(callback, spec, Arc::clone(&self.shared));

        let built = match backend_format(spec.format)? {
            cpal::SampleFormat::U8 => self.build_pair::<u8>(&stream_config, bridge, prod, cons),
            cpal::SampleFormat::I16 => self.build_pair::<i16>(&stream_config, bridge, prod, cons),
            cpal::SampleFormat::I32 => self.build_pair::<i32>(&stream_config, bridge, prod, cons),
            _ => self.build_pair::<f32>(&stream_config, bridge, prod, cons),
        };
        let (input, output) = match built {
            Ok(pair) => pair,
            Err(e) => {
                self.shared.clear_stop();
                return Err(e);
            }
        };

        self.shared.set_state(RunState::Started);
        if let Err(e) = input.play().and_then(|()| output.play()) {
            self.shared.set_state(RunState::Stopped);
            self.shared.clear_stop();
            return Err(AudioError::Backend(e.to_string()));
        }
        self.streams = Some((input, output));
        tracing::debug!(spec = ?spec, "duplex started");
        Ok(())
    }

    fn build_pair<T: BackendSample>(
        &self,
        stream_config: &cpal::StreamConfig,
        bridge: DuplexBridge,
        prod: HeapProd<u8>,
        cons: HeapCons<u8>,
    ) -> Result<(cpal::Stream, cpal::Stream), AudioError> {
        let input = build_input::<T>(&self.capture, stream_config, prod, Arc::clone(&self.shared))?;
        let output = build_output::<T>(
            &self.playback,
            stream_config,
            bridge,
            cons,
            self.config.spec.frame_bytes(),
            Arc::clone(&self.shared),
        )?;
        Ok((input, output))
    }

    /// Stops both directions, firing the stop callback if the device was
    /// running. A no-op otherwise.
    pub fn stop(&mut self) {
        self.shared.signal_stop();
        if let Some((input, output)) = self.streams.take() {
            for stream in [input, output] {
                if let Err(e) = stream.pause() {
                    tracing::warn!(error = %e, "backend refused pause during stop");
                }
            }
        }
    }

    /// Stops and permanently closes the device. Idempotent.
    pub fn close(&mut self) {
        self.stop();
        self.shared.set_state(RunState::Closed);
    }
}

impl Drop for DuplexDevice {
    fn drop(&mut self) {
        self.close();
    }
}
