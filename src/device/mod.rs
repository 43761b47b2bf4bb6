//! Real-time audio devices: playback, capture, and full duplex.
//!
//! Devices follow a strict lifecycle: construct, [`start`] with a callback,
//! [`stop`], start again if desired, and finally [`close`] (or drop). Audio
//! flows through the pull/push traits in [`crate::producer`], invoked from
//! the backend's real-time thread.
//!
//! A device can also stop *involuntarily*: the producer runs out of frames,
//! or the backend fails (device unplugged). That is not surfaced as an
//! error from any method; it flips the device to stopped. The stop callback
//! registered at start fires exactly once per start, on the stop
//! transition, whether it came from an explicit [`stop`] or involuntarily.
//!
//! [`start`]: PlaybackDevice::start
//! [`stop`]: PlaybackDevice::stop
//! [`close`]: PlaybackDevice::close

mod bridge;
mod capture;
mod duplex;
mod enumerate;
mod playback;

pub use capture::CaptureDevice;
pub use duplex::DuplexDevice;
pub use enumerate::{DeviceFormat, DeviceInfo, Devices};
pub use playback::PlaybackDevice;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use cpal::traits::{DeviceTrait, HostTrait};

use crate::{AudioError, PcmSpec, SampleFormat};

/// Callback fired once when a started device stops, for any reason.
pub type StopCallback = Box<dyn FnOnce() + Send + 'static>;

/// Lifecycle state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    /// Constructed or stopped; can be started.
    Stopped = 0,
    /// Actively streaming audio.
    Started = 1,
    /// Closed; all further lifecycle calls are rejected.
    Closed = 2,
}

impl RunState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Started,
            2 => Self::Closed,
            _ => Self::Stopped,
        }
    }
}

/// Identifies a specific audio device, as reported by [`Devices`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceId(pub(crate) String);

impl DeviceId {
    /// The backend's display name for the device.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Configuration for opening a device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// The stream format at the callback boundary.
    pub spec: PcmSpec,
    /// Requested period size in milliseconds.
    pub buffer_ms: u32,
    /// Specific device to open; `None` means the backend default.
    pub device: Option<DeviceId>,
}

impl Default for DeviceConfig {
    /// Signed 16-bit stereo at 44100 Hz with a 200 ms buffer on the default
    /// device.
    fn default() -> Self {
        Self {
            spec: PcmSpec::default(),
            buffer_ms: 200,
            device: None,
        }
    }
}

impl DeviceConfig {
    fn buffer_frames(&self) -> u32 {
        let frames = u64::from(self.spec.sample_rate) * u64::from(self.buffer_ms) / 1000;
        frames.max(1) as u32
    }
}

/// State shared between a device handle and its real-time callbacks.
pub(crate) struct StreamShared {
    state: AtomicU8,
    stop_cb: Mutex<Option<StopCallback>>,
}

impl StreamShared {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(RunState::Stopped as u8),
            stop_cb: Mutex::new(None),
        }
    }

    pub(crate) fn run_state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: RunState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn install_stop(&self, cb: Option<StopCallback>) {
        *self.lock_stop() = cb;
    }

    /// Drops any registered stop callback without firing it (failed start,
    /// close of a never-started run).
    pub(crate) fn clear_stop(&self) {
        self.lock_stop().take();
    }

    /// Started → Stopped, firing the stop callback exactly once.
    ///
    /// The single stop path for explicit `stop()` calls and involuntary
    /// stops alike. Safe to call repeatedly and from any thread; only the
    /// call that wins the state transition fires the callback.
    pub(crate) fn signal_stop(&self) {
        let won = self
            .state
            .compare_exchange(
                RunState::Started as u8,
                RunState::Stopped as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if won {
            if let Some(cb) = self.lock_stop().take() {
                cb();
            }
        }
    }

    fn lock_stop(&self) -> std::sync::MutexGuard<'_, Option<StopCallback>> {
        self.stop_cb
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Maps a stream format to the backend's sample type.
///
/// Packed 24-bit is a storage format only; devices reject it.
fn backend_format(format: SampleFormat) -> Result<cpal::SampleFormat, AudioError> {
    match format {
        SampleFormat::Unsigned8 => Ok(cpal::SampleFormat::U8),
        SampleFormat::Signed16 => Ok(cpal::SampleFormat::I16),
        SampleFormat::Signed24 => Err(AudioError::UnsupportedFormat {
            format: "s24 (packed 24-bit is not playable; convert to s32 or f32)".to_string(),
        }),
        SampleFormat::Signed32 => Ok(cpal::SampleFormat::I32),
        SampleFormat::Float32 => Ok(cpal::SampleFormat::F32),
    }
}

fn stream_config(config: &DeviceConfig) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: config.spec.channels,
        sample_rate: cpal::SampleRate(config.spec.sample_rate),
        buffer_size: cpal::BufferSize::Fixed(config.buffer_frames()),
    }
}

fn resolve_output(
    host: &cpal::Host,
    wanted: Option<&DeviceId>,
) -> Result<cpal::Device, AudioError> {
    match wanted {
        None => host
            .default_output_device()
            .ok_or(AudioError::NoDefaultDevice),
        Some(id) => {
            let mut devices = host
                .output_devices()
                .map_err(|e| AudioError::Backend(e.to_string()))?;
            devices
                .find(|d| d.name().map(|n| n == id.0).unwrap_or(false))
                .ok_or_else(|| AudioError::DeviceNotFound {
                    name: id.0.clone(),
                })
        }
    }
}

fn resolve_input(host: &cpal::Host, wanted: Option<&DeviceId>) -> Result<cpal::Device, AudioError> {
    match wanted {
        None => host
            .default_input_device()
            .ok_or(AudioError::NoDefaultDevice),
        Some(id) => {
            let mut devices = host
                .input_devices()
                .map_err(|e| AudioError::Backend(e.to_string()))?;
            devices
                .find(|d| d.name().map(|n| n == id.0).unwrap_or(false))
                .ok_or_else(|| AudioError::DeviceNotFound {
                    name: id.0.clone(),
                })
        }
    }
}
