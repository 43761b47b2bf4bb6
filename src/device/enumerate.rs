//! Enumeration of the system's audio devices.

use cpal::traits::{DeviceTrait, HostTrait};

use crate::device::DeviceId;
use crate::{AudioError, SampleFormat};

/// One format range a device advertises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFormat {
    /// Sample format.
    pub sample_format: SampleFormat,
    /// Channel count.
    pub channels: u16,
    /// Lowest supported rate in Hz.
    pub min_sample_rate: u32,
    /// Highest supported rate in Hz.
    pub max_sample_rate: u32,
}

/// One playback or capture device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Identifier to pass in [`DeviceConfig::device`](crate::DeviceConfig).
    pub id: DeviceId,
    /// The backend's display name.
    pub name: String,
    /// Whether this is the backend's default device of its kind.
    pub is_default: bool,
    /// Advertised format ranges. Formats with no equivalent here are
    /// omitted.
    pub formats: Vec<DeviceFormat>,
}

/// Snapshot access to the system's audio devices.
///
/// # Example
///
/// ```no_run
/// use pcm_stream::Devices;
///
/// let devices = Devices::new()?;
/// println!("backend: {}", devices.backend_name());
/// for dev in devices.playbacks()? {
///     println!("{}{}", dev.name, if dev.is_default { " (default)" } else { "" });
/// }
/// # Ok::<(), pcm_stream::AudioError>(())
/// ```
pub struct Devices {
    host: cpal::Host,
}

impl Devices {
    /// Connects to the default audio backend.
    ///
    /// # Errors
    ///
    /// Currently infallible on every supported backend, but kept fallible
    /// for hosts that can be absent.
    pub fn new() -> Result<Self, AudioError> {
        Ok(Self {
            host: cpal::default_host(),
        })
    }

    /// The backend's name (e.g. `"ALSA"`, `"CoreAudio"`, `"WASAPI"`).
    #[must_use]
    pub fn backend_name(&self) -> &str {
        self.host.id().name()
    }

    /// Lists the playback (output) devices.
    ///
    /// # Errors
    ///
    /// [`AudioError::NoBackend`] if the backend cannot enumerate devices.
    pub fn playbacks(&self) -> Result<Vec<DeviceInfo>, AudioError> {
        let default_name = self
            .host
            .default_output_device()
            .and_then(|d| d.name().ok());
        let devices = self.host.output_devices().map_err(|e| AudioError::NoBackend {
            reason: e.to_string(),
        })?;
        Ok(devices
            .map(|device| {
                let formats = device
                    .supported_output_configs()
                    .map(|configs| configs.filter_map(|c| describe(&c)).collect())
                    .unwrap_or_default();
                describe_device(&device, default_name.as_deref(), formats)
            })
            .collect())
    }

    /// Lists the capture (input) devices.
    ///
    /// # Errors
    ///
    /// [`AudioError::NoBackend`] if the backend cannot enumerate devices.
    pub fn captures(&self) -> Result<Vec<DeviceInfo>, AudioError> {
        let default_name = self
            .host
            .default_input_device()
            .and_then(|d| d.name().ok());
        let devices = self.host.input_devices().map_err(|e| AudioError::NoBackend {
            reason: e.to_string(),
        })?;
        Ok(devices
            .map(|device| {
                let formats = device
                    .supported_input_configs()
                    .map(|configs| configs.filter_map(|c| describe(&c)).collect())
                    .unwrap_or_default();
                describe_device(&device, default_name.as_deref(), formats)
            })
            .collect())
    }
}

fn describe_device(
    device: &cpal::Device,
    default_name: Option<&str>,
    formats: Vec<DeviceFormat>,
) -> DeviceInfo {
    let name = device.name().unwrap_or_else(|_| "<unknown>".to_string());
    DeviceInfo {
        id: DeviceId(name.clone()),
        is_default: default_name == Some(name.as_str()),
        name,
        formats,
    }
}

fn describe(config: &cpal::SupportedStreamConfigRange) -> Option<DeviceFormat> {
    let sample_format = match config.sample_format() {
        cpal::SampleFormat::U8 => SampleFormat::Unsigned8,
        cpal::SampleFormat::I16 => SampleFormat::Signed16,
        cpal::SampleFormat::I32 => SampleFormat::Signed32,
        cpal::SampleFormat::F32 => SampleFormat::Float32,
        _ => return None,
    };
    Some(DeviceFormat {
        sample_format,
        channels: config.channels(),
        min_sample_rate: config.min_sample_rate().0,
        max_sample_rate: config.max_sample_rate().0,
    })
}
