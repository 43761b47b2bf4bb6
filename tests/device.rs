//! Device tests. Lifecycle and configuration checks run anywhere; tests
//! that open real streams are ignored by default since CI machines have no
//! audio hardware.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pcm_stream::{
    AudioError, BufferProducer, DeviceConfig, Devices, FrameBuffer, PcmSpec, PlaybackDevice,
    SampleFormat,
};

#[test]
fn test_default_config() {
    let config = DeviceConfig::default();
    assert_eq!(config.spec, PcmSpec::default());
    assert_eq!(config.buffer_ms, 200);
    assert!(config.device.is_none());
}

#[test]
fn test_packed_24_bit_is_rejected() {
    let config = DeviceConfig {
        spec: PcmSpec::new(SampleFormat::Signed24, 2, 44100),
        ..DeviceConfig::default()
    };
    assert!(matches!(
        PlaybackDevice::new(config),
        Err(AudioError::UnsupportedFormat { .. })
    ));
}

#[test]
#[ignore = "requires audio hardware"]
fn test_enumerate_devices() {
    let devices = Devices::new().unwrap();
    assert!(!devices.backend_name().is_empty());

    let outputs = devices.playbacks().unwrap();
    for dev in &outputs {
        assert!(!dev.name.is_empty());
        for fmt in &dev.formats {
            assert!(fmt.min_sample_rate <= fmt.max_sample_rate);
            assert!(fmt.channels > 0);
        }
    }
    assert!(outputs.iter().filter(|d| d.is_default).count() <= 1);
}

#[test]
#[ignore = "requires audio hardware"]
fn test_playback_runs_to_completion() {
    let config = DeviceConfig {
        spec: PcmSpec::new(SampleFormat::Float32, 2, 44100),
        buffer_ms: 50,
        device: None,
    };
    let mut device = PlaybackDevice::new(config).unwrap();

    // Quarter second of silence
    let producer = BufferProducer::new(FrameBuffer::zeroed(SampleFormat::Float32, 2, 11025));
    let stops = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&stops);
    device
        .start(
            Box::new(producer),
            Some(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .unwrap();
    assert!(device.is_running());

    // Double-start is rejected while running
    let again = device.start(
        Box::new(BufferProducer::new(FrameBuffer::empty(
            SampleFormat::Float32,
            2,
        ))),
        None,
    );
    assert!(matches!(again, Err(AudioError::InvalidState { .. })));

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while device.is_running() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(!device.is_running());
    assert_eq!(stops.load(Ordering::SeqCst), 1);

    // Restarting after the involuntary stop: the stale stream from the
    // finished run must not be able to kill the new one
    let restarts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&restarts);
    device
        .start(
            Box::new(BufferProducer::new(FrameBuffer::zeroed(
                SampleFormat::Float32,
                2,
                44100 * 10,
            ))),
            Some(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .unwrap();
    std::thread::sleep(Duration::from_millis(300));
    assert!(device.is_running());
    assert_eq!(restarts.load(Ordering::SeqCst), 0);
    device.stop();
    assert_eq!(restarts.load(Ordering::SeqCst), 1);
}

#[test]
#[ignore = "requires audio hardware"]
fn test_playback_stop_and_restart() {
    let mut device = PlaybackDevice::new(DeviceConfig {
        spec: PcmSpec::new(SampleFormat::Float32, 2, 44100),
        ..DeviceConfig::default()
    })
    .unwrap();

    let stops = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&stops);
    device
        .start(
            Box::new(BufferProducer::new(FrameBuffer::zeroed(
                SampleFormat::Float32,
                2,
                44100 * 10,
            ))),
            Some(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .unwrap();
    std::thread::sleep(Duration::from_millis(100));

    // Explicit stop fires the notification, once
    device.stop();
    assert!(!device.is_running());
    assert_eq!(stops.load(Ordering::SeqCst), 1);

    // Stop while stopped is a no-op and never re-notifies
    device.stop();
    assert_eq!(stops.load(Ordering::SeqCst), 1);

    // The device restarts cleanly
    device
        .start(
            Box::new(BufferProducer::new(FrameBuffer::zeroed(
                SampleFormat::Float32,
                2,
                4410,
            ))),
            None,
        )
        .unwrap();
    assert!(device.is_running());

    device.close();
    assert!(!device.is_running());
    // Closed devices reject start
    assert!(matches!(
        device.start(
            Box::new(BufferProducer::new(FrameBuffer::empty(SampleFormat::Float32, 2))),
            None
        ),
        Err(AudioError::InvalidState { .. })
    ));
    device.close();
}
