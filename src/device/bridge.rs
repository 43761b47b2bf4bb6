//! The real-time callback protocol, independent of any backend.
//!
//! The backend hands each bridge raw little-endian byte buffers at the
//! period rate; the bridge enforces the producer/consumer contracts and the
//! involuntary-stop semantics. Keeping this layer byte-oriented and free of
//! backend types means the whole protocol is exercisable in plain unit
//! tests.

use std::sync::Arc;

use crate::device::{RunState, StreamShared};
use crate::producer::{DuplexCallback, FrameConsumer, FrameProducer};
use crate::{FrameBuffer, PcmSpec, SampleFormat};

fn silence(out: &mut [u8], format: SampleFormat) {
    let fill = if format == SampleFormat::Unsigned8 {
        128
    } else {
        0
    };
    out.fill(fill);
}

/// Drives a [`FrameProducer`] from a playback period callback.
pub(crate) struct PlaybackBridge {
    producer: Box<dyn FrameProducer>,
    spec: PcmSpec,
    shared: Arc<StreamShared>,
}

impl PlaybackBridge {
    pub(crate) fn new(
        producer: Box<dyn FrameProducer>,
        spec: PcmSpec,
        shared: Arc<StreamShared>,
    ) -> Self {
        Self {
            producer,
            spec,
            shared,
        }
    }

    /// Fills one period with produced audio.
    ///
    /// `out` must hold a whole number of frames. A short or absent delivery
    /// plays what arrived, pads the rest with silence, and stops the device;
    /// an oversized or mismatched delivery is a contract violation that
    /// stops the device without playing the bad buffer.
    pub(crate) fn fill(&mut self, out: &mut [u8]) {
        if self.shared.run_state() != RunState::Started {
            silence(out, self.spec.format);
            return;
        }
        let frames = out.len() / self.spec.frame_bytes();
        let block = match self.producer.next_frames(frames) {
            Some(block) => block,
            None => {
                silence(out, self.spec.format);
                self.shared.signal_stop();
                return;
            }
        };
        if block.frame_count() > frames {
            tracing::error!(
                returned = block.frame_count(),
                requested = frames,
                "producer returned more frames than requested; stopping device"
            );
            silence(out, self.spec.format);
            self.shared.signal_stop();
            return;
        }
        if block.format() != self.spec.format || block.channels() != self.spec.channels {
            tracing::error!(
                got_format = %block.format(),
                got_channels = block.channels(),
                "producer returned frames in the wrong format; stopping device"
            );
            silence(out, self.spec.format);
            self.shared.signal_stop();
            return;
        }

        let bytes = block.as_bytes();
        out[..bytes.len()].copy_from_slice(bytes);
        if block.frame_count() < frames {
            silence(&mut out[bytes.len()..], self.spec.format);
            self.shared.signal_stop();
        }
    }
}

/// Feeds a [`FrameConsumer`] from a capture period callback.
pub(crate) struct CaptureBridge {
    consumer: Box<dyn FrameConsumer>,
    spec: PcmSpec,
    shared: Arc<StreamShared>,
}

impl CaptureBridge {
    pub(crate) fn new(
        consumer: Box<dyn FrameConsumer>,
        spec: PcmSpec,
        shared: Arc<StreamShared>,
    ) -> Self {
        Self {
            consumer,
            spec,
            shared,
        }
    }

    /// Delivers one captured period. Trailing partial frames are dropped.
    pub(crate) fn deliver(&mut self, data: &[u8]) {
        if self.shared.run_state() != RunState::Started {
            return;
        }
        let frame = self.spec.frame_bytes();
        let whole = data.len() / frame * frame;
        if whole == 0 {
            return;
        }
        match FrameBuffer::from_bytes(
            data[..whole].to_vec(),
            self.spec.format,
            self.spec.channels,
        ) {
            Ok(block) => self.consumer.push_frames(&block),
            Err(err) => tracing::error!(error = %err, "dropping malformed capture period"),
        }
    }
}

/// Runs a [`DuplexCallback`] from a full-duplex period callback.
///
/// Capture is always presented before the playback request, in the same
/// call, so the callback can echo input to output with one period of
/// latency.
pub(crate) struct DuplexBridge {
    callback: Box<dyn DuplexCallback>,
    spec: PcmSpec,
    shared: Arc<StreamShared>,
}

impl DuplexBridge {
    pub(crate) fn new(
        callback: Box<dyn DuplexCallback>,
        spec: PcmSpec,
        shared: Arc<StreamShared>,
    ) -> Self {
        Self {
            callback,
            spec,
            shared,
        }
    }

    /// Exchanges one period: `captured` in, `out` filled for playback.
    pub(crate) fn exchange(&mut self, captured: &[u8], out: &mut [u8]) {
        if self.shared.run_state() != RunState::Started {
            silence(out, self.spec.format);
            return;
        }
        let frame = self.spec.frame_bytes();
        let whole = captured.len() / frame * frame;
        let cap_block = FrameBuffer::from_bytes(
            captured[..whole].to_vec(),
            self.spec.format,
            self.spec.channels,
        )
        .unwrap_or_else(|_| FrameBuffer::empty(self.spec.format, self.spec.channels));

        let frames = out.len() / frame;
        let block = match self.callback.exchange(&cap_block, frames) {
            Some(block) => block,
            None => {
                silence(out, self.spec.format);
                self.shared.signal_stop();
                return;
            }
        };
        if block.frame_count() > frames
            || block.format() != self.spec.format
            || block.channels() != self.spec.channels
        {
            tracing::error!(
                returned = block.frame_count(),
                requested = frames,
                "duplex callback returned an invalid playback buffer; stopping device"
            );
            silence(out, self.spec.format);
            self.shared.signal_stop();
            return;
        }
        let bytes = block.as_bytes();
        out[..bytes.len()].copy_from_slice(bytes);
        if block.frame_count() < frames {
            silence(&mut out[bytes.len()..], self.spec.format);
            self.shared.signal_stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::{BufferProducer, CallbackProducer};
    use crate::SampleFormat;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn started_shared() -> Arc<StreamShared> {
        let shared = Arc::new(StreamShared::new());
        shared.set_state(RunState::Started);
        shared
    }

    fn spec_s16_mono(rate: u32) -> PcmSpec {
        PcmSpec::new(SampleFormat::Signed16, 1, rate)
    }

    #[test]
    fn test_playback_three_chunks_then_stop() {
        // A producer holding 3 periods' worth of audio is asked 4 times:
        // three full deliveries, then the stop notification
        let shared = started_shared();
        let stops = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&stops);
        shared.install_stop(Some(Box::new(move || {
            s.fetch_add(1, Ordering::SeqCst);
        })));

        let samples: Vec<i16> = (0..192).collect();
        let mut bridge = PlaybackBridge::new(
            Box::new(BufferProducer::new(FrameBuffer::from_i16(&samples, 1))),
            spec_s16_mono(8000),
            Arc::clone(&shared),
        );

        let mut played = Vec::new();
        for _ in 0..3 {
            let mut out = vec![0u8; 64 * 2];
            bridge.fill(&mut out);
            played.extend(
                out.chunks_exact(2)
                    .map(|b| i16::from_le_bytes([b[0], b[1]])),
            );
            assert_eq!(shared.run_state(), RunState::Started);
        }
        assert_eq!(played, samples);
        assert_eq!(stops.load(Ordering::SeqCst), 0);

        // Fourth period: nothing left, silence plus exactly one stop
        let mut out = vec![0xAAu8; 64 * 2];
        bridge.fill(&mut out);
        assert!(out.iter().all(|&b| b == 0));
        assert_eq!(shared.run_state(), RunState::Stopped);
        assert_eq!(stops.load(Ordering::SeqCst), 1);

        // Further periods stay silent and never re-notify
        let mut out = vec![0xAAu8; 64 * 2];
        bridge.fill(&mut out);
        assert!(out.iter().all(|&b| b == 0));
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_playback_short_delivery_pads_and_stops() {
        let shared = started_shared();
        let mut bridge = PlaybackBridge::new(
            Box::new(BufferProducer::new(FrameBuffer::from_i16(&[7, 7], 1))),
            spec_s16_mono(8000),
            Arc::clone(&shared),
        );

        let mut out = vec![0xAAu8; 8 * 2];
        bridge.fill(&mut out);
        assert_eq!(i16::from_le_bytes([out[0], out[1]]), 7);
        assert_eq!(i16::from_le_bytes([out[2], out[3]]), 7);
        assert!(out[4..].iter().all(|&b| b == 0));
        assert_eq!(shared.run_state(), RunState::Stopped);
    }

    #[test]
    fn test_playback_overrun_is_fatal() {
        let shared = started_shared();
        let mut bridge = PlaybackBridge::new(
            Box::new(CallbackProducer::new(|_| {
                Some(FrameBuffer::zeroed(SampleFormat::Signed16, 1, 10_000))
            })),
            spec_s16_mono(8000),
            Arc::clone(&shared),
        );
        let mut out = vec![0xAAu8; 16 * 2];
        bridge.fill(&mut out);
        assert!(out.iter().all(|&b| b == 0));
        assert_eq!(shared.run_state(), RunState::Stopped);
    }

    #[test]
    fn test_playback_u8_silence_is_bias() {
        let shared = started_shared();
        let spec = PcmSpec::new(SampleFormat::Unsigned8, 1, 8000);
        let mut bridge = PlaybackBridge::new(
            Box::new(BufferProducer::new(FrameBuffer::empty(
                SampleFormat::Unsigned8,
                1,
            ))),
            spec,
            Arc::clone(&shared),
        );
        let mut out = vec![0u8; 16];
        bridge.fill(&mut out);
        assert!(out.iter().all(|&b| b == 128));
    }

    #[test]
    fn test_playback_ignores_periods_when_stopped() {
        let shared = Arc::new(StreamShared::new());
        let mut bridge = PlaybackBridge::new(
            Box::new(BufferProducer::new(FrameBuffer::from_i16(&[1; 64], 1))),
            spec_s16_mono(8000),
            Arc::clone(&shared),
        );
        let mut out = vec![0xAAu8; 8 * 2];
        bridge.fill(&mut out);
        // Not started: silence, producer untouched
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_capture_delivers_whole_frames_only() {
        let shared = started_shared();
        let spec = PcmSpec::new(SampleFormat::Signed16, 2, 8000);
        let received = Arc::new(Mutex::new(Vec::new()));

        struct Collect(Arc<Mutex<Vec<i16>>>);
        impl FrameConsumer for Collect {
            fn push_frames(&mut self, frames: &FrameBuffer) {
                self.0.lock().unwrap().extend(frames.to_i16().unwrap());
            }
        }

        let mut bridge = CaptureBridge::new(
            Box::new(Collect(Arc::clone(&received))),
            spec,
            Arc::clone(&shared),
        );
        // 5 bytes: one whole stereo s16 frame plus a dangling byte
        bridge.deliver(&[1, 0, 2, 0, 3]);
        assert_eq!(*received.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_capture_counts_frames() {
        let shared = started_shared();
        let spec = spec_s16_mono(8000);
        let received = Arc::new(AtomicUsize::new(0));

        struct Counting(Arc<AtomicUsize>);
        impl FrameConsumer for Counting {
            fn push_frames(&mut self, frames: &FrameBuffer) {
                self.0.fetch_add(frames.frame_count(), Ordering::SeqCst);
            }
        }

        let mut bridge = CaptureBridge::new(
            Box::new(Counting(Arc::clone(&received))),
            spec,
            Arc::clone(&shared),
        );
        bridge.deliver(&[0; 32]);
        bridge.deliver(&[0; 32]);
        assert_eq!(received.load(Ordering::SeqCst), 32);

        shared.set_state(RunState::Stopped);
        bridge.deliver(&[0; 32]);
        assert_eq!(received.load(Ordering::SeqCst), 32);
    }

    #[test]
    fn test_duplex_echo_round_trip() {
        let shared = started_shared();
        let spec = spec_s16_mono(8000);

        // Echo whatever was captured, padded/truncated to the request
        struct Echo(Vec<i16>);
        impl DuplexCallback for Echo {
            fn exchange(&mut self, captured: &FrameBuffer, frames: usize) -> Option<FrameBuffer> {
                self.0.extend(captured.to_i16().unwrap());
                let take: Vec<i16> = self.0.drain(..frames.min(self.0.len())).collect();
                Some(FrameBuffer::from_i16(&take, 1))
            }
        }

        let mut bridge = DuplexBridge::new(Box::new(Echo(Vec::new())), spec, Arc::clone(&shared));

        let captured: Vec<u8> = [5i16, 6, 7, 8]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let mut out = vec![0u8; 4 * 2];
        bridge.exchange(&captured, &mut out);
        let played: Vec<i16> = out
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(played, vec![5, 6, 7, 8]);
        assert_eq!(shared.run_state(), RunState::Started);
    }

    #[test]
    fn test_duplex_none_stops() {
        let shared = started_shared();
        let stops = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&stops);
        shared.install_stop(Some(Box::new(move || {
            s.fetch_add(1, Ordering::SeqCst);
        })));

        struct Done;
        impl DuplexCallback for Done {
            fn exchange(&mut self, _: &FrameBuffer, _: usize) -> Option<FrameBuffer> {
                None
            }
        }

        let mut bridge =
            DuplexBridge::new(Box::new(Done), spec_s16_mono(8000), Arc::clone(&shared));
        let mut out = vec![0xAAu8; 8];
        bridge.exchange(&[0; 8], &mut out);
        assert!(out.iter().all(|&b| b == 0));
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(shared.run_state(), RunState::Stopped);
    }

    #[test]
    fn test_duplex_capture_seen_before_playback_request() {
        let shared = started_shared();
        let log = Arc::new(Mutex::new(Vec::new()));

        struct Order(Arc<Mutex<Vec<usize>>>);
        impl DuplexCallback for Order {
            fn exchange(&mut self, captured: &FrameBuffer, frames: usize) -> Option<FrameBuffer> {
                // Capture content is available at the moment playback is requested
                self.0.lock().unwrap().push(captured.frame_count());
                Some(FrameBuffer::zeroed(SampleFormat::Signed16, 1, frames))
            }
        }

        let mut bridge = DuplexBridge::new(
            Box::new(Order(Arc::clone(&log))),
            spec_s16_mono(8000),
            Arc::clone(&shared),
        );
        let mut out = vec![0u8; 16];
        bridge.exchange(&[0; 8], &mut out);
        bridge.exchange(&[0; 4], &mut out);
        assert_eq!(*log.lock().unwrap(), vec![4, 2]);
    }
}
