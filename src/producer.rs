//! Pull and push interfaces between audio pipelines and devices.
//!
//! The library is pull-based end to end: a playback device or streaming
//! converter repeatedly asks its [`FrameProducer`] for the next block of
//! frames, and the producer decides how many to hand back. Capture runs the
//! other direction through [`FrameConsumer`]; full-duplex combines both in
//! [`DuplexCallback`].
//!
//! Producers are driven from real-time callbacks, so implementations must
//! not block, allocate unboundedly, or take locks shared with slow paths.

use crate::FrameBuffer;

/// A pull-based source of PCM frames.
///
/// `next_frames(n)` returns at most `n` frames. Returning fewer than
/// requested, or `None`, means the stream is finished; after that every
/// subsequent call must return `None` or an empty buffer. Returning *more*
/// than requested is a contract violation and fatally stops whatever is
/// driving the producer.
pub trait FrameProducer: Send {
    /// Produces up to `frames` frames of audio.
    fn next_frames(&mut self, frames: usize) -> Option<FrameBuffer>;
}

impl FrameProducer for Box<dyn FrameProducer> {
    fn next_frames(&mut self, frames: usize) -> Option<FrameBuffer> {
        (**self).next_frames(frames)
    }
}

/// A push-based sink for captured PCM frames.
pub trait FrameConsumer: Send {
    /// Receives a block of captured frames.
    fn push_frames(&mut self, frames: &FrameBuffer);
}

impl FrameConsumer for Box<dyn FrameConsumer> {
    fn push_frames(&mut self, frames: &FrameBuffer) {
        (**self).push_frames(frames)
    }
}

/// The combined callback for full-duplex streams.
///
/// Each period the device delivers the frames just captured and asks for
/// `playback_frames` frames to play, in one call. The same end-of-stream
/// rules as [`FrameProducer`] apply to the returned buffer.
pub trait DuplexCallback: Send {
    /// Exchanges one period of audio: consumes `captured`, returns up to
    /// `playback_frames` frames to play.
    fn exchange(&mut self, captured: &FrameBuffer, playback_frames: usize) -> Option<FrameBuffer>;
}

/// A producer that serves frames out of one in-memory buffer.
///
/// Hands out exactly the requested number of frames until the buffer runs
/// dry; the final block is short and every call after it returns `None`.
/// This is the producer behind "play a decoded file".
pub struct BufferProducer {
    remaining: FrameBuffer,
    done: bool,
}

impl BufferProducer {
    /// Creates a producer over the given buffer.
    #[must_use]
    pub fn new(buffer: FrameBuffer) -> Self {
        Self {
            remaining: buffer,
            done: false,
        }
    }

    /// Returns the number of frames not yet handed out.
    #[must_use]
    pub fn frames_left(&self) -> usize {
        self.remaining.frame_count()
    }
}

impl FrameProducer for BufferProducer {
    fn next_frames(&mut self, frames: usize) -> Option<FrameBuffer> {
        if self.done {
            return None;
        }
        let chunk = self.remaining.split_front(frames);
        if chunk.frame_count() < frames {
            self.done = true;
        }
        if chunk.is_empty() {
            None
        } else {
            Some(chunk)
        }
    }
}

/// A consumer that accumulates everything pushed into it.
///
/// Useful for capturing into memory and in tests.
pub struct BufferConsumer {
    collected: FrameBuffer,
}

impl BufferConsumer {
    /// Creates a consumer expecting the given format and channel count.
    #[must_use]
    pub fn new(format: crate::SampleFormat, channels: u16) -> Self {
        Self {
            collected: FrameBuffer::empty(format, channels),
        }
    }

    /// Consumes the collector, returning everything captured so far.
    #[must_use]
    pub fn into_buffer(self) -> FrameBuffer {
        self.collected
    }

    /// Returns the number of frames collected so far.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.collected.frame_count()
    }
}

impl FrameConsumer for BufferConsumer {
    fn push_frames(&mut self, frames: &FrameBuffer) {
        // Mismatched pushes are dropped rather than corrupting the buffer;
        // capture devices always push their configured format.
        if self.collected.extend(frames).is_err() {
            tracing::warn!(
                pushed_format = %frames.format(),
                pushed_channels = frames.channels(),
                "dropping capture block with mismatched format"
            );
        }
    }
}

/// A producer that defers to a closure each period.
///
/// The closure receives the requested frame count and returns the next
/// block, with the usual end-of-stream rules.
pub struct CallbackProducer<F>
where
    F: FnMut(usize) -> Option<FrameBuffer> + Send,
{
    callback: F,
}

impl<F> CallbackProducer<F>
where
    F: FnMut(usize) -> Option<FrameBuffer> + Send,
{
    /// Wraps the closure.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> FrameProducer for CallbackProducer<F>
where
    F: FnMut(usize) -> Option<FrameBuffer> + Send,
{
    fn next_frames(&mut self, frames: usize) -> Option<FrameBuffer> {
        (self.callback)(frames)
    }
}

/// Wraps another producer with observation hooks.
///
/// Useful for progress reporting and simple per-block processing while a
/// stream plays: the progress hook sees the running frame total after each
/// block, the process hook may replace each block (e.g. apply gain), and
/// the end hook fires once when the inner producer finishes.
pub struct HookedProducer<P: FrameProducer> {
    inner: P,
    progress: Option<Box<dyn FnMut(u64) + Send>>,
    process: Option<Box<dyn FnMut(FrameBuffer) -> FrameBuffer + Send>>,
    end: Option<Box<dyn FnOnce() + Send>>,
    delivered: u64,
}

impl<P: FrameProducer> HookedProducer<P> {
    /// Wraps `inner` with no hooks installed.
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            progress: None,
            process: None,
            end: None,
            delivered: 0,
        }
    }

    /// Calls `hook` with the cumulative frame count after every block.
    #[must_use]
    pub fn on_progress(mut self, hook: impl FnMut(u64) + Send + 'static) -> Self {
        self.progress = Some(Box::new(hook));
        self
    }

    /// Passes every block through `hook` before delivery.
    ///
    /// The hook must honor the producer contract: same format and channel
    /// count, no more frames than it received.
    #[must_use]
    pub fn on_block(mut self, hook: impl FnMut(FrameBuffer) -> FrameBuffer + Send + 'static) -> Self {
        self.process = Some(Box::new(hook));
        self
    }

    /// Calls `hook` once, when the inner producer signals completion.
    #[must_use]
    pub fn on_end(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.end = Some(Box::new(hook));
        self
    }
}

impl<P: FrameProducer> FrameProducer for HookedProducer<P> {
    fn next_frames(&mut self, frames: usize) -> Option<FrameBuffer> {
        match self.inner.next_frames(frames) {
            Some(block) => {
                let block = match &mut self.process {
                    Some(hook) => hook(block),
                    None => block,
                };
                self.delivered += block.frame_count() as u64;
                if let Some(hook) = &mut self.progress {
                    hook(self.delivered);
                }
                if block.frame_count() < frames {
                    if let Some(hook) = self.end.take() {
                        hook();
                    }
                }
                Some(block)
            }
            None => {
                if let Some(hook) = self.end.take() {
                    hook();
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SampleFormat;

    #[test]
    fn test_buffer_producer_exact_then_short() {
        let buf = FrameBuffer::from_i16(&[1, 2, 3, 4, 5], 1);
        let mut producer = BufferProducer::new(buf);

        let a = producer.next_frames(2).unwrap();
        assert_eq!(a.to_i16().unwrap(), vec![1, 2]);
        assert_eq!(producer.frames_left(), 3);

        let b = producer.next_frames(2).unwrap();
        assert_eq!(b.to_i16().unwrap(), vec![3, 4]);

        // Final short block, then None forever
        let c = producer.next_frames(2).unwrap();
        assert_eq!(c.to_i16().unwrap(), vec![5]);
        assert!(producer.next_frames(2).is_none());
        assert!(producer.next_frames(2).is_none());
    }

    #[test]
    fn test_buffer_producer_empty_buffer() {
        let mut producer = BufferProducer::new(FrameBuffer::empty(SampleFormat::Signed16, 2));
        assert!(producer.next_frames(128).is_none());
    }

    #[test]
    fn test_buffer_consumer_collects() {
        let mut consumer = BufferConsumer::new(SampleFormat::Signed16, 1);
        consumer.push_frames(&FrameBuffer::from_i16(&[1, 2], 1));
        consumer.push_frames(&FrameBuffer::from_i16(&[3], 1));
        assert_eq!(consumer.frame_count(), 3);
        assert_eq!(consumer.into_buffer().to_i16().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_buffer_consumer_drops_mismatch() {
        let mut consumer = BufferConsumer::new(SampleFormat::Signed16, 1);
        consumer.push_frames(&FrameBuffer::from_f32(&[0.5], 1));
        assert_eq!(consumer.frame_count(), 0);
    }

    #[test]
    fn test_callback_producer() {
        let mut calls = 0;
        let mut producer = CallbackProducer::new(move |frames| {
            calls += 1;
            if calls > 2 {
                None
            } else {
                Some(FrameBuffer::zeroed(SampleFormat::Signed16, 2, frames))
            }
        });
        assert_eq!(producer.next_frames(64).unwrap().frame_count(), 64);
        assert_eq!(producer.next_frames(64).unwrap().frame_count(), 64);
        assert!(producer.next_frames(64).is_none());
    }

    #[test]
    fn test_hooked_producer_reports_progress_and_end() {
        use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
        use std::sync::Arc;

        let progress = Arc::new(AtomicU64::new(0));
        let ended = Arc::new(AtomicUsize::new(0));
        let p = Arc::clone(&progress);
        let e = Arc::clone(&ended);

        let inner = BufferProducer::new(FrameBuffer::from_i16(&[10, 20, 30], 1));
        let mut hooked = HookedProducer::new(inner)
            .on_progress(move |total| p.store(total, Ordering::SeqCst))
            .on_block(|block| {
                let doubled: Vec<i16> =
                    block.to_i16().unwrap().iter().map(|s| s * 2).collect();
                FrameBuffer::from_i16(&doubled, block.channels())
            })
            .on_end(move || {
                e.fetch_add(1, Ordering::SeqCst);
            });

        let a = hooked.next_frames(2).unwrap();
        assert_eq!(a.to_i16().unwrap(), vec![20, 40]);
        assert_eq!(progress.load(Ordering::SeqCst), 2);
        assert_eq!(ended.load(Ordering::SeqCst), 0);

        // Final short block fires the end hook exactly once
        let b = hooked.next_frames(2).unwrap();
        assert_eq!(b.to_i16().unwrap(), vec![60]);
        assert_eq!(progress.load(Ordering::SeqCst), 3);
        assert_eq!(ended.load(Ordering::SeqCst), 1);

        assert!(hooked.next_frames(2).is_none());
        assert_eq!(ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_boxed_producer_dispatch() {
        let mut boxed: Box<dyn FrameProducer> =
            Box::new(BufferProducer::new(FrameBuffer::from_i16(&[7, 8], 1)));
        assert_eq!(boxed.next_frames(8).unwrap().to_i16().unwrap(), vec![7, 8]);
        assert!(boxed.next_frames(8).is_none());
    }
}
