//! Linear sample-rate conversion with exact rational phase tracking.
//!
//! Output frame `k` of an `in_rate` → `out_rate` conversion reads source
//! position `k * in_rate / out_rate`, computed in integer arithmetic as an
//! index plus a fractional phase. Because the position of every output frame
//! is derived from its absolute index rather than accumulated per block, a
//! stream resampled in arbitrary chunks yields exactly the same samples as
//! one bulk pass.

/// Streaming linear resampler over interleaved `f64` pipeline samples.
///
/// Input frames are pushed in arbitrary blocks; output frames are pulled.
/// The caller tells the resampler when input is exhausted, at which point
/// the final partial window is flushed holding the last input frame.
pub(crate) struct Resampler {
    in_rate: u64,
    out_rate: u64,
    channels: usize,
    /// Absolute input index of `window[0..channels]`.
    in_base: u64,
    /// Total input frames pushed so far.
    in_end: u64,
    /// Next output frame index to produce.
    next_out: u64,
    window: Vec<f64>,
}

impl Resampler {
    pub(crate) fn new(in_rate: u32, out_rate: u32, channels: u16) -> Self {
        Self {
            in_rate: u64::from(in_rate),
            out_rate: u64::from(out_rate),
            channels: usize::from(channels),
            in_base: 0,
            in_end: 0,
            next_out: 0,
            window: Vec::new(),
        }
    }

    /// Appends input frames.
    pub(crate) fn push(&mut self, samples: &[f64]) {
        self.window.extend_from_slice(samples);
        self.in_end += (samples.len() / self.channels) as u64;
    }

    /// Total input frames consumed so far.
    pub(crate) fn input_frames(&self) -> u64 {
        self.in_end
    }

    /// How many more input frames are needed before `out_frames` further
    /// output frames can be produced without flushing.
    pub(crate) fn input_needed(&self, out_frames: usize) -> usize {
        if out_frames == 0 {
            return 0;
        }
        let last = self.next_out + out_frames as u64 - 1;
        // Interpolation for output `last` reads indices idx and idx + 1
        let required = (last * self.in_rate) / self.out_rate + 2;
        required.saturating_sub(self.in_end) as usize
    }

    /// How many output frames can be produced right now.
    ///
    /// With `exhausted` the total output count is fixed at
    /// `in_frames * out_rate / in_rate` and the tail interpolates against a
    /// held copy of the last frame; otherwise only outputs whose full
    /// two-frame window is buffered are counted.
    pub(crate) fn available(&self, exhausted: bool) -> usize {
        let total = if exhausted {
            (self.in_end * self.out_rate) / self.in_rate
        } else {
            if self.in_end < 2 {
                return 0;
            }
            // Largest k with (k * in_rate) / out_rate + 1 <= in_end - 1
            ((self.in_end - 1) * self.out_rate).div_ceil(self.in_rate)
        };
        total.saturating_sub(self.next_out) as usize
    }

    /// Produces up to `max_frames` output frames.
    pub(crate) fn pull(&mut self, max_frames: usize, exhausted: bool) -> Vec<f64> {
        let count = self.available(exhausted).min(max_frames);
        if count == 0 {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(count * self.channels);
        let last_rel = (self.in_end - self.in_base) as usize - 1;

        for _ in 0..count {
            let pos = self.next_out * self.in_rate;
            let idx = pos / self.out_rate;
            let frac = (pos % self.out_rate) as f64 / self.out_rate as f64;
            let rel = (idx - self.in_base) as usize;
            let next_rel = (rel + 1).min(last_rel);
            for c in 0..self.channels {
                let a = self.window[rel * self.channels + c];
                let b = self.window[next_rel * self.channels + c];
                out.push(a + (b - a) * frac);
            }
            self.next_out += 1;
        }

        // Drop input frames no future output can read
        let keep_from = (self.next_out * self.in_rate) / self.out_rate;
        if keep_from > self.in_base {
            let drop = ((keep_from - self.in_base) as usize).min(last_rel);
            self.window.drain(..drop * self.channels);
            self.in_base += drop as u64;
        }
        out
    }

    /// Clears all position and buffer state, e.g. after a seek.
    pub(crate) fn reset(&mut self) {
        self.in_base = 0;
        self.in_end = 0;
        self.next_out = 0;
        self.window.clear();
    }
}

/// Resamples a whole block in one pass.
pub(crate) fn resample_bulk(
    samples: &[f64],
    in_rate: u32,
    out_rate: u32,
    channels: u16,
) -> Vec<f64> {
    if in_rate == out_rate {
        return samples.to_vec();
    }
    let mut rs = Resampler::new(in_rate, out_rate, channels);
    rs.push(samples);
    let avail = rs.available(true);
    rs.pull(avail, true)
}
