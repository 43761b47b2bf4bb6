//! Channel count conversion on interleaved pipeline samples.

use crate::convert::ChannelMixMode;

/// Converts interleaved samples from `in_ch` to `out_ch` channels.
///
/// Purely frame-local, so results are independent of how the stream is
/// chunked. `Rectangular` mixing copies matching channels, fills extra
/// output channels with the frame average, and folds surplus input channels
/// down by averaging the channels that share an output slot (stride
/// `out_ch`); mono-to-many and many-to-mono fall out of those rules as
/// splat and mean. `Simple` copies matching channels and leaves extra
/// outputs silent.
pub(crate) fn mix(samples: &[f64], in_ch: u16, out_ch: u16, mode: ChannelMixMode) -> Vec<f64> {
    let in_ch = in_ch as usize;
    let out_ch = out_ch as usize;
    if in_ch == out_ch {
        return samples.to_vec();
    }
    let frames = samples.len() / in_ch;
    let mut out = Vec::with_capacity(frames * out_ch);

    match mode {
        ChannelMixMode::Simple => {
            for frame in samples.chunks_exact(in_ch) {
                for c in 0..out_ch {
                    out.push(if c < in_ch { frame[c] } else { 0.0 });
                }
            }
        }
        ChannelMixMode::Rectangular => {
            if out_ch < in_ch {
                for frame in samples.chunks_exact(in_ch) {
                    for c in 0..out_ch {
                        let mut sum = 0.0;
                        let mut n = 0usize;
                        let mut j = c;
                        while j < in_ch {
                            sum += frame[j];
                            n += 1;
                            j += out_ch;
                        }
                        out.push(sum / n as f64);
                    }
                }
            } else {
                for frame in samples.chunks_exact(in_ch) {
                    let mean = frame.iter().sum::<f64>() / in_ch as f64;
                    for c in 0..out_ch {
                        out.push(if c < in_ch { frame[c] } else { mean });
                    }
                }
            }
        }
    }
    out
}
