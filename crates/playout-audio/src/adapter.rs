//! Mono source adaptation - fixed-rate i16 sources into the device format
//!
//! Chip-tune style generators produce mono 16-bit PCM at a rate of their own
//! choosing. The adapter resamples that to the negotiated device rate by
//! linear interpolation, replicates it across the device channels, and
//! rescales into float.

use playout_core::{Sample, StreamFormat};

use crate::SampleProvider;

/// Scale factor from i16 PCM into float
const I16_SCALE: Sample = 1.0 / 32_768.0;

/// Fixed-rate mono 16-bit source
pub trait MonoSource: Send + 'static {
    /// Native rate of the source in frames per second
    fn sample_rate(&self) -> u32;

    /// Fill `output` with mono samples, returning how many were produced
    fn fill(&mut self, output: &mut [i16]) -> usize;
}

/// Adapts a [`MonoSource`] to the negotiated device format
pub struct FormatAdapter<S> {
    source: S,
    /// Source frames per device frame
    ratio: f64,
    channels: usize,
    scratch: Vec<i16>,
}

impl<S: MonoSource> FormatAdapter<S> {
    pub fn new(source: S, device: StreamFormat) -> Self {
        let ratio = source.sample_rate() as f64 / device.sample_rate as f64;
        Self {
            source,
            ratio,
            channels: device.channels as usize,
            scratch: Vec::new(),
        }
    }
}

impl<S: MonoSource> SampleProvider for FormatAdapter<S> {
    fn render(&mut self, output: &mut [Sample]) -> usize {
        let frames = output.len() / self.channels;
        let needed = (frames as f64 * self.ratio) as usize;

        // Grows on the first call, then amortizes.
        self.scratch.resize(needed, 0);
        let produced = self.source.fill(&mut self.scratch[..needed]);

        for frame in 0..frames {
            let pos = frame as f64 * self.ratio;
            let idx = pos as usize;
            let frac = pos - idx as f64;

            let value = if idx + 1 < produced {
                let s0 = self.scratch[idx] as f64;
                let s1 = self.scratch[idx + 1] as f64;
                s0 * (1.0 - frac) + s1 * frac
            } else if idx < produced {
                self.scratch[idx] as f64
            } else {
                0.0
            };

            let sample = value as Sample * I16_SCALE;
            for ch in 0..self.channels {
                output[frame * self.channels + ch] = sample;
            }
        }

        // Silence past the source's reach is already written.
        output.len()
    }
}
