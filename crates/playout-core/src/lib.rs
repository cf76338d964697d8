//! playout-core: Shared types for the playout audio engine
//!
//! This crate provides the foundational types used across the playout crates.

use std::time::Duration;

mod sample;

pub use sample::*;

/// Stream format negotiated with an output device
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StreamFormat {
    /// Frames per second
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// Container size of one sample
    pub bits_per_sample: u16,
}

impl StreamFormat {
    pub const fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
        }
    }

    /// Interleaved sample count covering `frames` frames
    #[inline]
    pub const fn samples_for(&self, frames: u32) -> usize {
        frames as usize * self.channels as usize
    }

    /// Byte count of one interleaved frame
    #[inline]
    pub const fn bytes_per_frame(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    /// Wall-clock duration of `frames` frames at this rate
    #[inline]
    pub fn duration_of(&self, frames: u32) -> Duration {
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self::new(48_000, 2, 32)
    }
}
