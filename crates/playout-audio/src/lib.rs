//! playout-audio: Real-time audio output over WASAPI
//!
//! Provides low-latency shared-mode playback on the default render device,
//! fed by a pull-model sample provider on a dedicated render thread.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌────────────────┐
//! │ AudioOutput  │────▶│ render loop  │────▶│ OutputSession  │
//! │              │     │              │     │    (WASAPI)    │
//! │ - lifecycle  │     │ - wait/fill  │     │ - mix format   │
//! │ - stop ctrl  │     │ - silence    │     │ - acquire/     │
//! │ - provider   │     │   masking    │     │   commit       │
//! └──────────────┘     └──────────────┘     └────────────────┘
//! ```

mod adapter;
mod blocking;
mod engine;
mod error;
mod provider;
mod render;
mod session;
mod thread_priority;

#[cfg(target_os = "windows")]
mod wasapi;

#[cfg(test)]
mod testing;

pub use adapter::*;
pub use blocking::*;
pub use engine::*;
pub use error::*;
pub use provider::*;
pub use render::*;
pub use session::*;
pub use thread_priority::*;

/// Output engine configuration
///
/// The device keeps the last word: shared mode always plays at the mix
/// format, so these are a request, not a guarantee.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
        }
    }
}
