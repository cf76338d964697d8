//! Output session - the seam between the render loop and the OS
//!
//! A session owns the device-side objects for one playback lifetime:
//! negotiated format, buffer capacity, notification handles, and the render
//! buffer accessor. The render loop drives it through a single bounded wait
//! primitive plus scoped acquire/commit pairs.

use std::time::Duration;

use playout_core::{Sample, StreamFormat};

use crate::{OutputConfig, OutputResult};

// ═══════════════════════════════════════════════════════════════════════════════
// NOTIFICATION
// ═══════════════════════════════════════════════════════════════════════════════

/// How the device signals buffer readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyMode {
    /// The device signals an event whenever buffer space opens
    Event,
    /// No event support; the loop polls on a timed wait
    Polling,
}

/// Outcome of one bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Stop was signalled; wins over readiness when both are pending
    Stop,
    /// The device reported buffer space
    Ready,
    /// Neither signal arrived within the timeout
    TimedOut,
}

// ═══════════════════════════════════════════════════════════════════════════════
// RENDER SEGMENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Transient writable view of the device render buffer
///
/// Valid only between `acquire` and `commit` of the same loop iteration;
/// the region belongs to the device again once committed.
pub struct RenderSegment<'a> {
    /// Interleaved device-format samples
    pub samples: &'a mut [Sample],
    /// Frames this segment covers
    pub frames: u32,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SESSION TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Device-facing playback session
///
/// Exactly one thread drives the session once the render loop owns it; the
/// detached [`SessionControl`] handle is the only cross-thread surface.
pub trait OutputSession: Send {
    /// Format the device actually negotiated (never the requested one)
    fn format(&self) -> StreamFormat;

    /// Total device buffer capacity in frames
    fn buffer_frames(&self) -> u32;

    /// Notification mode the session ended up with
    fn notify_mode(&self) -> NotifyMode;

    /// Detachable stop handle, usable from any thread
    fn control(&self) -> Box<dyn SessionControl>;

    /// Start the OS-side stream
    fn start(&mut self) -> OutputResult<()>;

    /// Block up to `timeout` for stop or readiness; stop wins ties
    fn wait_ready(&mut self, timeout: Duration) -> WaitOutcome;

    /// Frames queued in the device buffer and not yet played
    fn padding(&mut self) -> OutputResult<u32>;

    /// Writable frames right now, failing soft to zero
    ///
    /// A padding failure is transient: report a full buffer so the loop
    /// backs off briefly instead of tearing down.
    fn available_frames(&mut self) -> u32 {
        match self.padding() {
            Ok(padding) => self.buffer_frames().saturating_sub(padding),
            Err(err) => {
                log::debug!("padding query failed, treating buffer as full: {err}");
                0
            }
        }
    }

    /// Map `frames` of the device buffer for writing
    fn acquire(&mut self, frames: u32) -> OutputResult<RenderSegment<'_>>;

    /// Hand the acquired frames back to the device, silence tail included
    fn commit(&mut self, frames: u32) -> OutputResult<()>;
}

/// Thread-safe stop handle detached from its session
pub trait SessionControl: Send + Sync {
    /// Latch the stop signal and halt the OS stream immediately
    fn request_stop(&self);
}

// ═══════════════════════════════════════════════════════════════════════════════
// PLATFORM FACTORY
// ═══════════════════════════════════════════════════════════════════════════════

/// Open a session on the default render device
#[cfg(target_os = "windows")]
pub(crate) fn open_default(config: &OutputConfig) -> OutputResult<Box<dyn OutputSession>> {
    Ok(Box::new(crate::wasapi::WasapiSession::open(config)?))
}

/// Open a session on the default render device
#[cfg(not(target_os = "windows"))]
pub(crate) fn open_default(_config: &OutputConfig) -> OutputResult<Box<dyn OutputSession>> {
    log::error!("no output backend on this platform");
    Err(crate::OutputError::DeviceUnavailable)
}
