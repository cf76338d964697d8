//! Render loop - the real-time iteration feeding the device buffer
//!
//! One dedicated thread per engine runs [`run`] until the stop signal
//! latches: wait for readiness, measure free space from the hardware
//! padding, acquire exactly that much, pull samples from the provider,
//! silence whatever the provider left unfilled, and commit the whole
//! acquisition.

use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;
use std::time::Duration;

use playout_core::write_silence;

use crate::{OutputResult, OutputSession, SampleProvider, WaitOutcome};

/// Upper bound on one readiness wait (also the polling cadence)
const WAIT_SLICE: Duration = Duration::from_millis(10);

/// Backoff when the device buffer reports no free space
const FULL_BUFFER_BACKOFF: Duration = Duration::from_millis(1);

// ═══════════════════════════════════════════════════════════════════════════════
// LOOP STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Render loop lifecycle, observable from any thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    /// Thread not started yet
    Idle = 0,
    /// Iterating against the device
    Running = 1,
    /// Stop observed, queued audio playing out
    Draining = 2,
    /// Loop exited, device resources released
    Stopped = 3,
}

/// Atomic cell publishing the loop state across threads
#[derive(Debug)]
pub struct LoopStateCell(AtomicU8);

impl LoopStateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(LoopState::Idle as u8))
    }

    pub fn get(&self) -> LoopState {
        match self.0.load(Ordering::Acquire) {
            0 => LoopState::Idle,
            1 => LoopState::Running,
            2 => LoopState::Draining,
            _ => LoopState::Stopped,
        }
    }

    fn set(&self, state: LoopState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOOP BODY
// ═══════════════════════════════════════════════════════════════════════════════

/// Drive the session until stop latches
pub(crate) fn run(
    session: &mut dyn OutputSession,
    provider: &mut dyn SampleProvider,
    state: &LoopStateCell,
) {
    let channels = session.format().channels as usize;
    state.set(LoopState::Running);
    log::info!("render loop running ({:?} mode)", session.notify_mode());

    loop {
        match session.wait_ready(WAIT_SLICE) {
            WaitOutcome::Stop => {
                state.set(LoopState::Draining);
                break;
            }
            WaitOutcome::Ready | WaitOutcome::TimedOut => {}
        }

        let frames = session.available_frames();
        if frames == 0 {
            thread::sleep(FULL_BUFFER_BACKOFF);
            continue;
        }

        if let Err(err) = fill_once(session, provider, frames, channels) {
            log::debug!("render iteration skipped: {err}");
            thread::sleep(FULL_BUFFER_BACKOFF);
        }
    }

    // The stop request already halted the OS stream; whatever the device
    // still queues plays out or is cut on its side. Nothing left to submit.
    state.set(LoopState::Stopped);
    log::info!("render loop stopped");
}

/// One acquire/fill/commit round against the device buffer
fn fill_once(
    session: &mut dyn OutputSession,
    provider: &mut dyn SampleProvider,
    frames: u32,
    channels: usize,
) -> OutputResult<()> {
    let requested = frames as usize * channels;
    {
        let segment = session.acquire(frames)?;
        let produced = provider.render(segment.samples).min(requested);
        // The device plays whatever bytes sit in the region; an
        // under-producing provider must leave silence behind, not stale
        // memory.
        write_silence(&mut segment.samples[produced..]);
    }
    session.commit(frames)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
