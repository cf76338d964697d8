//! Test doubles for the session and provider seams

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use playout_core::{Sample, StreamFormat};

use crate::{
    NotifyMode, OutputError, OutputResult, OutputSession, RenderSegment, SampleProvider,
    SessionControl, WaitOutcome,
};

/// Value the mock pre-fills acquired segments with, so tests can prove the
/// loop overwrote the region rather than inheriting its contents
pub(crate) const STALE: Sample = 7.5;

/// One recorded session call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MockOp {
    Start,
    Wait,
    Acquire(u32),
    Commit(u32),
    RequestStop,
}

/// Everything a test wants to observe after the fact
#[derive(Debug, Default)]
pub(crate) struct MockLog {
    pub ops: Mutex<Vec<MockOp>>,
    pub committed: Mutex<Vec<Vec<Sample>>>,
    pub stop_requested: AtomicBool,
    pub client_running: AtomicBool,
}

impl MockLog {
    pub fn ops(&self) -> Vec<MockOp> {
        self.ops.lock().clone()
    }

    pub fn op_count(&self) -> usize {
        self.ops.lock().len()
    }

    pub fn acquired_frames(&self) -> Vec<u32> {
        self.ops()
            .iter()
            .filter_map(|op| match op {
                MockOp::Acquire(frames) => Some(*frames),
                _ => None,
            })
            .collect()
    }

    pub fn committed_frames(&self) -> Vec<u32> {
        self.ops()
            .iter()
            .filter_map(|op| match op {
                MockOp::Commit(frames) => Some(*frames),
                _ => None,
            })
            .collect()
    }
}

/// What a finite availability script does once it runs out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnExhausted {
    /// Report the stop signal (self-terminating unit tests)
    Stop,
    /// Start over from the top (runs until a control stops it)
    Cycle,
}

/// Scripted in-memory session
///
/// Each loop iteration consumes one scripted padding answer. Finite scripts
/// end by reporting stop; cycling scripts repeat until a [`MockControl`]
/// latches the stop flag.
pub(crate) struct MockSession {
    log: Arc<MockLog>,
    format: StreamFormat,
    capacity: u32,
    notify: NotifyMode,
    /// `None` entries make the padding query fail
    paddings: Vec<Option<u32>>,
    cursor: usize,
    on_exhausted: OnExhausted,
    acquire_faults: usize,
    scratch: Vec<Sample>,
    pending: Option<u32>,
}

impl MockSession {
    pub fn new(format: StreamFormat, capacity: u32) -> Self {
        Self {
            log: Arc::new(MockLog::default()),
            format,
            capacity,
            notify: NotifyMode::Event,
            paddings: Vec::new(),
            cursor: 0,
            on_exhausted: OnExhausted::Stop,
            acquire_faults: 0,
            scratch: Vec::new(),
            pending: None,
        }
    }

    /// Script the writable frame counts the loop will observe, in order
    pub fn available(mut self, frames: &[u32]) -> Self {
        for &avail in frames {
            assert!(avail <= self.capacity);
            self.paddings.push(Some(self.capacity - avail));
        }
        self
    }

    /// Script raw padding answers (may exceed capacity)
    pub fn raw_padding(mut self, paddings: &[u32]) -> Self {
        self.paddings.extend(paddings.iter().map(|p| Some(*p)));
        self
    }

    /// Script one failing padding query
    pub fn padding_failure(mut self) -> Self {
        self.paddings.push(None);
        self
    }

    /// Repeat the script until a control stops the session
    pub fn cycling(mut self) -> Self {
        self.on_exhausted = OnExhausted::Cycle;
        self
    }

    /// Report no event support, as a degraded device would
    pub fn polling(mut self) -> Self {
        self.notify = NotifyMode::Polling;
        self
    }

    /// Fail the next `n` acquisitions
    pub fn acquire_faults(mut self, n: usize) -> Self {
        self.acquire_faults = n;
        self
    }

    pub fn log(&self) -> Arc<MockLog> {
        Arc::clone(&self.log)
    }
}

impl OutputSession for MockSession {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn buffer_frames(&self) -> u32 {
        self.capacity
    }

    fn notify_mode(&self) -> NotifyMode {
        self.notify
    }

    fn control(&self) -> Box<dyn SessionControl> {
        Box::new(MockControl {
            log: Arc::clone(&self.log),
        })
    }

    fn start(&mut self) -> OutputResult<()> {
        self.log.ops.lock().push(MockOp::Start);
        self.log.client_running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn wait_ready(&mut self, _timeout: Duration) -> WaitOutcome {
        self.log.ops.lock().push(MockOp::Wait);
        if self.log.stop_requested.load(Ordering::SeqCst) {
            return WaitOutcome::Stop;
        }
        if self.paddings.is_empty() {
            return WaitOutcome::Stop;
        }
        if self.cursor >= self.paddings.len() {
            match self.on_exhausted {
                OnExhausted::Stop => return WaitOutcome::Stop,
                OnExhausted::Cycle => self.cursor = 0,
            }
        }
        match self.notify {
            NotifyMode::Event => WaitOutcome::Ready,
            NotifyMode::Polling => WaitOutcome::TimedOut,
        }
    }

    fn padding(&mut self) -> OutputResult<u32> {
        let entry = self.paddings.get(self.cursor).copied();
        self.cursor += 1;
        match entry {
            Some(Some(padding)) => Ok(padding),
            Some(None) => Err(OutputError::BufferBusy),
            None => Ok(self.capacity),
        }
    }

    fn acquire(&mut self, frames: u32) -> OutputResult<RenderSegment<'_>> {
        self.log.ops.lock().push(MockOp::Acquire(frames));
        if self.acquire_faults > 0 {
            self.acquire_faults -= 1;
            return Err(OutputError::BufferBusy);
        }
        let samples = frames as usize * self.format.channels as usize;
        self.scratch.clear();
        self.scratch.resize(samples, STALE);
        self.pending = Some(frames);
        Ok(RenderSegment {
            samples: &mut self.scratch[..samples],
            frames,
        })
    }

    fn commit(&mut self, frames: u32) -> OutputResult<()> {
        self.log.ops.lock().push(MockOp::Commit(frames));
        assert_eq!(
            self.pending.take(),
            Some(frames),
            "commit must match the acquisition"
        );
        let samples = frames as usize * self.format.channels as usize;
        self.log.committed.lock().push(self.scratch[..samples].to_vec());
        Ok(())
    }
}

/// Stop handle over the shared mock log
pub(crate) struct MockControl {
    log: Arc<MockLog>,
}

impl SessionControl for MockControl {
    fn request_stop(&self) {
        self.log.ops.lock().push(MockOp::RequestStop);
        self.log.stop_requested.store(true, Ordering::SeqCst);
        self.log.client_running.store(false, Ordering::SeqCst);
    }
}

/// Provider with a configurable per-call shortfall
pub(crate) struct ScriptedProvider {
    pub value: Sample,
    pub shortfall: usize,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    /// Produces every requested sample at `value`
    pub fn full(value: Sample) -> Self {
        Self {
            value,
            shortfall: 0,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Produces nothing at all
    pub fn empty() -> Self {
        Self {
            value: 0.0,
            shortfall: usize::MAX,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl SampleProvider for ScriptedProvider {
    fn render(&mut self, output: &mut [Sample]) -> usize {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let produced = output.len().saturating_sub(self.shortfall);
        for s in &mut output[..produced] {
            *s = self.value;
        }
        produced
    }
}
