//! Output engine lifecycle
//!
//! [`AudioOutput`] walks a one-way path: bind a provider while freshly
//! created, start exactly once, stop without blocking, close to reclaim
//! everything. Starting hands the session and provider to a dedicated
//! render thread; after that the engine only talks to the stream through
//! the detached stop control.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use playout_core::StreamFormat;

use crate::render::{self, LoopState, LoopStateCell};
use crate::{
    NotifyMode, OutputConfig, OutputError, OutputResult, OutputSession, SampleProvider,
    SessionControl, session, thread_priority,
};

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle stage of an [`AudioOutput`]
///
/// Stages only advance: `Created` accepts provider binds and one start,
/// `Active` accepts stop and close, `Stopping` means the stream was halted
/// but the thread is not reclaimed yet, `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Created,
    Active,
    Stopping,
    Closed,
}

struct Inner {
    state: EngineState,
    session: Option<Box<dyn OutputSession>>,
    provider: Option<Box<dyn SampleProvider>>,
    control: Option<Box<dyn SessionControl>>,
    thread: Option<JoinHandle<()>>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// AUDIO OUTPUT
// ═══════════════════════════════════════════════════════════════════════════════

/// Real-time audio output engine over the default render device
pub struct AudioOutput {
    inner: Mutex<Inner>,
    loop_state: Arc<LoopStateCell>,
    format: StreamFormat,
    buffer_frames: u32,
    notify: NotifyMode,
}

impl AudioOutput {
    /// Open the default render device and wrap it in a fresh engine
    pub fn new(config: &OutputConfig) -> OutputResult<Self> {
        let session = session::open_default(config)?;
        Ok(Self::from_session(session))
    }

    pub(crate) fn from_session(session: Box<dyn OutputSession>) -> Self {
        let format = session.format();
        let buffer_frames = session.buffer_frames();
        let notify = session.notify_mode();
        let control = session.control();

        log::info!(
            "output engine created: {} Hz, {} ch, {} frame buffer, {:?} notification",
            format.sample_rate,
            format.channels,
            buffer_frames,
            notify
        );

        Self {
            inner: Mutex::new(Inner {
                state: EngineState::Created,
                session: Some(session),
                provider: None,
                control: Some(control),
                thread: None,
            }),
            loop_state: Arc::new(LoopStateCell::new()),
            format,
            buffer_frames,
            notify,
        }
    }

    /// Bind the sample source for this playback; rebinding before start
    /// replaces the previous one
    pub fn bind_provider(&self, provider: Box<dyn SampleProvider>) -> OutputResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != EngineState::Created {
            return Err(OutputError::InvalidState(
                "provider binding requires a freshly created engine",
            ));
        }
        inner.provider = Some(provider);
        Ok(())
    }

    /// Start the stream and spawn the render thread
    ///
    /// The OS-side stream starts first; if the thread then fails to spawn,
    /// the session is dropped, which halts the stream again, and the engine
    /// closes. A failed stream start leaves the engine created and
    /// retryable.
    pub fn start(&self) -> OutputResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != EngineState::Created {
            return Err(OutputError::InvalidState(
                "start requires a freshly created engine",
            ));
        }

        let Some(mut provider) = inner.provider.take() else {
            return Err(OutputError::NotReady("no provider bound"));
        };
        let Some(mut session) = inner.session.take() else {
            inner.provider = Some(provider);
            return Err(OutputError::InvalidState("session already consumed"));
        };

        if let Err(err) = session.start() {
            log::error!("output start failed: {err}");
            inner.session = Some(session);
            inner.provider = Some(provider);
            return Err(err);
        }

        let loop_state = Arc::clone(&self.loop_state);
        let spawned = thread::Builder::new()
            .name("playout-render".into())
            .spawn(move || {
                let _priority = thread_priority::boost_render_thread();
                render::run(session.as_mut(), provider.as_mut(), &loop_state);
            });

        match spawned {
            Ok(handle) => {
                inner.thread = Some(handle);
                inner.state = EngineState::Active;
                log::info!("output engine active");
                Ok(())
            }
            Err(err) => {
                // The unspawned closure already dropped the session, which
                // halted the freshly started stream.
                log::error!("render thread spawn failed: {err}");
                inner.state = EngineState::Closed;
                inner.control = None;
                Err(OutputError::Backend(format!("thread spawn: {err}")))
            }
        }
    }

    /// Halt playback without blocking
    ///
    /// Latches the stop signal and stops the OS stream immediately; the
    /// render thread is reclaimed by [`close`](Self::close). A no-op unless
    /// the engine is active.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if inner.state != EngineState::Active {
            return;
        }
        inner.state = EngineState::Stopping;
        if let Some(control) = &inner.control {
            control.request_stop();
        }
        log::info!("output engine stopping");
    }

    /// Stop if needed, join the render thread, and release the device
    ///
    /// Idempotent; also invoked on drop.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.state == EngineState::Closed {
            return;
        }
        if inner.state == EngineState::Active {
            if let Some(control) = &inner.control {
                control.request_stop();
            }
            inner.state = EngineState::Stopping;
        }

        // The render thread never touches this lock, so joining under it is
        // safe and keeps close atomic against concurrent callers.
        if let Some(handle) = inner.thread.take() {
            if handle.join().is_err() {
                log::error!("render thread panicked before close");
            }
        }

        inner.session = None;
        inner.provider = None;
        inner.control = None;
        inner.state = EngineState::Closed;
        log::info!("output engine closed");
    }

    /// Format the device negotiated at open
    #[inline]
    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Device buffer capacity in frames
    #[inline]
    pub fn buffer_frames(&self) -> u32 {
        self.buffer_frames
    }

    /// Notification mode the session ended up with
    #[inline]
    pub fn notify_mode(&self) -> NotifyMode {
        self.notify
    }

    /// Current lifecycle stage
    pub fn state(&self) -> EngineState {
        self.inner.lock().state
    }

    /// Render loop stage, readable without blocking
    #[inline]
    pub fn loop_state(&self) -> LoopState {
        self.loop_state.get()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.state() == EngineState::Closed
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.close();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
