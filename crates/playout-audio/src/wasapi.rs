//! WASAPI shared-mode output session
//!
//! Owns the COM object chain for one playback lifetime: device enumerator,
//! default render endpoint, audio client, render client, and the two
//! notification events. Initialization prefers the event-driven path and
//! falls back to a fresh polling client when the device rejects event
//! registration. All buffer math uses the format the device returned, never
//! the requested one.

use std::slice;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_EVENT, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows::Win32::Media::Audio::{
    AUDCLNT_SHAREMODE_SHARED, AUDCLNT_STREAMFLAGS_EVENTCALLBACK, IAudioClient,
    IAudioRenderClient, IMMDevice, IMMDeviceEnumerator, MMDeviceEnumerator, WAVEFORMATEX,
    WAVEFORMATEXTENSIBLE, eConsole, eRender,
};
use windows::Win32::System::Com::{
    CLSCTX_ALL, COINIT_MULTITHREADED, CoCreateInstance, CoInitializeEx, CoTaskMemFree,
};
use windows::Win32::System::Threading::{
    CreateEventW, ResetEvent, SetEvent, WaitForMultipleObjects, WaitForSingleObject,
};
use windows::core::GUID;

use playout_core::{Sample, StreamFormat};

use crate::{
    NotifyMode, OutputConfig, OutputError, OutputResult, OutputSession, RenderSegment,
    SessionControl, WaitOutcome,
};

/// HRESULT for S_FALSE - COM already initialized on this thread
const COM_S_FALSE: u32 = 0x0000_0001;
/// HRESULT for RPC_E_CHANGED_MODE - COM initialized with a different model
const COM_RPC_E_CHANGED_MODE: u32 = 0x8001_0106;

/// WAVEFORMATEX format tag for IEEE float samples
const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
/// WAVEFORMATEX format tag indicating an extensible format structure
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;
/// SubFormat GUID for IEEE float in WAVEFORMATEXTENSIBLE
const KSDATAFORMAT_SUBTYPE_IEEE_FLOAT: GUID =
    GUID::from_u128(0x00000003_0000_0010_8000_00aa00389b71);

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT HANDLES
// ═══════════════════════════════════════════════════════════════════════════════

/// Owned event handle, shared between the session and its stop control
struct EventHandle(HANDLE);

// Event handles are process-global kernel objects; either thread may signal
// or wait on them.
unsafe impl Send for EventHandle {}
unsafe impl Sync for EventHandle {}

impl Drop for EventHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

fn create_event(manual_reset: bool) -> OutputResult<EventHandle> {
    let handle = unsafe { CreateEventW(None, manual_reset, false, None) }
        .map_err(|e| OutputError::Backend(format!("CreateEventW: {e}")))?;
    Ok(EventHandle(handle))
}

// ═══════════════════════════════════════════════════════════════════════════════
// COM SETUP
// ═══════════════════════════════════════════════════════════════════════════════

/// Initialize multithreaded COM on the calling thread.
///
/// S_FALSE and RPC_E_CHANGED_MODE both mean COM is already usable here.
/// Left initialized for the process lifetime; the session may drop on a
/// different thread than the one that opened it.
fn init_com() -> OutputResult<()> {
    let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
    if hr.is_err() {
        let code = hr.0 as u32;
        if code != COM_S_FALSE && code != COM_RPC_E_CHANGED_MODE {
            return Err(OutputError::Backend(format!(
                "CoInitializeEx: 0x{code:08X}"
            )));
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// SESSION
// ═══════════════════════════════════════════════════════════════════════════════

/// Shared-mode render session on the default endpoint
///
/// Field order is drop order: the render client releases before the audio
/// client, and the events close last.
pub(crate) struct WasapiSession {
    render_client: IAudioRenderClient,
    audio_client: IAudioClient,
    stop_event: Arc<EventHandle>,
    ready_event: Arc<EventHandle>,
    format: StreamFormat,
    buffer_frames: u32,
    notify: NotifyMode,
    pending: Option<u32>,
}

// The session is created on the control thread and moved into the render
// thread. COM is initialized multithreaded, so the interfaces may cross.
unsafe impl Send for WasapiSession {}

impl WasapiSession {
    pub(crate) fn open(config: &OutputConfig) -> OutputResult<Self> {
        init_com()?;

        let enumerator: IMMDeviceEnumerator =
            unsafe { CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL) }.map_err(|e| {
                log::error!("device enumerator unavailable: {e}");
                OutputError::DeviceUnavailable
            })?;

        let device: IMMDevice = unsafe { enumerator.GetDefaultAudioEndpoint(eRender, eConsole) }
            .map_err(|e| {
                log::error!("no default render endpoint: {e}");
                OutputError::DeviceUnavailable
            })?;

        // Both events exist before any client initialization attempt.
        let stop_event = Arc::new(create_event(true)?);
        let ready_event = Arc::new(create_event(false)?);

        // Event-driven first; a fresh polling client when the device rejects
        // event registration.
        let (audio_client, format, notify) =
            match activate_client(&device, &ready_event, NotifyMode::Event) {
                Ok((client, format)) => (client, format, NotifyMode::Event),
                Err(err) => {
                    log::warn!("event-driven init rejected ({err}), falling back to polling");
                    let (client, format) =
                        activate_client(&device, &ready_event, NotifyMode::Polling)?;
                    (client, format, NotifyMode::Polling)
                }
            };

        let buffer_frames = unsafe { audio_client.GetBufferSize() }
            .map_err(|e| OutputError::Backend(format!("GetBufferSize: {e}")))?;
        let render_client: IAudioRenderClient = unsafe { audio_client.GetService() }
            .map_err(|e| OutputError::Backend(format!("GetService: {e}")))?;

        if config.sample_rate != format.sample_rate || config.channels != format.channels {
            log::debug!(
                "requested {} Hz / {} ch, device chose {} Hz / {} ch",
                config.sample_rate,
                config.channels,
                format.sample_rate,
                format.channels
            );
        }
        log::info!(
            "wasapi session open: {} Hz, {} ch, {} frame buffer, {:?} notification",
            format.sample_rate,
            format.channels,
            buffer_frames,
            notify
        );

        Ok(Self {
            render_client,
            audio_client,
            stop_event,
            ready_event,
            format,
            buffer_frames,
            notify,
            pending: None,
        })
    }
}

/// Activate a client against `device` and initialize it shared-mode with a
/// device-chosen buffer size.
fn activate_client(
    device: &IMMDevice,
    ready_event: &EventHandle,
    mode: NotifyMode,
) -> OutputResult<(IAudioClient, StreamFormat)> {
    let client: IAudioClient = unsafe { device.Activate(CLSCTX_ALL, None) }.map_err(|e| {
        log::error!("audio client activation failed: {e}");
        OutputError::DeviceUnavailable
    })?;

    let mix = unsafe { client.GetMixFormat() }
        .map_err(|e| OutputError::FormatNegotiation(format!("GetMixFormat: {e}")))?;

    // The mix format is freed exactly once, whether initialization succeeds
    // or not.
    let result = unsafe { parse_mix_format(mix) }.and_then(|format| {
        let flags = match mode {
            NotifyMode::Event => AUDCLNT_STREAMFLAGS_EVENTCALLBACK,
            NotifyMode::Polling => 0,
        };
        unsafe { client.Initialize(AUDCLNT_SHAREMODE_SHARED, flags, 0, 0, mix, None) }
            .map_err(|e| OutputError::Backend(format!("Initialize: {e}")))?;
        Ok(format)
    });
    unsafe { CoTaskMemFree(Some(mix as *const _)) };
    let format = result?;

    if mode == NotifyMode::Event {
        unsafe { client.SetEventHandle(ready_event.0) }
            .map_err(|e| OutputError::Backend(format!("SetEventHandle: {e}")))?;
    }

    Ok((client, format))
}

/// Validate the mix format and translate it.
///
/// The render path writes f32 straight into the device buffer, so anything
/// other than 32-bit IEEE float is a negotiation failure.
///
/// # Safety
///
/// `mix` must point at the WAVEFORMATEX returned by `GetMixFormat`.
unsafe fn parse_mix_format(mix: *const WAVEFORMATEX) -> OutputResult<StreamFormat> {
    if mix.is_null() {
        return Err(OutputError::FormatNegotiation("null mix format".into()));
    }
    let fmt = unsafe { &*mix };

    let float32 = fmt.wBitsPerSample == 32
        && match fmt.wFormatTag {
            WAVE_FORMAT_IEEE_FLOAT => true,
            WAVE_FORMAT_EXTENSIBLE => {
                let ext = mix as *const WAVEFORMATEXTENSIBLE;
                // read_unaligned because the extensible struct may not be
                // properly aligned.
                let sub = unsafe { std::ptr::read_unaligned(std::ptr::addr_of!((*ext).SubFormat)) };
                sub == KSDATAFORMAT_SUBTYPE_IEEE_FLOAT
            }
            _ => false,
        };
    if !float32 {
        return Err(OutputError::FormatNegotiation(format!(
            "mix format is not 32-bit float (tag 0x{:04X}, {} bits)",
            fmt.wFormatTag, fmt.wBitsPerSample
        )));
    }

    Ok(StreamFormat::new(
        fmt.nSamplesPerSec,
        fmt.nChannels,
        fmt.wBitsPerSample,
    ))
}

impl OutputSession for WasapiSession {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn buffer_frames(&self) -> u32 {
        self.buffer_frames
    }

    fn notify_mode(&self) -> NotifyMode {
        self.notify
    }

    fn control(&self) -> Box<dyn SessionControl> {
        Box::new(WasapiControl {
            audio_client: self.audio_client.clone(),
            stop_event: Arc::clone(&self.stop_event),
        })
    }

    fn start(&mut self) -> OutputResult<()> {
        unsafe {
            let _ = ResetEvent(self.stop_event.0);
            self.audio_client
                .Start()
                .map_err(|e| OutputError::Backend(format!("client start: {e}")))
        }
    }

    fn wait_ready(&mut self, timeout: Duration) -> WaitOutcome {
        const READY: WAIT_EVENT = WAIT_EVENT(WAIT_OBJECT_0.0 + 1);

        let ms = timeout.as_millis() as u32;
        let result = match self.notify {
            NotifyMode::Event => unsafe {
                WaitForMultipleObjects(&[self.stop_event.0, self.ready_event.0], false, ms)
            },
            NotifyMode::Polling => unsafe { WaitForSingleObject(self.stop_event.0, ms) },
        };

        match result {
            WAIT_OBJECT_0 => WaitOutcome::Stop,
            READY => WaitOutcome::Ready,
            WAIT_TIMEOUT => WaitOutcome::TimedOut,
            _ => {
                // A failed wait returns immediately; pace the loop by hand
                // so it cannot spin hot.
                log::debug!("wait failed (0x{:08X})", result.0);
                thread::sleep(timeout);
                WaitOutcome::TimedOut
            }
        }
    }

    fn padding(&mut self) -> OutputResult<u32> {
        unsafe { self.audio_client.GetCurrentPadding() }.map_err(|e| {
            log::debug!("GetCurrentPadding: {e}");
            OutputError::BufferBusy
        })
    }

    fn acquire(&mut self, frames: u32) -> OutputResult<RenderSegment<'_>> {
        debug_assert!(self.pending.is_none(), "acquire while a segment is out");

        let ptr = unsafe { self.render_client.GetBuffer(frames) }.map_err(|e| {
            log::debug!("GetBuffer({frames}): {e}");
            OutputError::BufferBusy
        })?;

        let samples = frames as usize * self.format.channels as usize;
        self.pending = Some(frames);
        // The region stays valid until ReleaseBuffer; the borrow on self
        // keeps the commit from happening while the segment lives.
        let buf = unsafe { slice::from_raw_parts_mut(ptr as *mut Sample, samples) };
        Ok(RenderSegment {
            samples: buf,
            frames,
        })
    }

    fn commit(&mut self, frames: u32) -> OutputResult<()> {
        let _pending = self.pending.take();
        debug_assert_eq!(_pending, Some(frames), "commit must match the acquisition");

        unsafe { self.render_client.ReleaseBuffer(frames, 0) }.map_err(|e| {
            log::debug!("ReleaseBuffer({frames}): {e}");
            OutputError::BufferBusy
        })
    }
}

impl Drop for WasapiSession {
    fn drop(&mut self) {
        // Idempotent; the control handle usually halted the client already.
        unsafe {
            let _ = self.audio_client.Stop();
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STOP CONTROL
// ═══════════════════════════════════════════════════════════════════════════════

/// Stop handle shared with the lifecycle controller
struct WasapiControl {
    audio_client: IAudioClient,
    stop_event: Arc<EventHandle>,
}

unsafe impl Send for WasapiControl {}
unsafe impl Sync for WasapiControl {}

impl SessionControl for WasapiControl {
    fn request_stop(&self) {
        unsafe {
            // Latch the manual-reset event so every subsequent wait sees it,
            // then halt the mixer pull without waiting for the thread.
            let _ = SetEvent(self.stop_event.0);
            let _ = self.audio_client.Stop();
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
