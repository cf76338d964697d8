//! Render-thread priority elevation
//!
//! Shared-mode playback tolerates scheduling jitter badly: one late wakeup
//! is an audible underrun. On Windows the render thread registers with
//! MMCSS (Multimedia Class Scheduler Service) under the "Pro Audio" class,
//! falling back to a plain time-critical priority when MMCSS is
//! unavailable. The elevation is scoped to a guard so it reverts on every
//! exit path of the loop, panic unwind included.

/// Outcome of the elevation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityResult {
    /// Elevated (MMCSS or direct thread priority)
    Success,
    /// Could not elevate; the loop runs at default priority
    Failed,
    /// Platform has no elevation path
    Unsupported,
}

/// Scoped elevation of the current thread
///
/// Created on the render thread at loop entry; dropping it reverts
/// whatever was applied.
#[derive(Debug)]
pub struct PriorityGuard {
    result: PriorityResult,
    #[cfg(target_os = "windows")]
    boost: Boost,
}

impl PriorityGuard {
    pub fn result(&self) -> PriorityResult {
        self.result
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Windows Implementation
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(target_os = "windows")]
#[derive(Debug)]
enum Boost {
    Mmcss(windows::Win32::Foundation::HANDLE),
    TimeCritical,
    None,
}

/// Elevate the current thread for audio rendering
#[cfg(target_os = "windows")]
pub fn boost_render_thread() -> PriorityGuard {
    use windows::Win32::System::Threading::{
        AvSetMmThreadCharacteristicsW, GetCurrentThread, SetThreadPriority,
        THREAD_PRIORITY_TIME_CRITICAL,
    };
    use windows::core::PCWSTR;

    // MMCSS is the preferred method for pro audio on Windows.
    let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
    let mut task_index: u32 = 0;

    let mmcss_handle =
        unsafe { AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index) };

    if !mmcss_handle.is_invalid() {
        log::debug!(
            "MMCSS Pro Audio class registered (task index: {})",
            task_index
        );
        return PriorityGuard {
            result: PriorityResult::Success,
            boost: Boost::Mmcss(mmcss_handle),
        };
    }

    log::debug!("MMCSS registration failed, falling back to thread priority");

    let elevated =
        unsafe { SetThreadPriority(GetCurrentThread(), THREAD_PRIORITY_TIME_CRITICAL) };
    if elevated.as_bool() {
        PriorityGuard {
            result: PriorityResult::Success,
            boost: Boost::TimeCritical,
        }
    } else {
        log::warn!("Failed to elevate render thread priority (non-fatal)");
        PriorityGuard {
            result: PriorityResult::Failed,
            boost: Boost::None,
        }
    }
}

#[cfg(target_os = "windows")]
impl Drop for PriorityGuard {
    fn drop(&mut self) {
        use windows::Win32::System::Threading::{
            AvRevertMmThreadCharacteristics, GetCurrentThread, SetThreadPriority,
            THREAD_PRIORITY_NORMAL,
        };

        match self.boost {
            Boost::Mmcss(handle) => unsafe {
                // Best-effort revert. Nothing we can do if it fails.
                let _ = AvRevertMmThreadCharacteristics(handle);
            },
            Boost::TimeCritical => unsafe {
                let _ = SetThreadPriority(GetCurrentThread(), THREAD_PRIORITY_NORMAL);
            },
            Boost::None => {}
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Unsupported Platforms
// ═══════════════════════════════════════════════════════════════════════════════

/// Elevate the current thread for audio rendering
#[cfg(not(target_os = "windows"))]
pub fn boost_render_thread() -> PriorityGuard {
    log::debug!("Render thread priority elevation not supported on this platform");
    PriorityGuard {
        result: PriorityResult::Unsupported,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_reports_platform_outcome() {
        let guard = boost_render_thread();

        #[cfg(target_os = "windows")]
        assert!(matches!(
            guard.result(),
            PriorityResult::Success | PriorityResult::Failed
        ));

        #[cfg(not(target_os = "windows"))]
        assert_eq!(guard.result(), PriorityResult::Unsupported);
    }

    #[test]
    fn test_guard_reverts_without_panic() {
        for _ in 0..2 {
            let _guard = boost_render_thread();
        }
    }
}
