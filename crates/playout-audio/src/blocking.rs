//! Blocking push-model output contract
//!
//! Platforms without an event-driven render path expose a simple blocking
//! sink instead: the caller pushes interleaved bytes and the write blocks
//! until the device accepted them. Dropping the sink releases the device.

use playout_core::StreamFormat;

use crate::OutputResult;

/// Blocking audio sink for push-model backends
///
/// `write` takes whole interleaved frames in the format `open` negotiated
/// and returns once the device owns the bytes. `drain` blocks until
/// everything written has actually played.
pub trait BlockingOutput: Sized {
    /// Open the default device for the requested format
    fn open(format: StreamFormat) -> OutputResult<Self>;

    /// Push interleaved sample bytes, blocking until accepted
    fn write(&mut self, bytes: &[u8]) -> OutputResult<()>;

    /// Block until all written audio has played out
    fn drain(&mut self) -> OutputResult<()>;
}
