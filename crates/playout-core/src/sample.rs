//! Sample types for the render path

/// Type alias for audio samples (f32, the shared-mode mixer's native format)
pub type Sample = f32;

/// Digital silence
pub const SILENCE: Sample = 0.0;

/// Fill an interleaved buffer with silence
#[inline]
pub fn write_silence(buf: &mut [Sample]) {
    buf.fill(SILENCE);
}
