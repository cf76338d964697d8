//! Sample provider contract - the pull seam feeding the render loop

use playout_core::Sample;

/// Pull-model PCM source driven from the render thread
///
/// Called on the device cadence, roughly every 10 ms at default shared-mode
/// buffer sizes. Implementations must not block indefinitely and should
/// avoid allocating per call.
pub trait SampleProvider: Send + 'static {
    /// Fill `output` with interleaved samples in the negotiated format
    ///
    /// Returns how many samples were produced. Producing fewer than
    /// `output.len()` is allowed; the engine supplies silence for the
    /// remainder.
    fn render(&mut self, output: &mut [Sample]) -> usize;
}

impl<F> SampleProvider for F
where
    F: FnMut(&mut [Sample]) -> usize + Send + 'static,
{
    fn render(&mut self, output: &mut [Sample]) -> usize {
        self(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_provider() {
        let mut provider = |output: &mut [Sample]| {
            output.fill(0.5);
            output.len()
        };

        let mut buf = [0.0f32; 4];
        assert_eq!(provider.render(&mut buf), 4);
        assert!(buf.iter().all(|s| *s == 0.5));
    }

    #[test]
    fn test_partial_production() {
        let mut provider = |output: &mut [Sample]| {
            output[0] = 1.0;
            1
        };

        let mut buf = [0.0f32; 4];
        assert_eq!(provider.render(&mut buf), 1);
    }
}
