//! Zero-order decimation with linear interpolation.

use super::Resampler;

const FIXP_SHIFT: i32 = 10;
const FIXP_SCALE: i32 = 1 << FIXP_SHIFT;

/// Linear interpolation between the two chip-rate samples straddling
/// each output instant. Cheap, aliases above the output Nyquist rate.
pub struct ZeroOrderResampler {
    cached_sample: i32,
    /// Clock cycles per output sample, 10-bit fixed point.
    cycles_per_sample: i32,
    sample_offset: i32,
    output_value: i32,
}

impl ZeroOrderResampler {
    /// A decimator for the given clock/sample rate pair.
    pub fn new(clock_frequency: f64, sampling_frequency: f64) -> Self {
        ZeroOrderResampler {
            cached_sample: 0,
            cycles_per_sample: (clock_frequency / sampling_frequency * FIXP_SCALE as f64) as i32,
            sample_offset: 0,
            output_value: 0,
        }
    }
}

impl Resampler for ZeroOrderResampler {
    #[inline]
    fn input(&mut self, sample: i32) -> bool {
        let mut ready = false;

        if self.sample_offset < FIXP_SCALE {
            self.output_value = self.cached_sample
                + ((self.sample_offset * (sample - self.cached_sample)) >> FIXP_SHIFT);
            ready = true;
            self.sample_offset += self.cycles_per_sample;
        }
        self.sample_offset -= FIXP_SCALE;

        self.cached_sample = sample;
        ready
    }

    #[inline]
    fn output(&self) -> i32 {
        self.output_value
    }

    fn reset(&mut self) {
        self.cached_sample = 0;
        self.sample_offset = 0;
        self.output_value = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_rate_matches_ratio() {
        let mut resampler = ZeroOrderResampler::new(985_248.0, 44_100.0);
        let cycles = 200_000;
        let mut produced = 0;
        for _ in 0..cycles {
            if resampler.input(1000) {
                produced += 1;
            }
        }
        let expected = (cycles as f64 * 44_100.0 / 985_248.0) as i32;
        assert!(
            (produced - expected).abs() <= 2,
            "{produced} samples, expected about {expected}"
        );
    }

    #[test]
    fn test_constant_input_passes_through() {
        let mut resampler = ZeroOrderResampler::new(985_248.0, 44_100.0);
        for i in 0..10_000 {
            if resampler.input(12_345) && i > 10 {
                assert_eq!(resampler.output(), 12_345);
            }
        }
    }

    #[test]
    fn test_reset_clears_state() {
        let mut resampler = ZeroOrderResampler::new(985_248.0, 44_100.0);
        for _ in 0..100 {
            resampler.input(30_000);
        }
        resampler.reset();
        assert_eq!(resampler.output(), 0);
    }
}
