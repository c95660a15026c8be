//! Two-pass Kaiser-windowed sinc resampler.
//!
//! Resampling in one step from ~1MHz to an audio rate needs a very long
//! FIR. Chaining two shorter filters through an intermediate frequency
//! is much cheaper; Laurent Ganier's formula picks the intermediate
//! frequency that minimizes the summed filter order:
//!
//! ```text
//! 2 * pass_freq + sqrt( 2 * pass_freq * clock_freq
//!     * (sample_freq - 2 * pass_freq) / sample_freq )
//! ```
//!
//! Based on "A Flexible Sampling-Rate Conversion Method" by J. O. Smith
//! and P. Gosset, and the expanded tutorial at
//! <http://www-ccrma.stanford.edu/~jos/resample/>.

use crate::{Result, SidError};

use super::Resampler;

/// Each pass decimates by a modest ratio, so a small ring suffices.
const RING_SIZE: usize = 2048;
const RING_MASK: usize = RING_SIZE - 1;

const FIXP_SHIFT: i32 = 10;
const FIXP_SCALE: i32 = 1 << FIXP_SHIFT;
const FIXP_MASK: i32 = FIXP_SCALE - 1;

/// End of passband for output rates above 44kHz. Lower rates get 45%
/// of the rate so a transition band remains below Nyquist.
const DEFAULT_PASSBAND: f64 = 20000.0;

/// Phase-shifted FIR coefficient tables for one pass.
struct Fir {
    data: Vec<i16>,
    /// Filter length, odd.
    n: i32,
    /// Number of phase-shifted tables.
    res: i32,
}

/// High quality converter chaining two sinc decimators.
pub struct TwoPassSincResampler {
    fir1: Fir,
    fir2: Fir,
    // Double-length rings; every sample is stored twice so a
    // convolution window never has to wrap.
    buffer1: Vec<i32>,
    buffer2: Vec<i32>,
    index1: usize,
    index2: usize,
    offset1: i32,
    offset2: i32,
    cycles_per_sample1: i32,
    cycles_per_sample2: i32,
    output_value1: i32,
    output_value2: i32,
}

impl TwoPassSincResampler {
    /// Build the two filter stages for a clock/sample rate pair.
    ///
    /// The sample frequency cannot be arbitrarily low: the per-pass FIR
    /// must fit the ring buffer. For a ~1MHz clock anything from ~8kHz
    /// up is fine.
    pub fn new(clock_frequency: f64, sampling_frequency: f64) -> Result<Self> {
        let passband = Self::passband_freq(sampling_frequency);
        let intermediate = 2.0 * passband
            + (2.0 * passband * clock_frequency * (sampling_frequency - 2.0 * passband)
                / sampling_frequency)
                .sqrt();

        let fir1 = Self::build_fir(clock_frequency, intermediate, passband);
        let fir2 = Self::build_fir(intermediate, sampling_frequency, passband);

        for fir in [&fir1, &fir2] {
            if fir.n as usize > RING_SIZE {
                return Err(SidError::ConfigError(format!(
                    "sample frequency {sampling_frequency} too low for clock {clock_frequency}"
                )));
            }
        }

        Ok(TwoPassSincResampler {
            cycles_per_sample1: (clock_frequency / intermediate * FIXP_SCALE as f64) as i32,
            cycles_per_sample2: (intermediate / sampling_frequency * FIXP_SCALE as f64) as i32,
            fir1,
            fir2,
            buffer1: vec![0; RING_SIZE * 2],
            buffer2: vec![0; RING_SIZE * 2],
            index1: 0,
            index2: 0,
            offset1: 0,
            offset2: 0,
            output_value1: 0,
            output_value2: 0,
        })
    }

    fn passband_freq(sample_freq: f64) -> f64 {
        if sample_freq > 44000.0 {
            DEFAULT_PASSBAND
        } else {
            sample_freq * 0.45
        }
    }

    /// Kaiser-windowed sinc FIR for one decimation pass.
    fn build_fir(input_freq: f64, output_freq: f64, passband_freq: f64) -> Fir {
        let cycles_per_sample = input_freq / output_freq;
        let samples_per_cycle = output_freq / input_freq;

        // 16-bit output wants -96dB stopband attenuation.
        let atten = -20.0_f64 * (1.0 / (1_i32 << 16) as f64).log10();

        let dw = (1.0 - 2.0 * passband_freq / output_freq) * std::f64::consts::PI * 2.0;

        // Kaiser parameters per the MATLAB kaiserord reference.
        let beta = 0.1102_f64 * (atten - 8.7);
        let i0_beta = i0(beta);

        // The filter order equals the number of zero crossings and must
        // be even; the length must be odd (sinc is symmetric about 0).
        let mut order = ((atten - 7.95) / (2.285 * dw) + 0.5) as i32;
        order += order & 1;

        let mut n = (order as f64 * cycles_per_sample) as i32 + 1;
        n |= 1;

        // Interpolated table lookup error is bounded by 1.234/L^2.
        let res = ((1.234_f64 * (1 << 16) as f64).sqrt() * samples_per_cycle).ceil() as i32;

        let mut data = vec![0i16; (n * res) as usize];
        let half = n / 2;
        let half_f = half as f64;
        let scale = 32768.0 * samples_per_cycle;

        for phase in 0..res {
            let phase_offset = phase as f64 / res as f64 + half_f;
            for tap in 0..n {
                let x = tap as f64 - phase_offset;
                let kaiser = {
                    let t = x / half_f;
                    if t.abs() < 1.0 {
                        i0(beta * (1.0 - t * t).sqrt()) / i0_beta
                    } else {
                        0.0
                    }
                };
                let wt = x * samples_per_cycle * std::f64::consts::PI;
                let sinc = if wt.abs() >= 1e-8 { wt.sin() / wt } else { 1.0 };
                data[(phase * n + tap) as usize] = (scale * sinc * kaiser) as i16;
            }
        }

        Fir { data, n, res }
    }

    #[inline]
    fn store(buffer: &mut [i32], index: &mut usize, sample: i32) {
        buffer[*index] = sample;
        buffer[*index + RING_SIZE] = sample;
        *index = (*index + 1) & RING_MASK;
    }

    /// Advance the decimation phase; the convolution offset comes back
    /// when this input instant produces an output.
    #[inline]
    fn check_decimation(offset: &mut i32, cycles_per_sample: i32) -> Option<i32> {
        let result = if *offset < FIXP_SCALE {
            let r = *offset;
            *offset += cycles_per_sample;
            Some(r)
        } else {
            None
        };
        *offset -= FIXP_SCALE;
        result
    }

    /// Convolution against two adjacent phase tables, linearly
    /// interpolated by the sub-cycle remainder.
    fn convolve(fir: &Fir, buffer: &[i32], index: usize, subcycle: i32) -> i32 {
        let mut table = (subcycle * fir.res) >> FIXP_SHIFT;
        let frac = (subcycle * fir.res) & FIXP_MASK;

        let mut start = index + RING_SIZE - fir.n as usize;

        let v1 = Self::dot(
            &buffer[start..start + fir.n as usize],
            &fir.data[(table * fir.n) as usize..],
        );

        table += 1;
        if table == fir.res {
            table = 0;
            start += 1;
        }

        let v2 = Self::dot(
            &buffer[start..start + fir.n as usize],
            &fir.data[(table * fir.n) as usize..],
        );

        v1 + ((frac * (v2 - v1)) >> FIXP_SHIFT)
    }

    #[inline]
    fn dot(samples: &[i32], coeffs: &[i16]) -> i32 {
        let mut acc: i64 = 0;
        for (&s, &c) in samples.iter().zip(coeffs) {
            acc += s as i64 * c as i64;
        }
        // Rounding shift back out of the coefficient scale.
        ((acc + (1 << 14)) >> 15) as i32
    }
}

impl Resampler for TwoPassSincResampler {
    #[inline]
    fn input(&mut self, sample: i32) -> bool {
        Self::store(&mut self.buffer1, &mut self.index1, sample);

        if let Some(offset) = Self::check_decimation(&mut self.offset1, self.cycles_per_sample1) {
            self.output_value1 = Self::convolve(&self.fir1, &self.buffer1, self.index1, offset);

            Self::store(&mut self.buffer2, &mut self.index2, self.output_value1);

            if let Some(offset2) =
                Self::check_decimation(&mut self.offset2, self.cycles_per_sample2)
            {
                self.output_value2 =
                    Self::convolve(&self.fir2, &self.buffer2, self.index2, offset2);
                return true;
            }
        }
        false
    }

    #[inline]
    fn output(&self) -> i32 {
        self.output_value2
    }

    fn reset(&mut self) {
        self.buffer1.iter_mut().for_each(|v| *v = 0);
        self.buffer2.iter_mut().for_each(|v| *v = 0);
        self.index1 = 0;
        self.index2 = 0;
        self.offset1 = 0;
        self.offset2 = 0;
        self.output_value1 = 0;
        self.output_value2 = 0;
    }
}

/// Zeroth order modified Bessel function of the first kind.
fn i0(x: f64) -> f64 {
    // Max acceptable error.
    let i0e = 1e-6;
    let halfx = x / 2.0;
    let mut sum = 1.0;
    let mut u = 1.0;
    let mut n = 1;
    loop {
        let temp = halfx / n as f64;
        n += 1;
        u *= temp * temp;
        sum += u;
        if u < i0e * sum {
            return sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_rate_matches_ratio() {
        let mut resampler = TwoPassSincResampler::new(985_248.0, 44_100.0).unwrap();
        let cycles = 400_000;
        let mut produced = 0;
        for _ in 0..cycles {
            if resampler.input(0) {
                produced += 1;
            }
        }
        let expected = (cycles as f64 * 44_100.0 / 985_248.0) as i32;
        assert!(
            (produced - expected).abs() <= 3,
            "{produced} samples, expected about {expected}"
        );
    }

    #[test]
    fn test_dc_gain_near_unity() {
        let mut resampler = TwoPassSincResampler::new(985_248.0, 44_100.0).unwrap();
        let mut last = 0;
        for _ in 0..100_000 {
            if resampler.input(10_000) {
                last = resampler.output();
            }
        }
        assert!(
            (last - 10_000).abs() < 1_000,
            "DC gain off: {last} for 10000 in"
        );
    }

    #[test]
    fn test_too_low_sample_rate_is_rejected() {
        assert!(TwoPassSincResampler::new(985_248.0, 1_000.0).is_err());
    }

    #[test]
    fn test_reset_clears_state() {
        let mut resampler = TwoPassSincResampler::new(985_248.0, 44_100.0).unwrap();
        for _ in 0..10_000 {
            resampler.input(20_000);
        }
        resampler.reset();
        assert_eq!(resampler.output(), 0);
        // After reset a burst of silence stays silent.
        let mut peak = 0;
        for _ in 0..10_000 {
            if resampler.input(0) {
                peak = peak.max(resampler.output().abs());
            }
        }
        assert_eq!(peak, 0);
    }

    #[test]
    fn test_high_frequency_is_attenuated() {
        // A tone far above the output Nyquist rate must be filtered
        // out rather than aliased down.
        let mut resampler = TwoPassSincResampler::new(985_248.0, 44_100.0).unwrap();
        let mut peak = 0;
        for i in 0..200_000u32 {
            // ~123kHz square wave at the chip clock.
            let sample = if (i / 4) % 2 == 0 { 20_000 } else { -20_000 };
            if resampler.input(sample) && i > 100_000 {
                peak = peak.max(resampler.output().abs());
            }
        }
        assert!(peak < 2_000, "stopband leak: {peak}");
    }
}
