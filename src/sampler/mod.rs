//! Clock-rate to sample-rate conversion.
//!
//! The chip core produces one sample per system clock cycle, near 1MHz.
//! Two strategies bring that down to an audio rate: cheap zero-order
//! decimation with linear interpolation, and a two-pass Kaiser-windowed
//! sinc resampler chained through an intermediate frequency.

mod sinc;
mod soft_clip;
mod zero_order;

pub use sinc::TwoPassSincResampler;
pub use soft_clip::soft_clip;
pub use zero_order::ZeroOrderResampler;

/// Common interface of the output-rate converters.
///
/// One chip-rate sample goes in per call; when enough have accumulated
/// to produce an output-rate sample, `input` returns true and the
/// sample can be collected with `get_output`.
pub trait Resampler {
    /// Feed one chip-rate sample. Returns true when an output sample
    /// is ready.
    fn input(&mut self, sample: i32) -> bool;

    /// The last output-rate sample, unscaled.
    fn output(&self) -> i32;

    /// Drop all buffered state.
    fn reset(&mut self);

    /// The last output sample amplified by `scale`/2 and clipped into
    /// 16 bits.
    #[inline]
    fn get_output(&self, scale: i32) -> i16 {
        soft_clip(self.output() * scale / 2)
    }
}
