//! C64 audio output stage filter.
//!
//! The signal leaving the chip passes through two STC networks on the
//! board: a low-pass RC (R = 10kOhm, C = 1000pF, ~16kHz) and a high-pass
//! DC blocker (R = 10kOhm, C = 10uF, ~1.6Hz, assuming 10kOhm input
//! impedance on the audio equipment). The BJT voltage follower between
//! them is omitted; modeling it would require MHz-level bandwidth for no
//! audible gain.

const R_LP: f64 = 10e3;
const C_LP: f64 = 1000e-12;
const R_HP: f64 = 10e3;
const C_HP: f64 = 10e-6;

/// First-order low-pass plus DC blocker, fixed point.
pub struct ExternalFilter {
    /// Low-pass state, carried at 2^11 precision.
    vlp: i32,
    /// High-pass state, carried at 2^11 precision.
    vhp: i32,
    /// Low-pass coefficient, scaled by 2^7.
    w0lp_1_s7: i32,
    /// High-pass coefficient, scaled by 2^17.
    w0hp_1_s17: i32,
}

impl ExternalFilter {
    /// A filter set up for the PAL clock.
    pub fn new() -> Self {
        let mut filter = ExternalFilter {
            vlp: 0,
            vhp: 0,
            w0lp_1_s7: 0,
            w0hp_1_s17: 0,
        };
        filter.set_clock_frequency(985_248.0);
        filter
    }

    /// Recalculate the coefficients for a system clock frequency.
    ///
    /// First-order IIR: alpha = dt / (dt + R*C) with dt one clock cycle.
    pub fn set_clock_frequency(&mut self, frequency: f64) {
        let dt = 1.0 / frequency;
        self.w0lp_1_s7 = (dt / (dt + R_LP * C_LP) * (1 << 7) as f64 + 0.5) as i32;
        self.w0hp_1_s17 = (dt / (dt + R_HP * C_HP) * (1 << 17) as f64 + 0.5) as i32;
    }

    /// Filter one centered chip output sample.
    #[inline]
    pub fn clock(&mut self, vi: i32) -> i32 {
        let vi = vi << 11;
        let dvlp = (self.w0lp_1_s7 * (vi - self.vlp)) >> 7;
        let dvhp = (self.w0hp_1_s17 * (self.vlp - self.vhp)) >> 17;
        self.vlp += dvlp;
        self.vhp += dvhp;
        (self.vlp - self.vhp) >> 11
    }

    /// Discharge both capacitors.
    pub fn reset(&mut self) {
        self.vlp = 0;
        self.vhp = 0;
    }
}

impl Default for ExternalFilter {
    fn default() -> Self {
        ExternalFilter::new()
    }
}
