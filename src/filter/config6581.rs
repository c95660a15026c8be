//! 6581 filter model configuration.
//!
//! Holds every lookup table needed by the 6581 filter: the shared op-amp
//! tables plus the EKV tables for the voltage-controlled cutoff resistor
//! and the 11-bit cutoff DAC. Building the tables costs millions of
//! Newton iterations, so the finished config is published once as a
//! process-wide shared instance.

use std::sync::Arc;

use parking_lot::RwLock;

use super::config::{build_filter_tables, to_u16, BuildParams, FilterTables, VoltageScale};
use super::integrator::Integrator6581;
use super::spline::Point;
use crate::config::ChipModel;
use crate::tables::dac::Dac;

/// Op-amp voltage transfer, measured on a chip marked MOS 6581R4AR 3789.
const OPAMP_VOLTAGE: [Point; 33] = [
    Point { x: 0.81, y: 10.31 }, // Approximate start of actual range
    Point { x: 2.40, y: 10.31 },
    Point { x: 2.60, y: 10.30 },
    Point { x: 2.70, y: 10.29 },
    Point { x: 2.80, y: 10.26 },
    Point { x: 2.90, y: 10.17 },
    Point { x: 3.00, y: 10.04 },
    Point { x: 3.10, y: 9.83 },
    Point { x: 3.20, y: 9.58 },
    Point { x: 3.30, y: 9.32 },
    Point { x: 3.50, y: 8.69 },
    Point { x: 3.70, y: 8.00 },
    Point { x: 4.00, y: 6.89 },
    Point { x: 4.40, y: 5.21 },
    Point { x: 4.54, y: 4.54 }, // Working point (vi = vo)
    Point { x: 4.60, y: 4.19 },
    Point { x: 4.80, y: 3.00 },
    Point { x: 4.90, y: 2.30 },
    Point { x: 4.95, y: 2.03 },
    Point { x: 5.00, y: 1.88 },
    Point { x: 5.05, y: 1.77 },
    Point { x: 5.10, y: 1.69 },
    Point { x: 5.20, y: 1.58 },
    Point { x: 5.40, y: 1.44 },
    Point { x: 5.60, y: 1.33 },
    Point { x: 5.80, y: 1.26 },
    Point { x: 6.00, y: 1.21 },
    Point { x: 6.40, y: 1.12 },
    Point { x: 7.00, y: 1.02 },
    Point { x: 7.50, y: 0.97 },
    Point { x: 8.50, y: 0.89 },
    Point { x: 10.00, y: 0.81 },
    Point { x: 10.31, y: 0.81 }, // Approximate end of actual range
];

const VOICE_VOLTAGE_RANGE: f64 = 1.5;
const VOICE_DC_VOLTAGE: f64 = 5.0;

/// Integrator capacitor value.
const C: f64 = 470e-12;

// Transistor parameters.
const VDD: f64 = 12.18;
const VTH: f64 = 1.31;
/// Thermal voltage Ut = kT/q.
const UT: f64 = 26.0e-3;

// W/L ratios.
const WL_VCR: f64 = 9.0;
const WL_SNAKE: f64 = 1.0 / 115.0;

// Cutoff DAC parameters.
const DAC_ZERO: f64 = 6.65;
const DAC_SCALE: f64 = 2.63;
const DAC_BITS: u32 = 11;

static INSTANCE: RwLock<Option<Arc<FilterModelConfig6581>>> = RwLock::new(None);

/// Precomputed tables and constants for the 6581 filter.
pub struct FilterModelConfig6581 {
    scale: VoltageScale,
    tables: FilterTables,
    /// VCR gate voltage table: Vg = Vddt - sqrt(i*2^16).
    vcr_n_vg: Vec<u16>,
    /// EKV moderate-inversion current term, scaled by m*2^15.
    vcr_n_ids_term: Vec<u16>,
    dac: Dac,
    vddt: f64,
}

impl FilterModelConfig6581 {
    /// Default transconductance coefficient u*Cox.
    pub const UCOX: f64 = 20e-6;

    /// Fetch the shared instance, building the tables on first use.
    pub fn instance() -> Arc<Self> {
        if let Some(config) = INSTANCE.read().as_ref() {
            return Arc::clone(config);
        }

        let mut guard = INSTANCE.write();
        if let Some(config) = guard.as_ref() {
            return Arc::clone(config);
        }

        let config = Arc::new(Self::new());
        *guard = Some(Arc::clone(&config));
        config
    }

    fn new() -> Self {
        let vddt = VDD - VTH;
        let scale = VoltageScale::new(&OPAMP_VOLTAGE, vddt);

        // Die photographs show gain ~ vol/8 and 1/Q ~ res/8 on the volume
        // and bandpass "resistor" ladders.
        let gain_n: [f64; 16] = std::array::from_fn(|n8| n8 as f64 / 8.0);

        let params = BuildParams {
            opamp_voltage: &OPAMP_VOLTAGE,
            vddt,
            mixer_ratio: 8.0 / 6.0,
            volume_n: gain_n,
            resonance_n: gain_n,
        };

        let tables = build_filter_tables(&scale, &params);

        // VCR gate voltage. The table index is right-shifted 16 times to
        // fit 16 bits, so the sqrt argument is multiplied back by 2^16.
        let n_vddt = scale.n16 * (vddt - scale.vmin);
        let vcr_n_vg: Vec<u16> = (0..1u64 << 16)
            .map(|i| to_u16(n_vddt - ((i << 16) as f64).sqrt()))
            .collect();

        // EKV model:
        //   Ids = Is*(if - ir)
        //   Is  = (2*u*Cox*Ut^2)*W/L
        //   if  = ln^2(1 + e^((k*(Vg - Vt) - Vs)/(2*Ut)))
        //   ir  = ln^2(1 + e^((k*(Vg - Vt) - Vd)/(2*Ut)))
        let is_cur = (2.0 * Self::UCOX * UT * UT) * WL_VCR;

        // Normalize the current for one cycle at 1MHz.
        let n15 = scale.norm * ((1u32 << 15) - 1) as f64;
        let n_is = n15 * 1.0e-6 / C * is_cur;

        let vcr_n_ids_term: Vec<u16> = (0..1u32 << 16)
            .map(|k_vgt_vx| {
                let log_term = ((k_vgt_vx as f64 / scale.n16) / (2.0 * UT)).exp().ln_1p();
                to_u16(n_is * log_term * log_term)
            })
            .collect();

        FilterModelConfig6581 {
            scale,
            tables,
            vcr_n_vg,
            vcr_n_ids_term,
            dac: Dac::new(DAC_BITS, ChipModel::Mos6581),
            vddt,
        }
    }

    #[inline]
    pub(super) fn opamp_rev(&self, i: usize) -> u16 {
        self.tables.opamp_rev[i]
    }

    #[inline]
    pub(super) fn vcr_n_vg(&self, i: usize) -> u16 {
        self.vcr_n_vg[i]
    }

    #[inline]
    pub(super) fn vcr_n_ids_term(&self, i: usize) -> u16 {
        self.vcr_n_ids_term[i]
    }

    pub(super) fn tables(&self) -> &FilterTables {
        &self.tables
    }

    /// The digital range of one voice is 20 bits; scaling term for
    /// multiplication which fits in 11 bits.
    pub(crate) fn voice_scale_s11(&self) -> i32 {
        ((self.scale.norm * ((1u32 << 11) - 1) as f64) * VOICE_VOLTAGE_RANGE) as i32
    }

    /// The "zero" output level of the voices.
    pub(crate) fn voice_dc(&self) -> i32 {
        (self.scale.n16 * (VOICE_DC_VOLTAGE - self.scale.vmin)) as i32
    }

    /// Build the 11-bit cutoff DAC output voltage table for the given
    /// curve adjustment (0.0 to 1.0, 0.5 being the average chip).
    pub(crate) fn f0_dac(&self, adjustment: f64) -> Vec<u16> {
        let dac_zero = DAC_ZERO + (1.0 - adjustment);
        let max_code = ((1u32 << DAC_BITS) - 1) as f64;

        (0..1u32 << DAC_BITS)
            .map(|i| {
                let fcd = self.dac.output(i) * max_code;
                to_u16(
                    self.scale.n16
                        * (dac_zero + fcd * DAC_SCALE / (1u32 << DAC_BITS) as f64
                            - self.scale.vmin),
                )
            })
            .collect()
    }

    /// Normalized snake current factor for one cycle at 1MHz. Fits in
    /// 5 bits at the default transconductance.
    pub(crate) fn n_snake(&self, u_cox: f64) -> u16 {
        to_u16(self.scale.denorm * (1u32 << 13) as f64 * (u_cox / 2.0 * WL_SNAKE * 1.0e-6 / C))
    }

    pub(super) fn n_vddt(&self) -> u16 {
        // Vddt normalized so translated values can be subtracted:
        // Vddt - x = (Vddt - t) - (x - t)
        to_u16(self.scale.n16 * (self.vddt - self.scale.vmin))
    }

    pub(super) fn n_vt(&self) -> u16 {
        to_u16(self.scale.n16 * (VTH - self.scale.vmin))
    }

    pub(super) fn n_vmin(&self) -> u16 {
        to_u16(self.scale.n16 * self.scale.vmin)
    }

    /// Construct an integrator solver bound to this config.
    pub fn build_integrator(&self) -> Integrator6581 {
        Integrator6581::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_is_shared() {
        let a = FilterModelConfig6581::instance();
        let b = FilterModelConfig6581::instance();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_voltage_scale() {
        let config = FilterModelConfig6581::instance();
        // Vddt spans the full working range, so nVddt saturates the scale.
        assert_eq!(config.n_vddt(), 65535);
        assert_eq!(config.vcr_n_vg[0], 65535);
    }

    #[test]
    fn test_voice_scaling_terms() {
        let config = FilterModelConfig6581::instance();
        let scale = config.voice_scale_s11();
        assert!((300..=310).contains(&scale), "voice scale: {scale}");
        let dc = config.voice_dc();
        assert!((27_200..=27_400).contains(&dc), "voice dc: {dc}");
    }

    #[test]
    fn test_f0_dac_reference_values() {
        let config = FilterModelConfig6581::instance();
        let f0_dac = config.f0_dac(0.5);

        assert!((f0_dac[0] as i32 - 41_430).abs() <= 16, "{}", f0_dac[0]);
        assert!(
            (f0_dac[1024] as i32 - 49_664).abs() <= 16,
            "{}",
            f0_dac[1024]
        );
        // The kinked DAC makes the cutoff table non-monotonic too.
        assert!(f0_dac[1023] > f0_dac[1024]);
    }

    #[test]
    fn test_f0_dac_curve_shifts_center() {
        let config = FilterModelConfig6581::instance();
        let low = config.f0_dac(0.0);
        let high = config.f0_dac(1.0);
        // Raising the curve setting lowers the DAC zero voltage.
        assert!(low[1024] > high[1024]);
    }

    #[test]
    fn test_opamp_rev_is_monotone() {
        // Rising capacitor voltage maps to a rising op-amp input voltage.
        let config = FilterModelConfig6581::instance();
        for i in 1..65536 {
            assert!(
                config.opamp_rev(i) >= config.opamp_rev(i - 1),
                "opamp_rev not monotone at {i}"
            );
        }
    }

    #[test]
    fn test_snake_factor_tracks_transconductance() {
        let config = FilterModelConfig6581::instance();
        let base = config.n_snake(FilterModelConfig6581::UCOX);
        assert!(base > 0 && base < 32, "n_snake: {base}");
        assert!(config.n_snake(40e-6) > base);
    }
}
