//! 8580 filter model configuration.
//!
//! The 8580 shares the two-integrator-loop topology with the 6581 but
//! replaces the troublesome VCR cutoff element with switched FET ladders
//! in saturation and a proper resistor ladder for resonance, so the only
//! extra data beyond the shared op-amp tables is the resonance gain
//! ladder. The finished config is published once as a process-wide shared
//! instance.

use std::sync::Arc;

use parking_lot::RwLock;

use super::config::{build_filter_tables, to_u16, BuildParams, FilterTables, VoltageScale};
use super::integrator::Integrator8580;
use super::spline::Point;

/// Op-amp voltage transfer, measured on CAP1B/CAP1A of a chip marked
/// CSG 8580R5 1690 25.
const OPAMP_VOLTAGE: [Point; 21] = [
    Point { x: 1.30, y: 8.91 }, // Approximate start of actual range
    Point { x: 4.76, y: 8.91 },
    Point { x: 4.77, y: 8.90 },
    Point { x: 4.78, y: 8.88 },
    Point { x: 4.785, y: 8.86 },
    Point { x: 4.79, y: 8.80 },
    Point { x: 4.795, y: 8.60 },
    Point { x: 4.80, y: 8.25 },
    Point { x: 4.805, y: 7.50 },
    Point { x: 4.81, y: 6.10 },
    Point { x: 4.815, y: 4.05 }, // Change of curvature
    Point { x: 4.82, y: 2.27 },
    Point { x: 4.825, y: 1.65 },
    Point { x: 4.83, y: 1.55 },
    Point { x: 4.84, y: 1.47 },
    Point { x: 4.85, y: 1.43 },
    Point { x: 4.87, y: 1.37 },
    Point { x: 4.90, y: 1.34 },
    Point { x: 5.00, y: 1.30 },
    Point { x: 5.10, y: 1.30 },
    Point { x: 8.91, y: 1.30 }, // Approximate end of actual range
];

// Resonance gain ratios from the feedback/input resistor network:
//
//   R1 = 15.3*Ri, R2 = 7.3*Ri, R3 = 4.7*Ri
//   Rf =  1.4*Ri, R4 = 1.4*Ri, R8 = 2.0*Ri, RC = 2.8*Ri
//
//   res  feedback  input
//   ---  --------  -----
//   0-3  Rf|{-,R1,R2,R3}  Ri
//   4-7  Rf|{-,R1,R2,R3}  R4
//   8-B  Rf|{-,R1,R2,R3}  R8
//   C-F  Rf|{-,R1,R2,R3}  RC
const RES_GAIN: [f64; 16] = [
    1.4 / 1.0,
    ((1.4 * 15.3) / (1.4 + 15.3)) / 1.0,
    ((1.4 * 7.3) / (1.4 + 7.3)) / 1.0,
    ((1.4 * 4.7) / (1.4 + 4.7)) / 1.0,
    1.4 / 1.4,
    ((1.4 * 15.3) / (1.4 + 15.3)) / 1.4,
    ((1.4 * 7.3) / (1.4 + 7.3)) / 1.4,
    ((1.4 * 4.7) / (1.4 + 4.7)) / 1.4,
    1.4 / 2.0,
    ((1.4 * 15.3) / (1.4 + 15.3)) / 2.0,
    ((1.4 * 7.3) / (1.4 + 7.3)) / 2.0,
    ((1.4 * 4.7) / (1.4 + 4.7)) / 2.0,
    1.4 / 2.8,
    ((1.4 * 15.3) / (1.4 + 15.3)) / 2.8,
    ((1.4 * 7.3) / (1.4 + 7.3)) / 2.8,
    ((1.4 * 4.7) / (1.4 + 4.7)) / 2.8,
];

const VOICE_VOLTAGE_RANGE: f64 = 0.25;
const VOICE_DC_VOLTAGE: f64 = 4.80;

/// Integrator capacitor value.
const C: f64 = 22e-9;

// Transistor parameters.
const VDD: f64 = 9.09;
const VTH: f64 = 0.80;
/// Transconductance coefficient u*Cox.
const UCOX: f64 = 100e-6;

/// Reference voltage of the gate bias divider.
const VREF: f64 = 4.75;

static INSTANCE: RwLock<Option<Arc<FilterModelConfig8580>>> = RwLock::new(None);

/// Precomputed tables and constants for the 8580 filter.
pub struct FilterModelConfig8580 {
    scale: VoltageScale,
    tables: FilterTables,
    /// Current factor coefficient Kp/2 normalized for one cycle at 1MHz.
    n_kp: f64,
}

impl FilterModelConfig8580 {
    /// W/L ratio of one cutoff DAC ladder unit.
    pub const DAC_WL0: f64 = 0.00615;

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

        // Die photographs of the volume ladder show gain ~ vol/16.
        let volume_n: [f64; 16] = std::array::from_fn(|n8| n8 as f64 / 16.0);

        let params = BuildParams {
            opamp_voltage: &OPAMP_VOLTAGE,
            vddt,
            mixer_ratio: 8.0 / 5.0,
            volume_n,
            resonance_n: RES_GAIN,
        };

        let tables = build_filter_tables(&scale, &params);

        FilterModelConfig8580 {
            scale,
            tables,
            n_kp: scale.denorm * (UCOX / 2.0 * 1.0e-6 / C),
        }
    }

    #[inline]
    pub(super) fn opamp_rev(&self, i: usize) -> u16 {
        self.tables.opamp_rev[i]
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

    /// Normalized cutoff current factor for the given W/L ratio, one
    /// cycle at 1MHz.
    pub(crate) fn current_factor(&self, wl: f64) -> u16 {
        to_u16((1u32 << 13) as f64 * self.n_kp * wl)
    }

    /// Normalized gate overdrive voltage for a bias divider setting `v`.
    ///
    /// The gate voltage is controlled by a switched capacitor voltage
    /// divider: Vg = Vref * v.
    pub(crate) fn gate_voltage(&self, v: f64) -> u16 {
        to_u16(self.scale.n16 * (VREF * v - VTH - self.scale.vmin))
    }

    /// Construct an integrator solver bound to this config.
    pub fn build_integrator(&self) -> Integrator8580 {
        Integrator8580::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_is_shared() {
        let a = FilterModelConfig8580::instance();
        let b = FilterModelConfig8580::instance();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_resonance_ladder_is_decreasing() {
        for chunk in RES_GAIN.chunks(4) {
            for pair in chunk.windows(2) {
                assert!(pair[1] < pair[0]);
            }
        }
        assert!((RES_GAIN[0] - 1.4).abs() < 1e-12);
        assert!((RES_GAIN[15] - 0.385246).abs() < 1e-5);
    }

    #[test]
    fn test_voice_scaling_terms() {
        let config = FilterModelConfig8580::instance();
        let scale = config.voice_scale_s11();
        assert!((60..=75).contains(&scale), "voice scale: {scale}");
        let dc = config.voice_dc();
        assert!((29_900..=30_400).contains(&dc), "voice dc: {dc}");
    }

    #[test]
    fn test_current_factor_scales_with_cutoff() {
        let config = FilterModelConfig8580::instance();
        let low = config.current_factor(FilterModelConfig8580::DAC_WL0);
        let high = config.current_factor(FilterModelConfig8580::DAC_WL0 * 2047.0);
        assert!(low < high);
        assert!(high < u16::MAX);
    }

    #[test]
    fn test_gate_voltage_range() {
        let config = FilterModelConfig8580::instance();
        // The curve knob maps to bias settings 0.8 through 1.6.
        let low = config.gate_voltage(0.8);
        let mid = config.gate_voltage(1.2);
        let high = config.gate_voltage(1.6);
        assert!(low < mid && mid < high);
    }
}
