//! R-2R ladder DAC nonlinearity model.
//!
//! Every DAC on the SID die is an R-2R ladder. On the 6581 the resistor
//! matching is off (2R/R ≈ 2.20) and the termination resistor at bit 0 is
//! missing entirely, which makes the transfer function non-monotonic. The
//! 8580 ladder is properly terminated with matched resistors and comes out
//! linear. MOSFET leakage keeps "off" bits from contributing exactly zero
//! on either chip.

use crate::ChipModel;

/// Stand-in resistance for the missing termination (open circuit).
const R_INFINITY: f64 = 1e6;

impl ChipModel {
    fn dac_leakage(self) -> f64 {
        match self {
            ChipModel::Mos6581 => 0.0075,
            ChipModel::Mos8580 => 0.0035,
        }
    }

    fn dac_2r_div_r(self) -> f64 {
        match self {
            ChipModel::Mos6581 => 2.20,
            ChipModel::Mos8580 => 2.00,
        }
    }

    fn dac_terminated(self) -> bool {
        matches!(self, ChipModel::Mos8580)
    }
}

fn parallel(r1: f64, r2: f64) -> f64 {
    (r1 * r2) / (r1 + r2)
}

/// Voltage contribution of one driven bit, with all other bits grounded.
///
/// Walks the ladder from the tail up to the driven bit accumulating the
/// equivalent resistance, applies the source transformation at the driven
/// bit, then walks toward the MSB applying the voltage dividers formed by
/// each remaining rung.
fn bit_voltage(set_bit: u32, bits: u32, r_2r: f64, terminated: bool) -> f64 {
    let r = 1.0;
    let mut vn = 1.0;

    let mut rn = if terminated { r_2r } else { R_INFINITY };

    for _ in 0..set_bit {
        rn = if rn == R_INFINITY {
            r + r_2r
        } else {
            r + parallel(r_2r, rn)
        };
    }

    if rn == R_INFINITY {
        rn = r_2r;
    } else {
        let rn_par = parallel(r_2r, rn);
        vn *= rn_par / r_2r;
        rn = rn_par;
    }

    for _ in (set_bit + 1)..bits {
        rn += r;
        let i = vn / rn;
        rn = parallel(r_2r, rn);
        vn = rn * i;
    }

    vn
}

/// An n-bit kinked DAC for one chip model.
///
/// Construction computes the per-bit voltage contributions once; `output`
/// then sums the contributions of set bits (plus leakage from cleared
/// bits), normalized so that the all-ones code maps to 1.0.
pub struct Dac {
    bit_voltages: Vec<f64>,
    leakage: f64,
}

impl Dac {
    /// Model an n-bit DAC as found on the given chip.
    pub fn new(bits: u32, model: ChipModel) -> Self {
        let r_2r = model.dac_2r_div_r();
        let terminated = model.dac_terminated();

        let mut bit_voltages: Vec<f64> = (0..bits)
            .map(|bit| bit_voltage(bit, bits, r_2r, terminated))
            .collect();

        let v_sum: f64 = bit_voltages.iter().sum();
        for v in &mut bit_voltages {
            *v /= v_sum;
        }

        Dac {
            bit_voltages,
            leakage: model.dac_leakage(),
        }
    }

    /// Normalized analog output for a digital input code.
    pub fn output(&self, code: u32) -> f64 {
        self.bit_voltages
            .iter()
            .enumerate()
            .map(|(bit, &v)| {
                if code & (1 << bit) != 0 {
                    v
                } else {
                    v * self.leakage
                }
            })
            .sum()
    }

    /// Full lookup table over the DAC's input range.
    pub fn build_table(&self) -> Vec<f32> {
        (0..1u32 << self.bit_voltages.len() as u32)
            .map(|code| self.output(code) as f32)
            .collect()
    }
}
