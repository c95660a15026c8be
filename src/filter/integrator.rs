//! Op-amp integrator solvers for the two filter models.
//!
//! Each integrator is one half of the two-integrator-loop filter: a
//! transconductance element charging a capacitor into an inverting
//! op-amp.
//!
//! ```text
//!                    +---C---+
//!                    |       |
//!      vi --o--Rw--o-o--[A>--o-- vo
//!           |      | vx
//!           +--Rs--+
//! ```
//!
//! On the 6581 the cutoff element Rw is a voltage-controlled resistor in
//! parallel with a "snake" resistor, modeled with the EKV transistor
//! equations. On the 8580 the cutoff element is a switched FET ladder in
//! saturation, which is a much simpler square-law device.
//!
//! All voltages are normalized 16-bit quantities; the capacitor charge is
//! carried at 2^30 scale. Wrapping arithmetic is intentional and matches
//! the fixed-point calibration of the lookup tables.

use super::config6581::FilterModelConfig6581;
use super::config8580::FilterModelConfig8580;

/// EKV-model integrator for the 6581 filter.
pub struct Integrator6581 {
    /// Capacitor charge, scaled by 2^30.
    vc: i32,
    /// Op-amp input voltage, normalized.
    vx: u16,
    /// Precomputed (nVddt - Vw)^2 / 2 for the VCR gate voltage.
    n_vddt_vw_2: u32,
    /// Normalized snake current factor, updated by the filter range knob.
    n_snake: u16,
    n_vddt: u16,
    n_vt: u16,
    n_vmin: u16,
}

impl Integrator6581 {
    pub(super) fn new(config: &FilterModelConfig6581) -> Self {
        Integrator6581 {
            vc: 0,
            vx: 0,
            n_vddt_vw_2: 0,
            n_snake: config.n_snake(FilterModelConfig6581::UCOX),
            n_vddt: config.n_vddt(),
            n_vt: config.n_vt(),
            n_vmin: config.n_vmin(),
        }
    }

    /// Program the cutoff via the VCR bias voltage Vw.
    #[inline]
    pub fn set_vw(&mut self, vw: u16) {
        let diff = self.n_vddt.saturating_sub(vw) as u32;
        self.n_vddt_vw_2 = (diff * diff) >> 1;
    }

    /// Update the snake current factor after a transconductance change.
    pub fn set_n_snake(&mut self, n_snake: u16) {
        self.n_snake = n_snake;
    }

    /// Discharge the integrator capacitor.
    pub fn reset(&mut self) {
        self.vc = 0;
        self.vx = 0;
        self.n_vddt_vw_2 = 0;
    }

    /// Advance the integrator by one cycle with input `vi`.
    #[inline]
    pub fn solve(&mut self, config: &FilterModelConfig6581, vi: i32) -> i32 {
        // The snake resistor has Vg = Vdd and stays in triode mode.
        // Vgst = Vddt - Vx, Vgdt = Vddt - Vi; vi may exceed nVddt, so the
        // subtraction wraps in the 16-bit fixed point.
        let n_vddt = self.n_vddt as u32;
        let vgst = n_vddt.wrapping_sub(self.vx as u32);
        let vgdt = n_vddt.wrapping_sub(vi as u32);

        let vgst_2 = vgst.wrapping_mul(vgst);
        let vgdt_2 = vgdt.wrapping_mul(vgdt);

        // Triode current: I = K*W/L*(Vgst^2 - Vgdt^2), scaled to 2^30.
        let n_i_snake =
            (self.n_snake as i32).wrapping_mul(vgst_2.wrapping_sub(vgdt_2) as i32 >> 15);

        // VCR gate voltage: Vg = Vddt - sqrt(((Vddt - Vw)^2 + Vgdt^2)/2).
        let vg_arg = ((self.n_vddt_vw_2.wrapping_add(vgdt_2 >> 1)) >> 16).min(65535) as usize;
        let k_vgt = config.vcr_n_vg(vg_arg) as i32 - self.n_vt as i32 - self.n_vmin as i32;

        // EKV table lookups, offset by INT16_MIN into positive indices.
        let k_vgt_vs = k_vgt
            .wrapping_sub(self.vx as i32)
            .wrapping_sub(i16::MIN as i32)
            .clamp(0, 65535) as usize;
        let k_vgt_vd = k_vgt
            .wrapping_sub(vi)
            .wrapping_sub(i16::MIN as i32)
            .clamp(0, 65535) as usize;

        // VCR current: I = Is*(if - ir), scaled to 2^30.
        let i_f = (config.vcr_n_ids_term(k_vgt_vs) as u32) << 15;
        let i_r = (config.vcr_n_ids_term(k_vgt_vd) as u32) << 15;
        let n_i_vcr = i_f.wrapping_sub(i_r) as i32;

        self.vc = self.vc.wrapping_add(n_i_snake.wrapping_add(n_i_vcr));

        // Op-amp transfer: vx = g(vc).
        let vc_idx = (self.vc >> 15).wrapping_sub(i16::MIN as i32).clamp(0, 65535) as usize;
        self.vx = config.opamp_rev(vc_idx);

        (self.vx as i32).wrapping_sub(self.vc >> 14)
    }
}

/// Square-law integrator for the 8580 filter.
///
/// The cutoff FETs operate in saturation, so the drain current reduces to
/// I = (k/2)*W/L*(Vgst^2 - Vgdt^2) with a fixed gate voltage set by the
/// capacitive voltage divider on the die.
pub struct Integrator8580 {
    /// Capacitor charge, scaled by 2^30.
    vc: i32,
    /// Op-amp input voltage, normalized.
    vx: u16,
    /// Normalized Vg - Vth.
    n_vgt: u16,
    /// Normalized cutoff current factor.
    n_fc: u16,
}

impl Integrator8580 {
    pub(super) fn new() -> Self {
        Integrator8580 {
            vc: 0,
            vx: 0,
            n_vgt: 0,
            n_fc: 0,
        }
    }

    /// Program the cutoff current factor for the selected W/L ratio.
    #[inline]
    pub fn set_fc(&mut self, n_fc: u16) {
        self.n_fc = n_fc;
    }

    /// Program the normalized gate overdrive voltage.
    #[inline]
    pub fn set_n_vgt(&mut self, n_vgt: u16) {
        self.n_vgt = n_vgt;
    }

    /// Discharge the integrator capacitor.
    pub fn reset(&mut self) {
        self.vc = 0;
        self.vx = 0;
    }

    /// Advance the integrator by one cycle with input `vi`.
    #[inline]
    pub fn solve(&mut self, config: &FilterModelConfig8580, vi: i32) -> i32 {
        let n_vgt = self.n_vgt as u32;
        let vgst = n_vgt.wrapping_sub(self.vx as u32);
        let vgdt = n_vgt.wrapping_sub(vi as u32);

        let vgst_2 = vgst.wrapping_mul(vgst);
        let vgdt_2 = vgdt.wrapping_mul(vgdt);

        let n_i = (self.n_fc as i32).wrapping_mul(vgst_2.wrapping_sub(vgdt_2) as i32 >> 15);

        self.vc = self.vc.wrapping_add(n_i);

        let vc_idx = (self.vc >> 15).wrapping_sub(i16::MIN as i32).clamp(0, 65535) as usize;
        self.vx = config.opamp_rev(vc_idx);

        (self.vx as i32).wrapping_sub(self.vc >> 14)
    }
}
