//! MOS 8580 filter emulation.

use std::sync::Arc;

use super::config8580::FilterModelConfig8580;
use super::integrator::Integrator8580;
use super::FilterRegisters;

/// The 8580 filter.
///
/// The cutoff current is programmed directly through switched FET
/// ladders, so the frequency response is linear in the cutoff code. The
/// one chip-to-chip variable is the gate bias, exposed through
/// `set_filter_curve`.
pub struct Filter8580 {
    config: Arc<FilterModelConfig8580>,
    regs: FilterRegisters,

    hp_integrator: Integrator8580,
    bp_integrator: Integrator8580,

    voice_scale_s11: i32,
    voice_dc: i32,

    // State voltages, normalized.
    vhp: i32,
    vbp: i32,
    vlp: i32,
    /// External audio input voltage.
    ve: i32,

    // Active table selections.
    current_summer: usize,
    current_mixer: usize,
    current_resonance: usize,
    current_gain: usize,
}

impl Filter8580 {
    /// W/L ratio of one cutoff ladder unit.
    const DAC_WL0: f64 = FilterModelConfig8580::DAC_WL0;

    pub(crate) fn new() -> Self {
        let config = FilterModelConfig8580::instance();

        let mut filter = Filter8580 {
            voice_scale_s11: config.voice_scale_s11(),
            voice_dc: config.voice_dc(),
            hp_integrator: config.build_integrator(),
            bp_integrator: config.build_integrator(),
            config,
            regs: FilterRegisters::new(),
            vhp: 0,
            vbp: 0,
            vlp: 0,
            ve: 0,
            current_summer: 0,
            current_mixer: 0,
            current_resonance: 0,
            current_gain: 0,
        };

        filter.input(0);
        filter.set_filter_curve(0.5);
        filter.update_center_frequency();
        filter.update_mixing();
        filter
    }

    pub(crate) fn write_fc_lo(&mut self, value: u8) {
        self.regs.write_fc_lo(value);
        self.update_center_frequency();
    }

    pub(crate) fn write_fc_hi(&mut self, value: u8) {
        self.regs.write_fc_hi(value);
        self.update_center_frequency();
    }

    pub(crate) fn write_res_filt(&mut self, value: u8) {
        self.regs.write_res_filt(value);
        self.current_resonance = self.regs.res as usize;
        self.update_mixing();
    }

    pub(crate) fn write_mode_vol(&mut self, value: u8) {
        self.regs.write_mode_vol(value);
        self.update_mixing();
    }

    /// Route or bypass the filter stage as a whole.
    pub(crate) fn enable(&mut self, enabled: bool) {
        self.regs.set_enabled(enabled);
        self.update_mixing();
    }

    /// Select the gate bias of the cutoff FETs (0.0 to 1.0, 0.5 being
    /// the average chip).
    pub fn set_filter_curve(&mut self, curve: f64) {
        // The bias divider setting covers 0.8 through 1.6 around the
        // 4.75V reference.
        let cp = 0.8 + curve.clamp(0.0, 1.0) * 0.8;
        let n_vgt = self.config.gate_voltage(cp);
        self.hp_integrator.set_n_vgt(n_vgt);
        self.bp_integrator.set_n_vgt(n_vgt);
    }

    pub(crate) fn reset(&mut self) {
        self.regs.write_fc_lo(0);
        self.regs.write_fc_hi(0);
        self.regs.write_res_filt(0);
        self.regs.write_mode_vol(0);
        self.current_resonance = 0;
        self.vhp = 0;
        self.vbp = 0;
        self.vlp = 0;
        self.hp_integrator.reset();
        self.bp_integrator.reset();
        self.input(0);
        self.update_center_frequency();
        self.update_mixing();
    }

    /// Apply an external audio input sample.
    pub(crate) fn input(&mut self, sample: i32) {
        self.ve = (sample * self.voice_scale_s11 * 3 >> 11) + self.config.tables().mixer[0][0] as i32;
    }

    fn update_center_frequency(&mut self) {
        // An all-zero code still leaves half a ladder unit conducting.
        let wl = if self.regs.fc > 0 {
            Self::DAC_WL0 * self.regs.fc as f64
        } else {
            Self::DAC_WL0 / 2.0
        };
        let n_fc = self.config.current_factor(wl);
        self.hp_integrator.set_fc(n_fc);
        self.bp_integrator.set_fc(n_fc);
    }

    fn update_mixing(&mut self) {
        self.current_gain = self.regs.vol as usize;
        self.current_summer = self.regs.summer_index();
        self.current_mixer = self.regs.mixer_index();
    }

    /// Clock the filter one cycle with the three voice outputs, returning
    /// the mixed audio sample.
    pub(crate) fn clock(&mut self, voice1: i32, voice2: i32, voice3: i32) -> u16 {
        let voice1 = (voice1 * self.voice_scale_s11 >> 15) + self.voice_dc;
        let voice2 = (voice2 * self.voice_scale_s11 >> 15) + self.voice_dc;

        let voice3 = if self.regs.filt3 || !self.regs.voice3_off {
            (voice3 * self.voice_scale_s11 >> 15) + self.voice_dc
        } else {
            0
        };

        let mut vi = 0;
        let mut vo = 0;

        if self.regs.filt1 {
            vi += voice1;
        } else {
            vo += voice1;
        }
        if self.regs.filt2 {
            vi += voice2;
        } else {
            vo += voice2;
        }
        if self.regs.filt3 {
            vi += voice3;
        } else {
            vo += voice3;
        }
        if self.regs.filt_e {
            vi += self.ve;
        } else {
            vo += self.ve;
        }

        let tables = self.config.tables();

        let resonance_vbp = tables.gain_res[self.current_resonance][self.vbp as usize] as i32;
        self.vhp =
            tables.summer[self.current_summer][(resonance_vbp + self.vlp + vi) as usize] as i32;
        self.vbp = self.hp_integrator.solve(&self.config, self.vhp);
        self.vlp = self.bp_integrator.solve(&self.config, self.vbp);

        if self.regs.lp {
            vo += self.vlp;
        }
        if self.regs.bp {
            vo += self.vbp;
        }
        if self.regs.hp {
            vo += self.vhp;
        }

        tables.gain_vol[self.current_gain][tables.mixer[self.current_mixer][vo as usize] as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_is_deterministic() {
        let mut a = Filter8580::new();
        let mut b = Filter8580::new();
        a.write_mode_vol(0x1f);
        b.write_mode_vol(0x1f);
        a.write_res_filt(0xf7);
        b.write_res_filt(0xf7);
        a.write_fc_hi(0x80);
        b.write_fc_hi(0x80);

        for i in 0..2000 {
            let sample = ((i * 7919) % 100_000) - 50_000;
            assert_eq!(a.clock(sample, -sample, 0), b.clock(sample, -sample, 0));
        }
    }

    #[test]
    fn test_cutoff_attenuates_lowpass() {
        // A fast square wave through the lowpass tap: raising the cutoff
        // lets more of the swing through.
        let mut swings = Vec::new();
        for fc_hi in [0x08u8, 0xff] {
            let mut filter = Filter8580::new();
            filter.write_fc_hi(fc_hi);
            filter.write_res_filt(0x01);
            filter.write_mode_vol(0x1f);

            let mut min = u16::MAX;
            let mut max = 0u16;
            for i in 0..4000 {
                let sample = if (i / 50) % 2 == 0 { 200_000 } else { -200_000 };
                let out = filter.clock(sample, 0, 0);
                if i > 1000 {
                    min = min.min(out);
                    max = max.max(out);
                }
            }
            swings.push(max - min);
        }
        assert!(
            swings[0] < swings[1],
            "lowpass swing should grow with cutoff: {swings:?}"
        );
    }

    #[test]
    fn test_repeated_routing_writes_are_idempotent() {
        let mut once = Filter8580::new();
        let mut twice = Filter8580::new();
        for filter in [&mut once, &mut twice] {
            filter.write_fc_hi(0x80);
            filter.write_res_filt(0xa5);
            filter.write_mode_vol(0x3f);
        }

        for i in 0..200 {
            let sample = ((i * 4099) % 200_000) - 100_000;
            assert_eq!(
                once.clock(sample, -sample, sample / 2),
                twice.clock(sample, -sample, sample / 2)
            );
        }

        // Re-writing the same routing and mode bytes mid-stream must
        // not change the selections or the signal path state.
        twice.write_res_filt(0xa5);
        twice.write_mode_vol(0x3f);
        assert_eq!(once.current_summer, twice.current_summer);
        assert_eq!(once.current_mixer, twice.current_mixer);
        assert_eq!(once.current_resonance, twice.current_resonance);
        assert_eq!(once.current_gain, twice.current_gain);

        for i in 0..1000 {
            let sample = ((i * 7919) % 200_000) - 100_000;
            assert_eq!(
                once.clock(sample, -sample, sample / 2),
                twice.clock(sample, -sample, sample / 2)
            );
        }
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut filter = Filter8580::new();
        filter.write_fc_hi(0xff);
        filter.write_res_filt(0xff);
        filter.write_mode_vol(0xff);
        for _ in 0..100 {
            filter.clock(50_000, -50_000, 25_000);
        }

        filter.reset();
        assert_eq!(filter.regs.fc, 0);
        assert_eq!(filter.regs.vol, 0);
        assert_eq!(filter.vbp, 0);
        assert_eq!(filter.vlp, 0);
    }
}
