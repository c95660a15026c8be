//! MOS 6581 filter emulation.

use std::sync::Arc;

use super::config6581::FilterModelConfig6581;
use super::integrator::Integrator6581;
use super::FilterRegisters;

/// The 6581 filter.
///
/// The cutoff element is a voltage-controlled resistor biased by the
/// notoriously nonlinear 11-bit cutoff DAC, paired with a "snake"
/// resistor for DC stability. Distortion characteristics vary between
/// chips; `set_filter_curve` and `set_filter_range` expose the two knobs
/// of the model.
pub struct Filter6581 {
    config: Arc<FilterModelConfig6581>,
    regs: FilterRegisters,

    /// VCR + associated capacitor connected to the highpass output.
    hp_integrator: Integrator6581,
    /// VCR + associated capacitor connected to the bandpass output.
    bp_integrator: Integrator6581,

    f0_dac: Vec<u16>,
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

impl Filter6581 {
    pub(crate) fn new() -> Self {
        let config = FilterModelConfig6581::instance();

        let mut filter = Filter6581 {
            f0_dac: config.f0_dac(0.5),
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

    /// Select the cutoff DAC zero offset of the emulated chip
    /// (0.0 to 1.0, 0.5 being the average).
    pub fn set_filter_curve(&mut self, curve: f64) {
        self.f0_dac = self.config.f0_dac(curve.clamp(0.0, 1.0));
        self.update_center_frequency();
    }

    /// Select the VCR transconductance, scaling the cutoff frequency
    /// range (0.0 to 1.0, 0.5 being the average).
    pub fn set_filter_range(&mut self, adjustment: f64) {
        let u_cox = (1.0 + 39.0 * adjustment.clamp(0.0, 1.0)) * 1e-6;
        let n_snake = self.config.n_snake(u_cox);
        self.hp_integrator.set_n_snake(n_snake);
        self.bp_integrator.set_n_snake(n_snake);
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
        let vw = self.f0_dac[self.regs.fc as usize];
        self.hp_integrator.set_vw(vw);
        self.bp_integrator.set_vw(vw);
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

        // Voice 3 is silenced by voice3off when not routed through the
        // filter.
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

    fn silence(filter: &mut Filter6581) -> u16 {
        let mut out = 0;
        for _ in 0..1000 {
            out = filter.clock(0, 0, 0);
        }
        out
    }

    #[test]
    fn test_muted_output_is_quiet() {
        let mut filter = Filter6581::new();
        // vol 0, nothing routed: output pinned near the op-amp zero.
        let zero = silence(&mut filter);

        filter.write_mode_vol(0x0f);
        let loud = silence(&mut filter);
        assert!(loud >= zero);
    }

    #[test]
    fn test_volume_scales_output() {
        let mut outputs = Vec::new();
        for vol in [0x01u8, 0x07, 0x0f] {
            let mut filter = Filter6581::new();
            filter.write_mode_vol(vol);
            for _ in 0..500 {
                filter.clock(100_000, 0, 0);
            }
            let mut acc = 0u32;
            for _ in 0..100 {
                acc += filter.clock(100_000, 0, 0) as u32;
            }
            outputs.push(acc);
        }
        assert!(outputs[0] <= outputs[1] && outputs[1] <= outputs[2]);
        assert!(outputs[0] < outputs[2]);
    }

    #[test]
    fn test_voice3_mute_only_affects_unfiltered_path() {
        // Muted and unrouted: voice 3 input must not reach the output.
        let mut muted = Filter6581::new();
        muted.write_mode_vol(0x8f);
        let mut silent = Filter6581::new();
        silent.write_mode_vol(0x8f);
        for _ in 0..500 {
            assert_eq!(muted.clock(0, 0, 200_000), silent.clock(0, 0, 0));
        }

        // Routed through the filter the mute bit has no effect.
        let mut routed = Filter6581::new();
        routed.write_res_filt(0x04);
        routed.write_mode_vol(0x9f);
        let mut same_but_unmuted = Filter6581::new();
        same_but_unmuted.write_res_filt(0x04);
        same_but_unmuted.write_mode_vol(0x1f);
        for _ in 0..500 {
            assert_eq!(
                routed.clock(0, 0, 200_000),
                same_but_unmuted.clock(0, 0, 200_000)
            );
        }
    }

    #[test]
    fn test_repeated_routing_writes_are_idempotent() {
        let mut once = Filter6581::new();
        let mut twice = Filter6581::new();
        for filter in [&mut once, &mut twice] {
            filter.write_fc_hi(0x40);
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
        let mut filter = Filter6581::new();
        filter.write_fc_lo(0x07);
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
