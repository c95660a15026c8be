//! Two-integrator-loop filter models.
//!
//! The filter sums the routed voices, feeds the sum through a highpass,
//! bandpass, lowpass integrator loop and mixes the selected taps with the
//! unfiltered voices through the master volume stage. Register handling
//! is common to both chip models; what differs is the physics of the
//! cutoff element, captured by the per-model configs and integrators.

mod config;
mod config6581;
mod config8580;
mod filter6581;
mod filter8580;
mod integrator;
mod opamp;
mod spline;

pub use config6581::FilterModelConfig6581;
pub use config8580::FilterModelConfig8580;
pub use filter6581::Filter6581;
pub use filter8580::Filter8580;
pub use integrator::{Integrator6581, Integrator8580};

/// Register-visible filter state, shared by both models.
#[derive(Default)]
pub(crate) struct FilterRegisters {
    /// 11-bit cutoff frequency code.
    fc: u32,
    /// Last RES/FILT register value, kept for re-enabling.
    filt: u8,
    /// 4-bit resonance code.
    res: u8,
    /// 4-bit master volume.
    vol: u8,
    filt1: bool,
    filt2: bool,
    filt3: bool,
    filt_e: bool,
    lp: bool,
    bp: bool,
    hp: bool,
    voice3_off: bool,
    enabled: bool,
}

impl FilterRegisters {
    fn new() -> Self {
        FilterRegisters {
            enabled: true,
            ..FilterRegisters::default()
        }
    }

    fn write_fc_lo(&mut self, value: u8) {
        self.fc = (self.fc & 0x7f8) | (value as u32 & 0x007);
    }

    fn write_fc_hi(&mut self, value: u8) {
        self.fc = ((value as u32) << 3 & 0x7f8) | (self.fc & 0x007);
    }

    fn write_res_filt(&mut self, value: u8) {
        self.filt = value;
        self.res = (value >> 4) & 0x0f;
        self.apply_routing();
    }

    fn write_mode_vol(&mut self, value: u8) {
        self.vol = value & 0x0f;
        self.lp = value & 0x10 != 0;
        self.bp = value & 0x20 != 0;
        self.hp = value & 0x40 != 0;
        self.voice3_off = value & 0x80 != 0;
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.apply_routing();
    }

    fn apply_routing(&mut self) {
        if self.enabled {
            self.filt1 = self.filt & 0x01 != 0;
            self.filt2 = self.filt & 0x02 != 0;
            self.filt3 = self.filt & 0x04 != 0;
            self.filt_e = self.filt & 0x08 != 0;
        } else {
            self.filt1 = false;
            self.filt2 = false;
            self.filt3 = false;
            self.filt_e = false;
        }
    }

    /// Number of inputs routed into the filter summer.
    fn summer_index(&self) -> usize {
        let mut ni = 0;
        if self.filt1 {
            ni += 1;
        }
        if self.filt2 {
            ni += 1;
        }
        if self.filt3 {
            ni += 1;
        }
        if self.filt_e {
            ni += 1;
        }
        ni
    }

    /// Number of inputs routed into the audio mixer.
    fn mixer_index(&self) -> usize {
        let mut no = 0;
        if !self.filt1 {
            no += 1;
        }
        if !self.filt2 {
            no += 1;
        }
        // Voice 3 only reaches the mixer when not muted.
        if !self.filt3 && !self.voice3_off {
            no += 1;
        }
        if !self.filt_e {
            no += 1;
        }
        if self.lp {
            no += 1;
        }
        if self.bp {
            no += 1;
        }
        if self.hp {
            no += 1;
        }
        no
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fc_register_split() {
        let mut regs = FilterRegisters::new();
        regs.write_fc_lo(0xff);
        regs.write_fc_hi(0xff);
        assert_eq!(regs.fc, 0x7ff);

        regs.write_fc_lo(0x00);
        assert_eq!(regs.fc, 0x7f8);

        regs.write_fc_hi(0x00);
        assert_eq!(regs.fc, 0x000);
    }

    #[test]
    fn test_routing_bits() {
        let mut regs = FilterRegisters::new();
        regs.write_res_filt(0xf5);
        assert_eq!(regs.res, 0x0f);
        assert!(regs.filt1 && regs.filt3 && !regs.filt2);
        assert!(!regs.filt_e);
        assert_eq!(regs.summer_index(), 2);
    }

    #[test]
    fn test_disable_clears_routing_but_keeps_register() {
        let mut regs = FilterRegisters::new();
        regs.write_res_filt(0x0f);
        assert_eq!(regs.summer_index(), 4);

        regs.set_enabled(false);
        assert_eq!(regs.summer_index(), 0);

        regs.set_enabled(true);
        assert_eq!(regs.summer_index(), 4);
    }

    #[test]
    fn test_mixer_counts_taps_and_bypassed_voices() {
        let mut regs = FilterRegisters::new();
        regs.write_res_filt(0x01);
        regs.write_mode_vol(0x1f);
        // Voices 2, 3, ext bypass; lp tap enabled.
        assert_eq!(regs.mixer_index(), 4);

        // Muting voice 3 removes it from the mixer.
        regs.write_mode_vol(0x9f);
        assert_eq!(regs.mixer_index(), 3);
    }
}
