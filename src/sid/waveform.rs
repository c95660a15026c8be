//! Tone oscillator and waveform selector for one voice.
//!
//! A 24-bit accumulator is the basis for waveform generation; FREQ is
//! added to it each cycle. The waveforms are derived as follows:
//!
//! - Triangle: upper 12 bits, MSB inverts the lower 11 which are shifted
//!   left one (half resolution, full amplitude). Ring modulation
//!   substitutes the MSB with MSB EOR NOT sync-source MSB.
//! - Sawtooth: upper 12 bits as-is.
//! - Pulse: upper 12 bits compared against the PW register; the compare
//!   result is delayed one cycle. The test bit holds pulse at 0xfff.
//! - Noise: taken from intermediate bits of a 23-bit shift register
//!   clocked by accumulator bit 19, with the shift delayed two cycles:
//!
//! ```text
//!                  reset  +--------------------------------------------+
//!                    |    |                                            |
//!             test--OR-->EOR<--+                                       |
//!                    |         |                                       |
//!                    2 2 2 1 1 1 1 1 1 1 1 1 1                         |
//!   Register bits:   2 1 0 9 8 7 6 5 4 3 2 1 0 9 8 7 6 5 4 3 2 1 0 <---+
//!                        |   |       |     |   |       |     |   |
//!   Waveform bits:       1   1       9     8   7       6     5   4
//!                        1   0
//! ```
//!
//! Selecting several waveforms at once combines them through the
//! precomputed pulldown tables. With no waveform selected the DAC input
//! floats and fades out over a model-specific time.

use std::sync::Arc;

use crate::config::{ChipModel, CombinedWaveforms};
use crate::tables::{self, PulldownTables, WaveTables};

// Cycles until the floating DAC input fades to 0 after deselecting all
// waveforms, measured on warm chips checking OSC3. Times vary wildly
// with temperature; these capture the difference between the models.
const FLOATING_OUTPUT_TTL_6581R3: u32 = 54_000; // ~95ms
const FLOATING_OUTPUT_FADE_6581R3: u32 = 1_400;
const FLOATING_OUTPUT_TTL_8580R5: u32 = 800_000; // ~1s
const FLOATING_OUTPUT_FADE_8580R5: u32 = 50_000;

// Cycles until the shift register resets to all ones while the test bit
// is held, measured the same way.
const SHIFT_REGISTER_RESET_6581R3: u32 = 50_000; // ~210ms
const SHIFT_REGISTER_FADE_6581R3: u32 = 15_000;
const SHIFT_REGISTER_RESET_8580R5: u32 = 986_000; // ~2.8s
const SHIFT_REGISTER_FADE_8580R5: u32 = 314_300;

/// Mask clearing the shift register bits that feed the noise output.
const SHIFT_MASK: u32 = !((1 << 2) // Bit 20
    | (1 << 4) // Bit 18
    | (1 << 8) // Bit 14
    | (1 << 11) // Bit 11
    | (1 << 13) // Bit  9
    | (1 << 17) // Bit  5
    | (1 << 20) // Bit  2
    | (1 << 22)); // Bit  0

/// One voice's oscillator, waveform selector and noise shift register.
pub struct WaveformGenerator {
    model_wave: Arc<WaveTables>,
    model_pulldown: Arc<PulldownTables>,

    /// Active wave table, indexed by the low two waveform bits.
    wave: usize,
    /// Active pulldown table for combined waveforms, if any.
    pulldown: Option<usize>,

    /// PWout = (PWn/40.95)%
    pw: u32,

    shift_register: u32,
    /// Shift register is latched when transitioning to shift phase 1.
    shift_latch: u32,
    /// Pipeline causing bit 19 to clock the shift register 2 cycles late.
    shift_pipeline: u32,

    ring_msb_mask: u32,
    no_noise: u32,
    noise_output: u32,
    no_noise_or_noise_output: u32,
    no_pulse: u32,
    pulse_output: u32,

    /// The control register right-shifted 4 bits.
    waveform: u32,
    waveform_output: u32,

    /// Accumulator's even bits are high on powerup.
    accumulator: u32,

    /// Fout = (Fn*Fclk/16777216)Hz
    freq: u32,

    /// 8580 tri/saw half-cycle delay, visible as one cycle on OSC3.
    tri_saw_pipeline: u32,

    /// The OSC3 value.
    osc3: u32,

    /// Remaining time until the held shift register resets.
    shift_register_reset: u32,
    /// Remaining time until the floating DAC input fades.
    floating_output_ttl: u32,

    // Control register bits. Gate is handled by the envelope generator.
    test: bool,
    sync: bool,

    /// Test bit latched at phi2 for the noise XOR.
    test_or_reset: bool,

    /// Whether the accumulator MSB was set high on this cycle.
    msb_rising: bool,

    is6581: bool,
}

impl WaveformGenerator {
    /// A generator in its powerup state, bound to the default 8580
    /// tables until a model is installed.
    pub fn new() -> Self {
        let mut wave = WaveformGenerator {
            model_wave: tables::wave_tables(),
            model_pulldown: tables::pulldown_tables(ChipModel::Mos8580, CombinedWaveforms::Average),
            wave: 0,
            pulldown: None,
            pw: 0,
            shift_register: 0,
            shift_latch: 0,
            shift_pipeline: 0,
            ring_msb_mask: 0,
            no_noise: 0,
            noise_output: 0,
            no_noise_or_noise_output: 0,
            no_pulse: 0,
            pulse_output: 0,
            waveform: 0,
            waveform_output: 0,
            accumulator: 0x555555,
            freq: 0,
            tri_saw_pipeline: 0x555,
            osc3: 0,
            shift_register_reset: 0,
            floating_output_ttl: 0,
            test: false,
            sync: false,
            test_or_reset: false,
            msb_rising: false,
            is6581: false,
        };
        wave.reset();
        wave
    }

    /// Install the base waveform tables.
    pub fn set_waveform_models(&mut self, models: Arc<WaveTables>) {
        self.model_wave = models;
    }

    /// Install the combined-waveform pulldown tables.
    pub fn set_pulldown_models(&mut self, models: Arc<PulldownTables>) {
        self.model_pulldown = models;
    }

    /// Set the chip model. Must be called before any operation.
    pub fn set_model(&mut self, model: ChipModel) {
        self.is6581 = model == ChipModel::Mos6581;
    }

    /// Write the low byte of the frequency register.
    pub fn write_freq_lo(&mut self, value: u8) {
        self.freq = (self.freq & 0xff00) | value as u32;
    }

    /// Write the high byte of the frequency register.
    pub fn write_freq_hi(&mut self, value: u8) {
        self.freq = ((value as u32) << 8 & 0xff00) | (self.freq & 0x00ff);
    }

    /// Write the low byte of the pulse width register.
    pub fn write_pw_lo(&mut self, value: u8) {
        self.pw = (self.pw & 0xf00) | value as u32;
    }

    /// Write the upper 4 bits of the pulse width register.
    pub fn write_pw_hi(&mut self, value: u8) {
        self.pw = ((value as u32) << 8 & 0xf00) | (self.pw & 0x0ff);
    }

    /// Write the control register: waveform selection, test, sync and
    /// ring modulation bits.
    pub fn write_control(&mut self, control: u8) {
        let waveform_prev = self.waveform;
        let test_prev = self.test;

        self.waveform = (control as u32 >> 4) & 0x0f;
        self.test = control & 0x08 != 0;
        self.sync = control & 0x02 != 0;

        // Substitution of accumulator MSB when sawtooth = 0, ring_mod = 1.
        self.ring_msb_mask = ((!control as u32 >> 5) & (control as u32 >> 2) & 0x1) << 23;

        if self.waveform != waveform_prev {
            self.wave = (self.waveform & 0x3) as usize;

            // Combinations including noise behave the same as without.
            self.pulldown = match self.waveform & 0x7 {
                3 => Some(0),
                4 => {
                    if self.waveform & 0x8 != 0 {
                        Some(4)
                    } else {
                        None
                    }
                }
                5 => Some(1),
                6 => Some(2),
                7 => Some(3),
                _ => None,
            };

            // Bitmasks letting noise or pulse influence the output only
            // when selected.
            self.no_noise = if self.waveform & 0x8 != 0 { 0x000 } else { 0xfff };
            self.set_no_noise_or_noise_output();
            self.no_pulse = if self.waveform & 0x4 != 0 { 0x000 } else { 0xfff };

            if self.waveform == 0 {
                // Change to floating DAC input.
                self.floating_output_ttl = if self.is6581 {
                    FLOATING_OUTPUT_TTL_6581R3
                } else {
                    FLOATING_OUTPUT_TTL_8580R5
                };
            }
        }

        if self.test != test_prev {
            if self.test {
                self.accumulator = 0;
                self.shift_pipeline = 0;

                // Latch the shift register value and arm the reset timer.
                self.shift_latch = self.shift_register;
                self.shift_register_reset = if self.is6581 {
                    SHIFT_REGISTER_RESET_6581R3
                } else {
                    SHIFT_REGISTER_RESET_8580R5
                };
            } else {
                // On the falling test bit the second phase of the shift
                // completes by enabling SRAM write.
                self.shift_phase2(waveform_prev, self.waveform);
            }
        }
    }

    /// Hardware reset.
    pub fn reset(&mut self) {
        // The accumulator is not changed on reset.
        self.freq = 0;
        self.pw = 0;

        self.msb_rising = false;

        self.waveform = 0;
        self.osc3 = 0;

        self.test = false;
        self.sync = false;

        self.wave = 0;
        self.pulldown = None;

        self.ring_msb_mask = 0;
        self.no_noise = 0xfff;
        self.no_pulse = 0xfff;
        self.pulse_output = 0xfff;

        self.shift_register_reset = 0;
        self.shift_register = 0x7fffff;

        // When reset is released the shift register is clocked once so
        // the lower bit is zeroed out:
        // bit0 = (bit22 | test) ^ bit17 = 1 ^ 1 = 0
        self.test_or_reset = true;
        self.shift_latch = self.shift_register;
        self.shift_phase2(0, 0);

        self.shift_pipeline = 0;

        self.waveform_output = 0;
        self.floating_output_ttl = 0;
    }

    /// Read the OSC3 register value.
    pub fn read_osc(&self) -> u8 {
        (self.osc3 >> 4) as u8
    }

    pub(crate) fn read_accumulator(&self) -> u32 {
        self.accumulator
    }

    pub(crate) fn read_freq(&self) -> u32 {
        self.freq
    }

    pub(crate) fn read_test(&self) -> bool {
        self.test
    }

    pub(crate) fn read_sync(&self) -> bool {
        self.sync
    }

    pub(crate) fn read_msb_rising(&self) -> bool {
        self.msb_rising
    }

    /// Hard-sync this oscillator, given the pre-clock snapshot flags of
    /// its sync source. A sync source being synced itself on the same
    /// cycle its MSB rises does not sync its destination; verified by
    /// sampling OSC3.
    pub(crate) fn synchronize(&mut self, source_msb_rising: bool, source_synced_itself: bool) {
        if source_msb_rising && self.sync && !source_synced_itself {
            self.accumulator = 0;
        }
    }

    /// Clock the oscillator and the noise pipeline one cycle.
    #[inline]
    pub fn clock(&mut self) {
        if self.test {
            if self.shift_register_reset != 0 {
                self.shift_register_reset -= 1;
                if self.shift_register_reset == 0 {
                    self.shift_reg_bit_fade();
                    self.shift_latch = self.shift_register;
                    self.set_noise_output();
                }
            }

            // Latch the test bit value for shift phase 2.
            self.test_or_reset = true;

            // The test bit sets pulse high.
            self.pulse_output = 0xfff;
        } else {
            let accumulator_old = self.accumulator;
            self.accumulator = (self.accumulator + self.freq) & 0xffffff;

            // Which bits changed from low to high.
            let accumulator_bits_set = !accumulator_old & self.accumulator;

            // MSB rising is used for synchronization.
            self.msb_rising = accumulator_bits_set & 0x800000 != 0;

            // Shift the noise register once each time accumulator bit 19
            // goes high; the shift is delayed 2 cycles.
            if accumulator_bits_set & 0x080000 != 0 {
                self.shift_pipeline = 2;
            } else if self.shift_pipeline != 0 {
                self.shift_pipeline -= 1;
                match self.shift_pipeline {
                    0 => self.shift_phase2(self.waveform, self.waveform),
                    1 => {
                        // Start shift phase 1.
                        self.test_or_reset = false;
                        self.shift_latch = self.shift_register;
                    }
                    _ => {}
                }
            }
        }
    }

    /// 12-bit waveform output, given the current accumulator of the ring
    /// modulation source.
    #[inline]
    pub fn output(&mut self, ring_accumulator: u32) -> u32 {
        if self.waveform != 0 {
            let ix = ((self.accumulator ^ (!ring_accumulator & self.ring_msb_mask)) >> 12) as usize;

            // no_pulse and no_noise give branch-free selection.
            self.waveform_output = self.model_wave[self.wave][ix] as u32
                & (self.no_pulse | self.pulse_output)
                & self.no_noise_or_noise_output;
            if let Some(pd) = self.pulldown {
                self.waveform_output = self.model_pulldown[pd][self.waveform_output as usize] as u32;
            }

            // Triangle/sawtooth output is delayed half a cycle on 8580,
            // seen as one cycle on OSC3 which latches in the first phase.
            if self.waveform & 3 != 0 && !self.is6581 {
                self.osc3 = self.tri_saw_pipeline
                    & (self.no_pulse | self.pulse_output)
                    & self.no_noise_or_noise_output;
                if let Some(pd) = self.pulldown {
                    self.osc3 = self.model_pulldown[pd][self.osc3 as usize] as u32;
                }
                self.tri_saw_pipeline = self.model_wave[self.wave][ix] as u32;
            } else {
                self.osc3 = self.waveform_output;
            }

            // On the 6581 combined waveforms can drive the accumulator
            // top bit low while the sawtooth is selected.
            if self.is6581 && self.waveform & 2 != 0 && self.waveform_output & 0x800 == 0 {
                self.msb_rising = false;
                self.accumulator &= 0x7fffff;
            }

            self.write_shift_register();
        } else {
            // Age the floating DAC input.
            if self.floating_output_ttl != 0 {
                self.floating_output_ttl -= 1;
                if self.floating_output_ttl == 0 {
                    self.wave_bit_fade();
                }
            }
        }

        // The pulse level is (accumulator >> 12) >= pw, delayed one
        // cycle; push the next level into the pipeline.
        self.pulse_output = if (self.accumulator >> 12) >= self.pw {
            0xfff
        } else {
            0x000
        };

        self.waveform_output
    }

    /// Whether writing back combined-waveform output into the shift
    /// register is enabled for this waveform transition. The individual
    /// cases have been verified against noise writeback samplings.
    fn do_writeback(&self, waveform_old: u32, waveform_new: u32) -> bool {
        // No writeback without combined waveforms.
        if waveform_old <= 8 {
            return false;
        }
        if waveform_new < 8 {
            return false;
        }
        if waveform_new == 8 && waveform_old != 0xf {
            return false;
        }
        if self.is6581
            && ((waveform_old & 0x3 == 0x1 && waveform_new & 0x3 == 0x2)
                || (waveform_old & 0x3 == 0x2 && waveform_new & 0x3 == 0x1))
        {
            return false;
        }
        if waveform_old == 0xc {
            return false;
        }
        if waveform_new == 0xc {
            return false;
        }

        true
    }

    fn get_noise_writeback(waveform_output: u32) -> u32 {
        ((waveform_output & (1 << 11)) >> 9) // Bit 11 -> bit 20
            | ((waveform_output & (1 << 10)) >> 6) // Bit 10 -> bit 18
            | ((waveform_output & (1 << 9)) >> 1) // Bit  9 -> bit 14
            | ((waveform_output & (1 << 8)) << 3) // Bit  8 -> bit 11
            | ((waveform_output & (1 << 7)) << 6) // Bit  7 -> bit  9
            | ((waveform_output & (1 << 6)) << 11) // Bit  6 -> bit  5
            | ((waveform_output & (1 << 5)) << 15) // Bit  5 -> bit  2
            | ((waveform_output & (1 << 4)) << 18) // Bit  4 -> bit  0
    }

    /// Second phase of the shift: the latched value moves into the
    /// following bits. The XOR for bit 0 uses the test bit latched
    /// during the previous phi2 cycle.
    fn shift_phase2(&mut self, waveform_old: u32, waveform_new: u32) {
        if self.do_writeback(waveform_old, waveform_new) {
            // With noise combined the output drives the SR bits.
            self.shift_latch = (self.shift_register & SHIFT_MASK)
                | Self::get_noise_writeback(self.waveform_output);
        }

        // bit0 = (bit22 | test | reset) ^ bit17
        let bit22 = ((self.test_or_reset as u32) | self.shift_latch) << 22;
        let bit0 = (bit22 ^ (self.shift_latch << 17)) & (1 << 22);

        self.shift_register = (self.shift_latch >> 1) | bit0;

        self.set_noise_output();
    }

    fn write_shift_register(&mut self) {
        if self.waveform > 0x8 {
            // Write changes caused by combined waveforms back into the
            // shift register.
            if self.shift_pipeline != 1 && !self.test {
                // The output pulls down the SR bits.
                self.shift_register &= SHIFT_MASK | Self::get_noise_writeback(self.waveform_output);
                self.noise_output &= self.waveform_output;
            } else {
                // In shift phase 1 the output drives the SR bits.
                self.noise_output = self.waveform_output;
            }

            self.set_no_noise_or_noise_output();
        }
    }

    fn set_noise_output(&mut self) {
        self.noise_output = ((self.shift_register & (1 << 2)) << 9) // Bit 20 -> bit 11
            | ((self.shift_register & (1 << 4)) << 6) // Bit 18 -> bit 10
            | ((self.shift_register & (1 << 8)) << 1) // Bit 14 -> bit  9
            | ((self.shift_register & (1 << 11)) >> 3) // Bit 11 -> bit  8
            | ((self.shift_register & (1 << 13)) >> 6) // Bit  9 -> bit  7
            | ((self.shift_register & (1 << 17)) >> 11) // Bit  5 -> bit  6
            | ((self.shift_register & (1 << 20)) >> 15) // Bit  2 -> bit  5
            | ((self.shift_register & (1 << 22)) >> 18); // Bit  0 -> bit  4

        self.set_no_noise_or_noise_output();
    }

    fn set_no_noise_or_noise_output(&mut self) {
        self.no_noise_or_noise_output = self.no_noise | self.noise_output;
    }

    fn wave_bit_fade(&mut self) {
        self.waveform_output &= self.waveform_output >> 1;
        self.osc3 = self.waveform_output;

        if self.waveform_output != 0 {
            self.floating_output_ttl = if self.is6581 {
                FLOATING_OUTPUT_FADE_6581R3
            } else {
                FLOATING_OUTPUT_FADE_8580R5
            };
        }
    }

    fn shift_reg_bit_fade(&mut self) {
        self.shift_register |= self.shift_register >> 1;
        self.shift_register |= 0x400000;

        if self.shift_register != 0x7fffff {
            self.shift_register_reset = if self.is6581 {
                SHIFT_REGISTER_FADE_6581R3
            } else {
                SHIFT_REGISTER_FADE_8580R5
            };
        }
    }
}

impl Default for WaveformGenerator {
    fn default() -> Self {
        WaveformGenerator::new()
    }
}
