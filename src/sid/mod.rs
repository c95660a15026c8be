//! The chip core: three voices, the filter stage, the board-level
//! output filter and the register bus.
//!
//! [`Sid`] owns everything and is clocked in batches. Oscillator hard
//! sync is the one cross-voice dependency, so the clock loop runs
//! freely between precomputed sync checkpoints instead of checking all
//! three voices every cycle.

pub mod envelope;
pub mod external_filter;
pub mod potentiometer;
pub mod voice;
pub mod waveform;

use std::sync::Arc;

use bitflags::bitflags;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::config::{ChipModel, CombinedWaveforms, SamplingMethod, SidConfig};
use crate::filter::{Filter6581, Filter8580};
use crate::sampler::{Resampler, TwoPassSincResampler, ZeroOrderResampler};
use crate::tables::{self, Dac};
use crate::Result;

use external_filter::ExternalFilter;
use potentiometer::Potentiometer;
use voice::Voice;

// The waveform DAC rides on a DC offset; its "zero" level is nowhere
// near code 0x800. Measured on a 6581R4AR the zero level sits at code
// 0x380, on 8580s around 0x9c0. The oscillator DAC table is centered
// on the mid code instead, which the measurements bracket.
const ENV_DAC_BITS: u32 = 8;
const OSC_DAC_BITS: u32 = 12;

// The written bus value stays readable for a while. Timings measured
// on real machines with a bit-fade test program; the 8580 holds its
// bus an order of magnitude longer.
const BUS_TTL_6581: i32 = 0x01d00;
const BUS_TTL_8580: i32 = 0xa2000;

bitflags! {
    /// Voice control register bits, for hosts that prefer names over
    /// magic values when programming registers 0x04/0x0b/0x12.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Control: u8 {
        /// Envelope gate.
        const GATE = 0x01;
        /// Hard sync to the preceding voice.
        const SYNC = 0x02;
        /// Ring modulation by the preceding voice.
        const RING_MOD = 0x04;
        /// Test bit: resets and holds the oscillator.
        const TEST = 0x08;
        /// Triangle waveform select.
        const TRIANGLE = 0x10;
        /// Sawtooth waveform select.
        const SAWTOOTH = 0x20;
        /// Pulse waveform select.
        const PULSE = 0x40;
        /// Noise waveform select.
        const NOISE = 0x80;
    }
}

/// The chip's register map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
enum Register {
    Voice1FreqLo = 0x00,
    Voice1FreqHi = 0x01,
    Voice1PwLo = 0x02,
    Voice1PwHi = 0x03,
    Voice1Control = 0x04,
    Voice1AttackDecay = 0x05,
    Voice1SustainRelease = 0x06,
    Voice2FreqLo = 0x07,
    Voice2FreqHi = 0x08,
    Voice2PwLo = 0x09,
    Voice2PwHi = 0x0a,
    Voice2Control = 0x0b,
    Voice2AttackDecay = 0x0c,
    Voice2SustainRelease = 0x0d,
    Voice3FreqLo = 0x0e,
    Voice3FreqHi = 0x0f,
    Voice3PwLo = 0x10,
    Voice3PwHi = 0x11,
    Voice3Control = 0x12,
    Voice3AttackDecay = 0x13,
    Voice3SustainRelease = 0x14,
    FilterFcLo = 0x15,
    FilterFcHi = 0x16,
    FilterResFilt = 0x17,
    FilterModeVol = 0x18,
    PotX = 0x19,
    PotY = 0x1a,
    Osc3 = 0x1b,
    Env3 = 0x1c,
}

/// A complete MOS 6581/8580.
///
/// Construct, pick a model and sampling setup, then drive it with
/// register writes and [`clock`](Sid::clock) calls.
pub struct Sid {
    voices: [Voice; 3],

    filter6581: Filter6581,
    filter8580: Filter8580,

    external_filter: ExternalFilter,

    pot_x: Potentiometer,
    pot_y: Potentiometer,

    resampler: Box<dyn Resampler>,

    /// Output amplification, x/2.
    scale_factor: i32,

    bus_value: u8,
    bus_value_ttl: i32,
    /// The active model's bus TTL.
    model_ttl: i32,

    /// Cycles until the next oscillator sync checkpoint.
    next_voice_sync: u32,

    model: ChipModel,
    cws: CombinedWaveforms,
}

impl Sid {
    /// A chip in its powerup state: 8580 model, averaged combined
    /// waveforms, PAL clock decimated to 44.1kHz.
    pub fn new() -> Self {
        let mut sid = Sid {
            voices: [Voice::new(), Voice::new(), Voice::new()],
            filter6581: Filter6581::new(),
            filter8580: Filter8580::new(),
            external_filter: ExternalFilter::new(),
            pot_x: Potentiometer::new(),
            pot_y: Potentiometer::new(),
            resampler: Box::new(ZeroOrderResampler::new(985_248.0, 44_100.0)),
            scale_factor: 5,
            bus_value: 0,
            bus_value_ttl: 0,
            model_ttl: BUS_TTL_8580,
            next_voice_sync: 0,
            model: ChipModel::Mos8580,
            cws: CombinedWaveforms::Average,
        };

        sid.set_chip_model(ChipModel::Mos8580);
        sid.reset();
        sid
    }

    /// Apply a full host configuration in one call.
    pub fn configure(&mut self, config: &SidConfig) -> Result<()> {
        self.set_chip_model(config.chip_model);
        self.set_combined_waveforms(config.combined_waveforms);
        self.set_sampling_parameters(
            config.clock_frequency,
            config.sampling_method,
            config.sampling_frequency,
        )
    }

    /// Switch the emulated chip revision.
    ///
    /// Rebinds the waveform tables, both DAC nonlinearity tables and
    /// the bus fade timing. Filter state is kept; the matching filter
    /// is selected per clock.
    pub fn set_chip_model(&mut self, model: ChipModel) {
        match model {
            ChipModel::Mos6581 => {
                self.scale_factor = 3;
                self.model_ttl = BUS_TTL_6581;
            }
            ChipModel::Mos8580 => {
                self.scale_factor = 5;
                self.model_ttl = BUS_TTL_8580;
            }
        }
        self.model = model;

        let wave_tables = tables::wave_tables();
        let pulldown_tables = tables::pulldown_tables(model, self.cws);

        let dac = Dac::new(ENV_DAC_BITS, model);
        let env_dac: Arc<Vec<f32>> = Arc::new(
            (0..1u32 << ENV_DAC_BITS)
                .map(|i| (dac.output(i) * 255.0) as f32)
                .collect(),
        );

        // Center the oscillator DAC on the mid code so the envelope
        // multiplies a zero-mean signal.
        let dac = Dac::new(OSC_DAC_BITS, model);
        let offset = dac.output(0x7ff);
        let wav_dac: Arc<Vec<f32>> = Arc::new(
            (0..1u32 << OSC_DAC_BITS)
                .map(|i| ((dac.output(i) - offset) * 4095.0) as f32)
                .collect(),
        );

        for voice in &mut self.voices {
            voice.set_env_dac(Arc::clone(&env_dac));
            voice.set_wav_dac(Arc::clone(&wav_dac));
            let wave = voice.wave_mut();
            wave.set_model(model);
            wave.set_waveform_models(Arc::clone(&wave_tables));
            wave.set_pulldown_models(Arc::clone(&pulldown_tables));
        }
    }

    /// Switch the combined-waveform strength and rebuild the pulldown
    /// tables.
    pub fn set_combined_waveforms(&mut self, cws: CombinedWaveforms) {
        self.cws = cws;

        let pulldown_tables = tables::pulldown_tables(self.model, cws);
        for voice in &mut self.voices {
            voice.wave_mut().set_pulldown_models(Arc::clone(&pulldown_tables));
        }
    }

    /// Set the 6581 filter cutoff curve (0.0 to 1.0, 0.5 average).
    pub fn set_filter_6581_curve(&mut self, curve: f64) {
        self.filter6581.set_filter_curve(curve);
    }

    /// Set the 6581 filter uCox spread (0.0 to 1.0, 0.5 average).
    pub fn set_filter_6581_range(&mut self, adjustment: f64) {
        self.filter6581.set_filter_range(adjustment);
    }

    /// Set the 8580 filter gate bias (0.0 to 1.0, 0.5 average).
    pub fn set_filter_8580_curve(&mut self, curve: f64) {
        self.filter8580.set_filter_curve(curve);
    }

    /// Route voices through or around the filter stage wholesale.
    pub fn enable_filter(&mut self, enabled: bool) {
        self.filter6581.enable(enabled);
        self.filter8580.enable(enabled);
    }

    /// Hardware reset.
    pub fn reset(&mut self) {
        for voice in &mut self.voices {
            voice.reset();
        }

        self.filter6581.reset();
        self.filter8580.reset();
        self.external_filter.reset();
        self.resampler.reset();

        self.bus_value = 0;
        self.bus_value_ttl = 0;
        self.voice_sync(false);
    }

    /// Feed a 16-bit sample into EXT IN.
    ///
    /// To mix in external audio cleanly the signal should be resampled
    /// to the chip clock rate first.
    pub fn input(&mut self, value: i32) {
        let value = (value as i16) as i32;
        self.filter6581.input(value);
        self.filter8580.input(value);
    }

    /// Read a register.
    ///
    /// Only the pot and voice 3 readback registers exist for reading;
    /// everything else returns the fading last-written bus value.
    /// Reading a write-only register also discharges the bus faster,
    /// emulated by halving the residual TTL.
    pub fn read(&mut self, offset: u32) -> u8 {
        match Register::from_u32(offset) {
            Some(Register::PotX) => {
                self.bus_value = self.pot_x.read();
                self.bus_value_ttl = self.model_ttl;
            }
            Some(Register::PotY) => {
                self.bus_value = self.pot_y.read();
                self.bus_value_ttl = self.model_ttl;
            }
            Some(Register::Osc3) => {
                self.bus_value = self.voices[2].wave().read_osc();
                self.bus_value_ttl = self.model_ttl;
            }
            Some(Register::Env3) => {
                self.bus_value = self.voices[2].envelope().read_env();
                self.bus_value_ttl = self.model_ttl;
            }
            _ => {
                self.bus_value_ttl /= 2;
            }
        }

        self.bus_value
    }

    /// Write a register.
    pub fn write(&mut self, offset: u32, value: u8) {
        self.bus_value = value;
        self.bus_value_ttl = self.model_ttl;

        match Register::from_u32(offset) {
            Some(Register::Voice1FreqLo) => self.voices[0].wave_mut().write_freq_lo(value),
            Some(Register::Voice1FreqHi) => self.voices[0].wave_mut().write_freq_hi(value),
            Some(Register::Voice1PwLo) => self.voices[0].wave_mut().write_pw_lo(value),
            Some(Register::Voice1PwHi) => self.voices[0].wave_mut().write_pw_hi(value),
            Some(Register::Voice1Control) => self.voices[0].write_control(value),
            Some(Register::Voice1AttackDecay) => {
                self.voices[0].envelope_mut().write_attack_decay(value)
            }
            Some(Register::Voice1SustainRelease) => {
                self.voices[0].envelope_mut().write_sustain_release(value)
            }
            Some(Register::Voice2FreqLo) => self.voices[1].wave_mut().write_freq_lo(value),
            Some(Register::Voice2FreqHi) => self.voices[1].wave_mut().write_freq_hi(value),
            Some(Register::Voice2PwLo) => self.voices[1].wave_mut().write_pw_lo(value),
            Some(Register::Voice2PwHi) => self.voices[1].wave_mut().write_pw_hi(value),
            Some(Register::Voice2Control) => self.voices[1].write_control(value),
            Some(Register::Voice2AttackDecay) => {
                self.voices[1].envelope_mut().write_attack_decay(value)
            }
            Some(Register::Voice2SustainRelease) => {
                self.voices[1].envelope_mut().write_sustain_release(value)
            }
            Some(Register::Voice3FreqLo) => self.voices[2].wave_mut().write_freq_lo(value),
            Some(Register::Voice3FreqHi) => self.voices[2].wave_mut().write_freq_hi(value),
            Some(Register::Voice3PwLo) => self.voices[2].wave_mut().write_pw_lo(value),
            Some(Register::Voice3PwHi) => self.voices[2].wave_mut().write_pw_hi(value),
            Some(Register::Voice3Control) => self.voices[2].write_control(value),
            Some(Register::Voice3AttackDecay) => {
                self.voices[2].envelope_mut().write_attack_decay(value)
            }
            Some(Register::Voice3SustainRelease) => {
                self.voices[2].envelope_mut().write_sustain_release(value)
            }
            Some(Register::FilterFcLo) => {
                self.filter6581.write_fc_lo(value);
                self.filter8580.write_fc_lo(value);
            }
            Some(Register::FilterFcHi) => {
                self.filter6581.write_fc_hi(value);
                self.filter8580.write_fc_hi(value);
            }
            Some(Register::FilterResFilt) => {
                self.filter6581.write_res_filt(value);
                self.filter8580.write_res_filt(value);
            }
            Some(Register::FilterModeVol) => {
                self.filter6581.write_mode_vol(value);
                self.filter8580.write_mode_vol(value);
            }
            _ => {}
        }

        // A freq or control write can move the next sync point.
        self.voice_sync(false);
    }

    /// Clock the chip forward, writing finished output samples into
    /// `buf` starting at `pos`. Returns the number of samples written.
    pub fn clock(&mut self, mut cycles: u32, buf: &mut [i16], pos: usize) -> usize {
        self.age_bus_value(cycles);
        let mut s = pos;

        while cycles != 0 {
            let delta_t = self.next_voice_sync.min(cycles);

            if delta_t > 0 {
                for _ in 0..delta_t {
                    let [v1, v2, v3] = &mut self.voices;

                    v1.wave_mut().clock();
                    v2.wave_mut().clock();
                    v3.wave_mut().clock();

                    v1.envelope_mut().clock();
                    v2.envelope_mut().clock();
                    v3.envelope_mut().clock();

                    // Each voice is ring modulated by the preceding one.
                    let acc1 = v1.wave().read_accumulator();
                    let acc2 = v2.wave().read_accumulator();
                    let acc3 = v3.wave().read_accumulator();
                    let o1 = v1.output(acc3);
                    let o2 = v2.output(acc1);
                    let o3 = v3.output(acc2);

                    let sid_output = match self.model {
                        ChipModel::Mos6581 => self.filter6581.clock(o1, o2, o3),
                        ChipModel::Mos8580 => self.filter8580.clock(o1, o2, o3),
                    } as i32;

                    let c64_output = self.external_filter.clock(sid_output - (1 << 15));

                    if self.resampler.input(c64_output) && s < buf.len() {
                        buf[s] = self.resampler.get_output(self.scale_factor);
                        s += 1;
                    }
                }

                cycles -= delta_t;
                self.next_voice_sync -= delta_t;
            }

            if self.next_voice_sync == 0 {
                self.voice_sync(true);
            }
        }

        s - pos
    }

    /// Select the clock rate, conversion method and output rate.
    ///
    /// Use 985248Hz for a PAL C64, 1022730Hz for NTSC. With
    /// [`SamplingMethod::Resample`] the output rate cannot be
    /// arbitrarily low relative to the clock; roughly 8kHz is the
    /// floor for a ~1MHz clock.
    pub fn set_sampling_parameters(
        &mut self,
        clock_frequency: f64,
        method: SamplingMethod,
        sampling_frequency: f64,
    ) -> Result<()> {
        self.external_filter.set_clock_frequency(clock_frequency);

        self.resampler = match method {
            SamplingMethod::Decimate => {
                Box::new(ZeroOrderResampler::new(clock_frequency, sampling_frequency))
            }
            SamplingMethod::Resample => Box::new(TwoPassSincResampler::new(
                clock_frequency,
                sampling_frequency,
            )?),
        };

        Ok(())
    }

    /// Recompute the time to the next oscillator sync event, and run
    /// the pending synchronization when `sync` is set.
    fn voice_sync(&mut self, sync: bool) {
        if sync {
            let msb_rising = [
                self.voices[0].wave().read_msb_rising(),
                self.voices[1].wave().read_msb_rising(),
                self.voices[2].wave().read_msb_rising(),
            ];
            let sync_enabled = [
                self.voices[0].wave().read_sync(),
                self.voices[1].wave().read_sync(),
                self.voices[2].wave().read_sync(),
            ];

            for i in 0..3 {
                let dest = (i + 1) % 3;
                // A source that is itself being synced on this cycle
                // does not propagate the sync.
                let source_synced = sync_enabled[i] && msb_rising[(i + 2) % 3];
                self.voices[dest]
                    .wave_mut()
                    .synchronize(msb_rising[i], source_synced);
            }
        }

        self.next_voice_sync = u32::MAX;

        for i in 0..3 {
            let wave = self.voices[i].wave();
            let freq = wave.read_freq();

            if wave.read_test() || freq == 0 || !self.voices[(i + 1) % 3].wave().read_sync() {
                continue;
            }

            let accumulator = wave.read_accumulator();
            let this_voice_sync = ((0x7fffff - accumulator) & 0xffffff) / freq + 1;

            if this_voice_sync < self.next_voice_sync {
                self.next_voice_sync = this_voice_sync;
            }
        }
    }

    #[inline]
    fn age_bus_value(&mut self, n: u32) {
        if self.bus_value_ttl != 0 {
            self.bus_value_ttl -= n as i32;

            if self.bus_value_ttl <= 0 {
                self.bus_value = 0;
                self.bus_value_ttl = 0;
            }
        }
    }
}

impl Default for Sid {
    fn default() -> Self {
        Sid::new()
    }
}
