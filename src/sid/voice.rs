//! A single voice: waveform generator, envelope generator and the
//! multiplying DAC between them.

use std::sync::Arc;

use crate::sid::envelope::EnvelopeGenerator;
use crate::sid::waveform::WaveformGenerator;

/// One of the chip's three voices.
pub struct Voice {
    wave: WaveformGenerator,
    envelope: EnvelopeGenerator,

    /// Non-linear envelope DAC lookup, scaled to 8-bit code units.
    env_dac: Arc<Vec<f32>>,
    /// Non-linear oscillator DAC lookup, centered on the measured
    /// waveform zero level and scaled to 12-bit code units.
    wav_dac: Arc<Vec<f32>>,
}

impl Voice {
    /// A voice in its powerup state, with flat placeholder DAC tables.
    pub fn new() -> Self {
        Voice {
            wave: WaveformGenerator::new(),
            envelope: EnvelopeGenerator::new(),
            env_dac: Arc::new(vec![0.0; 256]),
            wav_dac: Arc::new(vec![0.0; 4096]),
        }
    }

    /// The voice's waveform generator.
    #[inline]
    pub fn wave(&self) -> &WaveformGenerator {
        &self.wave
    }

    /// The voice's waveform generator, mutably.
    #[inline]
    pub fn wave_mut(&mut self) -> &mut WaveformGenerator {
        &mut self.wave
    }

    /// The voice's envelope generator.
    #[inline]
    pub fn envelope(&self) -> &EnvelopeGenerator {
        &self.envelope
    }

    /// The voice's envelope generator, mutably.
    #[inline]
    pub fn envelope_mut(&mut self) -> &mut EnvelopeGenerator {
        &mut self.envelope
    }

    /// Install the envelope DAC nonlinearity table.
    pub fn set_env_dac(&mut self, env_dac: Arc<Vec<f32>>) {
        self.env_dac = env_dac;
    }

    /// Install the oscillator DAC nonlinearity table.
    pub fn set_wav_dac(&mut self, wav_dac: Arc<Vec<f32>>) {
        self.wav_dac = wav_dac;
    }

    /// The control register feeds both generators.
    pub fn write_control(&mut self, control: u8) {
        self.wave.write_control(control);
        self.envelope.write_control(control);
    }

    /// Reset both generators.
    pub fn reset(&mut self) {
        self.wave.reset();
        self.envelope.reset();
    }

    /// Amplitude modulated waveform output.
    ///
    /// The waveform DAC output is multiplied by the envelope DAC
    /// output through the multiplying DAC; both lookups carry the
    /// measured converter non-linearity. `ring_accumulator` is the
    /// phase accumulator of the ring modulation source voice.
    #[inline]
    pub fn output(&mut self, ring_accumulator: u32) -> i32 {
        let wav = self.wave.output(ring_accumulator) as usize;
        let env = self.envelope.output() as usize;
        (self.wav_dac[wav] * self.env_dac[env]) as i32
    }
}

impl Default for Voice {
    fn default() -> Self {
        Voice::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_with_zero_envelope() {
        let mut voice = Voice::new();
        voice.set_env_dac(Arc::new((0..256).map(|i| i as f32).collect()));
        voice.set_wav_dac(Arc::new((0..4096).map(|i| i as f32 - 2048.0).collect()));
        voice.reset();

        // Sawtooth running, gate never opened: envelope stays at zero.
        voice.write_control(0x20);
        voice.wave_mut().write_freq_hi(0x10);
        for _ in 0..10_000 {
            voice.wave_mut().clock();
            voice.envelope_mut().clock();
            assert_eq!(voice.output(0), 0);
        }
    }

    #[test]
    fn test_output_scales_with_envelope() {
        let mut voice = Voice::new();
        voice.set_env_dac(Arc::new((0..256).map(|i| i as f32).collect()));
        voice.set_wav_dac(Arc::new((0..4096).map(|i| i as f32 - 2048.0).collect()));
        voice.reset();

        voice.write_control(0x21);
        voice.envelope_mut().write_attack_decay(0x00);
        voice.envelope_mut().write_sustain_release(0xf0);
        voice.wave_mut().write_freq_hi(0x10);

        let mut peak = 0;
        for _ in 0..20_000 {
            voice.wave_mut().clock();
            voice.envelope_mut().clock();
            peak = peak.max(voice.output(0).abs());
        }
        assert!(peak > 100_000, "envelope never opened: {peak}");
    }
}
