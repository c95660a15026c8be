//! End-to-end playback pipeline tests.
//!
//! These drive the full chain: register writes, voice and filter
//! clocking, the board-level output filter and the resampler, checking
//! that rendered audio is deterministic, audible and model-dependent.

use anyhow::Result;
use hound::{SampleFormat, WavSpec, WavWriter};
use sidchip::{ChipModel, Control, SamplingMethod, Sid, SidConfig};

const PAL_CLOCK: f64 = 985_248.0;
const SAMPLE_RATE: f64 = 44_100.0;

/// Program a simple one-voice patch and render about a second of audio.
fn render(model: ChipModel, method: SamplingMethod, cycles: u32) -> Vec<i16> {
    let mut sid = Sid::new();
    sid.configure(&SidConfig {
        chip_model: model,
        sampling_method: method,
        clock_frequency: PAL_CLOCK,
        sampling_frequency: SAMPLE_RATE,
        ..SidConfig::default()
    })
    .expect("valid sampling setup");

    sid.write(0x18, 0x0f); // full volume, no filter taps
    sid.write(0x00, 0x00);
    sid.write(0x01, 0x1c); // ~A4
    sid.write(0x05, 0x09); // attack 0, decay 9
    sid.write(0x06, 0xf0); // sustain full
    sid.write(0x04, (Control::SAWTOOTH | Control::GATE).bits());

    let mut buf = vec![0i16; (cycles as f64 * SAMPLE_RATE / PAL_CLOCK) as usize + 64];
    let written = sid.clock(cycles, &mut buf, 0);
    buf.truncate(written);
    buf
}

fn peak(samples: &[i16]) -> i32 {
    samples.iter().map(|&s| (s as i32).abs()).max().unwrap_or(0)
}

#[test]
fn test_render_is_deterministic() {
    let a = render(ChipModel::Mos8580, SamplingMethod::Decimate, 300_000);
    let b = render(ChipModel::Mos8580, SamplingMethod::Decimate, 300_000);
    assert_eq!(a, b);
}

#[test]
fn test_render_is_audible_on_both_models() {
    for model in [ChipModel::Mos6581, ChipModel::Mos8580] {
        let samples = render(model, SamplingMethod::Decimate, 300_000);
        assert!(samples.len() > 10_000);
        assert!(peak(&samples) > 1_000, "{model:?} rendered near silence");
    }
}

#[test]
fn test_sawtooth_renders_at_programmed_frequency() {
    let samples = render(ChipModel::Mos8580, SamplingMethod::Decimate, 400_000);
    // Skip the attack transient and the DC blocker settling.
    let steady = &samples[2_000..];
    let threshold = peak(steady) / 4;

    // One rising crossing of the midline per sawtooth period; the
    // hysteresis band rejects resampler ripple near zero.
    let mut below = false;
    let mut first = None;
    let mut last = 0usize;
    let mut crossings = 0u32;
    for (i, &s) in steady.iter().enumerate() {
        if (s as i32) < -threshold {
            below = true;
        } else if below && (s as i32) > threshold {
            below = false;
            crossings += 1;
            if first.is_none() {
                first = Some(i);
            }
            last = i;
        }
    }
    assert!(crossings > 20, "too few periods to measure: {crossings}");

    let measured = (last - first.unwrap()) as f64 / (crossings - 1) as f64;
    // Frequency register 0x1c00 of a 24-bit phase at the chip clock.
    let expected = SAMPLE_RATE * (1u32 << 24) as f64 / (PAL_CLOCK * 0x1c00 as f64);
    let error = (measured - expected).abs() / expected;
    assert!(
        error < 0.03,
        "period {measured:.1} samples, expected {expected:.1}"
    );
}

#[test]
fn test_models_render_differently() {
    let a = render(ChipModel::Mos6581, SamplingMethod::Decimate, 200_000);
    let b = render(ChipModel::Mos8580, SamplingMethod::Decimate, 200_000);
    assert_ne!(a, b);
}

#[test]
fn test_resample_matches_decimate_length() {
    let a = render(ChipModel::Mos8580, SamplingMethod::Decimate, 400_000);
    let b = render(ChipModel::Mos8580, SamplingMethod::Resample, 400_000);
    let diff = (a.len() as i64 - b.len() as i64).abs();
    assert!(diff < 8, "lengths diverge: {} vs {}", a.len(), b.len());
    assert!(peak(&b) > 1_000, "sinc path rendered near silence");
}

#[test]
fn test_zero_volume_is_near_silent() {
    let mut sid = Sid::new();
    sid.write(0x18, 0x00);
    sid.write(0x01, 0x1c);
    sid.write(0x06, 0xf0);
    sid.write(0x04, (Control::SAWTOOTH | Control::GATE).bits());

    let mut buf = vec![0i16; 16_384];
    let written = sid.clock(300_000, &mut buf, 0);
    // The DC blocker removes the mixer's standing level; what remains
    // at volume 0 is a small residual.
    assert!(peak(&buf[written / 2..written]) < 200);
}

#[test]
fn test_pulse_width_changes_timbre() {
    let render_pulse = |pw_hi: u8| {
        let mut sid = Sid::new();
        sid.write(0x18, 0x0f);
        sid.write(0x01, 0x1c);
        sid.write(0x03, pw_hi);
        sid.write(0x06, 0xf0);
        sid.write(0x04, (Control::PULSE | Control::GATE).bits());
        let mut buf = vec![0i16; 16_384];
        let written = sid.clock(300_000, &mut buf, 0);
        buf.truncate(written);
        buf
    };

    assert_ne!(render_pulse(0x01), render_pulse(0x08));
}

#[test]
fn test_filter_routing_changes_output() {
    let render_filtered = |res_filt: u8| {
        let mut sid = Sid::new();
        sid.write(0x18, 0x1f); // volume + lowpass
        sid.write(0x16, 0x10); // low cutoff
        sid.write(0x17, res_filt);
        sid.write(0x01, 0x40);
        sid.write(0x06, 0xf0);
        sid.write(0x04, (Control::SAWTOOTH | Control::GATE).bits());
        let mut buf = vec![0i16; 16_384];
        let written = sid.clock(300_000, &mut buf, 0);
        buf.truncate(written);
        buf
    };

    let dry = render_filtered(0x00);
    let wet = render_filtered(0x01);
    assert_ne!(dry, wet);
    // A low cutoff lowpass takes energy out of a bright sawtooth.
    assert!(peak(&wet) < peak(&dry));
}

#[test]
fn test_wav_render_roundtrip() -> Result<()> {
    let samples = render(ChipModel::Mos6581, SamplingMethod::Resample, 300_000);

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("render.wav");

    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE as u32,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(&path, spec)?;
    for &s in &samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;

    let mut reader = hound::WavReader::open(&path)?;
    let read: Vec<i16> = reader.samples::<i16>().collect::<std::result::Result<_, _>>()?;
    assert_eq!(read, samples);
    Ok(())
}
