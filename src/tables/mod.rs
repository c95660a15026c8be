//! Waveform and DAC table construction.
//!
//! Builds the 4 base oscillator waveform tables and the nonlinear
//! "pulldown" tables that approximate what happens when more than one
//! waveform selector bit is active. Selecting several waveforms shorts
//! their output bits together; a zero bit in one waveform pulls the output
//! bit low and can drag neighboring bits down with it, so the result is
//! not a plain bitwise AND.
//!
//! The pulldown model works per DAC input bit: every other bit contributes
//! a distance-weighted pull toward zero, the pulse line (when selected)
//! couples all 12 bits together, and the surviving bits are those whose
//! weighted value stays above a per-configuration threshold. The
//! parameters were fitted against samplings from real chips.
//!
//! Tables are built once and shared; the caches are keyed by chip model
//! and combined-waveform strength and guarded by a lock so concurrent
//! first use builds exactly once.

pub mod dac;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{ChipModel, CombinedWaveforms};

pub use dac::Dac;

/// The 4 base waveform tables indexed by the upper 12 accumulator bits:
/// none (DAC floats at 0xfff), triangle, sawtooth, triangle+sawtooth.
pub type WaveTables = [[u16; 4096]; 4];

/// Pulldown tables for the 5 combined selections:
/// tri+saw, pulse+tri, pulse+saw, pulse+tri+saw, noise+pulse.
pub type PulldownTables = [[u16; 4096]; 5];

/// Distance weighting shape for neighbor-bit interaction.
#[derive(Clone, Copy)]
enum DistanceKind {
    Exponential,
    Linear,
    Quadratic,
}

impl DistanceKind {
    fn weight(self, distance: f32, i: i32) -> f32 {
        match self {
            DistanceKind::Exponential => distance.powi(-i),
            DistanceKind::Linear => 1.0 / (1.0 + i as f32 * distance),
            DistanceKind::Quadratic => 1.0 / (1.0 + (i * i) as f32 * distance),
        }
    }
}

/// Fitted parameters for one combined-waveform selection.
#[derive(Clone, Copy)]
struct PulldownConfig {
    kind: DistanceKind,
    threshold: f32,
    top_bit: f32,
    pulse_strength: f32,
    distance_down: f32,
    distance_up: f32,
}

impl PulldownConfig {
    const fn new(
        kind: DistanceKind,
        threshold: f32,
        top_bit: f32,
        pulse_strength: f32,
        distance_down: f32,
        distance_up: f32,
    ) -> Self {
        PulldownConfig {
            kind,
            threshold,
            top_bit,
            pulse_strength,
            distance_down,
            distance_up,
        }
    }

    /// Derive a weaker or stronger variant from the averaged fit.
    fn scaled(self, threshold_scale: f32, pulse_scale: f32) -> Self {
        PulldownConfig {
            threshold: self.threshold * threshold_scale,
            pulse_strength: self.pulse_strength * pulse_scale,
            ..self
        }
    }
}

// Parameters fitted with the Monte Carlo method against samplings from
// real machines: a 6581 R3 4785 and an 8580 R5 5092 25. The noise+pulse
// rows are estimates.
const CONFIG_6581: [PulldownConfig; 5] = [
    // TS
    PulldownConfig::new(
        DistanceKind::Exponential,
        0.776_678_2,
        1.184_399,
        0.0,
        2.257_322_6,
        5.128_037_4,
    ),
    // PT
    PulldownConfig::new(
        DistanceKind::Linear,
        1.018_667_6,
        1.0,
        2.691_776_3,
        0.023_354_393,
        0.085_022_96,
    ),
    // PS
    PulldownConfig::new(
        DistanceKind::Linear,
        2.203_298_6,
        1.045_014_4,
        10.514_689,
        0.277_294_37,
        0.143_747_06,
    ),
    // PTS
    PulldownConfig::new(
        DistanceKind::Linear,
        1.356_529_6,
        1.090_512_8,
        3.210_981_4,
        0.166_589_26,
        0.370_252_88,
    ),
    // NP
    PulldownConfig::new(DistanceKind::Exponential, 0.96, 1.0, 2.5, 1.1, 1.2),
];

const CONFIG_8580: [PulldownConfig; 5] = [
    // TS
    PulldownConfig::new(
        DistanceKind::Exponential,
        0.684_999_05,
        0.916_620_5,
        0.0,
        1.147_156_5,
        2.023_398_2,
    ),
    // PT
    PulldownConfig::new(
        DistanceKind::Exponential,
        0.940_367_6,
        1.0,
        1.266_954_4,
        0.976_729_45,
        1.579_547,
    ),
    // PS
    PulldownConfig::new(
        DistanceKind::Quadratic,
        0.963_866_3,
        1.220_950_8,
        1.013_807_5,
        0.011_088_589,
        0.381_492_47,
    ),
    // PTS
    PulldownConfig::new(
        DistanceKind::Linear,
        0.976_761_8,
        0.202_727_56,
        0.988_633_9,
        0.939_373_3,
        9.371_394,
    ),
    // NP
    PulldownConfig::new(DistanceKind::Exponential, 0.95, 1.0, 1.15, 1.0, 1.45),
];

fn configs_for(model: ChipModel, cws: CombinedWaveforms) -> [PulldownConfig; 5] {
    let base = match model {
        ChipModel::Mos6581 => CONFIG_6581,
        ChipModel::Mos8580 => CONFIG_8580,
    };

    match cws {
        CombinedWaveforms::Average => base,
        CombinedWaveforms::Weak => base.map(|c| c.scaled(1.05, 0.5)),
        CombinedWaveforms::Strong => base.map(|c| c.scaled(0.95, 2.0)),
    }
}

/// Triangle waveform: MSB selects the fold, output shifted up one bit.
fn tri_xor(val: u32) -> u32 {
    (if val & 0x800 == 0 { val } else { val ^ 0xfff }) << 1
}

/// Predict the surviving output bits for one accumulator value.
fn calculate_pulldown(
    distance_table: &[f32; 25],
    top_bit: f32,
    pulse_strength: f32,
    threshold: f32,
    accumulator: u32,
) -> u16 {
    let mut bit = [0.0f32; 12];
    for (i, b) in bit.iter_mut().enumerate() {
        *b = if accumulator & (1 << i) != 0 { 1.0 } else { 0.0 };
    }
    // The top bit of the sawtooth is the weakest driver.
    bit[11] *= top_bit;

    let mut pulldown = [0.0f32; 12];
    for sb in 0..12usize {
        let mut avg = 0.0f32;
        let mut n = 0.0f32;

        for cb in 0..12usize {
            if cb == sb {
                continue;
            }
            let weight = distance_table[(sb as i32 - cb as i32 + 12) as usize];
            avg += (1.0 - bit[cb]) * weight;
            n += weight;
        }

        avg -= pulse_strength;
        pulldown[sb] = avg / n;
    }

    let mut value = 0u16;
    for i in 0..12usize {
        let bit_value = if bit[i] != 0.0 { 1.0 - pulldown[i] } else { 0.0 };
        if bit_value > threshold {
            value |= 1 << i;
        }
    }

    value
}

fn build_wave_tables() -> WaveTables {
    let mut tables = [[0u16; 4096]; 4];

    for idx in 0..4096u32 {
        let saw = idx as u16;
        let tri = tri_xor(idx) as u16;

        tables[0][idx as usize] = 0xfff;
        tables[1][idx as usize] = tri;
        tables[2][idx as usize] = saw;
        tables[3][idx as usize] = saw & (saw << 1);
    }

    tables
}

fn build_pulldown_tables(model: ChipModel, cws: CombinedWaveforms) -> PulldownTables {
    let configs = configs_for(model, cws);
    let mut tables = [[0u16; 4096]; 5];

    for (wav, cfg) in configs.iter().enumerate() {
        let mut distance_table = [0.0f32; 25];
        distance_table[12] = 1.0;
        for i in 1..=12i32 {
            distance_table[(12 - i) as usize] = cfg.kind.weight(cfg.distance_down, i);
            distance_table[(12 + i) as usize] = cfg.kind.weight(cfg.distance_up, i);
        }

        for idx in 0..4096u32 {
            tables[wav][idx as usize] = calculate_pulldown(
                &distance_table,
                cfg.top_bit,
                cfg.pulse_strength,
                cfg.threshold,
                idx,
            );
        }
    }

    tables
}

static WAVE_CACHE: RwLock<Option<Arc<WaveTables>>> = RwLock::new(None);

#[allow(clippy::type_complexity)]
static PULLDOWN_CACHE: RwLock<
    Option<HashMap<(ChipModel, CombinedWaveforms), Arc<PulldownTables>>>,
> = RwLock::new(None);

/// Get the shared base waveform tables, building them on first use.
pub fn wave_tables() -> Arc<WaveTables> {
    if let Some(tables) = WAVE_CACHE.read().as_ref() {
        return Arc::clone(tables);
    }

    let mut guard = WAVE_CACHE.write();
    // Another thread may have built while we waited for the write lock.
    if let Some(tables) = guard.as_ref() {
        return Arc::clone(tables);
    }

    let tables = Arc::new(build_wave_tables());
    *guard = Some(Arc::clone(&tables));
    tables
}

/// Get the shared pulldown tables for a model/strength pair, building them
/// on first use.
pub fn pulldown_tables(model: ChipModel, cws: CombinedWaveforms) -> Arc<PulldownTables> {
    let key = (model, cws);

    if let Some(map) = PULLDOWN_CACHE.read().as_ref() {
        if let Some(tables) = map.get(&key) {
            return Arc::clone(tables);
        }
    }

    let mut guard = PULLDOWN_CACHE.write();
    let map = guard.get_or_insert_with(HashMap::new);
    if let Some(tables) = map.get(&key) {
        return Arc::clone(tables);
    }

    let tables = Arc::new(build_pulldown_tables(model, cws));
    map.insert(key, Arc::clone(&tables));
    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wave_table_shapes() {
        let tables = wave_tables();

        // "No waveform" floats at all-ones.
        assert!(tables[0].iter().all(|&v| v == 0xfff));

        // Sawtooth is the identity on the table index.
        assert_eq!(tables[2][0x000], 0x000);
        assert_eq!(tables[2][0xabc], 0xabc);
        assert_eq!(tables[2][0xfff], 0xfff);

        // Triangle folds at the midpoint and doubles the slope.
        assert_eq!(tables[1][0x000], 0x000);
        assert_eq!(tables[1][0x7ff], 0xffe);
        assert_eq!(tables[1][0x800], 0xffe);
        assert_eq!(tables[1][0xfff], 0x000);
    }

    #[test]
    fn test_wave_tables_are_shared() {
        let a = wave_tables();
        let b = wave_tables();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_pulldown_cache_keyed_by_model_and_strength() {
        let a = pulldown_tables(ChipModel::Mos6581, CombinedWaveforms::Average);
        let b = pulldown_tables(ChipModel::Mos6581, CombinedWaveforms::Average);
        let c = pulldown_tables(ChipModel::Mos8580, CombinedWaveforms::Average);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_pulldown_is_subset_of_and() {
        // Combined tri+saw never sets a bit that plain AND would clear
        // outright everywhere. Spot-check that the combined output is
        // dimmer than the sawtooth itself.
        let tables = pulldown_tables(ChipModel::Mos6581, CombinedWaveforms::Average);
        for idx in (0..4096).step_by(7) {
            let combined = tables[0][idx];
            assert!(combined <= 0xfff);
        }
        // Near zero the combined waveform is silent.
        assert_eq!(tables[0][0], 0);
    }

    #[test]
    fn test_concurrent_first_use_builds_once() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    pulldown_tables(ChipModel::Mos8580, CombinedWaveforms::Strong)
                })
            })
            .collect();

        let tables: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for t in &tables[1..] {
            assert!(Arc::ptr_eq(&tables[0], t));
        }
    }
}
