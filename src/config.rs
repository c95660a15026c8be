//! Model selection and host-facing configuration.
//!
//! The enums here mirror the chip's externally configurable behavior. They
//! are closed sets; unknown names arriving from the host (strings, JSON)
//! fail fast with [`SidError::ConfigError`](crate::SidError::ConfigError)
//! instead of being silently defaulted.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::SidError;

/// Which SID revision to emulate.
///
/// The two revisions differ in DAC linearity, filter circuit parameters,
/// combined-waveform behavior and bus fade timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChipModel {
    /// The original NMOS chip found in early C64s.
    Mos6581,
    /// The HMOS-II revision with a cleaner DAC and filter.
    #[default]
    Mos8580,
}

impl FromStr for ChipModel {
    type Err = SidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "6581" | "mos6581" => Ok(ChipModel::Mos6581),
            "8580" | "mos8580" => Ok(ChipModel::Mos8580),
            other => Err(SidError::ConfigError(format!(
                "unknown chip model '{other}'"
            ))),
        }
    }
}

/// Strength of the combined-waveform bit interaction.
///
/// Real chips vary; the pulldown tables are parameterized so hosts can pick
/// the flavor that matches their reference chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CombinedWaveforms {
    /// Averaged samplings, the recommended default.
    #[default]
    Average,
    /// Weaker neighbor pulldown than average.
    Weak,
    /// Stronger neighbor pulldown than average.
    Strong,
}

impl FromStr for CombinedWaveforms {
    type Err = SidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "average" => Ok(CombinedWaveforms::Average),
            "weak" => Ok(CombinedWaveforms::Weak),
            "strong" => Ok(CombinedWaveforms::Strong),
            other => Err(SidError::ConfigError(format!(
                "unknown combined waveforms strength '{other}'"
            ))),
        }
    }
}

/// Output resampling algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SamplingMethod {
    /// Linear interpolation between clock-domain samples. Fast, aliases.
    #[default]
    Decimate,
    /// Two-pass Kaiser-windowed sinc resampling. Slower, clean passband.
    Resample,
}

impl FromStr for SamplingMethod {
    type Err = SidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "decimate" => Ok(SamplingMethod::Decimate),
            "resample" => Ok(SamplingMethod::Resample),
            other => Err(SidError::ConfigError(format!(
                "unknown sampling method '{other}'"
            ))),
        }
    }
}

/// Serializable emulation setup for hosts that persist their settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidConfig {
    /// Chip revision to emulate.
    pub chip_model: ChipModel,
    /// Combined-waveform strength.
    pub combined_waveforms: CombinedWaveforms,
    /// Resampling algorithm.
    pub sampling_method: SamplingMethod,
    /// Chip clock in Hz (985248 for PAL, 1022730 for NTSC).
    pub clock_frequency: f64,
    /// Output sample rate in Hz.
    pub sampling_frequency: f64,
}

impl Default for SidConfig {
    fn default() -> Self {
        SidConfig {
            chip_model: ChipModel::default(),
            combined_waveforms: CombinedWaveforms::default(),
            sampling_method: SamplingMethod::default(),
            clock_frequency: 985_248.0,
            sampling_frequency: 44_100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chip_model_from_str() {
        assert_eq!("6581".parse::<ChipModel>().unwrap(), ChipModel::Mos6581);
        assert_eq!("MOS8580".parse::<ChipModel>().unwrap(), ChipModel::Mos8580);
        assert!("6582".parse::<ChipModel>().is_err());
    }

    #[test]
    fn test_unknown_names_fail_fast() {
        assert!("medium".parse::<CombinedWaveforms>().is_err());
        assert!("interpolate".parse::<SamplingMethod>().is_err());
    }

    #[test]
    fn test_default_config() {
        let cfg = SidConfig::default();
        assert_eq!(cfg.chip_model, ChipModel::Mos8580);
        assert_eq!(cfg.clock_frequency, 985_248.0);
    }
}
