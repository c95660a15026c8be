//! MOS 6581/8580 "SID" Emulator
//!
//! A cycle-accurate emulator of the MOS Technology 6581/8580 Sound Interface
//! Device as used in the Commodore 64. Models the chip down to its analog
//! quirks: R-2R DAC nonlinearity, the two-integrator-loop filter with its
//! NMOS "op-amps" and voltage-controlled resistors, LFSR-timed noise and
//! envelope generation, and the bus-value fade of write-only registers.
//!
//! # Features
//! - Cycle-accurate emulation of all 3 voices (waveform + ADSR envelope)
//! - Transistor-level 6581 filter (EKV model) and measured 8580 filter
//! - Combined-waveform pulldown tables from real-chip samplings
//! - Oscillator hard sync and ring modulation
//! - External RC filter stage and EXT-IN mixing
//! - Decimating and two-pass sinc resampling to any output rate
//!
//! # Quick start
//! ```no_run
//! use sidchip::{ChipModel, SamplingMethod, Sid};
//! let mut sid = Sid::new();
//! sid.set_chip_model(ChipModel::Mos6581);
//! sid.set_sampling_parameters(985_248.0, SamplingMethod::Decimate, 44_100.0).unwrap();
//! sid.write(0x00, 0x00); // Voice 1 freq lo
//! sid.write(0x01, 0x10); // Voice 1 freq hi
//! sid.write(0x05, 0x29); // Attack/decay
//! sid.write(0x18, 0x0f); // Full volume
//! sid.write(0x04, 0x11); // Triangle + gate
//! let mut buf = [0i16; 4096];
//! let written = sid.clock(20_000, &mut buf, 0);
//! ```

#![warn(missing_docs)]

pub mod config; // Model/config enums and host-facing configuration
pub mod filter; // Two-integrator-loop filter emulation
pub mod sampler; // Clock-rate to sample-rate conversion
pub mod sid; // Chip core (voices, envelope, orchestrator)
pub mod tables; // DAC and waveform table construction

/// Error types for SID emulator operations
#[derive(thiserror::Error, Debug)]
pub enum SidError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for SidError {
    /// Converts a String into `SidError::Other`.
    ///
    /// Convenience conversion for generic string errors. Prefer
    /// `SidError::ConfigError(msg)` for configuration failures so callers can
    /// discriminate them.
    fn from(msg: String) -> Self {
        SidError::Other(msg)
    }
}

impl From<&str> for SidError {
    /// Converts a string slice into `SidError::Other`.
    fn from(msg: &str) -> Self {
        SidError::Other(msg.to_string())
    }
}

/// Result type for emulator operations
pub type Result<T> = std::result::Result<T, SidError>;

// Public API exports
pub use config::{ChipModel, CombinedWaveforms, SamplingMethod, SidConfig};
pub use sampler::{Resampler, TwoPassSincResampler, ZeroOrderResampler};
pub use sid::{Control, Sid};
