//! POTX/POTY paddle inputs.
//!
//! The analog paddle circuitry is outside the chip; with nothing
//! connected the counters sit at full scale, which is what games that
//! never use paddles observe.

/// One paddle input channel.
pub struct Potentiometer;

impl Potentiometer {
    /// An unconnected paddle input.
    pub fn new() -> Self {
        Potentiometer
    }

    /// Read the conversion result for either pot register.
    pub fn read(&self) -> u8 {
        0xff
    }
}

impl Default for Potentiometer {
    fn default() -> Self {
        Potentiometer::new()
    }
}
