//! Self-biased NMOS inverter ("op-amp") solver.
//!
//! Finds the output voltage of the inverting amplifier stage used in the
//! SID filter, given the gain configuration n (ratio of input to feedback
//! "resistors") and the input voltage. The two NMOS transistors are in
//! saturation, so the current balance reduces to
//!
//! ```text
//! (n + 1)*(Vddt - vx)^2 - n*(Vddt - vi)^2 - (Vddt - vo)^2 = 0
//! ```
//!
//! with vx the inverter input following vo through the measured transfer
//! curve. Solved by Newton-Raphson with a bracketing bisection fallback,
//! warm-started from the previous solution across a monotone sweep.

use super::spline::{Point, Spline};

const EPSILON: f64 = 1e-8;

/// Voltage solver for one op-amp model.
pub struct OpAmp {
    transfer: Spline,
    vddt: f64,
    vmin: f64,
    vmax: f64,
    /// Current guess, kept across calls for warm starts.
    x: f64,
}

impl OpAmp {
    /// Build a solver from the measured transfer curve and Vdd - Vth.
    pub fn new(opamp_voltage: &[Point], vddt: f64) -> Self {
        let vmin = opamp_voltage[0].x;
        let vmax = if vddt < opamp_voltage[0].y {
            opamp_voltage[0].y
        } else {
            vddt
        };

        OpAmp {
            transfer: Spline::new(opamp_voltage),
            vddt,
            vmin,
            vmax,
            x: 0.0,
        }
    }

    /// Reset the warm-start state before a new sweep.
    pub fn reset(&mut self) {
        self.x = self.vmin;
    }

    /// Solve for the output voltage at gain `n` and input `vi`.
    pub fn solve(&mut self, n: f64, vi: f64) -> f64 {
        // Root bracket [ak, bk]; f is increasing over it.
        let mut ak = self.vmin;
        let mut bk = self.vmax;

        let a = n + 1.0;
        let b = self.vddt;
        let b_vi = if b > vi { b - vi } else { 0.0 };
        let c = n * (b_vi * b_vi);

        loop {
            let xk = self.x;

            let (vo, dvo) = self.transfer.evaluate(self.x);

            let b_vx = if b > self.x { b - self.x } else { 0.0 };
            let b_vo = if b > vo { b - vo } else { 0.0 };

            // f = a*(b - vx)^2 - c - (b - vo)^2
            let f = a * (b_vx * b_vx) - c - (b_vo * b_vo);

            // df = 2*((b - vo)*dvo - a*(b - vx))
            let df = 2.0 * (b_vo * dvo - a * b_vx);

            self.x -= f / df;

            if (self.x - xk).abs() < EPSILON {
                let (vo, _) = self.transfer.evaluate(self.x);
                return vo;
            }

            // Narrow the bracket, bisect if Newton stepped outside it.
            if f < 0.0 {
                ak = xk;
            } else {
                bk = xk;
            }

            if self.x <= ak || self.x >= bk {
                self.x = (ak + bk) * 0.5;
            }
        }
    }
}
