//! Shared filter model-configuration core.
//!
//! Both chip models precompute the same family of lookup tables: the
//! reverse op-amp transfer function, the filter summer (2-6 inputs), the
//! audio mixer (0-7 inputs) and the 16 volume and resonance gain ladders.
//! Voltages are normalized into 16 bits over the op-amp's working range so
//! the per-sample filter code is pure integer table lookups.
//!
//! Table construction sweeps an [`OpAmp`] solver across the full 16-bit
//! voltage domain for every input configuration. The sweeps are
//! independent, so they run on scoped worker threads and are joined before
//! the finished config is published.

use std::thread;

use super::opamp::OpAmp;
use super::spline::{Point, Spline};

/// Round a non-negative voltage product into a table entry.
#[inline]
pub(super) fn to_u16(x: f64) -> u16 {
    (x + 0.5) as u16
}

/// Voltage normalization derived from the measured op-amp range.
#[derive(Debug, Clone, Copy)]
pub struct VoltageScale {
    /// Smallest representable voltage (first curve point).
    pub vmin: f64,
    /// Largest representable voltage (max of Vddt and curve top).
    pub vmax: f64,
    /// vmax - vmin.
    pub denorm: f64,
    /// 1 / denorm.
    pub norm: f64,
    /// Scale factor mapping the voltage range onto 16 bits.
    pub n16: f64,
}

impl VoltageScale {
    pub(super) fn new(opamp_voltage: &[Point], vddt: f64) -> Self {
        let vmin = opamp_voltage[0].x;
        let vmax = if vddt < opamp_voltage[0].y {
            opamp_voltage[0].y
        } else {
            vddt
        };
        let denorm = vmax - vmin;
        let norm = 1.0 / denorm;

        VoltageScale {
            vmin,
            vmax,
            denorm,
            norm,
            n16: norm * u16::MAX as f64,
        }
    }

    /// Normalize an absolute voltage into a 16-bit table entry.
    #[inline]
    pub(super) fn normalize(&self, voltage: f64) -> u16 {
        to_u16(self.n16 * (voltage - self.vmin))
    }
}

/// The lookup tables shared by both filter models.
pub struct FilterTables {
    /// Reverse op-amp transfer: capacitor voltage to op-amp input voltage.
    pub opamp_rev: Vec<u16>,
    /// Summer op-amp outputs for 2-6 input "resistors".
    pub summer: [Vec<u16>; 5],
    /// Mixer op-amp outputs for 0-7 input "resistors".
    pub mixer: [Vec<u16>; 8],
    /// Output gain ladders for the 16 volume settings.
    pub gain_vol: [Vec<u16>; 16],
    /// Bandpass feedback gain ladders for the 16 resonance settings.
    pub gain_res: [Vec<u16>; 16],
}

/// Model-specific inputs to the shared table build.
pub(super) struct BuildParams<'a> {
    /// Measured op-amp voltage transfer points.
    pub opamp_voltage: &'a [Point],
    /// Vdd - Vth.
    pub vddt: f64,
    /// Mixer gain per input: 8/6 on the 6581, 8/5 on the 8580.
    pub mixer_ratio: f64,
    /// Gain configuration for each of the 16 volume settings.
    pub volume_n: [f64; 16],
    /// Gain configuration for each of the 16 resonance settings.
    pub resonance_n: [f64; 16],
}

fn join_worker<T>(handle: thread::ScopedJoinHandle<'_, T>) -> T {
    match handle.join() {
        Ok(value) => value,
        Err(payload) => std::panic::resume_unwind(payload),
    }
}

/// Reverse op-amp transfer table via spline evaluation of the scaled curve.
fn build_opamp_rev(scale: &VoltageScale, opamp_voltage: &[Point]) -> Vec<u16> {
    let scaled: Vec<Point> = opamp_voltage
        .iter()
        .map(|p| Point {
            // Half the difference keeps the midpoint at 32768.
            x: scale.n16 * (p.x - p.y) / 2.0 + (1u32 << 15) as f64,
            y: scale.n16 * (p.x - scale.vmin),
        })
        .collect();

    let spline = Spline::new(&scaled);

    (0..1usize << 16)
        .map(|x| {
            let (v, _) = spline.evaluate(x as f64);
            // Extrapolation below the first point may go negative.
            if v > 0.0 {
                to_u16(v)
            } else {
                0
            }
        })
        .collect()
}

/// The filter summer operates at n ~ 1 and has 5 input configurations
/// (2-6 input "resistors"). All "on" transistors are modeled as one.
fn build_summer(scale: &VoltageScale, params: &BuildParams) -> [Vec<u16>; 5] {
    let mut opamp = OpAmp::new(params.opamp_voltage, params.vddt);

    std::array::from_fn(|i| {
        let i_div = 2 + i;
        let size = i_div << 16;
        let n = i_div as f64;
        let r_i_div = 1.0 / i_div as f64;

        opamp.reset();

        (0..size)
            .map(|vi| {
                let v_in = scale.vmin + vi as f64 / scale.n16 * r_i_div;
                scale.normalize(opamp.solve(n, v_in))
            })
            .collect()
    })
}

/// The audio mixer has 8 input configurations (0-7 input "resistors") and
/// operates at a model-specific gain per input.
fn build_mixer(scale: &VoltageScale, params: &BuildParams) -> [Vec<u16>; 8] {
    let mut opamp = OpAmp::new(params.opamp_voltage, params.vddt);

    std::array::from_fn(|i| {
        let i_div = if i == 0 { 1 } else { i };
        let size = if i == 0 { 1 } else { i << 16 };
        let n = i as f64 * params.mixer_ratio;
        let r_i_div = 1.0 / i_div as f64;

        opamp.reset();

        (0..size)
            .map(|vi| {
                let v_in = scale.vmin + vi as f64 / scale.n16 * r_i_div;
                scale.normalize(opamp.solve(n, v_in))
            })
            .collect()
    })
}

/// 4-bit "resistor" ladders in the output and bandpass gain stages
/// necessitate 16 gain tables each.
fn build_gain(scale: &VoltageScale, params: &BuildParams, gain_n: &[f64; 16]) -> [Vec<u16>; 16] {
    let mut opamp = OpAmp::new(params.opamp_voltage, params.vddt);

    std::array::from_fn(|n8| {
        opamp.reset();

        (0..1usize << 16)
            .map(|vi| {
                let v_in = scale.vmin + vi as f64 / scale.n16;
                scale.normalize(opamp.solve(gain_n[n8], v_in))
            })
            .collect()
    })
}

/// Build all shared tables, fanning the independent sweeps out to worker
/// threads. Returns only when every table is finished.
pub(super) fn build_filter_tables(scale: &VoltageScale, params: &BuildParams) -> FilterTables {
    thread::scope(|s| {
        let summer = s.spawn(|| build_summer(scale, params));
        let mixer = s.spawn(|| build_mixer(scale, params));
        let gain_vol = s.spawn(|| build_gain(scale, params, &params.volume_n));
        let gain_res = s.spawn(|| build_gain(scale, params, &params.resonance_n));
        let opamp_rev = build_opamp_rev(scale, params.opamp_voltage);

        FilterTables {
            opamp_rev,
            summer: join_worker(summer),
            mixer: join_worker(mixer),
            gain_vol: join_worker(gain_vol),
            gain_res: join_worker(gain_res),
        }
    })
}
