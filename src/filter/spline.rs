//! Monotone cubic spline interpolation (Fritsch-Carlson).
//!
//! Used during filter model construction to interpolate the measured
//! op-amp voltage transfer points. Monotonicity matters: the measured
//! curves are strictly decreasing and an overshooting interpolant would
//! produce a non-invertible transfer table.

/// A 2D control point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// Input voltage.
    pub x: f64,
    /// Output voltage.
    pub y: f64,
}

struct Segment {
    x1: f64,
    x2: f64,
    a: f64,
    b: f64,
    c: f64,
    d: f64,
}

/// Monotone cubic interpolator over a sorted point set.
pub struct Spline {
    segments: Vec<Segment>,
}

impl Spline {
    /// Build a spline through `input`, which must be sorted by x and hold
    /// at least 3 points.
    pub fn new(input: &[Point]) -> Self {
        assert!(input.len() > 2, "spline needs at least 3 points");

        let n = input.len() - 1;

        let dxs: Vec<f64> = (0..n).map(|i| input[i + 1].x - input[i].x).collect();
        let ms: Vec<f64> = (0..n)
            .map(|i| (input[i + 1].y - input[i].y) / dxs[i])
            .collect();

        // Tangents: weighted harmonic mean of adjacent slopes, zeroed on
        // sign changes to preserve monotonicity.
        let mut cs = Vec::with_capacity(n + 1);
        cs.push(ms[0]);
        for i in 1..n {
            let m_prev = ms[i - 1];
            let m_next = ms[i];
            if m_prev * m_next <= 0.0 {
                cs.push(0.0);
            } else {
                let dx = dxs[i - 1];
                let dx_next = dxs[i];
                let common = dx + dx_next;
                cs.push(3.0 * common / ((common + dx_next) / m_prev + (common + dx) / m_next));
            }
        }
        cs.push(ms[n - 1]);

        let mut segments = Vec::with_capacity(n);
        for i in 0..n {
            let c1 = cs[i];
            let m = ms[i];
            let inv_dx = 1.0 / dxs[i];
            let common = c1 + cs[i + 1] - m - m;

            segments.push(Segment {
                x1: input[i].x,
                x2: if i == n - 1 { f64::MAX } else { input[i + 1].x },
                d: input[i].y,
                c: c1,
                b: (m - c1 - common) * inv_dx,
                a: common * inv_dx * inv_dx,
            });
        }

        Spline { segments }
    }

    /// Evaluate at `x`, returning `(y, dy/dx)`. Points outside the input
    /// range extrapolate along the first/last segment.
    pub fn evaluate(&self, x: f64) -> (f64, f64) {
        let seg = match self.segments.iter().find(|s| x <= s.x2) {
            Some(seg) => seg,
            // x beyond the sentinel of the last segment cannot happen,
            // but extrapolating from the last segment is the right answer.
            None => &self.segments[self.segments.len() - 1],
        };

        let diff = x - seg.x1;
        let y = ((seg.a * diff + seg.b) * diff + seg.c) * diff + seg.d;
        let dy = (3.0 * seg.a * diff + 2.0 * seg.b) * diff + seg.c;

        (y, dy)
    }
}
