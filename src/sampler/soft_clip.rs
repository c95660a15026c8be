//! Smooth saturation toward the 16-bit rails.

/// Values below this pass unchanged.
const THRESHOLD: i32 = 28000;

/// Pade approximant of tanh (5th order), accurate for |x| < 3.
#[inline]
fn tanh_pade(x: f64) -> f64 {
    if x.abs() < 3.0 {
        let x2 = x * x;
        let num = x * (945.0 + x2 * (105.0 + x2));
        let den = 945.0 + x2 * (420.0 + x2 * 15.0);
        num / den
    } else if x > 0.0 {
        1.0
    } else {
        -1.0
    }
}

#[inline]
fn soft_clip_positive(x: i32, max_val: i32) -> i32 {
    if x < THRESHOLD {
        return x;
    }

    let max_f = max_val as f64;
    let t = THRESHOLD as f64 / max_f;
    let a = 1.0 - t;
    let b = 1.0 / a;

    let value = (x - THRESHOLD) as f64 / max_f;
    let result = t + a * tanh_pade(b * value);
    (result * max_f) as i32
}

/// Clip a sample into the 16-bit range, bending it smoothly toward the
/// rails above the threshold instead of truncating.
#[inline]
pub fn soft_clip(x: i32) -> i16 {
    if x < 0 {
        let abs_x = if x == i32::MIN { i32::MAX } else { -x };
        // Negate as i32 first so -(-32768) cannot overflow i16.
        (-soft_clip_positive(abs_x, 32768)) as i16
    } else {
        soft_clip_positive(x, 32767) as i16
    }
}
