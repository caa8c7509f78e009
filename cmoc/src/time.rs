//! Time handling. `t` (absolute simulation time) and `dt` (a sub-step) are
//! both modeled as [`hifitime::Duration`] — elapsed seconds since a nominal
//! zero, not a calendar [`hifitime::Epoch`]: both are conceptually plain
//! seconds, and `Duration` is hifitime's type for exactly that (a signed
//! span, not a point in time).

pub use hifitime::Duration;

/// The tolerance `alpha` is checked against: a small floating slop around
/// the closed interval `[0, 1]` rather than an exact comparison, since
/// `alpha` is usually produced by dividing two `Duration`s.
pub const ALPHA_EPS: f64 = 1e-6;

/// `true` if `alpha` lies in `[-ALPHA_EPS, 1 + ALPHA_EPS]`.
pub fn alpha_in_range(alpha: f64) -> bool {
    alpha >= -ALPHA_EPS && alpha <= 1.0 + ALPHA_EPS
}

/// Encode `t` as an 11-character string such that lexicographic string order
/// matches numeric order over the full range of representable `Duration`s,
/// including negative and zero values. Used for restart/visualization file
/// naming, where a plain `%f`-style format would not sort correctly across
/// magnitudes (`"9.0"` > `"10.0"` lexicographically).
///
/// Layout: one sign-class digit (`'0'` negative, `'1'` zero, `'2'`
/// positive), a 3-digit biased decimal exponent, `'.'`, and a 6-digit
/// normalized mantissa. For negative values both the exponent and mantissa
/// codes are complemented against their max so that larger magnitude (more
/// negative) sorts *before* smaller magnitude, matching how negative numbers
/// order.
pub fn time_string(t: Duration) -> String {
    let x = t.to_seconds();
    if x == 0.0 {
        return "1000.000000".to_string();
    }

    const BIAS: i32 = 500;
    let negative = x < 0.0;
    let mag = x.abs();

    let mut exponent = mag.log10().floor() as i32;
    let mut mantissa = mag / 10f64.powi(exponent);
    if mantissa >= 10.0 {
        mantissa /= 10.0;
        exponent += 1;
    }
    if mantissa < 1.0 {
        mantissa *= 10.0;
        exponent -= 1;
    }

    let biased = (exponent + BIAS).clamp(0, 999);
    let mantissa_int = ((mantissa / 10.0) * 1_000_000.0).round().clamp(0.0, 999_999.0) as i64;

    let (sign_class, exp_code, mant_code) = if negative {
        ('0', 999 - biased, 999_999 - mantissa_int)
    } else {
        ('2', biased, mantissa_int)
    };

    format!("{sign_class}{exp_code:03}.{mant_code:06}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(seconds: f64) -> Duration {
        Duration::from_seconds(seconds)
    }

    #[test]
    fn monotonic_across_signs_and_magnitudes() {
        let samples = [
            -1.0e6, -1000.0, -10.0, -9.0, -5.0, -1.0, -0.001, 0.0, 0.001, 1.0, 5.0, 9.0, 10.0,
            1000.0, 1.0e6,
        ];
        let mut encoded: Vec<String> = samples.iter().map(|&s| time_string(d(s))).collect();
        let sorted = {
            let mut e = encoded.clone();
            e.sort();
            e
        };
        assert_eq!(encoded, sorted, "encoding must already be in sorted order");
        encoded.dedup();
        assert_eq!(encoded.len(), samples.len(), "encoding must be injective here");
    }

    #[test]
    fn fixed_width() {
        for s in [-123.456, 0.0, 0.0001, 42.0, 9.999e9] {
            assert_eq!(time_string(d(s)).len(), 11);
        }
    }

    #[test]
    fn alpha_bounds() {
        assert!(alpha_in_range(0.0));
        assert!(alpha_in_range(1.0));
        assert!(alpha_in_range(-1e-7));
        assert!(alpha_in_range(1.0 + 1e-7));
        assert!(!alpha_in_range(-0.1));
        assert!(!alpha_in_range(1.1));
    }
}
