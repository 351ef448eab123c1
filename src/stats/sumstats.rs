use statrs::distribution::ContinuousCDF;
use statrs::distribution::Normal;

/// Median of a chi-square distribution with one degree of freedom, rounded
/// as in the usual genomic control definition.
pub const GC_NUMBER: f64 = 0.456;

/// Two-sided p-value of a standard normal z-score.
pub fn z2p(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    let normal = Normal::new(0.0, 1.0).unwrap();
    2.0 * normal.cdf(-z.abs())
}
