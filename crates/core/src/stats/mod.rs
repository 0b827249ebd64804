//! Two-proportion z-test and the normal CDF it needs.
//!
//! The CDF uses the Abramowitz-Stegun 7.1.26 rational approximation of `erf`
//! (absolute error around 1e-7). Good enough to drive a test decision, not
//! for reporting p-values to several significant digits.

use crate::domain::ab_test::VariantCounts;
use serde::{Deserialize, Serialize};

const A1: f64 = 0.254829592;
const A2: f64 = -0.284496736;
const A3: f64 = 1.421413741;
const A4: f64 = -1.453152027;
const A5: f64 = 1.061405429;
const P: f64 = 0.3275911;

/// Standard normal CDF, Φ(x).
pub fn normal_cdf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs() / std::f64::consts::SQRT_2;
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    0.5 * (1.0 + sign * y)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZTest {
    pub z_score: f64,
    /// Two-sided.
    pub p_value: f64,
}

impl ZTest {
    const NULL: ZTest = ZTest {
        z_score: 0.0,
        p_value: 1.0,
    };
}

/// Pooled two-proportion z-test of `variant` against `control`. A positive z
/// means the variant converts better. Degenerate inputs (no trials, or a pooled
/// rate of exactly 0 or 1) report z = 0 and p = 1.
pub fn two_proportion_z_test(control: VariantCounts, variant: VariantCounts) -> ZTest {
    if control.trials <= 0 || variant.trials <= 0 {
        return ZTest::NULL;
    }

    let n1 = control.trials as f64;
    let n2 = variant.trials as f64;
    let p1 = control.successes as f64 / n1;
    let p2 = variant.successes as f64 / n2;
    let pooled = (control.successes + variant.successes) as f64 / (n1 + n2);
    let se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();

    if se == 0.0 || !se.is_finite() {
        return ZTest::NULL;
    }

    let z = (p2 - p1) / se;
    if z == 0.0 {
        return ZTest::NULL;
    }

    let p_value = (2.0 * (1.0 - normal_cdf(z.abs()))).clamp(0.0, 1.0);
    ZTest {
        z_score: z,
        p_value,
    }
}

/// Relative improvement of `p2` over `p1` in percent; 0 when `p1` is 0.
pub fn lift(p1: f64, p2: f64) -> f64 {
    if p1 == 0.0 {
        return 0.0;
    }
    (p2 - p1) / p1 * 100.0
}
