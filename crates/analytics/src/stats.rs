//! Statistical primitives
//!
//! Normal distribution functions, the 2x2 chi-square test of independence,
//! Cohen's h, and post-hoc power for two-proportion tests. Implemented from
//! standard rational approximations (Abramowitz & Stegun 7.1.26 for the
//! error function, Acklam's algorithm for the normal quantile); absolute
//! error is below 1e-6, well inside the four decimals reported downstream.

use serde::{Deserialize, Serialize};

/// Error function, Abramowitz & Stegun approximation 7.1.26
pub fn erf(x: f64) -> f64 {
    const P: f64 = 0.327_591_1;
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

/// Standard normal cumulative distribution function
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Standard normal quantile (inverse CDF), Acklam's algorithm
///
/// Valid for p strictly inside (0, 1); returns +/- infinity at the bounds.
pub fn normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

/// Two-sided p-value for a z statistic
pub fn two_sided_p(z: f64) -> f64 {
    2.0 * (1.0 - normal_cdf(z.abs()))
}

/// Result of a chi-square test of independence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Chi2Test {
    /// Chi-square statistic (Yates-corrected for 2x2 tables)
    pub statistic: f64,
    /// Upper-tail p-value
    pub p_value: f64,
    /// Degrees of freedom
    pub dof: u32,
}

/// Chi-square test of independence on a 2x2 contingency table
///
/// Rows are the two populations, columns are outcome / non-outcome counts.
/// Applies Yates' continuity correction, matching the convention for 2x2
/// tables. A table with an empty row or column margin carries no evidence
/// of association and yields a null result (statistic 0, p-value 1).
pub fn chi_square_2x2(table: [[u64; 2]; 2]) -> Chi2Test {
    let o: Vec<f64> = table.iter().flatten().map(|&v| v as f64).collect();
    let row = [o[0] + o[1], o[2] + o[3]];
    let col = [o[0] + o[2], o[1] + o[3]];
    let n = row[0] + row[1];

    if row.contains(&0.0) || col.contains(&0.0) {
        return Chi2Test {
            statistic: 0.0,
            p_value: 1.0,
            dof: 1,
        };
    }

    let mut statistic = 0.0;
    for i in 0..2 {
        for j in 0..2 {
            let expected = row[i] * col[j] / n;
            let deviation = ((o[i * 2 + j] - expected).abs() - 0.5).max(0.0);
            statistic += deviation * deviation / expected;
        }
    }

    Chi2Test {
        statistic,
        // 1 dof: P(X > x) = erfc(sqrt(x / 2))
        p_value: 1.0 - erf((statistic / 2.0).sqrt()),
        dof: 1,
    }
}

/// Cohen's h effect size for the difference between two proportions
///
/// `h = 2 asin(sqrt(treatment)) - 2 asin(sqrt(control))`; antisymmetric
/// under swapping the groups.
pub fn cohens_h(control_rate: f64, treatment_rate: f64) -> f64 {
    2.0 * treatment_rate.sqrt().asin() - 2.0 * control_rate.sqrt().asin()
}

/// Post-hoc achieved power for a two-proportion z-test
///
/// Uses the normal approximation with the observed rates as the assumed
/// true effect. Quantifies how likely the test was to detect that effect;
/// it says nothing about the validity of the observed p-value.
pub fn achieved_power(
    control_rate: f64,
    treatment_rate: f64,
    control_size: u64,
    treatment_size: u64,
    alpha: f64,
) -> f64 {
    let n_c = control_size as f64;
    let n_t = treatment_size as f64;
    let pooled = (n_c * control_rate + n_t * treatment_rate) / (n_c + n_t);
    let se = (pooled * (1.0 - pooled) * (1.0 / n_c + 1.0 / n_t)).sqrt();

    let ncp = if se > 0.0 {
        (treatment_rate - control_rate).abs() / se
    } else {
        0.0
    };

    let z_crit = normal_quantile(1.0 - alpha / 2.0);
    1.0 - normal_cdf(z_crit - ncp) + normal_cdf(-z_crit - ncp)
}
