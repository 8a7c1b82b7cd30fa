use std::f64::consts::PI;

// above this argument the upward recursion starting from the erf expression is stable
const UPWARD_RECURSION_LIMIT: f64 = 30.0;
const SERIES_MAX_TERMS: usize = 1000;

/// Boys function F_n(t) = int_0^1 u^(2n) exp(-t u^2) du for n = 0..=n_max.
///
/// For small arguments F_(n_max) is obtained from the series expansion
/// F_n(t) = exp(-t) sum_k (2t)^k / ((2n+1)(2n+3)...(2n+2k+1))
/// and the lower orders by downward recursion. For large arguments F_0 is computed
/// from the error function and the higher orders by upward recursion.
pub fn boys_function(n_max: usize, t: f64) -> Vec<f64> {
    let mut f: Vec<f64> = vec![0.0; n_max + 1];
    let exp_t: f64 = (-t).exp();

    if t < UPWARD_RECURSION_LIMIT {
        let mut term: f64 = 1.0 / (2 * n_max + 1) as f64;
        let mut sum: f64 = term;
        for k in 0..SERIES_MAX_TERMS {
            term *= 2.0 * t / (2 * n_max + 2 * k + 3) as f64;
            sum += term;
            if term < sum * f64::EPSILON {
                break;
            }
        }
        f[n_max] = sum * exp_t;
        for n in (0..n_max).rev() {
            f[n] = (2.0 * t * f[n + 1] + exp_t) / (2 * n + 1) as f64;
        }
    } else {
        f[0] = 0.5 * (PI / t).sqrt() * libm::erf(t.sqrt());
        for n in 0..n_max {
            f[n + 1] = ((2 * n + 1) as f64 * f[n] - exp_t) / (2.0 * t);
        }
    }
    f
}
