//! Probability functions used by the statistical quality tests.

const LANCZOS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

const MAX_ITERATIONS: usize = 500;
const EPSILON: f64 = 1e-15;

/// Natural logarithm of the gamma function for `x > 0`.
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // Reflection formula.
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let t = x + 7.5;
    let series = LANCZOS
        .iter()
        .enumerate()
        .skip(1)
        .fold(LANCZOS[0], |acc, (i, &c)| acc + c / (x + i as f64));
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}

/// Regularized lower incomplete gamma function P(a, x).
pub fn gamma_p(a: f64, x: f64) -> f64 {
    if x <= 0.0 || a <= 0.0 {
        return 0.0;
    }
    if x < a + 1.0 {
        gamma_series(a, x)
    } else {
        1.0 - gamma_continued_fraction(a, x)
    }
}

/// Regularized upper incomplete gamma function Q(a, x) = 1 - P(a, x).
pub fn gamma_q(a: f64, x: f64) -> f64 {
    if x <= 0.0 || a <= 0.0 {
        return 1.0;
    }
    if x < a + 1.0 {
        1.0 - gamma_series(a, x)
    } else {
        gamma_continued_fraction(a, x)
    }
}

fn gamma_series(a: f64, x: f64) -> f64 {
    let mut sum = 1.0 / a;
    let mut term = sum;
    let mut ap = a;
    for _ in 0..MAX_ITERATIONS {
        ap += 1.0;
        term *= x / ap;
        sum += term;
        if term.abs() < sum.abs() * EPSILON {
            break;
        }
    }
    sum * (-x + a * x.ln() - ln_gamma(a)).exp()
}

// Modified Lentz evaluation.
fn gamma_continued_fraction(a: f64, x: f64) -> f64 {
    let tiny = f64::MIN_POSITIVE / EPSILON;
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / tiny;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..=MAX_ITERATIONS {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < tiny {
            d = tiny;
        }
        c = b + an / c;
        if c.abs() < tiny {
            c = tiny;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < EPSILON {
            break;
        }
    }
    (-x + a * x.ln() - ln_gamma(a)).exp() * h
}

/// Probability that a chi-square with `ndf` degrees of freedom exceeds `chi2`.
///
/// Returns 0 for `ndf <= 0` or a negative `chi2`, and 1 for `chi2 == 0`.
pub fn chi2_prob(chi2: f64, ndf: f64) -> f64 {
    if ndf <= 0.0 || chi2 < 0.0 {
        return 0.0;
    }
    if chi2 == 0.0 {
        return 1.0;
    }
    gamma_q(0.5 * ndf, 0.5 * chi2).clamp(0.0, 1.0)
}

/// Kolmogorov distribution: probability that the scaled two-sample distance
/// exceeds `z`.
pub fn kolmogorov_prob(z: f64) -> f64 {
    const FJ: [f64; 4] = [-2.0, -8.0, -18.0, -32.0];
    const W: f64 = 2.506_628_27;
    const C1: f64 = -1.233_700_550_136_169_7;
    const C2: f64 = -11.103_304_951_225_528;
    const C3: f64 = -30.842_513_753_404_244;

    let u = z.abs();
    if u < 0.2 {
        1.0
    } else if u < 0.755 {
        let v = 1.0 / (u * u);
        1.0 - W * ((C1 * v).exp() + (C2 * v).exp() + (C3 * v).exp()) / u
    } else if u < 6.8116 {
        let v = u * u;
        let maxj = ((3.0 / u).round() as usize).clamp(1, FJ.len());
        let sum: f64 = FJ
            .iter()
            .take(maxj)
            .enumerate()
            .map(|(j, &f)| {
                let term = (f * v).exp();
                if j % 2 == 0 {
                    term
                } else {
                    -term
                }
            })
            .sum();
        (2.0 * sum).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation, `None` for an empty slice.
pub fn rms(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Median of unsorted values, `None` for an empty slice.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        Some(0.5 * (sorted[n / 2 - 1] + sorted[n / 2]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn ln_gamma_matches_factorials() {
        assert!(close(ln_gamma(1.0), 0.0, 1e-10));
        assert!(close(ln_gamma(5.0), 24f64.ln(), 1e-10));
        assert!(close(ln_gamma(0.5), std::f64::consts::PI.sqrt().ln(), 1e-10));
    }

    #[test]
    fn gamma_p_and_q_are_complementary() {
        for &(a, x) in &[(0.5, 0.3), (2.0, 1.5), (5.0, 9.0), (10.0, 3.0)] {
            assert!(close(gamma_p(a, x) + gamma_q(a, x), 1.0, 1e-12));
        }
    }

    #[test]
    fn chi2_prob_known_values() {
        // One degree of freedom: P(chi2 > 3.841) = 0.05
        assert!(close(chi2_prob(3.841_458_8, 1.0), 0.05, 1e-6));
        // Two degrees of freedom: P(chi2 > x) = exp(-x/2)
        assert!(close(chi2_prob(4.0, 2.0), (-2.0f64).exp(), 1e-10));
        assert_eq!(chi2_prob(0.0, 3.0), 1.0);
        assert_eq!(chi2_prob(5.0, 0.0), 0.0);
        assert_eq!(chi2_prob(-1.0, 3.0), 0.0);
    }

    #[test]
    fn kolmogorov_prob_limits() {
        assert_eq!(kolmogorov_prob(0.1), 1.0);
        assert_eq!(kolmogorov_prob(7.0), 0.0);
        // Critical value for 5% significance.
        assert!(close(kolmogorov_prob(1.358), 0.05, 1e-3));
        let mut previous = 1.0;
        for i in 1..60 {
            let p = kolmogorov_prob(i as f64 * 0.1);
            assert!(p <= previous + 1e-12);
            previous = p;
        }
    }

    #[test]
    fn descriptive_statistics() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&values), Some(5.0));
        assert_eq!(rms(&values), Some(2.0));
        assert_eq!(median(&values), Some(4.5));
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(mean(&[]), None);
    }
}
