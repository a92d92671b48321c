//! Damped least-squares fitting of a [`Formula`] to a monitored object.
//!
//! The fitter runs Levenberg-Marquardt iterations with a forward-difference
//! Jacobian. Histogram bins are weighted by their errors (Neyman) unless
//! Pearson errors or a Poisson likelihood are requested; graph points have
//! unit weights and the parameter errors are rescaled by `chi2 / ndf`.

use dqmwatch_types::{Binned, MonitorObject};
use thiserror::Error;
use tracing::trace;

use crate::formula::{Builtin, Formula};

const MAX_ITERATIONS: usize = 200;
const MAX_DAMPING: f64 = 1e12;
const TOLERANCE: f64 = 1e-10;

/// Errors raised by [`fit`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("nothing to fit: the object has no usable points")]
    NoPoints,

    #[error("{points} point(s) cannot constrain {npar} parameter(s)")]
    TooFewPoints { points: usize, npar: usize },

    #[error("objects of class {0} cannot be fitted")]
    Unsupported(String),

    #[error("the fit diverged")]
    NotFinite,
}

/// Which residuals are minimized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMethod {
    /// `(data - model) / data error`, bins without error skipped.
    #[default]
    Neyman,
    /// `(data - model) / sqrt(model)`.
    Pearson,
    /// Poisson deviance residuals.
    Likelihood,
}

/// Fit settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    pub method: FitMethod,
    /// Run a second minimization from the first result.
    pub improve: bool,
    /// Restrict the fit to `min <= x <= max`.
    pub range: Option<(f64, f64)>,
    pub max_iterations: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            method: FitMethod::Neyman,
            improve: false,
            range: None,
            max_iterations: MAX_ITERATIONS,
        }
    }
}

/// A single measurement: coordinates, value and error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitPoint {
    pub vars: [f64; 3],
    pub value: f64,
    pub error: f64,
}

/// Measurements extracted from an object.
#[derive(Debug, Clone, PartialEq)]
pub struct FitData {
    pub points: Vec<FitPoint>,
    /// Points carry no measured errors (graphs).
    pub unit_errors: bool,
}

impl FitData {
    /// Extract measurements from `object`, keeping `x` inside `range`.
    pub fn from_object(object: &MonitorObject, range: Option<(f64, f64)>) -> Result<Self, FitError> {
        let in_range = |x: f64| range.map_or(true, |(lo, hi)| x >= lo && x <= hi);
        let (points, unit_errors) = match object {
            MonitorObject::Histogram1D(h) => {
                let points = (1..=h.axis.bins())
                    .map(|bin| FitPoint {
                        vars: [h.bin_center(bin), 0.0, 0.0],
                        value: h.bin_content(bin),
                        error: h.bin_error(bin),
                    })
                    .filter(|p| in_range(p.vars[0]))
                    .collect();
                (points, false)
            }
            MonitorObject::Histogram2D(h) => {
                let contents = h.contents();
                let points = h
                    .selected_bins(false, false)
                    .into_iter()
                    .map(|bin| {
                        let (ix, iy) = h.bin_xy(bin);
                        FitPoint {
                            vars: [h.x_axis.bin_center(ix), h.y_axis.bin_center(iy), 0.0],
                            value: contents[bin],
                            error: h.bin_error(bin),
                        }
                    })
                    .filter(|p| in_range(p.vars[0]))
                    .collect();
                (points, false)
            }
            MonitorObject::Graph(g) => {
                let points = g
                    .points
                    .iter()
                    .filter(|p| in_range(p.x))
                    .map(|p| FitPoint {
                        vars: [p.x, 0.0, 0.0],
                        value: p.y,
                        error: 1.0,
                    })
                    .collect();
                (points, true)
            }
            MonitorObject::Graph2D(g) => {
                let points = g
                    .points
                    .iter()
                    .filter(|p| in_range(p.x))
                    .map(|p| FitPoint {
                        vars: [p.x, p.y, 0.0],
                        value: p.z,
                        error: 1.0,
                    })
                    .collect();
                (points, true)
            }
            MonitorObject::Scalar(s) => return Err(FitError::Unsupported(s.class_name().to_string())),
        };
        Ok(Self { points, unit_errors })
    }
}

/// Outcome of a fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub parameters: Vec<f64>,
    pub errors: Vec<f64>,
    pub chi2: f64,
    pub ndf: usize,
    pub converged: bool,
}

/// Starting values: 1 for every parameter, refined for built-in shapes
/// from the data (height, mean and width for `gaus`, average for `polN`).
pub fn initial_guess(formula: &Formula, data: &FitData) -> Vec<f64> {
    let mut params = vec![1.0; formula.npar()];
    let total: f64 = data.points.iter().map(|p| p.value.max(0.0)).sum();
    let max = data.points.iter().map(|p| p.value).fold(f64::NEG_INFINITY, f64::max);
    let (mean, rms) = if total > 0.0 {
        let mean = data.points.iter().map(|p| p.value.max(0.0) * p.vars[0]).sum::<f64>() / total;
        let var = data
            .points
            .iter()
            .map(|p| p.value.max(0.0) * (p.vars[0] - mean).powi(2))
            .sum::<f64>()
            / total;
        (mean, var.sqrt())
    } else {
        (0.0, 1.0)
    };
    let average = if data.points.is_empty() {
        1.0
    } else {
        data.points.iter().map(|p| p.value).sum::<f64>() / data.points.len() as f64
    };

    for &(builtin, offset) in formula.builtins() {
        if offset + builtin.npar() > params.len() {
            continue;
        }
        match builtin {
            Builtin::Gaus => {
                if max.is_finite() {
                    params[offset] = max;
                }
                params[offset + 1] = mean;
                params[offset + 2] = if rms > 0.0 { rms } else { 1.0 };
            }
            Builtin::Expo => {
                params[offset] = if max > 0.0 { max.ln() } else { 0.0 };
                params[offset + 1] = 0.0;
            }
            Builtin::Pol(degree) => {
                params[offset] = average;
                for i in 1..=degree {
                    params[offset + i] = 0.0;
                }
            }
        }
    }
    params
}

fn residuals(
    formula: &Formula,
    data: &FitData,
    method: FitMethod,
    params: &[f64],
    out: &mut Vec<f64>,
) {
    out.clear();
    for p in &data.points {
        let model = formula.eval(&p.vars, params);
        let residual = match method {
            _ if data.unit_errors => p.value - model,
            FitMethod::Neyman => {
                if p.error <= 0.0 {
                    continue;
                }
                (p.value - model) / p.error
            }
            FitMethod::Pearson => {
                let sigma = model.abs().sqrt();
                if sigma > 0.0 {
                    (p.value - model) / sigma
                } else {
                    p.value - model
                }
            }
            FitMethod::Likelihood => {
                let mu = model.max(f64::MIN_POSITIVE);
                let deviance = if p.value > 0.0 {
                    2.0 * (mu - p.value + p.value * (p.value / mu).ln())
                } else {
                    2.0 * mu
                };
                deviance.max(0.0).sqrt() * (p.value - model).signum()
            }
        };
        out.push(residual);
    }
}

fn cost(r: &[f64]) -> f64 {
    r.iter().map(|v| v * v).sum()
}

/// Solve `a * x = b` by Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-300 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let sum: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - sum) / a[row][row];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}

fn invert_diagonal(a: &[Vec<f64>]) -> Option<Vec<f64>> {
    let n = a.len();
    (0..n)
        .map(|i| {
            let mut e = vec![0.0; n];
            e[i] = 1.0;
            solve(a.to_vec(), e).map(|col| col[i])
        })
        .collect()
}

struct Normal {
    jtj: Vec<Vec<f64>>,
    jtr: Vec<f64>,
}

fn normal_equations(
    formula: &Formula,
    data: &FitData,
    method: FitMethod,
    params: &[f64],
    base: &[f64],
) -> Normal {
    let npar = params.len();
    let mut columns = Vec::with_capacity(npar);
    let mut shifted = params.to_vec();
    let mut buffer = Vec::with_capacity(base.len());
    for j in 0..npar {
        let h = 1e-7 * params[j].abs().max(1e-3);
        shifted[j] = params[j] + h;
        residuals(formula, data, method, &shifted, &mut buffer);
        shifted[j] = params[j];
        let column: Vec<f64> = buffer
            .iter()
            .zip(base)
            .map(|(moved, r)| (moved - r) / h)
            .collect();
        columns.push(column);
    }
    let mut jtj = vec![vec![0.0; npar]; npar];
    let mut jtr = vec![0.0; npar];
    for i in 0..npar {
        jtr[i] = columns[i].iter().zip(base).map(|(j, r)| j * r).sum();
        for k in 0..=i {
            let v: f64 = columns[i].iter().zip(&columns[k]).map(|(a, b)| a * b).sum();
            jtj[i][k] = v;
            jtj[k][i] = v;
        }
    }
    Normal { jtj, jtr }
}

fn minimize(
    formula: &Formula,
    data: &FitData,
    options: &FitOptions,
    start: Vec<f64>,
) -> Result<(Vec<f64>, bool), FitError> {
    let mut params = start;
    let mut r = Vec::new();
    residuals(formula, data, options.method, &params, &mut r);
    let mut current = cost(&r);
    if !current.is_finite() {
        return Err(FitError::NotFinite);
    }
    let mut damping = 1e-3;
    let mut converged = false;

    for iteration in 0..options.max_iterations {
        let normal = normal_equations(formula, data, options.method, &params, &r);
        let mut improved = false;
        while damping < MAX_DAMPING {
            let mut a = normal.jtj.clone();
            for (i, row) in a.iter_mut().enumerate() {
                let d = row[i];
                row[i] = d + damping * if d > 0.0 { d } else { 1.0 };
            }
            let rhs: Vec<f64> = normal.jtr.iter().map(|g| -g).collect();
            let Some(step) = solve(a, rhs) else {
                damping *= 10.0;
                continue;
            };
            let candidate: Vec<f64> = params.iter().zip(&step).map(|(p, s)| p + s).collect();
            let mut candidate_r = Vec::new();
            residuals(formula, data, options.method, &candidate, &mut candidate_r);
            let candidate_cost = cost(&candidate_r);
            if candidate_cost.is_finite() && candidate_cost <= current {
                let decrease = current - candidate_cost;
                params = candidate;
                r = candidate_r;
                current = candidate_cost;
                damping = (damping / 10.0).max(1e-12);
                improved = true;
                if decrease <= TOLERANCE * current.max(TOLERANCE) {
                    converged = true;
                }
                break;
            }
            damping *= 10.0;
        }
        trace!("Fit iteration {}: cost {:.6e}, damping {:.1e}", iteration, current, damping);
        if !improved || converged {
            // No downhill step left: the minimum is reached.
            converged = true;
            break;
        }
    }
    Ok((params, converged))
}

/// Fit `formula` to `data` starting from `initial`.
pub fn fit(
    formula: &Formula,
    data: &FitData,
    initial: &[f64],
    options: &FitOptions,
) -> Result<FitResult, FitError> {
    if data.points.is_empty() {
        return Err(FitError::NoPoints);
    }
    let npar = formula.npar();
    let mut start = vec![1.0; npar];
    for (slot, value) in start.iter_mut().zip(initial) {
        *slot = *value;
    }

    let (mut params, mut converged) = minimize(formula, data, options, start)?;
    if options.improve {
        let (improved, again) = minimize(formula, data, options, params)?;
        params = improved;
        converged = again;
    }

    let mut r = Vec::new();
    residuals(formula, data, options.method, &params, &mut r);
    if r.len() < npar {
        return Err(FitError::TooFewPoints {
            points: r.len(),
            npar,
        });
    }
    let chi2 = cost(&r);
    if !chi2.is_finite() || params.iter().any(|p| !p.is_finite()) {
        return Err(FitError::NotFinite);
    }
    let ndf = r.len() - npar;

    let normal = normal_equations(formula, data, options.method, &params, &r);
    let scale = if data.unit_errors && ndf > 0 {
        chi2 / ndf as f64
    } else {
        1.0
    };
    let errors = invert_diagonal(&normal.jtj)
        .map(|diag| diag.iter().map(|v| (v.abs() * scale).sqrt()).collect())
        .unwrap_or_else(|| vec![0.0; npar]);

    Ok(FitResult {
        parameters: params,
        errors,
        chi2,
        ndf,
        converged,
    })
}
