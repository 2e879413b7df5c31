//! Vector-valued frequency quadrature.
//!
//! Every flux-tensor entry is integrated at once: the integrand returns the whole tensor at
//! one frequency, so each evaluation of the (expensive) flux engine is shared by all
//! components.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::{debug, warn};

use super::config::{IntegrationConfig, IntegrationStrategy};

/// Lowest frequency at which the Simpson rule evaluates the integrand.
pub const OMEGA_FLOOR: f64 = 0.01;

#[rustfmt::skip]
const XGK: [f64; 8] = [
    0.991455371120812639206854697526329, 0.949107912342758524526189684047851,
    0.864864423359769072789712788640926, 0.741531185599394439863864773280788,
    0.586087235467691130294144845693013, 0.405845151377397166906606412076961,
    0.207784955007898467600689403773245, 0.000000000000000000000000000000000,
];

#[rustfmt::skip]
const WGK: [f64; 8] = [
    0.022935322010529224963732008058970, 0.063092092629978553290700663189204,
    0.104790010322250183839876322541518, 0.140653259715525918745189590510238,
    0.169004726639267902826583426598550, 0.190350578064785409913256402421014,
    0.204432940075298892414161999234649, 0.209482141084727828012999174891714,
];

/// Weights of the embedded 7-point Gauss rule at `XGK[1], XGK[3], XGK[5], XGK[7]`.
#[rustfmt::skip]
const WG: [f64; 4] = [
    0.129484966168869693270611432679082, 0.279705391489276667901467771423780,
    0.381830050505118944950369775488975, 0.417959183673469387755102040816327,
];

const GK_POINTS: usize = 15;

#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureResult {
    pub integral: Vec<f64>,
    pub error: Vec<f64>,
    pub evaluations: usize,
    /// False when the adaptive rule ran out of evaluations before meeting its tolerance.
    pub converged: bool,
}

/// Integrates `f` as described by `config`.
pub fn integrate<F, E>(f: F, config: &IntegrationConfig) -> Result<QuadratureResult, E>
where
    F: FnMut(f64) -> Result<Vec<f64>, E>,
{
    match config.strategy {
        IntegrationStrategy::Adaptive {
            omega_max,
            abs_tol,
            rel_tol,
            max_evals,
        } => adaptive(f, config.omega_min, omega_max, abs_tol, rel_tol, max_evals),
        IntegrationStrategy::TrapSimp { omega_max, intervals } => {
            trap_simp(f, config.omega_min, omega_max, intervals)
        }
    }
}

struct Segment {
    a: f64,
    b: f64,
    integral: Vec<f64>,
    error: Vec<f64>,
    worst: f64,
}

impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        self.worst.total_cmp(&other.worst) == Ordering::Equal
    }
}

impl Eq for Segment {}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        self.worst.total_cmp(&other.worst)
    }
}

fn accumulate(target: &mut Vec<f64>, values: &[f64], weight: f64) {
    if target.len() < values.len() {
        target.resize(values.len(), 0.0);
    }
    for (t, v) in target.iter_mut().zip(values) {
        *t += weight * v;
    }
}

fn gauss_kronrod<F, E>(f: &mut F, a: f64, b: f64) -> Result<Segment, E>
where
    F: FnMut(f64) -> Result<Vec<f64>, E>,
{
    let center = 0.5 * (a + b);
    let half = 0.5 * (b - a);
    let fc = f(center)?;
    let mut kronrod = Vec::new();
    let mut gauss = Vec::new();
    accumulate(&mut kronrod, &fc, WGK[7]);
    accumulate(&mut gauss, &fc, WG[3]);
    for j in 0..7 {
        let dx = half * XGK[j];
        let f1 = f(center - dx)?;
        let f2 = f(center + dx)?;
        accumulate(&mut kronrod, &f1, WGK[j]);
        accumulate(&mut kronrod, &f2, WGK[j]);
        if j % 2 == 1 {
            accumulate(&mut gauss, &f1, WG[j / 2]);
            accumulate(&mut gauss, &f2, WG[j / 2]);
        }
    }
    gauss.resize(kronrod.len(), 0.0);
    let error: Vec<f64> = kronrod
        .iter()
        .zip(&gauss)
        .map(|(k, g)| (k - g).abs() * half.abs())
        .collect();
    let integral: Vec<f64> = kronrod.iter().map(|k| k * half).collect();
    let worst = error.iter().copied().fold(0.0, f64::max);
    Ok(Segment {
        a,
        b,
        integral,
        error,
        worst,
    })
}

fn totals(heap: &BinaryHeap<Segment>) -> (Vec<f64>, Vec<f64>) {
    let mut integral = Vec::new();
    let mut error = Vec::new();
    for segment in heap.iter() {
        accumulate(&mut integral, &segment.integral, 1.0);
        accumulate(&mut error, &segment.error, 1.0);
    }
    (integral, error)
}

fn converged(integral: &[f64], error: &[f64], abs_tol: f64, rel_tol: f64) -> bool {
    integral
        .iter()
        .zip(error)
        .all(|(i, e)| *e <= abs_tol.max(rel_tol * i.abs()))
}

/// h-adaptive Gauss-Kronrod (7/15) quadrature of a vector-valued integrand.
///
/// With `omega_max` absent the half-line is mapped onto `[0, 1)` by
/// `omega = omega_min + x / (1 - x)`. The subinterval with the largest component error is
/// bisected until every component meets `err_i <= max(abs_tol, rel_tol |I_i|)` or the
/// evaluation budget is spent.
pub fn adaptive<F, E>(
    mut f: F,
    omega_min: f64,
    omega_max: Option<f64>,
    abs_tol: f64,
    rel_tol: f64,
    max_evals: usize,
) -> Result<QuadratureResult, E>
where
    F: FnMut(f64) -> Result<Vec<f64>, E>,
{
    let (a, b) = match omega_max {
        Some(omega_max) => (omega_min, omega_max),
        None => (0.0, 1.0),
    };
    let mut integrand = |x: f64| -> Result<Vec<f64>, E> {
        match omega_max {
            Some(_) => f(x),
            None => {
                let s = 1.0 - x;
                let mut values = f(omega_min + x / s)?;
                let jacobian = 1.0 / (s * s);
                values.iter_mut().for_each(|v| *v *= jacobian);
                Ok(values)
            }
        }
    };

    let mut heap = BinaryHeap::new();
    heap.push(gauss_kronrod(&mut integrand, a, b)?);
    let mut evaluations = GK_POINTS;

    loop {
        let (integral, error) = totals(&heap);
        if converged(&integral, &error, abs_tol, rel_tol) {
            debug!(evaluations, segments = heap.len(), "Adaptive quadrature converged");
            return Ok(QuadratureResult {
                integral,
                error,
                evaluations,
                converged: true,
            });
        }
        let exhausted = evaluations + 2 * GK_POINTS > max_evals;
        let worst = heap.pop();
        let splittable = worst.as_ref().is_some_and(|s| {
            let mid = 0.5 * (s.a + s.b);
            mid > s.a && mid < s.b
        });
        match worst {
            Some(segment) if !exhausted && splittable => {
                let mid = 0.5 * (segment.a + segment.b);
                heap.push(gauss_kronrod(&mut integrand, segment.a, mid)?);
                heap.push(gauss_kronrod(&mut integrand, mid, segment.b)?);
                evaluations += 2 * GK_POINTS;
            }
            other => {
                if let Some(segment) = other {
                    heap.push(segment);
                }
                let (integral, error) = totals(&heap);
                warn!(
                    evaluations,
                    max_evals,
                    "Adaptive quadrature stopped before reaching the requested tolerance"
                );
                return Ok(QuadratureResult {
                    integral,
                    error,
                    evaluations,
                    converged: false,
                });
            }
        }
    }
}

/// Composite Simpson rule over `intervals` equal subintervals, with the difference from the
/// trapezoid rule on the same points as the error estimate.
///
/// The integrand is never evaluated below `OMEGA_FLOOR`. When `omega_min` is below it, the
/// segment up to the floor is estimated as `f(OMEGA_FLOOR) * (OMEGA_FLOOR - omega_min)` with
/// zero error and the rule starts at the floor. A range lying entirely below the floor is
/// covered by that rectangle alone.
pub fn trap_simp<F, E>(mut f: F, omega_min: f64, omega_max: f64, intervals: usize) -> Result<QuadratureResult, E>
where
    F: FnMut(f64) -> Result<Vec<f64>, E>,
{
    let intervals = intervals.max(1);
    let mut integral = Vec::new();
    let mut error = Vec::new();
    let mut lower = omega_min;
    let mut f_left = if omega_min < OMEGA_FLOOR {
        let values = f(OMEGA_FLOOR)?;
        if omega_max <= OMEGA_FLOOR {
            accumulate(&mut integral, &values, omega_max - omega_min);
            return Ok(QuadratureResult {
                error: vec![0.0; integral.len()],
                integral,
                evaluations: 1,
                converged: true,
            });
        }
        accumulate(&mut integral, &values, OMEGA_FLOOR - omega_min);
        lower = OMEGA_FLOOR;
        values
    } else {
        f(omega_min)?
    };
    let mut evaluations = 1;
    error.resize(f_left.len(), 0.0);

    let delta = (omega_max - lower) / intervals as f64;
    for n in 0..intervals {
        let left = lower + n as f64 * delta;
        let f_mid = f(left + 0.5 * delta)?;
        let f_right = f(left + delta)?;
        evaluations += 2;
        let dim = f_left.len().max(f_mid.len()).max(f_right.len());
        integral.resize(integral.len().max(dim), 0.0);
        error.resize(error.len().max(dim), 0.0);
        let value = |v: &[f64], i: usize| v.get(i).copied().unwrap_or(0.0);
        for i in 0..dim {
            let (l, m, r) = (value(&f_left, i), value(&f_mid, i), value(&f_right, i));
            let simpson = (l + 4.0 * m + r) * delta / 6.0;
            let trapezoid = (l + 2.0 * m + r) * delta / 4.0;
            integral[i] += simpson;
            error[i] += (simpson - trapezoid).abs();
        }
        f_left = f_right;
    }
    Ok(QuadratureResult {
        integral,
        error,
        evaluations,
        converged: true,
    })
}
