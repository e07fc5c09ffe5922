//! Matrix-free Newton-Krylov solver
//!
//! Solves `F(x) = 0` for a residual that is only available as a function.
//! Each Newton iteration solves `J d = -F(x)` with restarted GMRES, where the
//! Jacobian-vector product is approximated by a forward difference:
//!
//! ```text
//! J v ≈ (F(x + ε v) - F(x)) / ε,    ε = sqrt(machine ε) (1 + ‖x‖) / ‖v‖
//! ```
//!
//! The Newton update is damped by a backtracking line search on `‖F‖₂`.
//! Convergence is declared when `max |F_i|` falls below the tolerance.
//!
//! # Example
//!
//! ```rust
//! use nalgebra::DVector;
//! use spectral_pf::solver::newton_krylov::{solve, NewtonKrylovSettings};
//!
//! // x² = 2 component-wise
//! let residual = |x: &DVector<f64>| Ok(x.map(|v| v * v - 2.0));
//! let outcome = solve(&NewtonKrylovSettings::default(), residual, DVector::from_element(3, 1.0)).unwrap();
//!
//! assert!(outcome.converged);
//! assert!((outcome.x[0] - 2.0_f64.sqrt()).abs() < 1e-8);
//! ```

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Sufficient-decrease constant of the line search
const ARMIJO: f64 = 1e-4;

// =================================================================================================
// Settings
// =================================================================================================

/// Tuning parameters of the Newton-Krylov iteration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonKrylovSettings {
    /// Convergence threshold on `max |F_i|`
    pub tolerance: f64,
    /// Newton iterations before giving up
    pub max_iterations: usize,
    /// Krylov subspace size per GMRES cycle
    pub krylov_dimension: usize,
    /// Relative residual reduction requested from GMRES
    pub krylov_tolerance: f64,
    /// GMRES restarts per Newton iteration
    pub max_restarts: usize,
    /// Step halvings tried by the line search
    pub max_backtracks: usize,
}

impl Default for NewtonKrylovSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 50,
            krylov_dimension: 30,
            krylov_tolerance: 1e-6,
            max_restarts: 10,
            max_backtracks: 8,
        }
    }
}

impl NewtonKrylovSettings {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err("Newton tolerance must be positive".to_string());
        }
        if self.max_iterations == 0 {
            return Err("Newton maximum iterations must be positive".to_string());
        }
        if self.krylov_dimension == 0 {
            return Err("Krylov dimension must be positive".to_string());
        }
        if !(self.krylov_tolerance > 0.0 && self.krylov_tolerance < 1.0) {
            return Err("Krylov tolerance must lie in (0, 1)".to_string());
        }
        Ok(())
    }
}

/// Result of a Newton-Krylov solve
#[derive(Debug, Clone, PartialEq)]
pub struct NewtonKrylovOutcome {
    /// Last iterate
    pub x: DVector<f64>,
    /// True if `residual_norm < tolerance`
    pub converged: bool,
    /// Newton iterations performed
    pub iterations: usize,
    /// `max |F_i|` at `x`
    pub residual_norm: f64,
}

// =================================================================================================
// Newton Iteration
// =================================================================================================

/// Solve `residual(x) = 0` starting from `x0`
///
/// Failing to converge is not an error: the outcome reports it and the
/// caller decides. Errors come from invalid settings or from the residual
/// itself.
pub fn solve<F>(
    settings: &NewtonKrylovSettings,
    mut residual: F,
    x0: DVector<f64>,
) -> Result<NewtonKrylovOutcome, String>
where
    F: FnMut(&DVector<f64>) -> Result<DVector<f64>, String>,
{
    settings.validate()?;

    let mut x = x0;
    let mut f = residual(&x)?;
    let mut norm = max_norm(&f);
    let mut iterations = 0;

    while iterations < settings.max_iterations && !(norm < settings.tolerance) {
        iterations += 1;

        let rhs = -&f;
        let direction = gmres(
            |v: &DVector<f64>| jacobian_vector(&mut residual, &x, &f, v),
            &rhs,
            settings,
        )?;

        // Backtracking line search
        let f_norm = f.norm();
        let mut step = 1.0;
        let mut accepted = None;
        for _ in 0..=settings.max_backtracks {
            let trial = &x + &direction * step;
            let f_trial = residual(&trial)?;
            let trial_norm = f_trial.norm();
            if trial_norm.is_finite() && trial_norm <= (1.0 - ARMIJO * step) * f_norm {
                accepted = Some((trial, f_trial));
                break;
            }
            step *= 0.5;
        }

        match accepted {
            Some((trial, f_trial)) => {
                x = trial;
                f = f_trial;
                norm = max_norm(&f);
            }
            None => {
                log::debug!(
                    "Newton-Krylov line search stalled at iteration {} (residual {:.3e})",
                    iterations,
                    norm
                );
                break;
            }
        }
    }

    Ok(NewtonKrylovOutcome {
        x,
        converged: norm < settings.tolerance,
        iterations,
        residual_norm: norm,
    })
}

fn max_norm(v: &DVector<f64>) -> f64 {
    v.iter().fold(0.0_f64, |acc, x| if x.is_nan() { f64::NAN } else { acc.max(x.abs()) })
}

/// Forward-difference approximation of `J(x) v`
fn jacobian_vector<F>(
    residual: &mut F,
    x: &DVector<f64>,
    fx: &DVector<f64>,
    v: &DVector<f64>,
) -> Result<DVector<f64>, String>
where
    F: FnMut(&DVector<f64>) -> Result<DVector<f64>, String>,
{
    let v_norm = v.norm();
    if v_norm == 0.0 {
        return Ok(DVector::zeros(v.len()));
    }
    let eps = f64::EPSILON.sqrt() * (1.0 + x.norm()) / v_norm;
    let shifted = residual(&(x + v * eps))?;
    Ok((shifted - fx) / eps)
}

// =================================================================================================
// GMRES
// =================================================================================================

/// Restarted GMRES for `A x = b` with `A` given as a product
///
/// Arnoldi with modified Gram-Schmidt, Givens rotations on the Hessenberg
/// matrix. Starts from `x = 0` and stops when the residual estimate drops
/// below `krylov_tolerance * ‖b‖`.
pub fn gmres<A>(mut apply: A, b: &DVector<f64>, settings: &NewtonKrylovSettings) -> Result<DVector<f64>, String>
where
    A: FnMut(&DVector<f64>) -> Result<DVector<f64>, String>,
{
    let n = b.len();
    let mut x = DVector::zeros(n);
    let b_norm = b.norm();
    if n == 0 || b_norm == 0.0 {
        return Ok(x);
    }

    let m = settings.krylov_dimension.min(n);
    let target = settings.krylov_tolerance * b_norm;
    let mut first_cycle = true;

    for _ in 0..=settings.max_restarts {
        let r = if first_cycle { b.clone() } else { b - apply(&x)? };
        first_cycle = false;

        let beta = r.norm();
        if beta <= target {
            break;
        }

        let mut basis: Vec<DVector<f64>> = Vec::with_capacity(m + 1);
        basis.push(r / beta);
        let mut h = DMatrix::<f64>::zeros(m + 1, m);
        let mut cs = vec![0.0; m];
        let mut sn = vec![0.0; m];
        let mut g = DVector::<f64>::zeros(m + 1);
        g[0] = beta;

        let mut used = 0;
        for k in 0..m {
            let mut w = apply(&basis[k])?;
            for (j, v) in basis.iter().enumerate() {
                let coefficient = w.dot(v);
                h[(j, k)] = coefficient;
                w.axpy(-coefficient, v, 1.0);
            }
            let w_norm = w.norm();
            h[(k + 1, k)] = w_norm;

            for j in 0..k {
                let upper = cs[j] * h[(j, k)] + sn[j] * h[(j + 1, k)];
                h[(j + 1, k)] = -sn[j] * h[(j, k)] + cs[j] * h[(j + 1, k)];
                h[(j, k)] = upper;
            }

            let (c, s) = givens(h[(k, k)], h[(k + 1, k)]);
            cs[k] = c;
            sn[k] = s;
            h[(k, k)] = c * h[(k, k)] + s * h[(k + 1, k)];
            h[(k + 1, k)] = 0.0;
            g[k + 1] = -s * g[k];
            g[k] *= c;
            used = k + 1;

            let breakdown = w_norm <= f64::EPSILON * beta;
            if g[k + 1].abs() <= target || breakdown {
                break;
            }
            basis.push(w / w_norm);
        }

        // Back substitution on the triangular part
        let mut y = vec![0.0; used];
        for i in (0..used).rev() {
            let mut sum = g[i];
            for j in (i + 1)..used {
                sum -= h[(i, j)] * y[j];
            }
            y[i] = if h[(i, i)] != 0.0 { sum / h[(i, i)] } else { 0.0 };
        }
        for (j, coefficient) in y.iter().enumerate() {
            x.axpy(*coefficient, &basis[j], 1.0);
        }

        if g[used].abs() <= target {
            break;
        }
    }

    Ok(x)
}

fn givens(a: f64, b: f64) -> (f64, f64) {
    if b == 0.0 {
        (1.0, 0.0)
    } else {
        let r = a.hypot(b);
        (a / r, b / r)
    }
}

// =================================================================================================
// Tests
// =================================================================================================
