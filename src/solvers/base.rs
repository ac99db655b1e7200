//! Base solver types: errors, Butcher tableaus and the single-step attempt

use nalgebra::DVector;
use thiserror::Error;

use crate::utils::constants::SOL_ERROR_FLOOR;

/// Solver-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("Timestep {dt} smaller than minimum {dt_min}")]
    TimestepTooSmall { dt: f64, dt_min: f64 },

    #[error("Attempt to step on a {0} integrator")]
    NotRunning(IntegratorStatus),

    #[error("State dimension changed from {expected} to {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

/// Lifecycle of an [`Integrator`](super::Integrator)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegratorStatus {
    Running,
    Finished,
    Failed,
}

impl std::fmt::Display for IntegratorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IntegratorStatus::Running => "running",
            IntegratorStatus::Finished => "finished",
            IntegratorStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Explicit Runge-Kutta method in Butcher form
///
/// Row `i` of `a` holds the coefficients that build the state for stage
/// `i + 1` from the slopes of stages `0..=i`. Methods with an embedded
/// error estimate carry the weights `e = b - b_hat`; an extra trailing
/// stage evaluated at `(t + h, y_new)` is allowed (FSAL), in which case
/// the matching entry of `b` is zero.
#[derive(Debug)]
pub struct Tableau {
    pub name: &'static str,
    pub c: &'static [f64],
    pub a: &'static [&'static [f64]],
    pub b: &'static [f64],
    pub e: Option<&'static [f64]>,
    /// Order of the propagating solution
    pub order: usize,
    /// Order of the embedded error estimate
    pub error_order: usize,
}

/// Outcome of a single attempted step
#[derive(Debug, Clone)]
pub struct Attempt {
    pub state: DVector<f64>,
    /// Scaled max-norm of the local error, `None` for fixed-step methods
    pub error_norm: Option<f64>,
}

impl Tableau {
    /// Number of slope evaluations per attempt
    pub fn stages(&self) -> usize {
        self.c.len()
    }

    /// Whether the method carries an embedded error estimate
    pub fn is_adaptive(&self) -> bool {
        self.e.is_some()
    }

    /// Attempt one step of size `h` from `(t, x)`
    ///
    /// A non-finite state or error estimate yields an infinite error norm so
    /// adaptive control rejects the step. Fails when a slope does not match
    /// the state dimension.
    pub fn attempt<F>(
        &self,
        f: &mut F,
        t: f64,
        x: &DVector<f64>,
        h: f64,
        tol: (f64, f64),
    ) -> Result<Attempt, SolverError>
    where
        F: FnMut(&DVector<f64>, f64) -> DVector<f64>,
    {
        let mut slopes: Vec<DVector<f64>> = Vec::with_capacity(self.stages());
        slopes.push(check_dimension(f(x, t), x.len())?);

        for (i, row) in self.a.iter().enumerate() {
            let mut slope_sum = DVector::zeros(x.len());
            for (j, &coef) in row.iter().enumerate() {
                if coef != 0.0 {
                    slope_sum += coef * &slopes[j];
                }
            }
            let stage_state = x + h * slope_sum;
            slopes.push(check_dimension(f(&stage_state, t + self.c[i + 1] * h), x.len())?);
        }

        let mut increment = DVector::zeros(x.len());
        for (k, &coef) in self.b.iter().enumerate() {
            if coef != 0.0 {
                increment += coef * &slopes[k];
            }
        }
        let state = x + h * increment;
        let finite = state.iter().all(|v| v.is_finite());

        let error_norm = self.e.map(|e| {
            if !finite {
                return f64::INFINITY;
            }
            let mut error_slope = DVector::zeros(x.len());
            for (k, &coef) in e.iter().enumerate() {
                if coef != 0.0 {
                    error_slope += coef * &slopes[k];
                }
            }
            let (tol_abs, tol_rel) = tol;
            let mut norm: f64 = 0.0;
            for i in 0..x.len() {
                let scale = tol_abs + tol_rel * x[i].abs().max(state[i].abs());
                let component = (h * error_slope[i]).abs() / scale;
                if !component.is_finite() {
                    return f64::INFINITY;
                }
                norm = norm.max(component);
            }
            norm.max(SOL_ERROR_FLOOR)
        });

        Ok(Attempt { state, error_norm })
    }
}

/// Reject a slope whose length differs from the state's
pub(crate) fn check_dimension(slope: DVector<f64>, expected: usize) -> Result<DVector<f64>, SolverError> {
    if slope.len() == expected {
        Ok(slope)
    } else {
        Err(SolverError::DimensionMismatch { expected, found: slope.len() })
    }
}
