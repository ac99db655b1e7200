//! Step-wise ODE integrator driven by continuous blocks
//!
//! The integrator owns its time, state and step size. Callers advance it one
//! accepted substep at a time and bound how far a single substep may reach,
//! either with a relative `max_step` or with an absolute boundary that the
//! substep lands on exactly.

use nalgebra::DVector;

use super::base::check_dimension;
use super::{IntegratorStatus, SolverError, Tableau};
use crate::utils::constants::{
    SOL_BETA, SOL_SCALE_MAX, SOL_SCALE_MIN, SOL_TOLERANCE_LTE_ABS, SOL_TOLERANCE_LTE_REL,
};

/// Adaptive (or fixed-step) explicit Runge-Kutta integrator
#[derive(Debug, Clone)]
pub struct Integrator {
    method: &'static Tableau,
    t: f64,
    y: DVector<f64>,
    t_bound: f64,
    h_abs: Option<f64>,
    max_step: f64,
    boundary: Option<f64>,
    tol_abs: f64,
    tol_rel: f64,
    status: IntegratorStatus,
    accepted: usize,
    rejected: usize,
}

impl Integrator {
    /// Create an integrator for `t` in `[t0, t_bound]` starting at `y0`
    pub fn new(method: &'static Tableau, t0: f64, y0: DVector<f64>, t_bound: f64) -> Self {
        Self {
            method,
            t: t0,
            y: y0,
            t_bound,
            h_abs: None,
            max_step: f64::INFINITY,
            boundary: None,
            tol_abs: SOL_TOLERANCE_LTE_ABS,
            tol_rel: SOL_TOLERANCE_LTE_REL,
            status: if t0 < t_bound {
                IntegratorStatus::Running
            } else {
                IntegratorStatus::Finished
            },
            accepted: 0,
            rejected: 0,
        }
    }

    /// Set absolute and relative error tolerances
    pub fn with_tolerances(mut self, tol_abs: f64, tol_rel: f64) -> Self {
        self.tol_abs = tol_abs;
        self.tol_rel = tol_rel;
        self
    }

    /// Set the first substep size (and the fixed substep for non-adaptive methods)
    pub fn with_first_step(mut self, h: Option<f64>) -> Self {
        self.h_abs = h.filter(|h| *h > 0.0);
        self
    }

    pub fn t(&self) -> f64 {
        self.t
    }

    pub fn y(&self) -> &DVector<f64> {
        &self.y
    }

    pub fn t_bound(&self) -> f64 {
        self.t_bound
    }

    pub fn status(&self) -> IntegratorStatus {
        self.status
    }

    pub fn method(&self) -> &'static Tableau {
        self.method
    }

    pub fn max_step(&self) -> f64 {
        self.max_step
    }

    /// Number of accepted and rejected substeps so far
    pub fn counts(&self) -> (usize, usize) {
        (self.accepted, self.rejected)
    }

    /// Limit the size of subsequent substeps, dropping any absolute boundary
    pub fn set_max_step(&mut self, max_step: f64) {
        self.max_step = max_step;
        self.boundary = None;
    }

    /// Limit the next substeps to end no later than `boundary`
    ///
    /// Sets `max_step` to the time remaining until `boundary`; a substep
    /// limited by it lands on `boundary` exactly.
    pub fn limit_to(&mut self, boundary: f64) {
        self.max_step = boundary - self.t;
        self.boundary = Some(boundary);
    }

    /// Put a failed integrator back into the running state
    pub fn recover(&mut self) {
        if self.status == IntegratorStatus::Failed {
            self.status = IntegratorStatus::Running;
        }
    }

    /// Take one accepted substep
    ///
    /// Rejected attempts shrink the step and retry. Fails, leaving the
    /// integrator in the `Failed` status, when the step size underflows.
    pub fn step<F>(&mut self, mut f: F) -> Result<(), SolverError>
    where
        F: FnMut(&DVector<f64>, f64) -> DVector<f64>,
    {
        if self.status != IntegratorStatus::Running {
            return Err(SolverError::NotRunning(self.status));
        }

        let horizon = match self.boundary {
            Some(b) if b < self.t_bound => b,
            _ => self.t_bound,
        };
        let max_step = self.max_step.min(horizon - self.t);
        let min_step = 10.0 * (f64::EPSILON * self.t.abs()).max(f64::MIN_POSITIVE);

        let mut h_abs = match self.h_abs {
            Some(h) => h,
            None if self.method.is_adaptive() => self.initial_step(&mut f, max_step)?,
            None => max_step,
        };

        loop {
            let h = h_abs.min(max_step);
            if !(h >= min_step) {
                self.status = IntegratorStatus::Failed;
                return Err(SolverError::TimestepTooSmall { dt: h, dt_min: min_step });
            }

            // Snap to the horizon rather than leave a sliver below the minimum step
            let limited = horizon - (self.t + h) < min_step;
            let t_new = if limited { horizon } else { self.t + h };
            let h = t_new - self.t;

            let attempt = self
                .method
                .attempt(&mut f, self.t, &self.y, h, (self.tol_abs, self.tol_rel))?;
            let finite = attempt.state.iter().all(|v| v.is_finite());

            match attempt.error_norm {
                None if finite => {
                    self.accept(t_new, attempt.state);
                    if self.h_abs.is_none() && !limited {
                        self.h_abs = Some(h);
                    }
                    return Ok(());
                }
                Some(error_norm) if error_norm <= 1.0 => {
                    let factor = (SOL_BETA * self.scale(error_norm)).min(SOL_SCALE_MAX);
                    // Keep the larger free-running step when the boundary cut this one short
                    let next = h * factor;
                    self.h_abs = Some(if limited { h_abs.max(next) } else { next });
                    self.accept(t_new, attempt.state);
                    return Ok(());
                }
                error_norm => {
                    self.rejected += 1;
                    let error_norm = error_norm.unwrap_or(f64::INFINITY);
                    h_abs = h * (SOL_BETA * self.scale(error_norm)).max(SOL_SCALE_MIN);
                }
            }
        }
    }

    fn scale(&self, error_norm: f64) -> f64 {
        error_norm.powf(-1.0 / (self.method.error_order as f64 + 1.0))
    }

    fn accept(&mut self, t_new: f64, y_new: DVector<f64>) {
        self.t = t_new;
        self.y = y_new;
        self.accepted += 1;
        if self.t >= self.t_bound {
            self.status = IntegratorStatus::Finished;
        }
    }

    /// Empirical first step from the local derivative scale
    fn initial_step<F>(&mut self, f: &mut F, max_step: f64) -> Result<f64, SolverError>
    where
        F: FnMut(&DVector<f64>, f64) -> DVector<f64>,
    {
        let scale = self.y.map(|x| self.tol_abs + self.tol_rel * x.abs());
        let f0 = check_dimension(f(&self.y, self.t), self.y.len())?;
        let d0 = self.y.component_div(&scale).amax();
        let d1 = f0.component_div(&scale).amax();

        let h0 = if d0 < 1e-5 || d1 < 1e-5 { 1e-6 } else { 0.01 * d0 / d1 };
        let h0 = h0.min(max_step);

        let y1 = &self.y + h0 * &f0;
        let f1 = check_dimension(f(&y1, self.t + h0), self.y.len())?;
        let d2 = (f1 - f0).component_div(&scale).amax() / h0;

        let order = self.method.error_order as f64 + 1.0;
        let h1 = if d1 <= 1e-15 && d2 <= 1e-15 {
            (h0 * 1e-3).max(1e-6)
        } else {
            (0.01 / d1.max(d2)).powf(1.0 / order)
        };

        // Non-finite slopes give no scale; start small and let rejection shrink further
        let h = (100.0 * h0).min(h1);
        Ok(if h.is_finite() && h > 0.0 { h } else { max_step.min(1e-6) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solvers::{RK4, RKBS32, RKDP54};
    use approx::assert_relative_eq;

    fn decay(x: &DVector<f64>, _t: f64) -> DVector<f64> {
        -x
    }

    #[test]
    fn test_integrator_reaches_boundary_exactly() {
        let mut integrator = Integrator::new(&RKDP54, 0.0, DVector::from_vec(vec![1.0]), 10.0);

        let mut boundary = 0.0;
        for n in 1..=10 {
            boundary = n as f64 * 0.1;
            while integrator.t() < boundary {
                integrator.limit_to(boundary);
                integrator.step(decay).unwrap();
            }
            assert!(integrator.t() >= boundary);
        }

        assert_eq!(integrator.t(), boundary);
        assert_relative_eq!(integrator.y()[0], (-1.0f64).exp(), epsilon = 1e-5);
    }

    #[test]
    fn test_integrator_takes_substeps_on_fast_dynamics() {
        let mut integrator = Integrator::new(&RKBS32, 0.0, DVector::from_vec(vec![1.0, 0.0]), 10.0)
            .with_tolerances(1e-8, 1e-6);
        let oscillator = |x: &DVector<f64>, _t: f64| DVector::from_vec(vec![x[1], -400.0 * x[0]]);

        let mut substeps = 0;
        while integrator.t() < 1.0 {
            integrator.limit_to(1.0);
            integrator.step(oscillator).unwrap();
            substeps += 1;
        }

        assert!(substeps > 1);
        assert_eq!(integrator.t(), 1.0);
    }

    #[test]
    fn test_fixed_step_uses_first_step() {
        let mut integrator = Integrator::new(&RK4, 0.0, DVector::from_vec(vec![1.0]), 1.0)
            .with_first_step(Some(0.25));

        let mut times = Vec::new();
        while integrator.t() < 1.0 {
            integrator.limit_to(1.0);
            integrator.step(decay).unwrap();
            times.push(integrator.t());
        }

        assert_eq!(times, vec![0.25, 0.5, 0.75, 1.0]);
        assert_eq!(integrator.status(), IntegratorStatus::Finished);
    }

    #[test]
    fn test_step_underflow_fails_and_recovers() {
        let mut integrator = Integrator::new(&RKDP54, 1.0, DVector::from_vec(vec![1.0]), 10.0);
        integrator.set_max_step(1e-300);

        let err = integrator.step(decay).unwrap_err();
        assert!(matches!(err, SolverError::TimestepTooSmall { .. }));
        assert_eq!(integrator.status(), IntegratorStatus::Failed);

        // A failed integrator refuses to step until recovered
        assert!(matches!(integrator.step(decay), Err(SolverError::NotRunning(_))));

        integrator.recover();
        integrator.limit_to(1.5);
        integrator.step(decay).unwrap();
        assert!(integrator.t() > 1.0);
    }

    #[test]
    fn test_non_finite_dynamics_fail_before_the_window() {
        let mut integrator = Integrator::new(&RKDP54, 0.0, DVector::from_vec(vec![1.0]), 1.0);
        let poisoned = |x: &DVector<f64>, t: f64| {
            if t > 0.25 {
                DVector::from_element(1, f64::NAN)
            } else {
                -x
            }
        };

        let err = loop {
            integrator.limit_to(0.5);
            if let Err(err) = integrator.step(poisoned) {
                break err;
            }
        };

        assert!(matches!(err, SolverError::TimestepTooSmall { .. }));
        assert_eq!(integrator.status(), IntegratorStatus::Failed);
        assert!(integrator.t() <= 0.25);
        assert!(integrator.y()[0].is_finite());
    }

    #[test]
    fn test_wrong_derivative_length_is_reported() {
        for method in [&RK4, &RKDP54] {
            let mut integrator = Integrator::new(method, 0.0, DVector::from_vec(vec![1.0, 0.0]), 1.0)
                .with_first_step(Some(0.1));
            let err = integrator.step(|_x, _t| DVector::from_element(3, 0.0)).unwrap_err();
            assert_eq!(err, SolverError::DimensionMismatch { expected: 2, found: 3 }, "{}", method.name);
        }

        // Also caught while estimating the first adaptive step
        let mut integrator = Integrator::new(&RKBS32, 0.0, DVector::from_vec(vec![1.0, 0.0]), 1.0);
        let err = integrator.step(|_x, _t| DVector::from_element(1, 0.0)).unwrap_err();
        assert_eq!(err, SolverError::DimensionMismatch { expected: 2, found: 1 });
    }

    #[test]
    fn test_finished_integrator_rejects_steps() {
        let mut integrator = Integrator::new(&RK4, 0.0, DVector::from_vec(vec![1.0]), 0.5);
        while integrator.status() == IntegratorStatus::Running {
            integrator.step(decay).unwrap();
        }

        assert_eq!(integrator.t(), 0.5);
        assert!(matches!(
            integrator.step(decay),
            Err(SolverError::NotRunning(IntegratorStatus::Finished))
        ));
    }
}
