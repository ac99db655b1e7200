//! Simulation settings types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::solvers::{Tableau, RK4, RKBS32, RKDP54};
use crate::utils::constants::{
    SIM_MAX_STEPS, SIM_SAMPLE_TIME, SIM_T_BEG, SIM_T_END, SOL_TOLERANCE_LTE_ABS, SOL_TOLERANCE_LTE_REL,
};

/// Available ODE solvers for continuous blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SolverKind {
    /// Dormand-Prince 5(4), adaptive
    #[default]
    #[serde(rename = "RK45")]
    Rk45,
    /// Bogacki-Shampine 3(2), adaptive
    #[serde(rename = "RK23")]
    Rk23,
    /// Classical RK4, fixed step
    #[serde(rename = "RK4")]
    Rk4,
}

impl SolverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolverKind::Rk45 => "RK45",
            SolverKind::Rk23 => "RK23",
            SolverKind::Rk4 => "RK4",
        }
    }

    /// Butcher tableau implementing this solver
    pub fn tableau(&self) -> &'static Tableau {
        match self {
            SolverKind::Rk45 => &RKDP54,
            SolverKind::Rk23 => &RKBS32,
            SolverKind::Rk4 => &RK4,
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SolverKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RK45" => Ok(SolverKind::Rk45),
            "RK23" => Ok(SolverKind::Rk23),
            "RK4" => Ok(SolverKind::Rk4),
            other => Err(Error::Config(format!("unknown solver '{}'", other))),
        }
    }
}

/// Global simulation settings
///
/// Immutable once handed to a simulator. The resolved settings of a run are
/// the model-declared values where present, these library defaults otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// ODE solver used by continuous blocks
    pub solver: SolverKind,

    /// Simulation start time
    pub t_beg: f64,

    /// Simulation end time
    pub t_end: f64,

    /// Global step size (tick length)
    pub sample_time: f64,

    /// Relative tolerance for adaptive solvers
    pub rtol: f64,

    /// Absolute tolerance for adaptive solvers
    pub atol: f64,

    /// First integrator substep; fixed substep for RK4. `None` picks it automatically
    pub first_step: Option<f64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            solver: SolverKind::Rk45,
            t_beg: SIM_T_BEG,
            t_end: SIM_T_END,
            sample_time: SIM_SAMPLE_TIME,
            rtol: SOL_TOLERANCE_LTE_REL,
            atol: SOL_TOLERANCE_LTE_ABS,
            first_step: None,
        }
    }
}

impl Settings {
    /// Parse settings from JSON; missing keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid settings: {}", e)))
    }

    /// Apply model-declared values on top of these settings
    pub fn resolve(&self, overrides: &SettingsOverrides) -> Settings {
        Settings {
            solver: overrides.solver.unwrap_or(self.solver),
            t_beg: overrides.t_beg.unwrap_or(self.t_beg),
            t_end: overrides.t_end.unwrap_or(self.t_end),
            sample_time: overrides.sample_time.unwrap_or(self.sample_time),
            rtol: self.rtol,
            atol: self.atol,
            first_step: self.first_step,
        }
    }

    /// Number of ticks from `t_beg` to `t_end`
    pub fn total_steps(&self) -> u64 {
        ((self.t_end - self.t_beg) / self.sample_time).round().max(0.0) as u64
    }

    /// Time of tick `n`
    pub fn time_at(&self, n: u64) -> f64 {
        self.t_beg + n as f64 * self.sample_time
    }

    /// Reject settings that cannot drive a run
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.sample_time > 0.0) || !self.sample_time.is_finite() {
            return Err(Error::Config(format!(
                "sample time must be positive, got {}",
                self.sample_time
            )));
        }
        if !self.t_beg.is_finite() || !self.t_end.is_finite() {
            return Err(Error::Config(format!(
                "time bounds must be finite, got [{}, {}]",
                self.t_beg, self.t_end
            )));
        }
        if !(self.t_end > self.t_beg) {
            return Err(Error::Config(format!(
                "end time {} must be greater than start time {}",
                self.t_end, self.t_beg
            )));
        }
        if (self.t_end - self.t_beg) / self.sample_time > SIM_MAX_STEPS as f64 {
            return Err(Error::Config(format!(
                "too many simulation steps in [{}, {}] with step {} (at most {})",
                self.t_beg, self.t_end, self.sample_time, SIM_MAX_STEPS
            )));
        }
        if self.total_steps() == 0 {
            return Err(Error::Config(format!(
                "no simulation steps in [{}, {}] with step {}",
                self.t_beg, self.t_end, self.sample_time
            )));
        }
        if !(self.rtol > 0.0) || !(self.atol > 0.0) {
            return Err(Error::Config(format!(
                "tolerances must be positive, got rtol={} atol={}",
                self.rtol, self.atol
            )));
        }
        if let Some(h) = self.first_step {
            if !(h > 0.0) {
                return Err(Error::Config(format!("first step must be positive, got {}", h)));
            }
        }
        Ok(())
    }
}

/// Settings a model declares for itself; unset fields fall back to the defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsOverrides {
    pub solver: Option<SolverKind>,
    pub t_beg: Option<f64>,
    pub t_end: Option<f64>,
    pub sample_time: Option<f64>,
}

impl SettingsOverrides {
    pub fn solver(mut self, solver: SolverKind) -> Self {
        self.solver = Some(solver);
        self
    }

    pub fn t_beg(mut self, t_beg: f64) -> Self {
        self.t_beg = Some(t_beg);
        self
    }

    pub fn t_end(mut self, t_end: f64) -> Self {
        self.t_end = Some(t_end);
        self
    }

    pub fn sample_time(mut self, sample_time: f64) -> Self {
        self.sample_time = Some(sample_time);
        self
    }
}
