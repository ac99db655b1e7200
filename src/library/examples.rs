//! Small continuous models for demos and tests

use nalgebra::DVector;

use crate::block::{BlockError, ParameterSet};
use crate::blocks::{Continuous, ContinuousModel};

/// Second-order DC motor
///
/// # Dynamics
///
/// ```text
/// d(phi)/dt  = dphi
/// d(dphi)/dt = u - friction * dphi
/// y          = phi
/// ```
#[derive(Debug, Clone)]
pub struct Motor {
    pub friction: f64,
}

impl ContinuousModel for Motor {
    const TYPE_NAME: &'static str = "Motor";
    const PARAMETERS: &'static [&'static str] = &["friction"];
    const STATE_FIELDS: &'static [&'static str] = &["phi", "dphi"];
    type Input = f64;

    fn defaults() -> ParameterSet {
        ParameterSet::new().with("friction", 1.0)
    }

    fn from_parameters(params: &ParameterSet) -> Result<Self, BlockError> {
        Ok(Self { friction: params.number(Self::TYPE_NAME, "friction")? })
    }

    fn derivative(&self, _t: f64, x: &DVector<f64>, u: &f64) -> DVector<f64> {
        DVector::from_vec(vec![x[1], u - self.friction * x[1]])
    }

    fn output(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_vec(vec![x[0]])
    }
}

pub type MotorBlock = Continuous<Motor>;
