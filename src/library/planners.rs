//! Reference generators

use crate::block::{BlockError, ParamValue, ParameterSet};
use crate::blocks::{Discrete, DiscreteModel, Ordering};

/// Constant setpoint
#[derive(Debug, Clone)]
pub struct Constant {
    pub setpoint: f64,
}

impl DiscreteModel for Constant {
    const TYPE_NAME: &'static str = "Constant";
    const PARAMETERS: &'static [&'static str] = &["setpoint"];
    const ORDERING: Ordering = Ordering::Static;
    const OUTPUT_FIELDS: &'static [&'static str] = &["r"];
    type Input = ();
    type State = ();
    type Output = f64;

    fn from_parameters(params: &ParameterSet) -> Result<Self, BlockError> {
        Ok(Self { setpoint: params.number(Self::TYPE_NAME, "setpoint")? })
    }

    fn initial_state(&self, _x: Option<&ParamValue>) -> Result<(), BlockError> {
        Ok(())
    }

    fn output(&mut self, _x: &(), _u: Option<&()>) -> f64 {
        self.setpoint
    }
}

pub type ConstantBlock = Discrete<Constant>;
