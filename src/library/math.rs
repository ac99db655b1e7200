//! Elementary discrete blocks

use crate::block::{BlockError, ParamValue, ParameterSet};
use crate::blocks::{Discrete, DiscreteModel, Ordering};

/// Static gain: `y = k * u`
#[derive(Debug, Clone)]
pub struct Gain {
    pub k: f64,
}

impl DiscreteModel for Gain {
    const TYPE_NAME: &'static str = "Gain";
    const PARAMETERS: &'static [&'static str] = &["k"];
    const ORDERING: Ordering = Ordering::Static;
    const OUTPUT_FIELDS: &'static [&'static str] = &["y"];
    type Input = f64;
    type State = ();
    type Output = f64;

    fn defaults() -> ParameterSet {
        ParameterSet::new().with("k", 1.0)
    }

    fn from_parameters(params: &ParameterSet) -> Result<Self, BlockError> {
        Ok(Self { k: params.number(Self::TYPE_NAME, "k")? })
    }

    fn initial_state(&self, _x: Option<&ParamValue>) -> Result<(), BlockError> {
        Ok(())
    }

    fn output(&mut self, _x: &(), u: Option<&f64>) -> f64 {
        u.map_or(0.0, |u| self.k * u)
    }
}

pub type GainBlock = Discrete<Gain>;

/// One-sample delay: `y(k) = x(k)`, `x(k+1) = u(k)`
#[derive(Debug, Clone)]
pub struct UnitDelay;

impl DiscreteModel for UnitDelay {
    const TYPE_NAME: &'static str = "UnitDelay";
    const PARAMETERS: &'static [&'static str] = &[];
    const ORDERING: Ordering = Ordering::ReverseOrder;
    const OUTPUT_FIELDS: &'static [&'static str] = &["y"];
    type Input = f64;
    type State = f64;
    type Output = f64;

    fn from_parameters(_params: &ParameterSet) -> Result<Self, BlockError> {
        Ok(UnitDelay)
    }

    fn initial_state(&self, x: Option<&ParamValue>) -> Result<f64, BlockError> {
        match x {
            None => Ok(0.0),
            Some(value) => value.as_f64().ok_or_else(|| BlockError::InvalidParameter {
                block_type: Self::TYPE_NAME.to_string(),
                parameter: "x".to_string(),
                expected: "a number",
                found: value.to_string(),
            }),
        }
    }

    fn transition(&mut self, _x: &f64, u: &f64) -> f64 {
        *u
    }

    fn output(&mut self, x: &f64, _u: Option<&f64>) -> f64 {
        *x
    }
}

pub type UnitDelayBlock = Discrete<UnitDelay>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use crate::settings::Settings;
    use crate::simulation::Tick;

    #[test]
    fn test_unit_delay_outputs_previous_input() {
        let settings = Settings::default();
        let mut delay = UnitDelayBlock::new("delay", ParameterSet::new().with("x", 5.0)).unwrap();
        delay.validate(&settings).unwrap();

        let outputs: Vec<f64> = (1..=3)
            .map(|n| delay.call(Tick { t: settings.time_at(n), n }, n as f64).unwrap())
            .collect();
        assert_eq!(outputs, vec![5.0, 1.0, 2.0]);
        assert_eq!(delay.state(), &3.0);
    }

    #[test]
    fn test_gain_before_first_input() {
        let gain = GainBlock::new("gain", ParameterSet::new().with("k", 3.0)).unwrap();
        assert_eq!(gain.output(), &0.0);
        assert!(UnitDelayBlock::new("delay", ParameterSet::new().with("x", "zero")).is_err());
    }
}
