//! Discrete controllers

use crate::block::{BlockError, ParamValue, ParameterSet};
use crate::blocks::{Discrete, DiscreteModel, Ordering};
use crate::settings::Settings;

/// PI controller with a filtered derivative, Tustin discretisation
///
/// # Control Law
///
/// ```text
/// u(k) = Kp * e(k) + yi(k) + yd(k)
/// yi(k) = yi(k-1) + Ki * Ts / 2 * (e(k) + e(k-1))
/// yd(k) = -(2a - Ts) / (2a + Ts) * yd(k-1) + 2 Kd / (2a + Ts) * (e(k) - e(k-1))
/// ```
///
/// The state is `[yi, yd, e(k-1)]`.
#[derive(Debug, Clone)]
pub struct PIrD {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub alpha: f64,
    coefficients: (f64, f64, f64), // integral, derivative pole, derivative gain
}

impl PIrD {
    fn coefficients(&self, sample_time: f64) -> (f64, f64, f64) {
        (
            0.5 * self.ki * sample_time,
            (2.0 * self.alpha - sample_time) / (2.0 * self.alpha + sample_time),
            2.0 * self.kd / (2.0 * self.alpha + sample_time),
        )
    }
}

impl DiscreteModel for PIrD {
    const TYPE_NAME: &'static str = "PIrD";
    const PARAMETERS: &'static [&'static str] = &["Kp", "Ki", "Kd", "alpha"];
    const ORDERING: Ordering = Ordering::NormalOrder;
    const OUTPUT_FIELDS: &'static [&'static str] = &["u"];
    type Input = f64;
    type State = [f64; 3];
    type Output = f64;

    fn defaults() -> ParameterSet {
        ParameterSet::new().with("alpha", 0.1)
    }

    fn from_parameters(params: &ParameterSet) -> Result<Self, BlockError> {
        Ok(Self {
            kp: params.number(Self::TYPE_NAME, "Kp")?,
            ki: params.number(Self::TYPE_NAME, "Ki")?,
            kd: params.number(Self::TYPE_NAME, "Kd")?,
            alpha: params.number(Self::TYPE_NAME, "alpha")?,
            coefficients: (0.0, 0.0, 0.0),
        })
    }

    fn initial_state(&self, _x: Option<&ParamValue>) -> Result<[f64; 3], BlockError> {
        Ok([0.0; 3])
    }

    fn transition(&mut self, x: &[f64; 3], e: &f64) -> [f64; 3] {
        let (ci, d1, d2) = self.coefficients;
        [x[0] + ci * (e + x[2]), -d1 * x[1] + d2 * (e - x[2]), *e]
    }

    fn output(&mut self, x: &[f64; 3], e: Option<&f64>) -> f64 {
        self.kp * e.copied().unwrap_or(0.0) + x[0] + x[1]
    }

    fn on_validate(&mut self, _settings: &Settings, sample_time: f64) -> Result<(), BlockError> {
        if !(2.0 * self.alpha + sample_time > 0.0) {
            return Err(BlockError::InvalidParameter {
                block_type: Self::TYPE_NAME.to_string(),
                parameter: "alpha".to_string(),
                expected: "a non-negative filter constant",
                found: self.alpha.to_string(),
            });
        }
        self.coefficients = self.coefficients(sample_time);
        Ok(())
    }
}

pub type PIrDBlock = Discrete<PIrD>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use crate::simulation::Tick;
    use approx::assert_relative_eq;

    fn controller(params: ParameterSet) -> PIrDBlock {
        let mut block = PIrDBlock::new("controller", params).unwrap();
        block.validate(&Settings { sample_time: 0.5, ..Settings::default() }).unwrap();
        block
    }

    #[test]
    fn test_missing_gain() {
        let err = PIrDBlock::new("controller", ParameterSet::new().with("Kp", 1.0).with("Ki", 0.0)).err().unwrap();
        assert_eq!(err.to_string(), "PIrD() required parameter missing: 'Kd'");
    }

    #[test]
    fn test_proportional_only() {
        let mut block = controller(ParameterSet::new().with("Kp", 2.0).with("Ki", 0.0).with("Kd", 0.0));
        assert_eq!(block.output(), &0.0);
        assert_eq!(block.call(Tick { t: 0.5, n: 1 }, 1.5).unwrap(), 3.0);
    }

    #[test]
    fn test_integral_uses_resolved_sample_time() {
        let mut block = controller(ParameterSet::new().with("Kp", 0.0).with("Ki", 1.0).with("Kd", 0.0));

        // Trapezoidal integration of a unit error: 0.25, then 0.25 + 0.5
        assert_relative_eq!(block.call(Tick { t: 0.5, n: 1 }, 1.0).unwrap(), 0.25);
        assert_relative_eq!(block.call(Tick { t: 1.0, n: 2 }, 1.0).unwrap(), 0.75);
        assert_eq!(block.state()[2], 1.0);
    }
}
