//! Noise sources for stochastic simulations
//!
//! This module requires the `rand-support` feature.

use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Normal;

use crate::block::{BlockError, ParamValue, ParameterSet};
use crate::blocks::{Discrete, DiscreteModel, Ordering};

/// Gaussian white noise, sampled once per activation
///
/// A negative `seed` draws the generator seed from the OS.
#[derive(Debug, Clone)]
pub struct WhiteNoise {
    std_dev: f64,
    rng: StdRng,
    distribution: Normal<f64>,
}

impl WhiteNoise {
    pub fn std_dev(&self) -> f64 {
        self.std_dev
    }
}

impl DiscreteModel for WhiteNoise {
    const TYPE_NAME: &'static str = "WhiteNoise";
    const PARAMETERS: &'static [&'static str] = &["std_dev", "seed"];
    const ORDERING: Ordering = Ordering::Static;
    const OUTPUT_FIELDS: &'static [&'static str] = &["noise"];
    type Input = ();
    type State = ();
    type Output = f64;

    fn defaults() -> ParameterSet {
        ParameterSet::new().with("std_dev", 1.0).with("seed", -1i64)
    }

    fn from_parameters(params: &ParameterSet) -> Result<Self, BlockError> {
        let std_dev = params.number(Self::TYPE_NAME, "std_dev")?;
        let distribution = Normal::new(0.0, std_dev).map_err(|_| BlockError::InvalidParameter {
            block_type: Self::TYPE_NAME.to_string(),
            parameter: "std_dev".to_string(),
            expected: "a non-negative standard deviation",
            found: std_dev.to_string(),
        })?;

        let seed = params.number(Self::TYPE_NAME, "seed")?;
        let rng = if seed < 0.0 { StdRng::from_entropy() } else { StdRng::seed_from_u64(seed as u64) };

        Ok(Self { std_dev, rng, distribution })
    }

    fn initial_state(&self, _x: Option<&ParamValue>) -> Result<(), BlockError> {
        Ok(())
    }

    fn output(&mut self, _x: &(), _u: Option<&()>) -> f64 {
        self.distribution.sample(&mut self.rng)
    }
}

pub type WhiteNoiseBlock = Discrete<WhiteNoise>;
