//! Block library
//!
//! Blocks are registered under dotted paths such as `"examples.Motor"`;
//! see [`register`].

pub mod controllers;
pub mod examples;
pub mod math;
#[cfg(feature = "rand-support")]
pub mod noise;
pub mod planners;

pub use controllers::{PIrD, PIrDBlock};
pub use examples::{Motor, MotorBlock};
pub use math::{Gain, GainBlock, UnitDelay, UnitDelayBlock};
#[cfg(feature = "rand-support")]
pub use noise::{WhiteNoise, WhiteNoiseBlock};
pub use planners::{Constant, ConstantBlock};

use crate::registry::Registry;

/// Add every library block to `registry`
pub fn register(registry: &mut Registry) {
    registry
        .register_continuous::<Motor>("examples.Motor")
        .register_discrete::<Constant>("planners.Constant")
        .register_discrete::<PIrD>("controllers.PIrD")
        .register_discrete::<Gain>("math.Gain")
        .register_discrete::<UnitDelay>("math.UnitDelay");

    #[cfg(feature = "rand-support")]
    registry.register_discrete::<WhiteNoise>("noise.WhiteNoise");
}
