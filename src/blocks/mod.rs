//! Block variants: continuous (ODE) and discrete (difference equation)

mod continuous;
mod discrete;

pub use continuous::{Continuous, ContinuousModel, Trajectory};
pub use discrete::{Discrete, DiscreteModel, Ordering, SAMPLE_TIME};
