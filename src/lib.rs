//! sigflow - Block-diagram time-domain simulation engine
//!
//! Models are assembled from continuous blocks (ODEs driven by an adaptive
//! Runge-Kutta integrator) and discrete blocks (difference equations with a
//! sample time). A [`Simulator`] advances global time in fixed steps, calls
//! the model's signal flow once per tick and merges the returned output
//! groups into one typed record table.
//!
//! # Example
//!
//! ```rust,ignore
//! use sigflow::prelude::*;
//!
//! struct Servo {
//!     motor: MotorBlock,
//!     gain: GainBlock,
//! }
//!
//! impl Model for Servo {
//!     fn blocks_mut(&mut self) -> Vec<&mut dyn Block> {
//!         vec![&mut self.motor, &mut self.gain]
//!     }
//!
//!     fn signal_flow(&mut self, tick: Tick) -> Result<Vec<OutputGroup>, Error> {
//!         let phi = self.motor.output()[0];
//!         let u = self.gain.call(tick, 1.0 - phi)?;
//!         let trajectory = self.motor.call(tick.t, u)?;
//!         Ok(vec![
//!             trajectory.time_group("t"),
//!             trajectory.state_group(self.motor.state_fields()),
//!             OutputGroup::single(self.gain.output_fields(), &[u]),
//!         ])
//!     }
//! }
//! ```

pub mod block;
pub mod blocks;
pub mod error;
pub mod library;
pub mod logger;
pub mod record;
pub mod registry;
pub mod settings;
pub mod simulation;
pub mod solvers;
pub mod utils;

pub use block::{Block, BlockError, ParamValue, ParameterSet, ParameterUpdate};
pub use blocks::{Continuous, ContinuousModel, Discrete, DiscreteModel, Ordering, Trajectory};
pub use error::Error;
pub use logger::{Logger, OutputGroup};
pub use record::{Field, FieldType, RecordTable, Schema};
pub use registry::{BlockDefinition, BlockSet, Diagram, Registry};
pub use settings::{Settings, SettingsOverrides, SolverKind};
pub use simulation::{Failure, Model, Simulator, Status, Tick};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::block::{Block, BlockError, ParamValue, ParameterSet};
    pub use crate::blocks::*;
    pub use crate::error::Error;
    pub use crate::library::*;
    pub use crate::logger::OutputGroup;
    pub use crate::record::{Field, FieldType, RecordTable};
    pub use crate::registry::{BlockDefinition, BlockSet, Diagram, Registry};
    pub use crate::settings::{Settings, SettingsOverrides, SolverKind};
    pub use crate::simulation::{Model, Simulator, Status, Tick};
}
