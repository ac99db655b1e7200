//! Simulation constants and defaults

/// Default global step size (tick length)
pub const SIM_SAMPLE_TIME: f64 = 0.01;

/// Default simulation start time
pub const SIM_T_BEG: f64 = 0.0;

/// Default simulation end time
pub const SIM_T_END: f64 = 10.0;

/// Largest number of ticks in one run (tick indices stay exact as `f64`)
pub const SIM_MAX_STEPS: u64 = 1 << 53;

/// Sample time sentinel meaning "inherit the global step size"
pub const SAMPLE_TIME_INHERIT: f64 = -1.0;

/// Relative tolerance when checking that a sample time is a multiple of the step
pub const SAMPLE_TIME_TOLERANCE: f64 = 1e-9;

/// Minimum scale factor for timestep adjustment
pub const SOL_SCALE_MIN: f64 = 0.2;

/// Maximum scale factor for timestep adjustment
pub const SOL_SCALE_MAX: f64 = 10.0;

/// Safety factor for adaptive error control
pub const SOL_BETA: f64 = 0.9;

/// Default absolute tolerance for local truncation error
pub const SOL_TOLERANCE_LTE_ABS: f64 = 1e-6;

/// Default relative tolerance for local truncation error
pub const SOL_TOLERANCE_LTE_REL: f64 = 1e-3;

/// Lower bound for the scaled error norm
pub const SOL_ERROR_FLOOR: f64 = 1e-16;

/// Minimum number of rows reserved by the record store on first write, per tick row
pub const LOG_CHUNK_FACTOR: usize = 100;

/// Upper bound on the row-capacity estimate handed to the logger
pub const LOG_CHUNK_MAX: usize = 1 << 16;
