//! Continuous-time blocks
//!
//! A [`Continuous`] block wraps an ODE model and an [`Integrator`]. Each call
//! sets the block's input and advances the integrator substep by substep
//! until its time reaches the tick boundary. The substeps are returned as a
//! [`Trajectory`] so the full intra-tick resolution can be logged.

use std::any::Any;

use nalgebra::DVector;

use crate::block::{
    bind_parameters, dtype_of, parse_dtype, run_validation, Block, BlockCore, BlockError, ParamValue,
    ParameterSet, ParameterUpdate, ValidationHook, DTYPE, INITIAL_STATE,
};
use crate::logger::OutputGroup;
use crate::record::Field;
use crate::settings::Settings;
use crate::solvers::{Integrator, SolverError};

/// Dynamics of a continuous block: `dx/dt = f(t, x, u)`, `y = g(x)`
pub trait ContinuousModel: Sized + 'static {
    /// Block type name used in errors and the registry
    const TYPE_NAME: &'static str;

    /// Declared parameter names
    const PARAMETERS: &'static [&'static str];

    /// Default names of the state components, in state order; `dtype` may rename them
    const STATE_FIELDS: &'static [&'static str];

    type Input: 'static;

    /// Default parameter values
    fn defaults() -> ParameterSet {
        ParameterSet::new()
    }

    /// State used when no `x` parameter is supplied
    fn initial_state() -> DVector<f64> {
        DVector::zeros(Self::STATE_FIELDS.len())
    }

    /// Build the model from bound parameters
    fn from_parameters(params: &ParameterSet) -> Result<Self, BlockError>;

    /// State derivative
    fn derivative(&self, t: f64, x: &DVector<f64>, u: &Self::Input) -> DVector<f64>;

    /// Output function
    fn output(&self, x: &DVector<f64>) -> DVector<f64> {
        x.clone()
    }

    /// Model-level validation against the run settings
    fn on_validate(&mut self, _settings: &Settings) -> Result<(), BlockError> {
        Ok(())
    }
}

/// Substeps taken by one continuous call, sorted by time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    times: Vec<f64>,
    states: Vec<DVector<f64>>,
}

impl Trajectory {
    pub fn push(&mut self, t: f64, x: DVector<f64>) {
        self.times.push(t);
        self.states.push(x);
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn states(&self) -> &[DVector<f64>] {
        &self.states
    }

    /// Time and state of the final substep
    pub fn last(&self) -> Option<(f64, &DVector<f64>)> {
        self.times.last().copied().zip(self.states.last())
    }

    /// Substep times as an output group
    pub fn time_group(&self, name: &str) -> OutputGroup {
        OutputGroup::column(name, &self.times)
    }

    /// Substep states as an output group
    pub fn state_group(&self, fields: Vec<Field>) -> OutputGroup {
        OutputGroup::states(fields, &self.states)
    }
}

/// Continuous block driven by an adaptive integrator
pub struct Continuous<M: ContinuousModel> {
    core: BlockCore,
    model: M,
    state: DVector<f64>,
    state_fields: Vec<Field>,
    input: Option<M::Input>,
    integrator: Option<Integrator>, // created on first call
}

impl<M: ContinuousModel> Continuous<M> {
    /// Construct from a parameter set
    ///
    /// The initial state is the `x` parameter when supplied, the model's
    /// default otherwise.
    pub fn new(name: impl Into<String>, params: ParameterSet) -> Result<Self, BlockError> {
        let mut defaults = M::defaults();
        if !defaults.contains(DTYPE) {
            defaults.insert(DTYPE, dtype_of(M::STATE_FIELDS));
        }
        let required: Vec<&str> = M::PARAMETERS.iter().copied().chain([DTYPE]).collect();
        let bound = bind_parameters(M::TYPE_NAME, &required, &defaults, &params)?;
        let model = M::from_parameters(&bound)?;

        let state = match params.get(INITIAL_STATE) {
            Some(value) => DVector::from_vec(params.vector(M::TYPE_NAME, INITIAL_STATE).map_err(|_| {
                BlockError::InvalidParameter {
                    block_type: M::TYPE_NAME.to_string(),
                    parameter: INITIAL_STATE.to_string(),
                    expected: "a state vector",
                    found: value.to_string(),
                }
            })?),
            None => M::initial_state(),
        };
        if state.len() != M::STATE_FIELDS.len() {
            return Err(BlockError::InvalidParameter {
                block_type: M::TYPE_NAME.to_string(),
                parameter: INITIAL_STATE.to_string(),
                expected: "one value per state field",
                found: format!("{} values", state.len()),
            });
        }
        let state_fields = Self::fields_for(&bound, state.len())?;

        Ok(Self {
            core: BlockCore::new(name, M::TYPE_NAME, bound),
            model,
            state,
            state_fields,
            input: None,
            integrator: None,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Current state
    pub fn state(&self) -> &DVector<f64> {
        &self.state
    }

    /// Latest input, `None` until the first call
    pub fn input(&self) -> Option<&M::Input> {
        self.input.as_ref()
    }

    /// Output of the current state, recomputed on every read
    pub fn output(&self) -> DVector<f64> {
        self.model.output(&self.state)
    }

    /// Integrator time, `None` before the first call
    pub fn t(&self) -> Option<f64> {
        self.integrator.as_ref().map(|i| i.t())
    }

    pub fn integrator(&self) -> Option<&Integrator> {
        self.integrator.as_ref()
    }

    /// Fields describing the state when it is logged
    pub fn state_fields(&self) -> Vec<Field> {
        self.state_fields.clone()
    }

    /// Parse `dtype`, which must cover exactly `width` state values
    fn fields_for(params: &ParameterSet, width: usize) -> Result<Vec<Field>, BlockError> {
        let text = params.text(M::TYPE_NAME, DTYPE)?;
        let fields = parse_dtype(M::TYPE_NAME, text)?;
        if fields.iter().map(Field::width).sum::<usize>() != width {
            return Err(BlockError::InvalidParameter {
                block_type: M::TYPE_NAME.to_string(),
                parameter: DTYPE.to_string(),
                expected: "one field per state component",
                found: text.to_string(),
            });
        }
        Ok(fields)
    }

    /// Advance to the tick boundary `t` with input `u`
    ///
    /// Returns every accepted substep. On return the block time is at or past
    /// `t`, unless the integrator failed: the failure is logged as a warning,
    /// the integrator is put back into a running state, and the substeps
    /// taken so far are returned.
    pub fn call(&mut self, t: f64, u: M::Input) -> Result<Trajectory, BlockError> {
        let settings = self.core.settings().ok_or_else(|| BlockError::NotValidated {
            block: self.core.name().to_string(),
        })?;

        let state = &self.state;
        let integrator = self.integrator.get_or_insert_with(|| {
            let t_bound = settings.time_at(settings.total_steps()).max(settings.t_end);
            Integrator::new(settings.solver.tableau(), settings.t_beg, state.clone(), t_bound)
                .with_tolerances(settings.atol, settings.rtol)
                .with_first_step(settings.first_step)
        });

        let model = &self.model;
        let input = &*self.input.insert(u);
        let mut trajectory = Trajectory::default();

        while integrator.t() < t {
            integrator.limit_to(t);
            match integrator.step(|x, s| model.derivative(s, x, input)) {
                Ok(()) => trajectory.push(integrator.t(), integrator.y().clone()),
                Err(source @ SolverError::DimensionMismatch { .. }) => {
                    return Err(BlockError::Solver { block: self.core.name().to_string(), source });
                }
                Err(err) => {
                    log::warn!(
                        "Solver failed in '{}', t={}, max_step={}: {}",
                        self.core.name(),
                        integrator.t(),
                        integrator.max_step(),
                        err
                    );
                    integrator.recover();
                    break;
                }
            }
        }

        self.state = integrator.y().clone();
        Ok(trajectory)
    }

    fn validate_base(&mut self, settings: &Settings) -> Result<(), BlockError> {
        self.core.bind(settings);
        Ok(())
    }

    fn validate_model(&mut self, settings: &Settings) -> Result<(), BlockError> {
        self.model.on_validate(settings)
    }

    /// Rebuild the model from the current parameters, re-validating a bound block
    fn apply_parameters(&mut self) -> Result<(), BlockError> {
        let state_fields = Self::fields_for(self.core.parameters(), self.state.len())?;
        let model = M::from_parameters(self.core.parameters())?;
        let old_model = std::mem::replace(&mut self.model, model);

        if let Some(settings) = self.core.settings().cloned() {
            if let Err(err) = self.validate(&settings) {
                self.model = old_model;
                return Err(err);
            }
        }
        self.state_fields = state_fields;
        Ok(())
    }
}

impl<M: ContinuousModel> Block for Continuous<M> {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn block_type(&self) -> &'static str {
        M::TYPE_NAME
    }

    fn parameters(&self) -> &ParameterSet {
        self.core.parameters()
    }

    fn is_protected(&self) -> bool {
        self.core.is_protected()
    }

    fn validate(&mut self, settings: &Settings) -> Result<(), BlockError> {
        let hooks: [ValidationHook<Self>; 2] = [Self::validate_base, Self::validate_model];
        run_validation(self, settings, &hooks)
    }

    fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<ParameterUpdate, BlockError> {
        let previous = self.core.replace(name, value)?;
        match self.apply_parameters() {
            Ok(()) => Ok(self.core.update_outcome(name)),
            Err(err) => {
                self.core.replace(name, previous)?;
                Err(err)
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
