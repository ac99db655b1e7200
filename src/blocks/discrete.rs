//! Discrete-time blocks
//!
//! A [`Discrete`] block activates every `sample_time / step` ticks and holds
//! its output in between (zero-order hold). When it activates, the block's
//! [`Ordering`] decides whether the state transition runs before or after
//! the output is computed.

use std::any::Any;

use crate::block::{
    bind_parameters, dtype_of, parse_dtype, run_validation, Block, BlockCore, BlockError, ParamValue,
    ParameterSet, ParameterUpdate, ValidationHook, DTYPE, INITIAL_STATE,
};
use crate::record::Field;
use crate::settings::Settings;
use crate::simulation::Tick;
use crate::utils::constants::{SAMPLE_TIME_INHERIT, SAMPLE_TIME_TOLERANCE};

/// Name of the implicit sample-time parameter of every discrete block
pub const SAMPLE_TIME: &str = "sample_time";

/// Execution order of a discrete block on activation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ordering {
    /// No state transition, the output depends on the latched input only
    Static,
    /// Transition, then compute the output from the new state
    NormalOrder,
    /// Compute the output from the current state, then transition
    ReverseOrder,
}

/// Difference equations of a discrete block: `x' = f(x, u)`, `y = g(x, u)`
pub trait DiscreteModel: Sized + 'static {
    /// Block type name used in errors and the registry
    const TYPE_NAME: &'static str;

    /// Declared parameter names, not counting `sample_time`
    const PARAMETERS: &'static [&'static str];

    const ORDERING: Ordering;

    /// Default names of the logged output fields, overridable through `dtype`
    const OUTPUT_FIELDS: &'static [&'static str] = &[];

    type Input: 'static;
    type State: Clone + 'static;
    type Output: Clone + 'static;

    /// Default parameter values
    fn defaults() -> ParameterSet {
        ParameterSet::new()
    }

    /// Build the model from bound parameters
    fn from_parameters(params: &ParameterSet) -> Result<Self, BlockError>;

    /// Initial state, from the `x` parameter when one is supplied
    fn initial_state(&self, x: Option<&ParamValue>) -> Result<Self::State, BlockError>;

    /// State transition; unused by static blocks
    fn transition(&mut self, x: &Self::State, _u: &Self::Input) -> Self::State {
        x.clone()
    }

    /// Output function; `u` is `None` before the first activation
    fn output(&mut self, x: &Self::State, u: Option<&Self::Input>) -> Self::Output;

    /// Model-level validation, after the sample time has been resolved
    fn on_validate(&mut self, _settings: &Settings, _sample_time: f64) -> Result<(), BlockError> {
        Ok(())
    }
}

/// Discrete block with a sample time and zero-order-hold output
pub struct Discrete<M: DiscreteModel> {
    core: BlockCore,
    model: M,
    state: M::State,
    input: Option<M::Input>,
    output: M::Output,
    output_fields: Vec<Field>,
    sample_time: f64,
    step_ratio: Option<u64>, // ticks per activation, set by validation
    last_activation_step: u64,
    last_activation_time: Option<f64>,
}

impl<M: DiscreteModel> Discrete<M> {
    /// Construct from a parameter set
    ///
    /// `sample_time` defaults to -1, which inherits the simulation step.
    /// `dtype` defaults to one `<f8` field per name in `OUTPUT_FIELDS`.
    pub fn new(name: impl Into<String>, params: ParameterSet) -> Result<Self, BlockError> {
        let mut defaults = M::defaults();
        if !defaults.contains(SAMPLE_TIME) {
            defaults.insert(SAMPLE_TIME, SAMPLE_TIME_INHERIT);
        }
        if !defaults.contains(DTYPE) {
            defaults.insert(DTYPE, dtype_of(M::OUTPUT_FIELDS));
        }
        let required: Vec<&str> = M::PARAMETERS.iter().copied().chain([SAMPLE_TIME, DTYPE]).collect();
        let bound = bind_parameters(M::TYPE_NAME, &required, &defaults, &params)?;
        let sample_time = bound.number(M::TYPE_NAME, SAMPLE_TIME)?;
        let output_fields = parse_dtype(M::TYPE_NAME, bound.text(M::TYPE_NAME, DTYPE)?)?;

        let mut model = M::from_parameters(&bound)?;
        let state = model.initial_state(params.get(INITIAL_STATE))?;
        let output = model.output(&state, None);

        Ok(Self {
            core: BlockCore::new(name, M::TYPE_NAME, bound),
            model,
            state,
            input: None,
            output,
            output_fields,
            sample_time,
            step_ratio: None,
            last_activation_step: 0,
            last_activation_time: None,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn state(&self) -> &M::State {
        &self.state
    }

    /// Input latched at the last activation
    pub fn input(&self) -> Option<&M::Input> {
        self.input.as_ref()
    }

    /// Output held since the last activation
    pub fn output(&self) -> &M::Output {
        &self.output
    }

    /// Sample time; the inherited value is resolved by validation
    pub fn sample_time(&self) -> f64 {
        self.sample_time
    }

    /// Ticks between activations, `None` before validation
    pub fn step_ratio(&self) -> Option<u64> {
        self.step_ratio
    }

    /// Fields describing the output when it is logged
    pub fn output_fields(&self) -> Vec<Field> {
        self.output_fields.clone()
    }

    pub fn last_activation_time(&self) -> Option<f64> {
        self.last_activation_time
    }

    /// Feed input `u` at `tick` and return the held output
    ///
    /// The block activates when at least `step_ratio` ticks have passed since
    /// its last activation; otherwise `u` is dropped and the last output is
    /// returned unchanged.
    pub fn call(&mut self, tick: Tick, u: M::Input) -> Result<M::Output, BlockError> {
        let ratio = self.step_ratio.ok_or_else(|| BlockError::NotValidated {
            block: self.core.name().to_string(),
        })?;

        if tick.n.saturating_sub(self.last_activation_step) >= ratio {
            match M::ORDERING {
                Ordering::Static => {
                    self.output = self.model.output(&self.state, Some(&u));
                }
                Ordering::NormalOrder => {
                    self.state = self.model.transition(&self.state, &u);
                    self.output = self.model.output(&self.state, Some(&u));
                }
                Ordering::ReverseOrder => {
                    self.output = self.model.output(&self.state, Some(&u));
                    self.state = self.model.transition(&self.state, &u);
                }
            }
            self.input = Some(u);
            self.last_activation_step = tick.n;
            self.last_activation_time = Some(tick.t);
            log::trace!("'{}' activated at t={}", self.core.name(), tick.t);
        }

        Ok(self.output.clone())
    }

    fn validate_base(&mut self, settings: &Settings) -> Result<(), BlockError> {
        self.core.bind(settings);
        Ok(())
    }

    fn validate_sample_time(&mut self, settings: &Settings) -> Result<(), BlockError> {
        let step = settings.sample_time;
        let requested = self.core.parameters().number(M::TYPE_NAME, SAMPLE_TIME)?;
        let sample_time = if requested == SAMPLE_TIME_INHERIT { step } else { requested };

        let ratio = sample_time / step;
        let whole = ratio.round();
        if !(sample_time > 0.0) || whole < 1.0 || (ratio - whole).abs() > SAMPLE_TIME_TOLERANCE * whole {
            return Err(BlockError::SampleTimeMismatch {
                block: self.core.name().to_string(),
                sample_time: requested,
                step,
            });
        }

        // Activations fall on multiples of the ratio, counted from tick 0
        if self.step_ratio.is_none() {
            self.last_activation_step = 0;
        }
        self.sample_time = sample_time;
        self.step_ratio = Some(whole as u64);
        Ok(())
    }

    fn validate_model(&mut self, settings: &Settings) -> Result<(), BlockError> {
        self.model.on_validate(settings, self.sample_time)
    }

    /// Rebuild the model from the current parameters, re-validating a bound block
    fn apply_parameters(&mut self) -> Result<(), BlockError> {
        let sample_time = self.core.parameters().number(M::TYPE_NAME, SAMPLE_TIME)?;
        let output_fields = parse_dtype(M::TYPE_NAME, self.core.parameters().text(M::TYPE_NAME, DTYPE)?)?;
        let model = M::from_parameters(self.core.parameters())?;
        let old_model = std::mem::replace(&mut self.model, model);
        let old_sample_time = std::mem::replace(&mut self.sample_time, sample_time);
        let old_schedule = (self.step_ratio, self.last_activation_step);

        if let Some(settings) = self.core.settings().cloned() {
            if let Err(err) = self.validate(&settings) {
                self.model = old_model;
                self.sample_time = old_sample_time;
                (self.step_ratio, self.last_activation_step) = old_schedule;
                return Err(err);
            }
        }
        self.output_fields = output_fields;
        Ok(())
    }
}

impl<M: DiscreteModel> Block for Discrete<M> {
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
        let hooks: [ValidationHook<Self>; 3] =
            [Self::validate_base, Self::validate_sample_time, Self::validate_model];
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

#[cfg(test)]
mod tests {
    use super::*;

    struct Doubler;

    impl DiscreteModel for Doubler {
        const TYPE_NAME: &'static str = "Doubler";
        const PARAMETERS: &'static [&'static str] = &[];
        const ORDERING: Ordering = Ordering::Static;
        type Input = f64;
        type State = ();
        type Output = f64;

        fn from_parameters(_params: &ParameterSet) -> Result<Self, BlockError> {
            Ok(Doubler)
        }

        fn initial_state(&self, _x: Option<&ParamValue>) -> Result<(), BlockError> {
            Ok(())
        }

        fn output(&mut self, _x: &(), u: Option<&f64>) -> f64 {
            u.map_or(-1.0, |u| 2.0 * u)
        }
    }

    fn tick(settings: &Settings, n: u64) -> Tick {
        Tick { t: settings.time_at(n), n }
    }

    #[test]
    fn test_inherited_sample_time() {
        let settings = Settings::default();
        let mut block = Discrete::<Doubler>::new("d", ParameterSet::new()).unwrap();
        assert_eq!(block.sample_time(), -1.0);

        block.validate(&settings).unwrap();
        assert_eq!(block.sample_time(), 0.01);
        assert_eq!(block.step_ratio(), Some(1));
        assert_eq!(block.call(tick(&settings, 1), 3.0).unwrap(), 6.0);
    }

    #[test]
    fn test_sample_time_must_divide_step() {
        let settings = Settings::default();
        for sample_time in [0.025, 0.015, 0.005, 0.0] {
            let mut block =
                Discrete::<Doubler>::new("d", ParameterSet::new().with(SAMPLE_TIME, sample_time)).unwrap();
            let err = block.validate(&settings).unwrap_err();
            assert!(matches!(err, BlockError::SampleTimeMismatch { .. }), "{}", sample_time);
        }

        let mut block = Discrete::<Doubler>::new("d", ParameterSet::new().with(SAMPLE_TIME, 0.03)).unwrap();
        block.validate(&settings).unwrap();
        assert_eq!(block.step_ratio(), Some(3));
    }

    #[test]
    fn test_call_before_validation_fails() {
        let mut block = Discrete::<Doubler>::new("d", ParameterSet::new()).unwrap();
        assert!(matches!(
            block.call(Tick { t: 0.01, n: 1 }, 1.0),
            Err(BlockError::NotValidated { .. })
        ));
    }

    #[test]
    fn test_zero_order_hold() {
        let settings = Settings { t_end: 5.0, sample_time: 1.0, ..Settings::default() };
        let mut block = Discrete::<Doubler>::new("d", ParameterSet::new().with(SAMPLE_TIME, 2.0)).unwrap();
        block.validate(&settings).unwrap();

        let outputs: Vec<f64> = (1..=5)
            .map(|n| block.call(tick(&settings, n), n as f64).unwrap())
            .collect();
        assert_eq!(outputs, vec![-1.0, 4.0, 4.0, 8.0, 8.0]);
        assert_eq!(block.input(), Some(&4.0));
        assert_eq!(block.last_activation_time(), Some(4.0));
    }

    #[test]
    fn test_sample_time_change_revalidates() {
        let settings = Settings::default();
        let mut block = Discrete::<Doubler>::new("d", ParameterSet::new()).unwrap();
        block.validate(&settings).unwrap();

        let outcome = block.set_parameter(SAMPLE_TIME, 0.05.into()).unwrap();
        assert!(outcome.warning().is_some());
        assert_eq!(block.step_ratio(), Some(5));

        assert!(matches!(
            block.set_parameter(SAMPLE_TIME, 0.025.into()),
            Err(BlockError::SampleTimeMismatch { .. })
        ));
        assert_eq!(block.parameters().get(SAMPLE_TIME), Some(&ParamValue::Number(0.05)));
        assert_eq!(block.sample_time(), 0.05);
    }

    /// Rejects the sample time in the model hook, after the ratio is computed
    struct SlowOnly;

    impl DiscreteModel for SlowOnly {
        const TYPE_NAME: &'static str = "SlowOnly";
        const PARAMETERS: &'static [&'static str] = &[];
        const ORDERING: Ordering = Ordering::Static;
        type Input = f64;
        type State = ();
        type Output = f64;

        fn from_parameters(_params: &ParameterSet) -> Result<Self, BlockError> {
            Ok(SlowOnly)
        }

        fn initial_state(&self, _x: Option<&ParamValue>) -> Result<(), BlockError> {
            Ok(())
        }

        fn output(&mut self, _x: &(), u: Option<&f64>) -> f64 {
            u.copied().unwrap_or(0.0)
        }

        fn on_validate(&mut self, _settings: &Settings, sample_time: f64) -> Result<(), BlockError> {
            if sample_time < 0.2 {
                return Err(BlockError::InvalidParameter {
                    block_type: Self::TYPE_NAME.to_string(),
                    parameter: SAMPLE_TIME.to_string(),
                    expected: "at least 0.2",
                    found: sample_time.to_string(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn test_rejected_change_keeps_activation_schedule() {
        let settings = Settings::default();
        let mut block = Discrete::<SlowOnly>::new("slow", ParameterSet::new().with(SAMPLE_TIME, 0.5)).unwrap();
        block.validate(&settings).unwrap();
        assert_eq!(block.step_ratio(), Some(50));

        let err = block.set_parameter(SAMPLE_TIME, 0.1.into()).unwrap_err();
        assert!(matches!(err, BlockError::InvalidParameter { .. }));
        assert_eq!(block.sample_time(), 0.5);
        assert_eq!(block.step_ratio(), Some(50));

        // Still held until tick 50
        assert_eq!(block.call(tick(&settings, 10), 1.0).unwrap(), 0.0);
        assert_eq!(block.call(tick(&settings, 50), 2.0).unwrap(), 2.0);
    }

    #[test]
    fn test_output_fields_from_dtype() {
        let block = Discrete::<Doubler>::new("d", ParameterSet::new()).unwrap();
        assert!(block.output_fields().is_empty());

        let mut block = Discrete::<Doubler>::new("d", ParameterSet::new().with(DTYPE, "y2:<f8")).unwrap();
        assert_eq!(block.output_fields(), vec![Field::f64("y2")]);

        block.set_parameter(DTYPE, "doubled".into()).unwrap();
        assert_eq!(block.output_fields(), vec![Field::f64("doubled")]);
        assert!(block.set_parameter(DTYPE, "doubled:<x9".into()).is_err());
        assert_eq!(block.output_fields(), vec![Field::f64("doubled")]);
    }
}
