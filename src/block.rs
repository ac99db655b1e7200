//! Block base contract
//!
//! Every block is built from a [`ParameterSet`]: each parameter its type
//! declares is taken from the supplied set, else from the type's defaults,
//! else construction fails. Validation runs once before the first tick and
//! binds the block to the run's settings; from then on the block is
//! protected and parameter changes are applied with a warning.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::Field;
use crate::settings::Settings;
use crate::solvers::SolverError;

/// Reserved parameter name carrying a block's initial state
pub const INITIAL_STATE: &str = "x";

/// Reserved parameter naming the fields a block logs, as `name:code` entries
pub const DTYPE: &str = "dtype";

/// Block construction, configuration and execution errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlockError {
    #[error("{block_type}() required parameter missing: '{parameter}'")]
    MissingParameter { block_type: String, parameter: String },

    #[error("{block_type}() has no parameter '{parameter}'")]
    UnknownParameter { block_type: String, parameter: String },

    #[error("{block_type}() parameter '{parameter}' expects {expected}, got {found}")]
    InvalidParameter {
        block_type: String,
        parameter: String,
        expected: &'static str,
        found: String,
    },

    #[error(
        "incorrect sample time {sample_time} in block '{block}': \
         the sample time must be a multiple of the simulation step {step}"
    )]
    SampleTimeMismatch { block: String, sample_time: f64, step: f64 },

    #[error("block '{block}' has not been validated")]
    NotValidated { block: String },

    #[error("unknown block type '{0}'")]
    UnknownBlockType(String),

    #[error("no block named '{0}'")]
    UnknownBlock(String),

    #[error("block name '{0}' is used more than once")]
    DuplicateBlock(String),

    #[error("block '{0}' is not of the requested type")]
    TypeMismatch(String),

    #[error("block '{block}': {source}")]
    Solver { block: String, source: SolverError },
}

/// Value of a single block parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Integer(i64),
    Number(f64),
    Boolean(bool),
    Text(String),
    Vector(Vec<f64>),
}

impl ParamValue {
    fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Number(_) => "number",
            ParamValue::Integer(_) => "integer",
            ParamValue::Boolean(_) => "boolean",
            ParamValue::Text(_) => "text",
            ParamValue::Vector(_) => "vector",
        }
    }

    /// Numeric value; integers widen to `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            ParamValue::Number(v) => Some(v),
            ParamValue::Integer(v) => Some(v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            ParamValue::Integer(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            ParamValue::Boolean(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Vector value; a number is a vector of length one
    pub fn as_vector(&self) -> Option<Vec<f64>> {
        match self {
            ParamValue::Vector(v) => Some(v.clone()),
            ParamValue::Number(v) => Some(vec![*v]),
            ParamValue::Integer(v) => Some(vec![*v as f64]),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(v) => write!(f, "{}", v),
            ParamValue::Integer(v) => write!(f, "{}", v),
            ParamValue::Boolean(v) => write!(f, "{}", v),
            ParamValue::Text(v) => write!(f, "'{}'", v),
            ParamValue::Vector(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Number(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Integer(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Boolean(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

impl From<Vec<f64>> for ParamValue {
    fn from(v: Vec<f64>) -> Self {
        ParamValue::Vector(v)
    }
}

impl From<DVector<f64>> for ParamValue {
    fn from(v: DVector<f64>) -> Self {
        ParamValue::Vector(v.as_slice().to_vec())
    }
}

/// Named parameter values of one block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    values: BTreeMap<String, ParamValue>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Option<ParamValue> {
        self.values.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ParamValue> {
        self.values.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Typed read of a numeric parameter
    pub fn number(&self, block_type: &str, name: &str) -> Result<f64, BlockError> {
        let value = self.require(block_type, name)?;
        value
            .as_f64()
            .ok_or_else(|| invalid(block_type, name, "a number", value))
    }

    /// Typed read of a vector parameter
    pub fn vector(&self, block_type: &str, name: &str) -> Result<Vec<f64>, BlockError> {
        let value = self.require(block_type, name)?;
        value
            .as_vector()
            .ok_or_else(|| invalid(block_type, name, "a vector", value))
    }

    /// Typed read of a boolean parameter
    pub fn boolean(&self, block_type: &str, name: &str) -> Result<bool, BlockError> {
        let value = self.require(block_type, name)?;
        value
            .as_bool()
            .ok_or_else(|| invalid(block_type, name, "a boolean", value))
    }

    /// Typed read of a text parameter
    pub fn text(&self, block_type: &str, name: &str) -> Result<&str, BlockError> {
        let value = self.require(block_type, name)?;
        value
            .as_str()
            .ok_or_else(|| invalid(block_type, name, "text", value))
    }

    fn require(&self, block_type: &str, name: &str) -> Result<&ParamValue, BlockError> {
        self.get(name).ok_or_else(|| BlockError::MissingParameter {
            block_type: block_type.to_string(),
            parameter: name.to_string(),
        })
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = ParameterSet::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

fn invalid(block_type: &str, name: &str, expected: &'static str, found: &ParamValue) -> BlockError {
    BlockError::InvalidParameter {
        block_type: block_type.to_string(),
        parameter: name.to_string(),
        expected,
        found: found.type_name().to_string(),
    }
}

/// Parse a `dtype` parameter such as `"xr:<f8, zr:<f8"`
///
/// Entries without a code are `<f8`. An empty text declares no fields.
pub fn parse_dtype(block_type: &str, text: &str) -> Result<Vec<Field>, BlockError> {
    text.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, code) = entry.split_once(':').unwrap_or((entry, "<f8"));
            Field::parse(name.trim(), code.trim())
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| BlockError::InvalidParameter {
            block_type: block_type.to_string(),
            parameter: DTYPE.to_string(),
            expected: "comma-separated 'name:code' fields",
            found: text.to_string(),
        })
}

/// Default `dtype` text: one `<f8` field per name
pub fn dtype_of(names: &[&str]) -> String {
    names.iter().map(|name| format!("{}:<f8", name)).collect::<Vec<_>>().join(", ")
}

/// Bind a block type's declared parameters
///
/// Each name in `required` is taken from `supplied`, else from `defaults`,
/// else binding fails naming the block type and the parameter. Supplied
/// names the type does not declare are ignored.
pub fn bind_parameters(
    block_type: &str,
    required: &[&str],
    defaults: &ParameterSet,
    supplied: &ParameterSet,
) -> Result<ParameterSet, BlockError> {
    let mut bound = ParameterSet::new();
    for &name in required {
        let value = supplied
            .get(name)
            .or_else(|| defaults.get(name))
            .ok_or_else(|| BlockError::MissingParameter {
                block_type: block_type.to_string(),
                parameter: name.to_string(),
            })?;
        bound.insert(name, value.clone());
    }
    for (name, _) in supplied.iter() {
        if name != INITIAL_STATE && !required.contains(&name) {
            log::debug!("{}() ignores undeclared parameter '{}'", block_type, name);
        }
    }
    Ok(bound)
}

/// Outcome of a parameter change
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterUpdate {
    /// Applied before the block was validated
    Applied,
    /// Applied while the block is protected by an active run
    AppliedDuringRun { warning: String },
}

impl ParameterUpdate {
    pub fn warning(&self) -> Option<&str> {
        match self {
            ParameterUpdate::Applied => None,
            ParameterUpdate::AppliedDuringRun { warning } => Some(warning),
        }
    }
}

/// State shared by every block variant: identity, parameters and the run binding
#[derive(Debug, Clone)]
pub struct BlockCore {
    name: String,
    block_type: &'static str,
    parameters: ParameterSet,
    bound: Option<Settings>,
}

impl BlockCore {
    pub fn new(name: impl Into<String>, block_type: &'static str, parameters: ParameterSet) -> Self {
        Self { name: name.into(), block_type, parameters, bound: None }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn block_type(&self) -> &'static str {
        self.block_type
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    /// Settings of the run this block was validated for
    pub fn settings(&self) -> Option<&Settings> {
        self.bound.as_ref()
    }

    pub fn is_protected(&self) -> bool {
        self.bound.is_some()
    }

    /// Bind to a run; a later call rebinds
    pub fn bind(&mut self, settings: &Settings) {
        self.bound = Some(settings.clone());
    }

    /// Replace a declared parameter, returning the previous value
    pub fn replace(&mut self, name: &str, value: ParamValue) -> Result<ParamValue, BlockError> {
        match self.parameters.values.get_mut(name) {
            Some(slot) => Ok(std::mem::replace(slot, value)),
            None => Err(BlockError::UnknownParameter {
                block_type: self.block_type.to_string(),
                parameter: name.to_string(),
            }),
        }
    }

    /// Warning issued for a change to a protected block
    pub fn update_outcome(&self, parameter: &str) -> ParameterUpdate {
        if self.is_protected() {
            let warning = format!("Parameter '{}.{}' changed during active session.", self.name, parameter);
            log::warn!("{}", warning);
            ParameterUpdate::AppliedDuringRun { warning }
        } else {
            ParameterUpdate::Applied
        }
    }
}

/// Validation step contributed by one level of a block's specialization
pub type ValidationHook<B> = fn(&mut B, &Settings) -> Result<(), BlockError>;

/// Run validation hooks in their declared order, stopping at the first failure
pub fn run_validation<B>(block: &mut B, settings: &Settings, hooks: &[ValidationHook<B>]) -> Result<(), BlockError> {
    hooks.iter().try_for_each(|hook| hook(block, settings))
}

/// Type-erased block as seen by the simulator and the registry
pub trait Block: Any {
    /// Instance name within the model
    fn name(&self) -> &str;

    /// Name of the block type
    fn block_type(&self) -> &'static str;

    /// Bound parameter values
    fn parameters(&self) -> &ParameterSet;

    /// Whether the block has been validated for a run
    fn is_protected(&self) -> bool;

    /// Run the block's validation chain and bind it to `settings`
    fn validate(&mut self, settings: &Settings) -> Result<(), BlockError>;

    /// Change a parameter
    ///
    /// Before validation the change is simply applied. On a protected block
    /// it is applied, reported as a warning and the block re-validated; a
    /// value the block cannot accept is rolled back and returned as an error.
    fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<ParameterUpdate, BlockError>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn Block {
    pub fn downcast_ref<T: Block>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Block>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}
