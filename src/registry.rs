//! Block registry and block-diagram models
//!
//! The [`Registry`] maps dotted library paths to block factories. A
//! [`Diagram`] is a [`Model`] assembled from [`BlockDefinition`]s through a
//! registry, with the signal flow supplied as a closure over its
//! [`BlockSet`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::block::{Block, BlockError, ParameterSet};
use crate::blocks::{Continuous, ContinuousModel, Discrete, DiscreteModel};
use crate::error::Error;
use crate::logger::OutputGroup;
use crate::settings::SettingsOverrides;
use crate::simulation::{Model, Tick};

/// Builds a named block from its parameters
pub type BlockFactory = fn(&str, ParameterSet) -> Result<Box<dyn Block>, BlockError>;

fn build_continuous<M: ContinuousModel>(name: &str, params: ParameterSet) -> Result<Box<dyn Block>, BlockError> {
    Ok(Box::new(Continuous::<M>::new(name, params)?))
}

fn build_discrete<M: DiscreteModel>(name: &str, params: ParameterSet) -> Result<Box<dyn Block>, BlockError> {
    Ok(Box::new(Discrete::<M>::new(name, params)?))
}

/// Dotted-path lookup of block factories
#[derive(Clone, Default)]
pub struct Registry {
    factories: BTreeMap<String, BlockFactory>,
}

impl Registry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in block library
    pub fn with_library() -> Self {
        let mut registry = Self::new();
        crate::library::register(&mut registry);
        registry
    }

    /// Register `factory` under `path`, replacing any previous entry
    pub fn register(&mut self, path: impl Into<String>, factory: BlockFactory) -> &mut Self {
        let path = path.into();
        if self.factories.insert(path.clone(), factory).is_some() {
            log::debug!("block type '{}' re-registered", path);
        }
        self
    }

    pub fn register_continuous<M: ContinuousModel>(&mut self, path: impl Into<String>) -> &mut Self {
        self.register(path, build_continuous::<M>)
    }

    pub fn register_discrete<M: DiscreteModel>(&mut self, path: impl Into<String>) -> &mut Self {
        self.register(path, build_discrete::<M>)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.factories.contains_key(path)
    }

    /// Registered paths, sorted
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(|k| k.as_str())
    }

    /// Build a block of the type registered under `path`
    pub fn create(&self, path: &str, name: &str, params: ParameterSet) -> Result<Box<dyn Block>, BlockError> {
        let factory = self
            .factories
            .get(path)
            .ok_or_else(|| BlockError::UnknownBlockType(path.to_string()))?;
        factory(name, params)
    }

    /// Build the block a definition describes
    pub fn build(&self, definition: &BlockDefinition) -> Result<Box<dyn Block>, BlockError> {
        self.create(&definition.library, &definition.name, definition.parameters.clone())
    }
}

/// Declarative description of one block instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDefinition {
    pub name: String,
    /// Dotted registry path of the block type
    pub library: String,
    #[serde(default)]
    pub parameters: ParameterSet,
}

impl BlockDefinition {
    pub fn new(name: impl Into<String>, library: impl Into<String>) -> Self {
        Self { name: name.into(), library: library.into(), parameters: ParameterSet::new() }
    }

    pub fn with_parameters(mut self, parameters: ParameterSet) -> Self {
        self.parameters = parameters;
        self
    }

    /// Parse a JSON array of definitions
    pub fn list_from_json(json: &str) -> Result<Vec<Self>, Error> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid block definitions: {}", e)))
    }
}

/// Named blocks in declaration order
#[derive(Default)]
pub struct BlockSet {
    blocks: Vec<Box<dyn Block>>,
}

impl BlockSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block; names must be unique
    pub fn push(&mut self, block: Box<dyn Block>) -> Result<(), BlockError> {
        if self.position(block.name()).is_some() {
            return Err(BlockError::DuplicateBlock(block.name().to_string()));
        }
        self.blocks.push(block);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().map(|b| b.name())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Block> {
        self.position(name).map(|i| self.blocks[i].as_ref())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut dyn Block> {
        let index = self.position(name)?;
        Some(self.blocks[index].as_mut())
    }

    /// Borrow a block as its concrete type
    pub fn typed<T: Block>(&self, name: &str) -> Result<&T, BlockError> {
        self.get(name)
            .ok_or_else(|| BlockError::UnknownBlock(name.to_string()))?
            .downcast_ref::<T>()
            .ok_or_else(|| BlockError::TypeMismatch(name.to_string()))
    }

    /// Mutably borrow a block as its concrete type
    pub fn typed_mut<T: Block>(&mut self, name: &str) -> Result<&mut T, BlockError> {
        self.get_mut(name)
            .ok_or_else(|| BlockError::UnknownBlock(name.to_string()))?
            .downcast_mut::<T>()
            .ok_or_else(|| BlockError::TypeMismatch(name.to_string()))
    }

    pub fn blocks_mut(&mut self) -> Vec<&mut dyn Block> {
        self.blocks.iter_mut().map(|b| b.as_mut() as &mut dyn Block).collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.blocks.iter().position(|b| b.name() == name)
    }
}

/// Model assembled from block definitions and a signal-flow closure
pub struct Diagram<F> {
    name: String,
    settings: SettingsOverrides,
    blocks: BlockSet,
    flow: F,
}

impl<F> Diagram<F>
where
    F: FnMut(&mut BlockSet, Tick) -> Result<Vec<OutputGroup>, Error> + 'static,
{
    /// Build every definition through `registry`
    ///
    /// `overrides` maps block names to parameters that replace the
    /// definition's values of the same name.
    pub fn build(
        name: impl Into<String>,
        registry: &Registry,
        definitions: &[BlockDefinition],
        overrides: &BTreeMap<String, ParameterSet>,
        flow: F,
    ) -> Result<Self, Error> {
        if let Some(unknown) = overrides.keys().find(|k| !definitions.iter().any(|d| &d.name == *k)) {
            return Err(BlockError::UnknownBlock(unknown.clone()).into());
        }

        let mut blocks = BlockSet::new();
        for definition in definitions {
            let mut parameters = definition.parameters.clone();
            if let Some(replacements) = overrides.get(&definition.name) {
                for (key, value) in replacements.iter() {
                    parameters.insert(key, value.clone());
                }
            }
            blocks.push(registry.create(&definition.library, &definition.name, parameters)?)?;
        }

        Ok(Self { name: name.into(), settings: SettingsOverrides::default(), blocks, flow })
    }

    /// Declare the diagram's own simulation settings
    pub fn with_settings(mut self, settings: SettingsOverrides) -> Self {
        self.settings = settings;
        self
    }

    pub fn blocks(&self) -> &BlockSet {
        &self.blocks
    }

    pub fn block_set_mut(&mut self) -> &mut BlockSet {
        &mut self.blocks
    }
}

impl<F> Model for Diagram<F>
where
    F: FnMut(&mut BlockSet, Tick) -> Result<Vec<OutputGroup>, Error> + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn settings(&self) -> SettingsOverrides {
        self.settings.clone()
    }

    fn blocks_mut(&mut self) -> Vec<&mut dyn Block> {
        self.blocks.blocks_mut()
    }

    fn signal_flow(&mut self, tick: Tick) -> Result<Vec<OutputGroup>, Error> {
        (self.flow)(&mut self.blocks, tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{ConstantBlock, GainBlock, MotorBlock};
    use crate::record::Field;

    #[test]
    fn test_unknown_block_type() {
        let registry = Registry::with_library();
        let err = registry.create("vehicles.Rocket", "rocket", ParameterSet::new()).err().unwrap();
        assert_eq!(err, BlockError::UnknownBlockType("vehicles.Rocket".to_string()));
    }

    #[test]
    fn test_library_paths() {
        let registry = Registry::with_library();
        assert!(registry.contains("examples.Motor"));
        assert!(registry.contains("controllers.PIrD"));
        assert!(registry.paths().any(|p| p == "math.Gain"));
    }

    #[test]
    fn test_block_set_lookup() {
        let registry = Registry::with_library();
        let mut blocks = BlockSet::new();
        blocks.push(registry.create("examples.Motor", "motor", ParameterSet::new()).unwrap()).unwrap();
        blocks.push(registry.create("math.Gain", "gain", ParameterSet::new()).unwrap()).unwrap();

        assert_eq!(blocks.names().collect::<Vec<_>>(), vec!["motor", "gain"]);
        assert!(blocks.typed::<MotorBlock>("motor").is_ok());
        assert_eq!(blocks.typed::<GainBlock>("motor").err(), Some(BlockError::TypeMismatch("motor".into())));
        assert_eq!(blocks.typed_mut::<GainBlock>("pid").err(), Some(BlockError::UnknownBlock("pid".into())));

        let duplicate = registry.create("math.Gain", "gain", ParameterSet::new()).unwrap();
        assert_eq!(blocks.push(duplicate), Err(BlockError::DuplicateBlock("gain".into())));
    }

    #[test]
    fn test_definitions_from_json() {
        let definitions = BlockDefinition::list_from_json(
            r#"[
                {"name": "motor", "library": "examples.Motor", "parameters": {"x": [0.0, 1.0], "friction": 2}},
                {"name": "planner", "library": "planners.Constant", "parameters": {"setpoint": 1.0, "dtype": "xr:<f8"}}
            ]"#,
        )
        .unwrap();
        assert_eq!(definitions.len(), 2);

        let registry = Registry::with_library();
        let motor = registry.build(&definitions[0]).unwrap();
        assert_eq!(motor.block_type(), "Motor");
        let motor = motor.downcast_ref::<MotorBlock>().unwrap();
        assert_eq!(motor.state().as_slice(), &[0.0, 1.0]);
        assert_eq!(motor.model().friction, 2.0);
        assert_eq!(motor.state_fields(), vec![Field::f64("phi"), Field::f64("dphi")]);

        let planner = registry.build(&definitions[1]).unwrap();
        let planner = planner.downcast_ref::<ConstantBlock>().unwrap();
        assert_eq!(planner.output_fields(), vec![Field::f64("xr")]);
    }

    #[test]
    fn test_diagram_overrides() {
        let registry = Registry::with_library();
        let definitions = vec![BlockDefinition::new("gain", "math.Gain").with_parameters(ParameterSet::new().with("k", 2.0))];
        let flow = |_: &mut BlockSet, tick: Tick| Ok(vec![OutputGroup::scalar("t", tick.t)]);

        let mut overrides = BTreeMap::new();
        overrides.insert("gain".to_string(), ParameterSet::new().with("k", 5.0));
        let diagram = Diagram::build("gains", &registry, &definitions, &overrides, flow).unwrap();
        assert_eq!(diagram.blocks().typed::<GainBlock>("gain").unwrap().model().k, 5.0);

        overrides.insert("missing".to_string(), ParameterSet::new());
        assert!(Diagram::build("gains", &registry, &definitions, &overrides, flow).is_err());
    }
}
