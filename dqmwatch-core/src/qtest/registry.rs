//! Type-name to factory mapping.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::{
    BuiltinFactory, Chi2Test, ExactRefCompareTest, FitParamInRangeTest, KolmogorovTest,
    PropertyWithinExpectedTest, QualityTest, QualityTestFactory,
};
use crate::config::ConfigElement;
use crate::error::{DqmError, Result};

/// Registry of quality-test factories, keyed by type name.
///
/// Populated once when a manager is built and read-only afterwards.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: BTreeMap<String, Box<dyn QualityTestFactory>>,
}

impl FactoryRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the five built-in test types.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let builtins: [Box<dyn QualityTestFactory>; 5] = [
            Box::new(BuiltinFactory::<ExactRefCompareTest>::new()),
            Box::new(BuiltinFactory::<Chi2Test>::new()),
            Box::new(BuiltinFactory::<KolmogorovTest>::new()),
            Box::new(BuiltinFactory::<FitParamInRangeTest>::new()),
            Box::new(BuiltinFactory::<PropertyWithinExpectedTest>::new()),
        ];
        for factory in builtins {
            let name = factory.type_name().to_string();
            registry.factories.insert(name, factory);
        }
        registry
    }

    /// Register a factory under its type name.
    pub fn register(&mut self, factory: Box<dyn QualityTestFactory>) -> Result<()> {
        let name = factory.type_name().to_string();
        if self.factories.contains_key(&name) {
            return Err(DqmError::already_present(format!("quality test type '{name}'")));
        }
        debug!("Registered quality test type '{}'", name);
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Registered type names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    pub fn get(&self, type_name: &str) -> Option<&dyn QualityTestFactory> {
        self.factories.get(type_name).map(Box::as_ref)
    }

    /// Create a test with the factory named by the `type` attribute.
    pub fn create(&self, config: &ConfigElement) -> Result<Arc<dyn QualityTest>> {
        let type_name = config.required_attribute("type")?;
        let factory = self
            .get(type_name)
            .ok_or_else(|| DqmError::not_found(format!("quality test type '{type_name}'")))?;
        factory.create(config)
    }
}

impl std::fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}
