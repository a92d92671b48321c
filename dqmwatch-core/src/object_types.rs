//! Registry of object classes that can be booked by name.

use std::collections::BTreeMap;

use dqmwatch_types::{
    Axis, BinPrecision, Graph, Graph2D, Histogram1D, Histogram2D, MonitorObject, Scalar, ScalarValue,
};

use crate::error::{DqmError, Result};

/// What the engine requires from a bookable class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Instances carry a settable name.
    pub nameable: bool,
    /// Instances can be written to and read from object stores.
    pub serializable: bool,
}

impl Capabilities {
    pub const FULL: Capabilities = Capabilities {
        nameable: true,
        serializable: true,
    };

    fn missing(&self) -> Option<&'static str> {
        if !self.nameable {
            Some("nameable")
        } else if !self.serializable {
            Some("serializable")
        } else {
            None
        }
    }
}

type Constructor = Box<dyn Fn() -> MonitorObject + Send + Sync>;

struct ObjectType {
    capabilities: Capabilities,
    construct: Constructor,
}

/// Maps class names such as `H1F` or `Graph` to default constructors.
#[derive(Default)]
pub struct ObjectTypeRegistry {
    types: BTreeMap<String, ObjectType>,
}

impl ObjectTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in class. Histograms start with a single
    /// bin over `[0, 1)`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for precision in [BinPrecision::Float, BinPrecision::Double, BinPrecision::Int] {
            registry.insert(format!("H1{}", precision.suffix()), Capabilities::FULL, move || {
                Histogram1D::with_precision("", "", Axis::default(), precision).into()
            });
            registry.insert(format!("H2{}", precision.suffix()), Capabilities::FULL, move || {
                Histogram2D::with_precision("", "", Axis::default(), Axis::default(), precision).into()
            });
        }
        registry.insert("Graph", Capabilities::FULL, || Graph::new("", "").into());
        registry.insert("Graph2D", Capabilities::FULL, || Graph2D::new("", "").into());
        registry.insert("ScalarInt", Capabilities::FULL, || Scalar::new("", ScalarValue::Int(0)).into());
        registry.insert("ScalarFloat", Capabilities::FULL, || {
            Scalar::new("", ScalarValue::Float(0.0)).into()
        });
        registry.insert("ScalarString", Capabilities::FULL, || {
            Scalar::new("", ScalarValue::Text(String::new())).into()
        });
        registry
    }

    fn insert<F>(&mut self, class: impl Into<String>, capabilities: Capabilities, construct: F)
    where
        F: Fn() -> MonitorObject + Send + Sync + 'static,
    {
        self.types.insert(
            class.into(),
            ObjectType {
                capabilities,
                construct: Box::new(construct),
            },
        );
    }

    /// Register a class. Fails with ALREADY_PRESENT for a known class name.
    pub fn register<F>(&mut self, class: impl Into<String>, capabilities: Capabilities, construct: F) -> Result<()>
    where
        F: Fn() -> MonitorObject + Send + Sync + 'static,
    {
        let class = class.into();
        if self.types.contains_key(&class) {
            return Err(DqmError::already_present(format!("object class '{class}'")));
        }
        self.insert(class, capabilities, construct);
        Ok(())
    }

    pub fn contains(&self, class: &str) -> bool {
        self.types.contains_key(class)
    }

    pub fn capabilities(&self, class: &str) -> Option<Capabilities> {
        self.types.get(class).map(|t| t.capabilities)
    }

    /// Registered class names, sorted.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Build a new object of `class` named `name`.
    pub fn instantiate(&self, class: &str, name: &str) -> Result<MonitorObject> {
        let object_type = self
            .types
            .get(class)
            .ok_or_else(|| DqmError::not_found(format!("object class '{class}'")))?;
        if let Some(missing) = object_type.capabilities.missing() {
            return Err(DqmError::NotAllowed(format!("object class '{class}' is not {missing}")));
        }
        let mut object = (object_type.construct)();
        object.set_name(name);
        Ok(object)
    }
}

impl std::fmt::Debug for ObjectTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.types.keys()).finish()
    }
}
