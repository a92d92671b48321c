//! Attributed configuration trees.
//!
//! Quality tests are configured from a small element tree: the element
//! carries `name`, `type` and optional `enabled` attributes, and each
//! algorithm setting is a `parameter` child whose text is the value:
//!
//! ```text
//! <qtest name="ecal-chi2" type="Chi2Test">
//!   <parameter name="ComparisonType">WW</parameter>
//!   <parameter name="GuessParameters">1 0 1</parameter>
//! </qtest>
//! ```
//!
//! The same tree can be deserialized from a flat definition in TOML or JSON
//! through [`QualityTestDefinition`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DqmError, Result};

/// Tag of parameter children.
pub const PARAMETER_TAG: &str = "parameter";

/// A node of a configuration tree.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfigElement {
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub children: Vec<ConfigElement>,
    #[serde(default)]
    pub text: String,
}

impl ConfigElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    /// A `qtest` element with the two mandatory attributes.
    pub fn qtest(name: impl Into<String>, qtest_type: impl Into<String>) -> Self {
        Self::new("qtest")
            .with_attribute("name", name)
            .with_attribute("type", qtest_type)
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: ConfigElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Append a `<parameter name="...">value</parameter>` child.
    pub fn with_parameter(self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        let child = ConfigElement::new(PARAMETER_TAG)
            .with_attribute("name", name)
            .with_text(value.to_string());
        self.with_child(child)
    }

    /// Value of attribute `name`.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Value of attribute `name`, NOT_FOUND if missing or empty.
    pub fn required_attribute(&self, name: &str) -> Result<&str> {
        self.attribute(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| DqmError::not_found(format!("attribute '{name}' on <{}>", self.tag)))
    }

    /// First child with tag `tag`.
    pub fn child(&self, tag: &str) -> Option<&ConfigElement> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// Every child with tag `tag`.
    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a ConfigElement> {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// Raw text of parameter `name`. Parameter names match case-insensitively.
    pub fn parameter_text(&self, name: &str) -> Option<&str> {
        self.children_named(PARAMETER_TAG)
            .find(|c| c.attribute("name").is_some_and(|n| n.eq_ignore_ascii_case(name)))
            .map(|c| c.text.trim())
    }

    /// Typed parameter value; `Ok(None)` when absent.
    pub fn parameter<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        match self.parameter_text(name) {
            None => Ok(None),
            Some(text) => text.parse::<T>().map(Some).map_err(|_| {
                DqmError::invalid(format!("parameter '{name}' has invalid value '{text}'"))
            }),
        }
    }

    /// Typed parameter that must be present.
    pub fn required_parameter<T: FromStr>(&self, name: &str) -> Result<T> {
        self.parameter(name)?
            .ok_or_else(|| DqmError::not_found(format!("parameter '{name}'")))
    }

    /// Typed parameter with a default for when it is absent.
    pub fn parameter_or<T: FromStr>(&self, name: &str, default: T) -> Result<T> {
        Ok(self.parameter(name)?.unwrap_or(default))
    }

    /// Boolean parameter accepting `true/false`, `1/0`, `yes/no` and `on/off`.
    pub fn flag(&self, name: &str, default: bool) -> Result<bool> {
        match self.parameter_text(name) {
            None => Ok(default),
            Some(text) => parse_flag(text)
                .ok_or_else(|| DqmError::invalid(format!("parameter '{name}' is not a boolean: '{text}'"))),
        }
    }

    /// Whitespace-separated list parameter; `Ok(None)` when absent.
    pub fn vector_parameter<T: FromStr>(&self, name: &str) -> Result<Option<Vec<T>>> {
        let Some(text) = self.parameter_text(name) else {
            return Ok(None);
        };
        text.split_whitespace()
            .map(|item| {
                item.parse::<T>().map_err(|_| {
                    DqmError::invalid(format!("parameter '{name}' has invalid item '{item}'"))
                })
            })
            .collect::<Result<Vec<T>>>()
            .map(Some)
    }
}

fn parse_flag(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// A parameter value as written in TOML or JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<ParameterValue>),
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Bool(v) => write!(f, "{v}"),
            ParameterValue::Int(v) => write!(f, "{v}"),
            ParameterValue::Float(v) => write!(f, "{v}"),
            ParameterValue::Text(v) => f.write_str(v),
            ParameterValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

/// Flat description of a quality test, convenient in configuration files.
///
/// ```toml
/// name = "ecal-fit"
/// type = "FitParamInRangeTest"
///
/// [parameters]
/// FitFormula = "gaus(0)"
/// TestParameter = 1
/// GuessParameters = [100.0, 0.0, 1.0]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityTestDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub qtest_type: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterValue>,
}

fn default_enabled() -> bool {
    true
}

impl From<&QualityTestDefinition> for ConfigElement {
    fn from(def: &QualityTestDefinition) -> Self {
        let element = ConfigElement::qtest(&def.name, &def.qtest_type)
            .with_attribute("enabled", def.enabled.to_string());
        def.parameters
            .iter()
            .fold(element, |element, (name, value)| element.with_parameter(name, value))
    }
}
