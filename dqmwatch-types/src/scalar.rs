//! Single-valued monitored quantities.

use core::fmt;

/// The value carried by a [`Scalar`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub enum ScalarValue {
    #[cfg_attr(feature = "minicbor", n(0))]
    Int(#[cfg_attr(feature = "minicbor", n(0))] i64),
    #[cfg_attr(feature = "minicbor", n(1))]
    Float(#[cfg_attr(feature = "minicbor", n(0))] f64),
    #[cfg_attr(feature = "minicbor", n(2))]
    Text(#[cfg_attr(feature = "minicbor", n(0))] String),
}

impl ScalarValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Int(v) => Some(*v as f64),
            ScalarValue::Float(v) => Some(*v),
            ScalarValue::Text(_) => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Int(v) => write!(f, "{v}"),
            ScalarValue::Float(v) => write!(f, "{v}"),
            ScalarValue::Text(v) => f.write_str(v),
        }
    }
}

/// A named single value (counter, rate, status string...).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct Scalar {
    #[cfg_attr(feature = "minicbor", n(0))]
    pub name: String,

    #[cfg_attr(feature = "serde", serde(default))]
    #[cfg_attr(feature = "minicbor", n(1))]
    pub title: String,

    #[cfg_attr(feature = "minicbor", n(2))]
    pub value: ScalarValue,
}

impl Scalar {
    /// Create a scalar.
    pub fn new(name: impl Into<String>, value: ScalarValue) -> Self {
        Self {
            name: name.into(),
            title: String::new(),
            value,
        }
    }

    /// Create an integer scalar.
    pub fn int(name: impl Into<String>, value: i64) -> Self {
        Self::new(name, ScalarValue::Int(value))
    }

    /// Create a floating point scalar.
    pub fn float(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, ScalarValue::Float(value))
    }

    /// Create a text scalar.
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, ScalarValue::Text(value.into()))
    }

    /// Class name, one per value kind.
    pub fn class_name(&self) -> &'static str {
        match self.value {
            ScalarValue::Int(_) => "ScalarInt",
            ScalarValue::Float(_) => "ScalarFloat",
            ScalarValue::Text(_) => "ScalarString",
        }
    }
}
