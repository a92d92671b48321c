//! The closed set of monitored payloads.

use crate::{Binned, Graph, Graph2D, Histogram1D, Histogram2D, Scalar};

/// Any object a monitor element can hold.
///
/// The class name identifies the concrete type, including the bin precision
/// of histograms and the value kind of scalars, so two objects are of the
/// "same type" exactly when their class names are equal.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind"))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub enum MonitorObject {
    #[cfg_attr(feature = "serde", serde(rename = "histogram1d"))]
    #[cfg_attr(feature = "minicbor", n(0))]
    Histogram1D(#[cfg_attr(feature = "minicbor", n(0))] Histogram1D),

    #[cfg_attr(feature = "serde", serde(rename = "histogram2d"))]
    #[cfg_attr(feature = "minicbor", n(1))]
    Histogram2D(#[cfg_attr(feature = "minicbor", n(0))] Histogram2D),

    #[cfg_attr(feature = "serde", serde(rename = "graph"))]
    #[cfg_attr(feature = "minicbor", n(2))]
    Graph(#[cfg_attr(feature = "minicbor", n(0))] Graph),

    #[cfg_attr(feature = "serde", serde(rename = "graph2d"))]
    #[cfg_attr(feature = "minicbor", n(3))]
    Graph2D(#[cfg_attr(feature = "minicbor", n(0))] Graph2D),

    #[cfg_attr(feature = "serde", serde(rename = "scalar"))]
    #[cfg_attr(feature = "minicbor", n(4))]
    Scalar(#[cfg_attr(feature = "minicbor", n(0))] Scalar),
}

impl MonitorObject {
    /// Concrete class name (`H1F`, `H2D`, `Graph`, `ScalarInt`, ...).
    pub fn class_name(&self) -> &'static str {
        match self {
            MonitorObject::Histogram1D(h) => h.class_name(),
            MonitorObject::Histogram2D(h) => h.class_name(),
            MonitorObject::Graph(_) => "Graph",
            MonitorObject::Graph2D(_) => "Graph2D",
            MonitorObject::Scalar(s) => s.class_name(),
        }
    }

    /// Object name.
    pub fn name(&self) -> &str {
        match self {
            MonitorObject::Histogram1D(h) => &h.name,
            MonitorObject::Histogram2D(h) => &h.name,
            MonitorObject::Graph(g) => &g.name,
            MonitorObject::Graph2D(g) => &g.name,
            MonitorObject::Scalar(s) => &s.name,
        }
    }

    /// Rename the object.
    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        match self {
            MonitorObject::Histogram1D(h) => h.name = name,
            MonitorObject::Histogram2D(h) => h.name = name,
            MonitorObject::Graph(g) => g.name = name,
            MonitorObject::Graph2D(g) => g.name = name,
            MonitorObject::Scalar(s) => s.name = name,
        }
    }

    /// Object title.
    pub fn title(&self) -> &str {
        match self {
            MonitorObject::Histogram1D(h) => &h.title,
            MonitorObject::Histogram2D(h) => &h.title,
            MonitorObject::Graph(g) => &g.title,
            MonitorObject::Graph2D(g) => &g.title,
            MonitorObject::Scalar(s) => &s.title,
        }
    }

    /// Binned view for histograms.
    pub fn as_binned(&self) -> Option<&dyn Binned> {
        match self {
            MonitorObject::Histogram1D(h) => Some(h as &dyn Binned),
            MonitorObject::Histogram2D(h) => Some(h as &dyn Binned),
            _ => None,
        }
    }

    /// Whether the object is a histogram of any dimension.
    pub fn is_histogram(&self) -> bool {
        self.as_binned().is_some()
    }

    /// Whether the object is a graph of any dimension.
    pub fn is_graph(&self) -> bool {
        matches!(self, MonitorObject::Graph(_) | MonitorObject::Graph2D(_))
    }

    /// Internal consistency check for decoded objects.
    pub fn is_consistent(&self) -> bool {
        match self {
            MonitorObject::Histogram1D(h) => h.is_consistent(),
            MonitorObject::Histogram2D(h) => h.is_consistent(),
            _ => true,
        }
    }
}

impl From<Histogram1D> for MonitorObject {
    fn from(h: Histogram1D) -> Self {
        MonitorObject::Histogram1D(h)
    }
}

impl From<Histogram2D> for MonitorObject {
    fn from(h: Histogram2D) -> Self {
        MonitorObject::Histogram2D(h)
    }
}

impl From<Graph> for MonitorObject {
    fn from(g: Graph) -> Self {
        MonitorObject::Graph(g)
    }
}

impl From<Graph2D> for MonitorObject {
    fn from(g: Graph2D) -> Self {
        MonitorObject::Graph2D(g)
    }
}

impl From<Scalar> for MonitorObject {
    fn from(s: Scalar) -> Self {
        MonitorObject::Scalar(s)
    }
}
