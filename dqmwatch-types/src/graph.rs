//! Point graphs in two and three dimensions.

/// A single (x, y) point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct Point {
    #[cfg_attr(feature = "minicbor", n(0))]
    pub x: f64,
    #[cfg_attr(feature = "minicbor", n(1))]
    pub y: f64,
}

/// A single (x, y, z) point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct Point3 {
    #[cfg_attr(feature = "minicbor", n(0))]
    pub x: f64,
    #[cfg_attr(feature = "minicbor", n(1))]
    pub y: f64,
    #[cfg_attr(feature = "minicbor", n(2))]
    pub z: f64,
}

/// An ordered list of (x, y) points.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct Graph {
    #[cfg_attr(feature = "minicbor", n(0))]
    pub name: String,

    #[cfg_attr(feature = "minicbor", n(1))]
    pub title: String,

    #[cfg_attr(feature = "serde", serde(default))]
    #[cfg_attr(feature = "minicbor", n(2))]
    pub points: Vec<Point>,
}

impl Graph {
    /// Create an empty graph.
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            points: Vec::new(),
        }
    }

    /// Append a point.
    pub fn push(&mut self, x: f64, y: f64) {
        self.points.push(Point { x, y });
    }

    /// Builder-style append.
    pub fn with_point(mut self, x: f64, y: f64) -> Self {
        self.push(x, y);
        self
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the graph has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The y values in point order.
    pub fn y_values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.y).collect()
    }

    /// Mean of the x values.
    pub fn mean_x(&self) -> f64 {
        mean(self.points.iter().map(|p| p.x), self.len())
    }

    /// Mean of the y values.
    pub fn mean_y(&self) -> f64 {
        mean(self.points.iter().map(|p| p.y), self.len())
    }

    /// Standard deviation of the y values.
    pub fn rms_y(&self) -> f64 {
        let m = self.mean_y();
        mean(self.points.iter().map(|p| (p.y - m) * (p.y - m)), self.len()).sqrt()
    }
}

/// An ordered list of (x, y, z) points.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct Graph2D {
    #[cfg_attr(feature = "minicbor", n(0))]
    pub name: String,

    #[cfg_attr(feature = "minicbor", n(1))]
    pub title: String,

    #[cfg_attr(feature = "serde", serde(default))]
    #[cfg_attr(feature = "minicbor", n(2))]
    pub points: Vec<Point3>,
}

impl Graph2D {
    /// Create an empty 2D graph.
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            points: Vec::new(),
        }
    }

    /// Append a point.
    pub fn push(&mut self, x: f64, y: f64, z: f64) {
        self.points.push(Point3 { x, y, z });
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the graph has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn mean(values: impl Iterator<Item = f64>, n: usize) -> f64 {
    if n == 0 {
        0.0
    } else {
        values.sum::<f64>() / n as f64
    }
}
