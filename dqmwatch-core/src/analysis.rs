//! Scalar properties of monitored objects.
//!
//! Histograms are summarized along x. Graphs are summarized over their y
//! values. A `percentage` below 1 truncates the sample: for histograms the
//! bins around the mean bin are accumulated until they hold that fraction
//! of the entries, for graphs the same fraction of sorted y values is kept
//! around the middle.

use core::fmt;
use std::str::FromStr;

use dqmwatch_types::{Graph, Histogram1D, MonitorObject};

use crate::stats;

/// Fraction kept by the `*90` properties.
pub const TRUNCATION_90: f64 = 0.9;

/// A named scalar property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    Mean,
    Mean90,
    Rms,
    Rms90,
    Median,
}

impl Property {
    pub fn as_str(&self) -> &'static str {
        match self {
            Property::Mean => "Mean",
            Property::Mean90 => "Mean90",
            Property::Rms => "RMS",
            Property::Rms90 => "RMS90",
            Property::Median => "Median",
        }
    }

    /// Value of this property for `object`, `None` when the object has no
    /// meaningful value (empty, unsupported kind).
    pub fn compute(&self, object: &MonitorObject, percentage: f64) -> Option<f64> {
        match self {
            Property::Mean => mean(object, percentage),
            Property::Mean90 => mean(object, TRUNCATION_90),
            Property::Rms => rms(object, percentage),
            Property::Rms90 => rms(object, TRUNCATION_90),
            Property::Median => median(object),
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown property name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProperty(pub String);

impl fmt::Display for UnknownProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown property '{}'", self.0)
    }
}

impl std::error::Error for UnknownProperty {}

impl FromStr for Property {
    type Err = UnknownProperty;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Mean" => Ok(Property::Mean),
            "Mean90" => Ok(Property::Mean90),
            "RMS" => Ok(Property::Rms),
            "RMS90" => Ok(Property::Rms90),
            "Median" => Ok(Property::Median),
            other => Err(UnknownProperty(other.to_string())),
        }
    }
}

fn is_full(percentage: f64) -> bool {
    percentage >= 1.0 - f64::EPSILON
}

/// Mean of the object, truncated to `percentage` of the sample.
pub fn mean(object: &MonitorObject, percentage: f64) -> Option<f64> {
    match object {
        MonitorObject::Histogram1D(h) => {
            if h.entries() == 0.0 {
                None
            } else if is_full(percentage) {
                Some(h.mean())
            } else {
                window_moments(h, percentage).map(|(w, wx, _)| wx / w)
            }
        }
        MonitorObject::Histogram2D(h) if h.entries() > 0.0 => Some(h.mean_x()),
        MonitorObject::Graph(g) if !g.is_empty() => {
            if is_full(percentage) {
                Some(g.mean_y())
            } else {
                stats::mean(&truncated_y(g, percentage))
            }
        }
        _ => None,
    }
}

/// Standard deviation of the object, truncated to `percentage` of the sample.
pub fn rms(object: &MonitorObject, percentage: f64) -> Option<f64> {
    match object {
        MonitorObject::Histogram1D(h) => {
            if h.entries() == 0.0 {
                None
            } else if is_full(percentage) {
                Some(h.rms())
            } else {
                let center = h.mean();
                window_moments(h, percentage).map(|(w, wx, wx2)| {
                    // Spread around the full-sample mean.
                    let m = wx / w;
                    (wx2 / w - 2.0 * center * m + center * center).abs().sqrt()
                })
            }
        }
        MonitorObject::Histogram2D(h) if h.entries() > 0.0 => Some(h.rms_x()),
        MonitorObject::Graph(g) if !g.is_empty() => {
            if is_full(percentage) {
                Some(g.rms_y())
            } else {
                stats::rms(&truncated_y(g, percentage))
            }
        }
        _ => None,
    }
}

/// Median of the object.
pub fn median(object: &MonitorObject) -> Option<f64> {
    match object {
        MonitorObject::Histogram1D(h) => h.quantile(0.5),
        MonitorObject::Graph(g) => stats::median(&g.y_values()),
        _ => None,
    }
}

/// Sums `(w, w*x, w*x^2)` over the in-range bins closest to the mean bin,
/// widening symmetrically until the window holds more than
/// `percentage * entries`.
fn window_moments(h: &Histogram1D, percentage: f64) -> Option<(f64, f64, f64)> {
    let nbins = h.axis.bins();
    let target = percentage * h.entries();
    let center = h.find_bin(h.mean()).clamp(1, nbins);

    let mut sums = (0.0, 0.0, 0.0);
    let add = |bin: usize, sums: &mut (f64, f64, f64)| {
        let w = h.bin_content(bin);
        let x = h.bin_center(bin);
        sums.0 += w;
        sums.1 += w * x;
        sums.2 += w * x * x;
    };
    add(center, &mut sums);
    for offset in 1..nbins {
        if sums.0 > target {
            break;
        }
        if center > offset {
            add(center - offset, &mut sums);
        }
        if center + offset <= nbins {
            add(center + offset, &mut sums);
        }
    }
    (sums.0 > 0.0).then_some(sums)
}

/// The central `percentage` of the sorted y values.
fn truncated_y(g: &Graph, percentage: f64) -> Vec<f64> {
    let mut values = g.y_values();
    values.sort_by(f64::total_cmp);
    let n = values.len();
    let skip = (0.5 * (1.0 - percentage.clamp(0.0, 1.0)) * n as f64) as usize;
    values[skip..n - skip].to_vec()
}
