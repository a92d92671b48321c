//! Binned histograms in one and two dimensions.
//!
//! Bin numbering follows the usual convention: bin `0` is the underflow,
//! bins `1..=nbins` cover the axis range and bin `nbins + 1` is the overflow.

use std::ops::RangeInclusive;

/// A fixed-width binned axis.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct Axis {
    /// Number of in-range bins.
    #[cfg_attr(feature = "minicbor", n(0))]
    pub nbins: u32,

    /// Lower edge of the first bin.
    #[cfg_attr(feature = "minicbor", n(1))]
    pub min: f64,

    /// Upper edge of the last bin.
    #[cfg_attr(feature = "minicbor", n(2))]
    pub max: f64,
}

impl Axis {
    /// Create an axis. A zero bin count is promoted to one bin.
    pub fn new(nbins: u32, min: f64, max: f64) -> Self {
        Self {
            nbins: nbins.max(1),
            min,
            max,
        }
    }

    /// Number of in-range bins.
    pub fn bins(&self) -> usize {
        self.nbins as usize
    }

    /// Number of bins including underflow and overflow.
    pub fn total_bins(&self) -> usize {
        self.bins() + 2
    }

    /// Width of a single bin.
    pub fn bin_width(&self) -> f64 {
        (self.max - self.min) / self.nbins as f64
    }

    /// Bin index holding `x`, `0` for underflow and `nbins + 1` for overflow.
    pub fn find_bin(&self, x: f64) -> usize {
        if x.is_nan() || x < self.min {
            0
        } else if x >= self.max {
            self.bins() + 1
        } else {
            let bin = ((x - self.min) / self.bin_width()) as usize + 1;
            bin.min(self.bins())
        }
    }

    /// Lower edge of bin `bin`.
    pub fn bin_low_edge(&self, bin: usize) -> f64 {
        self.min + (bin as f64 - 1.0) * self.bin_width()
    }

    /// Center of bin `bin`.
    pub fn bin_center(&self, bin: usize) -> f64 {
        self.min + (bin as f64 - 0.5) * self.bin_width()
    }

    /// Whether `other` has the same bin count and range.
    pub fn same_binning(&self, other: &Axis) -> bool {
        self.nbins == other.nbins
            && (self.min - other.min).abs() <= f64::EPSILON * self.min.abs().max(1.0)
            && (self.max - other.max).abs() <= f64::EPSILON * self.max.abs().max(1.0)
    }
}

impl Default for Axis {
    fn default() -> Self {
        Self::new(1, 0.0, 1.0)
    }
}

/// Storage precision of the bin contents.
///
/// Contents are always held as `f64`; the precision rounds values the way
/// the corresponding storage type would and selects the class name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
#[cfg_attr(feature = "minicbor", cbor(index_only))]
pub enum BinPrecision {
    /// Single precision float bins.
    #[default]
    #[cfg_attr(feature = "minicbor", n(0))]
    Float,
    /// Double precision float bins.
    #[cfg_attr(feature = "minicbor", n(1))]
    Double,
    /// Integer bins.
    #[cfg_attr(feature = "minicbor", n(2))]
    Int,
}

impl BinPrecision {
    /// Class-name suffix for this precision.
    pub fn suffix(&self) -> &'static str {
        match self {
            BinPrecision::Float => "F",
            BinPrecision::Double => "D",
            BinPrecision::Int => "I",
        }
    }

    /// Round `value` to what this precision can store.
    pub fn quantize(&self, value: f64) -> f64 {
        match self {
            BinPrecision::Float => value as f32 as f64,
            BinPrecision::Double => value,
            BinPrecision::Int => value.round(),
        }
    }

    /// Parse a class-name suffix (`F`, `D` or `I`).
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "F" => Some(BinPrecision::Float),
            "D" => Some(BinPrecision::Double),
            "I" => Some(BinPrecision::Int),
            _ => None,
        }
    }
}

/// Running sums accumulated by `fill` over in-range entries.
///
/// They give exact means and widths independent of the binning. Directly
/// editing bin contents drops them, after which statistics are computed
/// from the bins.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct FillStats {
    #[cfg_attr(feature = "minicbor", n(0))]
    pub sumw: f64,
    #[cfg_attr(feature = "minicbor", n(1))]
    pub sumw2: f64,
    #[cfg_attr(feature = "minicbor", n(2))]
    pub sumwx: f64,
    #[cfg_attr(feature = "minicbor", n(3))]
    pub sumwx2: f64,
    #[cfg_attr(feature = "minicbor", n(4))]
    pub sumwy: f64,
    #[cfg_attr(feature = "minicbor", n(5))]
    pub sumwy2: f64,
}

/// Read access shared by every binned object.
///
/// Quality tests that compare bin contents go through this trait so that
/// one- and two-dimensional histograms are handled by the same code.
pub trait Binned {
    /// All bin contents, including underflow and overflow bins.
    fn contents(&self) -> &[f64];

    /// Sum of squared weights per bin, parallel to [`Binned::contents`].
    fn sumw2(&self) -> &[f64];

    /// Axes of the histogram, x first.
    fn axes(&self) -> Vec<Axis>;

    /// Indices of the bins to consider, optionally including the
    /// underflow and overflow bins of every axis.
    fn selected_bins(&self, underflow: bool, overflow: bool) -> Vec<usize>;

    /// Number of fill calls.
    fn entries(&self) -> f64;

    /// Whether both histograms share the same axes.
    fn same_binning(&self, other: &dyn Binned) -> bool {
        let (a, b) = (self.axes(), other.axes());
        a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| a.same_binning(b))
    }

    /// Error on the content of a bin.
    fn bin_error(&self, bin: usize) -> f64 {
        self.sumw2().get(bin).map_or(0.0, |w2| w2.sqrt())
    }

    /// Sum of the contents over the selected bins.
    fn integral(&self, underflow: bool, overflow: bool) -> f64 {
        let contents = self.contents();
        self.selected_bins(underflow, overflow)
            .into_iter()
            .map(|i| contents[i])
            .sum()
    }
}

fn bin_range(axis: &Axis, underflow: bool, overflow: bool) -> RangeInclusive<usize> {
    let first = if underflow { 0 } else { 1 };
    let last = if overflow { axis.bins() + 1 } else { axis.bins() };
    first..=last
}

/// A one-dimensional histogram.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct Histogram1D {
    #[cfg_attr(feature = "minicbor", n(0))]
    pub name: String,

    #[cfg_attr(feature = "minicbor", n(1))]
    pub title: String,

    #[cfg_attr(feature = "serde", serde(default))]
    #[cfg_attr(feature = "minicbor", n(2))]
    pub precision: BinPrecision,

    #[cfg_attr(feature = "minicbor", n(3))]
    pub axis: Axis,

    /// Bin contents, `nbins + 2` values.
    #[cfg_attr(feature = "minicbor", n(4))]
    contents: Vec<f64>,

    /// Sum of squared weights, `nbins + 2` values.
    #[cfg_attr(feature = "minicbor", n(5))]
    sumw2: Vec<f64>,

    #[cfg_attr(feature = "minicbor", n(6))]
    entries: f64,

    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "minicbor", n(7))]
    stats: Option<FillStats>,
}

impl Histogram1D {
    /// Create an empty single precision histogram.
    pub fn new(name: impl Into<String>, title: impl Into<String>, axis: Axis) -> Self {
        Self::with_precision(name, title, axis, BinPrecision::Float)
    }

    /// Create an empty histogram with the given bin precision.
    pub fn with_precision(
        name: impl Into<String>,
        title: impl Into<String>,
        axis: Axis,
        precision: BinPrecision,
    ) -> Self {
        let total = axis.total_bins();
        Self {
            name: name.into(),
            title: title.into(),
            precision,
            axis,
            contents: vec![0.0; total],
            sumw2: vec![0.0; total],
            entries: 0.0,
            stats: Some(FillStats::default()),
        }
    }

    /// Whether the bin arrays match the axis, as required after decoding.
    pub fn is_consistent(&self) -> bool {
        let total = self.axis.total_bins();
        self.contents.len() == total && self.sumw2.len() == total
    }

    /// Class name, `H1F`, `H1D` or `H1I`.
    pub fn class_name(&self) -> &'static str {
        match self.precision {
            BinPrecision::Float => "H1F",
            BinPrecision::Double => "H1D",
            BinPrecision::Int => "H1I",
        }
    }

    /// Fill with unit weight.
    pub fn fill(&mut self, x: f64) -> usize {
        self.fill_weighted(x, 1.0)
    }

    /// Fill with weight `w` and return the bin that received it.
    pub fn fill_weighted(&mut self, x: f64, w: f64) -> usize {
        let bin = self.axis.find_bin(x);
        self.contents[bin] = self.precision.quantize(self.contents[bin] + w);
        self.sumw2[bin] += w * w;
        self.entries += 1.0;
        if (1..=self.axis.bins()).contains(&bin) {
            if let Some(stats) = self.stats.as_mut() {
                stats.sumw += w;
                stats.sumw2 += w * w;
                stats.sumwx += w * x;
                stats.sumwx2 += w * x * x;
            }
        }
        bin
    }

    /// Content of bin `bin` (0 when out of bounds).
    pub fn bin_content(&self, bin: usize) -> f64 {
        self.contents.get(bin).copied().unwrap_or(0.0)
    }

    /// Overwrite the content of a bin. The error becomes `sqrt(|value|)`.
    ///
    /// Fill statistics are dropped, so later means come from the bins.
    pub fn set_bin_content(&mut self, bin: usize, value: f64) {
        if let Some(slot) = self.contents.get_mut(bin) {
            *slot = self.precision.quantize(value);
            self.sumw2[bin] = slot.abs();
            self.stats = None;
            self.entries += 1.0;
        }
    }

    /// Override the recorded number of entries.
    pub fn set_entries(&mut self, entries: f64) {
        self.entries = entries;
    }

    /// Center of bin `bin`.
    pub fn bin_center(&self, bin: usize) -> f64 {
        self.axis.bin_center(bin)
    }

    /// Bin index holding `x`.
    pub fn find_bin(&self, x: f64) -> usize {
        self.axis.find_bin(x)
    }

    /// Number of fill calls.
    pub fn entries(&self) -> f64 {
        self.entries
    }

    /// Content of the underflow bin.
    pub fn underflow(&self) -> f64 {
        self.contents[0]
    }

    /// Content of the overflow bin.
    pub fn overflow(&self) -> f64 {
        self.contents[self.axis.bins() + 1]
    }

    fn moments(&self) -> (f64, f64, f64) {
        match self.stats {
            Some(s) if s.sumw != 0.0 => (s.sumw, s.sumwx, s.sumwx2),
            _ => (1..=self.axis.bins()).fold((0.0, 0.0, 0.0), |(w, wx, wx2), bin| {
                let c = self.contents[bin];
                let x = self.axis.bin_center(bin);
                (w + c, wx + c * x, wx2 + c * x * x)
            }),
        }
    }

    /// Mean of the in-range entries.
    pub fn mean(&self) -> f64 {
        let (w, wx, _) = self.moments();
        if w == 0.0 {
            0.0
        } else {
            wx / w
        }
    }

    /// Standard deviation of the in-range entries.
    pub fn rms(&self) -> f64 {
        let (w, wx, wx2) = self.moments();
        if w == 0.0 {
            return 0.0;
        }
        let mean = wx / w;
        (wx2 / w - mean * mean).abs().sqrt()
    }

    /// Position below which a fraction `p` of the in-range content lies,
    /// interpolating linearly inside the bin. `None` for an empty histogram.
    pub fn quantile(&self, p: f64) -> Option<f64> {
        let nbins = self.axis.bins();
        let total: f64 = self.contents[1..=nbins].iter().sum();
        if total == 0.0 {
            return None;
        }
        let mut cumulative = Vec::with_capacity(nbins + 1);
        cumulative.push(0.0);
        for bin in 1..=nbins {
            let last = cumulative[bin - 1];
            cumulative.push(last + self.contents[bin] / total);
        }
        let index = cumulative
            .iter()
            .rposition(|&c| c <= p)
            .unwrap_or(0)
            .min(nbins - 1);
        let width = self.axis.bin_width();
        let low = self.axis.min + index as f64 * width;
        let step = cumulative[index + 1] - cumulative[index];
        if step > 0.0 {
            Some(low + width * (p - cumulative[index]) / step)
        } else {
            Some(low)
        }
    }
}

impl Binned for Histogram1D {
    fn contents(&self) -> &[f64] {
        &self.contents
    }

    fn sumw2(&self) -> &[f64] {
        &self.sumw2
    }

    fn axes(&self) -> Vec<Axis> {
        vec![self.axis]
    }

    fn selected_bins(&self, underflow: bool, overflow: bool) -> Vec<usize> {
        bin_range(&self.axis, underflow, overflow).collect()
    }

    fn entries(&self) -> f64 {
        self.entries
    }
}

/// A two-dimensional histogram.
///
/// Bins are stored row by row: the global index of `(ix, iy)` is
/// `ix + (nx + 2) * iy`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct Histogram2D {
    #[cfg_attr(feature = "minicbor", n(0))]
    pub name: String,

    #[cfg_attr(feature = "minicbor", n(1))]
    pub title: String,

    #[cfg_attr(feature = "serde", serde(default))]
    #[cfg_attr(feature = "minicbor", n(2))]
    pub precision: BinPrecision,

    #[cfg_attr(feature = "minicbor", n(3))]
    pub x_axis: Axis,

    #[cfg_attr(feature = "minicbor", n(4))]
    pub y_axis: Axis,

    #[cfg_attr(feature = "minicbor", n(5))]
    contents: Vec<f64>,

    #[cfg_attr(feature = "minicbor", n(6))]
    sumw2: Vec<f64>,

    #[cfg_attr(feature = "minicbor", n(7))]
    entries: f64,

    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "minicbor", n(8))]
    stats: Option<FillStats>,
}

impl Histogram2D {
    /// Create an empty single precision 2D histogram.
    pub fn new(name: impl Into<String>, title: impl Into<String>, x_axis: Axis, y_axis: Axis) -> Self {
        Self::with_precision(name, title, x_axis, y_axis, BinPrecision::Float)
    }

    /// Create an empty 2D histogram with the given bin precision.
    pub fn with_precision(
        name: impl Into<String>,
        title: impl Into<String>,
        x_axis: Axis,
        y_axis: Axis,
        precision: BinPrecision,
    ) -> Self {
        let total = x_axis.total_bins() * y_axis.total_bins();
        Self {
            name: name.into(),
            title: title.into(),
            precision,
            x_axis,
            y_axis,
            contents: vec![0.0; total],
            sumw2: vec![0.0; total],
            entries: 0.0,
            stats: Some(FillStats::default()),
        }
    }

    /// Whether the bin arrays match the axes, as required after decoding.
    pub fn is_consistent(&self) -> bool {
        let total = self.x_axis.total_bins() * self.y_axis.total_bins();
        self.contents.len() == total && self.sumw2.len() == total
    }

    /// Class name, `H2F`, `H2D` or `H2I`.
    pub fn class_name(&self) -> &'static str {
        match self.precision {
            BinPrecision::Float => "H2F",
            BinPrecision::Double => "H2D",
            BinPrecision::Int => "H2I",
        }
    }

    /// Global bin index of `(ix, iy)`.
    pub fn bin(&self, ix: usize, iy: usize) -> usize {
        ix + self.x_axis.total_bins() * iy
    }

    /// Split a global bin index into `(ix, iy)`.
    pub fn bin_xy(&self, bin: usize) -> (usize, usize) {
        let stride = self.x_axis.total_bins();
        (bin % stride, bin / stride)
    }

    /// Fill with unit weight.
    pub fn fill(&mut self, x: f64, y: f64) -> usize {
        self.fill_weighted(x, y, 1.0)
    }

    /// Fill with weight `w` and return the global bin that received it.
    pub fn fill_weighted(&mut self, x: f64, y: f64, w: f64) -> usize {
        let (ix, iy) = (self.x_axis.find_bin(x), self.y_axis.find_bin(y));
        let bin = self.bin(ix, iy);
        self.contents[bin] = self.precision.quantize(self.contents[bin] + w);
        self.sumw2[bin] += w * w;
        self.entries += 1.0;
        let in_range = (1..=self.x_axis.bins()).contains(&ix) && (1..=self.y_axis.bins()).contains(&iy);
        if in_range {
            if let Some(stats) = self.stats.as_mut() {
                stats.sumw += w;
                stats.sumw2 += w * w;
                stats.sumwx += w * x;
                stats.sumwx2 += w * x * x;
                stats.sumwy += w * y;
                stats.sumwy2 += w * y * y;
            }
        }
        bin
    }

    /// Content of bin `(ix, iy)`.
    pub fn bin_content(&self, ix: usize, iy: usize) -> f64 {
        self.contents.get(self.bin(ix, iy)).copied().unwrap_or(0.0)
    }

    /// Overwrite the content of bin `(ix, iy)`.
    pub fn set_bin_content(&mut self, ix: usize, iy: usize, value: f64) {
        let bin = self.bin(ix, iy);
        if let Some(slot) = self.contents.get_mut(bin) {
            *slot = self.precision.quantize(value);
            self.sumw2[bin] = slot.abs();
            self.stats = None;
            self.entries += 1.0;
        }
    }

    /// Number of fill calls.
    pub fn entries(&self) -> f64 {
        self.entries
    }

    fn moments(&self) -> (f64, f64, f64, f64, f64) {
        if let Some(s) = self.stats.filter(|s| s.sumw != 0.0) {
            return (s.sumw, s.sumwx, s.sumwx2, s.sumwy, s.sumwy2);
        }
        let mut acc = (0.0, 0.0, 0.0, 0.0, 0.0);
        for iy in 1..=self.y_axis.bins() {
            for ix in 1..=self.x_axis.bins() {
                let c = self.bin_content(ix, iy);
                let (x, y) = (self.x_axis.bin_center(ix), self.y_axis.bin_center(iy));
                acc.0 += c;
                acc.1 += c * x;
                acc.2 += c * x * x;
                acc.3 += c * y;
                acc.4 += c * y * y;
            }
        }
        acc
    }

    /// Mean along x.
    pub fn mean_x(&self) -> f64 {
        let (w, wx, ..) = self.moments();
        if w == 0.0 {
            0.0
        } else {
            wx / w
        }
    }

    /// Mean along y.
    pub fn mean_y(&self) -> f64 {
        let (w, _, _, wy, _) = self.moments();
        if w == 0.0 {
            0.0
        } else {
            wy / w
        }
    }

    /// Standard deviation along x.
    pub fn rms_x(&self) -> f64 {
        let (w, wx, wx2, ..) = self.moments();
        if w == 0.0 {
            return 0.0;
        }
        let mean = wx / w;
        (wx2 / w - mean * mean).abs().sqrt()
    }
}

impl Binned for Histogram2D {
    fn contents(&self) -> &[f64] {
        &self.contents
    }

    fn sumw2(&self) -> &[f64] {
        &self.sumw2
    }

    fn axes(&self) -> Vec<Axis> {
        vec![self.x_axis, self.y_axis]
    }

    fn selected_bins(&self, underflow: bool, overflow: bool) -> Vec<usize> {
        let xs = bin_range(&self.x_axis, underflow, overflow);
        bin_range(&self.y_axis, underflow, overflow)
            .flat_map(|iy| xs.clone().map(move |ix| (ix, iy)))
            .map(|(ix, iy)| self.bin(ix, iy))
            .collect()
    }

    fn entries(&self) -> f64 {
        self.entries
    }
}
