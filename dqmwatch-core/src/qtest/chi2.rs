//! Chi-square comparison of two histograms.

use core::fmt;
use std::str::FromStr;

use dqmwatch_types::Binned;

use super::{
    require_reference, ConfigurableTest, Evaluation, QTestError, QualityTest, QualityTestSettings,
};
use crate::config::ConfigElement;
use crate::element::MonitorElement;
use crate::error::{DqmError, Result};
use crate::stats;

/// How the bin contents of the two histograms are weighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComparisonType {
    /// Both histograms are unweighted counts.
    #[default]
    UU,
    /// Object unweighted, reference weighted.
    UW,
    /// Both weighted.
    WW,
    /// Unweighted counts compared after normalizing both to unit area.
    Norm,
}

impl fmt::Display for ComparisonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ComparisonType::UU => "UU",
            ComparisonType::UW => "UW",
            ComparisonType::WW => "WW",
            ComparisonType::Norm => "NORM",
        })
    }
}

impl FromStr for ComparisonType {
    type Err = DqmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "UU" => Ok(ComparisonType::UU),
            "UW" => Ok(ComparisonType::UW),
            "WW" => Ok(ComparisonType::WW),
            "NORM" => Ok(ComparisonType::Norm),
            other => Err(DqmError::invalid(format!("unknown comparison type '{other}'"))),
        }
    }
}

struct Sample<'a> {
    contents: &'a [f64],
    sumw2: &'a [f64],
    total: f64,
    total_w2: f64,
}

impl<'a> Sample<'a> {
    fn new(h: &'a dyn Binned, bins: &[usize]) -> Self {
        let (contents, sumw2) = (h.contents(), h.sumw2());
        Self {
            contents,
            sumw2,
            total: bins.iter().map(|&b| contents[b]).sum(),
            total_w2: bins.iter().map(|&b| sumw2[b]).sum(),
        }
    }
}

/// Chi-square statistic and number of contributing bins.
fn chi2_statistic(kind: ComparisonType, a: &Sample, b: &Sample, bins: &[usize]) -> (f64, usize) {
    let (n1, n2) = (a.total, b.total);
    let mut chi2 = 0.0;
    let mut used = 0;
    for &bin in bins {
        let (c1, c2) = (a.contents[bin], b.contents[bin]);
        let (e1sq, e2sq) = (a.sumw2[bin], b.sumw2[bin]);
        match kind {
            ComparisonType::UU => {
                if c1 + c2 <= 0.0 {
                    continue;
                }
                let delta = n2 * c1 - n1 * c2;
                chi2 += delta * delta / (c1 + c2);
            }
            ComparisonType::UW => {
                if c1 == 0.0 && c2 == 0.0 && e2sq == 0.0 {
                    continue;
                }
                // Empty weighted bin: assume the average weight.
                let e2sq = if e2sq > 0.0 { e2sq } else { b.total_w2 / n2 };
                let var1 = n2 * c2 - n1 * e2sq;
                let var2 = var1 * var1 + 4.0 * n2 * n2 * c1 * e2sq;
                let probability = (var1 + var2.sqrt()) / (2.0 * n2 * n2);
                if probability <= 0.0 {
                    continue;
                }
                let (expected1, expected2) = (probability * n1, probability * n2);
                chi2 += (c1 - expected1).powi(2) / expected1 + (c2 - expected2).powi(2) / e2sq;
            }
            ComparisonType::WW => {
                let sigma = n1 * n1 * e2sq + n2 * n2 * e1sq;
                if sigma <= 0.0 {
                    continue;
                }
                let delta = n2 * c1 - n1 * c2;
                chi2 += delta * delta / sigma;
            }
            ComparisonType::Norm => {
                let sigma = c1 / (n1 * n1) + c2 / (n2 * n2);
                if sigma <= 0.0 {
                    continue;
                }
                chi2 += (c1 / n1 - c2 / n2).powi(2) / sigma;
            }
        }
        used += 1;
    }
    if kind == ComparisonType::UU {
        chi2 /= n1 * n2;
    }
    (chi2, used)
}

/// Chi-square goodness of fit between the object and its reference.
///
/// Parameters: `ComparisonType` (`UU`, `UW`, `WW`, `NORM`, default `UU`),
/// `UseUnderflow`, `UseOverflow` (default false). The quality is the
/// upper-tail probability of the statistic.
#[derive(Debug, Clone)]
pub struct Chi2Test {
    settings: QualityTestSettings,
    comparison: ComparisonType,
    use_underflow: bool,
    use_overflow: bool,
}

impl QualityTest for Chi2Test {
    fn settings(&self) -> &QualityTestSettings {
        &self.settings
    }

    fn description(&self) -> &str {
        "Performs a chi-square test between a histogram and its reference and reports \
         the p-value. Suited to binned data."
    }

    fn evaluate(&self, element: &MonitorElement) -> Result<Evaluation, QTestError> {
        let reference = require_reference(element)?;
        let (Some(object), Some(reference)) = (element.object().as_binned(), reference.as_binned()) else {
            return Err(QTestError::invalid("both the object and the reference must be histograms"));
        };
        if !object.same_binning(reference) {
            return Err(QTestError::invalid("reference binning differs from the object binning"));
        }

        let bins = object.selected_bins(self.use_underflow, self.use_overflow);
        let (a, b) = (Sample::new(object, &bins), Sample::new(reference, &bins));
        if a.total <= 0.0 || b.total <= 0.0 {
            return Err(QTestError::invalid("cannot compare an empty histogram"));
        }

        let (chi2, used) = chi2_statistic(self.comparison, &a, &b, &bins);
        if used < 2 {
            return Err(QTestError::invalid("fewer than two non-empty bins to compare"));
        }
        let ndf = (used - 1) as f64;
        let quality = stats::chi2_prob(chi2, ndf);
        Ok(Evaluation::threshold(quality, self.error_limit())
            .with_message(format!("chi2/ndf = {chi2:.4}/{ndf}"))
            .with_extra("chi2", chi2)
            .with_extra("ndf", ndf))
    }
}

impl ConfigurableTest for Chi2Test {
    const TYPE_NAME: &'static str = "Chi2Test";

    fn read_settings(settings: QualityTestSettings, config: &ConfigElement) -> Result<Self> {
        Ok(Self {
            settings,
            comparison: config.parameter_or("ComparisonType", ComparisonType::UU)?,
            use_underflow: config.flag("UseUnderflow", false)?,
            use_overflow: config.flag("UseOverflow", false)?,
        })
    }
}
