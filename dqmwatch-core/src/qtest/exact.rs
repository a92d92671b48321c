//! Exact comparison against the reference.

use dqmwatch_types::{Binned, MonitorObject};

use super::{
    require_reference, ConfigurableTest, Evaluation, QTestError, QualityTest, QualityTestSettings,
};
use crate::config::ConfigElement;
use crate::element::MonitorElement;
use crate::error::Result;

/// Bin-by-bin, point-by-point or value equality with the reference.
///
/// Parameters: `CompareUnderflow`, `CompareOverflow` (default true).
#[derive(Debug, Clone)]
pub struct ExactRefCompareTest {
    settings: QualityTestSettings,
    compare_underflow: bool,
    compare_overflow: bool,
}

impl ExactRefCompareTest {
    fn judge(&self, compared: usize, differences: usize) -> Evaluation {
        if differences == 0 {
            return Evaluation::new(1.0, true).with_extra("nDifferences", 0.0);
        }
        let quality = if compared == 0 {
            0.0
        } else {
            self.error_limit() * (compared - differences) as f64 / compared as f64
        };
        Evaluation::new(quality, false)
            .with_message(format!("{differences} of {compared} value(s) differ from the reference"))
            .with_extra("nDifferences", differences as f64)
    }

    fn compare_binned(&self, object: &dyn Binned, reference: &dyn Binned) -> Result<Evaluation, QTestError> {
        if !object.same_binning(reference) {
            return Err(QTestError::invalid("reference binning differs from the object binning"));
        }
        let (values, expected) = (object.contents(), reference.contents());
        let bins = object.selected_bins(self.compare_underflow, self.compare_overflow);
        let differences = bins.iter().filter(|&&bin| values[bin] != expected[bin]).count();
        Ok(self.judge(bins.len(), differences))
    }
}

impl QualityTest for ExactRefCompareTest {
    fn settings(&self) -> &QualityTestSettings {
        &self.settings
    }

    fn description(&self) -> &str {
        "Compares the object with its reference bin by bin, point by point or by value. \
         The test succeeds only if both are identical."
    }

    fn evaluate(&self, element: &MonitorElement) -> Result<Evaluation, QTestError> {
        let object = element.object();
        let reference = require_reference(element)?;
        if object.class_name() != reference.class_name() {
            return Err(QTestError::invalid(format!(
                "reference of type {} cannot be compared to an object of type {}",
                reference.class_name(),
                object.class_name()
            )));
        }

        match (object, reference) {
            (MonitorObject::Histogram1D(a), MonitorObject::Histogram1D(b)) => self.compare_binned(a, b),
            (MonitorObject::Histogram2D(a), MonitorObject::Histogram2D(b)) => self.compare_binned(a, b),
            (MonitorObject::Graph(a), MonitorObject::Graph(b)) => {
                if a.len() != b.len() {
                    return Err(QTestError::invalid(format!(
                        "reference has {} point(s), object has {}",
                        b.len(),
                        a.len()
                    )));
                }
                let differences = a.points.iter().zip(&b.points).filter(|(p, q)| p != q).count();
                Ok(self.judge(a.len(), differences))
            }
            (MonitorObject::Graph2D(a), MonitorObject::Graph2D(b)) => {
                if a.len() != b.len() {
                    return Err(QTestError::invalid(format!(
                        "reference has {} point(s), object has {}",
                        b.len(),
                        a.len()
                    )));
                }
                let differences = a.points.iter().zip(&b.points).filter(|(p, q)| p != q).count();
                Ok(self.judge(a.len(), differences))
            }
            (MonitorObject::Scalar(a), MonitorObject::Scalar(b)) => {
                if a.value == b.value {
                    Ok(Evaluation::new(1.0, true))
                } else {
                    Ok(Evaluation::new(0.0, false)
                        .with_message(format!("value {} differs from reference {}", a.value, b.value)))
                }
            }
            _ => Err(QTestError::internal("object kinds diverge despite equal class names")),
        }
    }
}

impl ConfigurableTest for ExactRefCompareTest {
    const TYPE_NAME: &'static str = "ExactRefCompareTest";

    fn read_settings(settings: QualityTestSettings, config: &ConfigElement) -> Result<Self> {
        Ok(Self {
            settings,
            compare_underflow: config.flag("CompareUnderflow", true)?,
            compare_overflow: config.flag("CompareOverflow", true)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qtest::{execute, BuiltinFactory, QualityTestFactory};
    use dqmwatch_types::{Axis, BinPrecision, Graph, Histogram1D, Scalar, Verdict};

    fn create(config: ConfigElement) -> std::sync::Arc<dyn QualityTest> {
        BuiltinFactory::<ExactRefCompareTest>::new().create(&config).unwrap()
    }

    fn qtest() -> std::sync::Arc<dyn QualityTest> {
        create(ConfigElement::qtest("exact", "ExactRefCompareTest"))
    }

    fn histogram(name: &str, nbins: u32, precision: BinPrecision) -> Histogram1D {
        let mut h = Histogram1D::with_precision(name, "", Axis::new(nbins, 0.0, 99.0), precision);
        for i in 0..50 {
            h.fill(i as f64 * 1.7);
        }
        h
    }

    fn run(object: MonitorObject, reference: Option<MonitorObject>) -> dqmwatch_types::QualityReport {
        let mut element = MonitorElement::new(object);
        if let Some(reference) = reference {
            element.set_reference(reference);
        }
        execute(qtest().as_ref(), "/", &element).unwrap()
    }

    // ========================================================================
    // Histogram Tests
    // ========================================================================

    #[test]
    fn identical_histograms_succeed() {
        let h = histogram("h", 100, BinPrecision::Float);
        let report = run(h.clone().into(), Some(h.into()));
        assert_eq!(report.verdict, Verdict::Success);
        assert_eq!(report.quality, Some(1.0));
    }

    #[test]
    fn missing_reference_is_invalid() {
        let report = run(histogram("h", 100, BinPrecision::Float).into(), None);
        assert_eq!(report.verdict, Verdict::Invalid);
        assert_eq!(report.quality, None);
    }

    #[test]
    fn different_binning_is_invalid() {
        let report = run(
            histogram("h", 100, BinPrecision::Float).into(),
            Some(histogram("h", 110, BinPrecision::Float).into()),
        );
        assert_eq!(report.verdict, Verdict::Invalid);
    }

    #[test]
    fn different_precision_is_invalid() {
        let report = run(
            histogram("h", 100, BinPrecision::Float).into(),
            Some(histogram("h", 100, BinPrecision::Double).into()),
        );
        assert_eq!(report.verdict, Verdict::Invalid);
    }

    #[test]
    fn different_contents_are_error() {
        let h = histogram("h", 100, BinPrecision::Float);
        let mut reference = h.clone();
        reference.fill(42.0);
        let report = run(h.into(), Some(reference.into()));
        assert_eq!(report.verdict, Verdict::Error);
        assert!(report.success);
        assert_eq!(report.extra.get("nDifferences"), Some(&1.0));
        let expected = 0.05 * 101.0 / 102.0;
        assert!((report.quality.unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn overflow_can_be_ignored() {
        let h = histogram("h", 100, BinPrecision::Float);
        let mut reference = h.clone();
        reference.fill(1000.0);
        let element = {
            let mut e = MonitorElement::new(h.into());
            e.set_reference(reference.into());
            e
        };
        let test = create(
            ConfigElement::qtest("exact", "ExactRefCompareTest").with_parameter("CompareOverflow", false),
        );
        let report = execute(test.as_ref(), "/", &element).unwrap();
        assert_eq!(report.verdict, Verdict::Success);
        assert!(!qtest().evaluate(&element).unwrap().passed);
    }

    // ========================================================================
    // Graph and Scalar Tests
    // ========================================================================

    #[test]
    fn graphs_compare_point_by_point() {
        let g = Graph::new("g", "").with_point(0.0, 1.0).with_point(1.0, 2.0);
        assert_eq!(run(g.clone().into(), Some(g.clone().into())).verdict, Verdict::Success);

        let shifted = Graph::new("g", "").with_point(0.0, 1.0).with_point(1.0, 2.5);
        assert_eq!(run(g.clone().into(), Some(shifted.into())).verdict, Verdict::Error);

        let shorter = Graph::new("g", "").with_point(0.0, 1.0);
        assert_eq!(run(g.into(), Some(shorter.into())).verdict, Verdict::Invalid);
    }

    #[test]
    fn scalars_compare_by_value_and_type() {
        let report = run(Scalar::int("s", 42).into(), Some(Scalar::int("s", 42).into()));
        assert_eq!(report.verdict, Verdict::Success);

        let report = run(Scalar::int("s", 42).into(), Some(Scalar::int("s", 45).into()));
        assert_eq!(report.verdict, Verdict::Error);

        let report = run(Scalar::int("s", 42).into(), Some(Scalar::float("s", 42.0).into()));
        assert_eq!(report.verdict, Verdict::Invalid);
    }
}
