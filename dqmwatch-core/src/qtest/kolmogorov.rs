//! Kolmogorov-Smirnov comparison with the reference.

use dqmwatch_types::{Binned, MonitorObject};

use super::{
    require_reference, ConfigurableTest, Evaluation, QTestError, QualityTest, QualityTestSettings,
};
use crate::config::ConfigElement;
use crate::element::MonitorElement;
use crate::error::Result;
use crate::stats;

/// Maximum distance between the cumulative distributions of two sorted
/// samples.
fn unbinned_distance(a: &[f64], b: &[f64]) -> f64 {
    let (rna, rnb) = (1.0 / a.len() as f64, 1.0 / b.len() as f64);
    let (mut ia, mut ib) = (0, 0);
    let mut diff: f64 = 0.0;
    let mut dmax: f64 = 0.0;
    while ia < a.len() && ib < b.len() {
        if a[ia] < b[ib] {
            diff -= rna;
            ia += 1;
        } else if a[ia] > b[ib] {
            diff += rnb;
            ib += 1;
        } else {
            let x = a[ia];
            while ia < a.len() && a[ia] == x {
                diff -= rna;
                ia += 1;
            }
            while ib < b.len() && b[ib] == x {
                diff += rnb;
                ib += 1;
            }
        }
        dmax = dmax.max(diff.abs());
    }
    dmax
}

/// Effective number of entries, `sum^2 / sum(w^2)`.
fn effective_entries(sum: f64, sumw2: f64) -> f64 {
    if sumw2 > 0.0 {
        sum * sum / sumw2
    } else {
        sum
    }
}

/// Kolmogorov-Smirnov test between the object and its reference.
///
/// Parameters: `UseUnderflow`, `UseOverflow` (default false, histograms
/// only). Graphs are compared on their sorted y values; histograms on their
/// binned cumulative distributions, which only approximates the test.
#[derive(Debug, Clone)]
pub struct KolmogorovTest {
    settings: QualityTestSettings,
    use_underflow: bool,
    use_overflow: bool,
}

impl KolmogorovTest {
    fn compare_binned(&self, object: &dyn Binned, reference: &dyn Binned) -> Result<Evaluation, QTestError> {
        if object.axes().len() != 1 {
            return Err(QTestError::invalid("only one-dimensional histograms are supported"));
        }
        if !object.same_binning(reference) {
            return Err(QTestError::invalid("reference binning differs from the object binning"));
        }
        let bins = object.selected_bins(self.use_underflow, self.use_overflow);
        let sums = |h: &dyn Binned| {
            let (c, w2) = (h.contents(), h.sumw2());
            bins.iter()
                .fold((0.0, 0.0), |(s, s2), &bin| (s + c[bin], s2 + w2[bin]))
        };
        let ((sum1, w1), (sum2, w2)) = (sums(object), sums(reference));
        if sum1 <= 0.0 || sum2 <= 0.0 {
            return Err(QTestError::invalid("cannot compare an empty histogram"));
        }

        let (c1, c2) = (object.contents(), reference.contents());
        let (mut cdf1, mut cdf2, mut dmax) = (0.0, 0.0, 0.0f64);
        for &bin in &bins {
            cdf1 += c1[bin] / sum1;
            cdf2 += c2[bin] / sum2;
            dmax = dmax.max((cdf1 - cdf2).abs());
        }
        let (n1, n2) = (effective_entries(sum1, w1), effective_entries(sum2, w2));
        Ok(self.judge(dmax, n1, n2).with_message(
            "the Kolmogorov test is meant for unbinned data, interpret histogram results with care",
        ))
    }

    fn judge(&self, distance: f64, n1: f64, n2: f64) -> Evaluation {
        let z = distance * (n1 * n2 / (n1 + n2)).sqrt();
        let quality = stats::kolmogorov_prob(z);
        Evaluation::threshold(quality, self.error_limit()).with_extra("distance", distance)
    }
}

impl QualityTest for KolmogorovTest {
    fn settings(&self) -> &QualityTestSettings {
        &self.settings
    }

    fn description(&self) -> &str {
        "Performs the Kolmogorov-Smirnov test between an object and its reference and reports \
         the p-value. Intended for graphs; histograms are accepted with reduced accuracy."
    }

    fn evaluate(&self, element: &MonitorElement) -> Result<Evaluation, QTestError> {
        let object = element.object();
        let reference = require_reference(element)?;
        if object.class_name() != reference.class_name() {
            return Err(QTestError::invalid(format!(
                "the object ({}) and the reference ({}) must be of the same type",
                object.class_name(),
                reference.class_name()
            )));
        }

        match (object, reference) {
            (MonitorObject::Histogram1D(a), MonitorObject::Histogram1D(b)) => self.compare_binned(a, b),
            (MonitorObject::Histogram2D(a), MonitorObject::Histogram2D(b)) => self.compare_binned(a, b),
            (MonitorObject::Graph(a), MonitorObject::Graph(b)) => {
                if a.is_empty() || b.is_empty() {
                    return Err(QTestError::invalid("one or more of the graphs are empty"));
                }
                let (mut ya, mut yb) = (a.y_values(), b.y_values());
                ya.sort_by(f64::total_cmp);
                yb.sort_by(f64::total_cmp);
                let distance = unbinned_distance(&ya, &yb);
                Ok(self.judge(distance, ya.len() as f64, yb.len() as f64))
            }
            _ => Err(QTestError::invalid(format!(
                "objects of type {} are not supported",
                object.class_name()
            ))),
        }
    }
}

impl ConfigurableTest for KolmogorovTest {
    const TYPE_NAME: &'static str = "KolmogorovTest";

    fn read_settings(settings: QualityTestSettings, config: &ConfigElement) -> Result<Self> {
        Ok(Self {
            settings,
            use_underflow: config.flag("UseUnderflow", false)?,
            use_overflow: config.flag("UseOverflow", false)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qtest::{execute, BuiltinFactory, QualityTestFactory};
    use dqmwatch_types::{Axis, Graph, Histogram1D, Scalar, Verdict};
    use std::sync::Arc;

    fn qtest() -> Arc<dyn QualityTest> {
        BuiltinFactory::<KolmogorovTest>::new()
            .create(&ConfigElement::qtest("ks", "KolmogorovTest"))
            .unwrap()
    }

    fn run(object: MonitorObject, reference: MonitorObject) -> dqmwatch_types::QualityReport {
        let mut element = MonitorElement::new(object);
        element.set_reference(reference);
        execute(qtest().as_ref(), "/", &element).unwrap()
    }

    fn graph(values: impl IntoIterator<Item = f64>) -> Graph {
        values
            .into_iter()
            .enumerate()
            .fold(Graph::new("g", ""), |g, (i, y)| g.with_point(i as f64, y))
    }

    #[test]
    fn unbinned_distance_of_disjoint_samples_is_one() {
        assert_eq!(unbinned_distance(&[1.0, 2.0], &[3.0, 4.0]), 1.0);
        assert_eq!(unbinned_distance(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
        assert!((unbinned_distance(&[1.0, 2.0, 3.0, 4.0], &[3.0, 4.0]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn identical_graphs_succeed() {
        let g = graph((0..50).map(|i| (i as f64 * 0.37).sin()));
        let report = run(g.clone().into(), g.into());
        assert_eq!(report.verdict, Verdict::Success);
        assert_eq!(report.quality, Some(1.0));
        assert_eq!(report.extra.get("distance"), Some(&0.0));
    }

    #[test]
    fn shifted_graph_is_error() {
        let a = graph((0..50).map(|i| i as f64));
        let b = graph((0..50).map(|i| i as f64 + 40.0));
        let report = run(a.into(), b.into());
        assert_eq!(report.verdict, Verdict::Error);
        assert!(report.quality.unwrap() < 0.05);
    }

    #[test]
    fn histograms_use_binned_distance() {
        let mut h = Histogram1D::new("h", "", Axis::new(10, 0.0, 10.0));
        for i in 0..100 {
            h.fill((i % 10) as f64 + 0.5);
        }
        let report = run(h.clone().into(), h.clone().into());
        assert_eq!(report.verdict, Verdict::Success);
        assert!(!report.message.is_empty());

        let mut skewed = Histogram1D::new("h", "", Axis::new(10, 0.0, 10.0));
        for _ in 0..100 {
            skewed.fill(9.5);
        }
        assert_eq!(run(h.into(), skewed.into()).verdict, Verdict::Error);
    }

    #[test]
    fn mixed_kinds_are_invalid() {
        let g = graph([1.0, 2.0, 3.0]);
        let mut h = Histogram1D::new("h", "", Axis::new(3, 0.0, 3.0));
        h.fill(1.5);
        assert_eq!(run(g.clone().into(), h.into()).verdict, Verdict::Invalid);
        assert_eq!(run(g.into(), Graph::new("g", "").into()).verdict, Verdict::Invalid);
        assert_eq!(
            run(Scalar::int("s", 1).into(), Scalar::int("s", 1).into()).verdict,
            Verdict::Invalid
        );
    }
}
