//! Comparison of a computed property with expected bounds.

use core::fmt;
use std::str::FromStr;

use super::{ConfigurableTest, Evaluation, QTestError, QualityTest, QualityTestSettings};
use crate::analysis::Property;
use crate::config::ConfigElement;
use crate::element::MonitorElement;
use crate::error::{DqmError, Result};
use crate::stats;

/// How the computed value is compared with the bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// `DeviationLower < value < DeviationUpper`.
    #[default]
    WithinRange,
    /// `value < DeviationUpper`.
    LowerThan,
    /// `value > DeviationLower`.
    HigherThan,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::WithinRange => "WithinRange",
            Method::LowerThan => "LowerThan",
            Method::HigherThan => "HigherThan",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = DqmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "WithinRange" => Ok(Method::WithinRange),
            "LowerThan" => Ok(Method::LowerThan),
            "HigherThan" => Ok(Method::HigherThan),
            other => Err(DqmError::invalid(format!("unknown method '{other}'"))),
        }
    }
}

/// Checks that a property of the object (`Mean`, `RMS`, `Median`, ...) lies
/// in an expected range or beyond a bound.
///
/// The property and method names are kept as written in the configuration
/// and resolved when the test runs, so an unknown name yields an INVALID
/// report instead of failing creation.
#[derive(Debug, Clone)]
pub struct PropertyWithinExpectedTest {
    settings: QualityTestSettings,
    property: String,
    method: String,
    percentage: f64,
    expected: f64,
    lower: Option<f64>,
    upper: Option<f64>,
}

impl PropertyWithinExpectedTest {
    fn bound(&self, value: Option<f64>, name: &str) -> Result<f64, QTestError> {
        value.ok_or_else(|| QTestError::invalid(format!("parameter {name} is required by method {}", self.method)))
    }
}

impl QualityTest for PropertyWithinExpectedTest {
    fn settings(&self) -> &QualityTestSettings {
        &self.settings
    }

    fn description(&self) -> &str {
        "Computes a property of the object (mean, RMS, median, possibly truncated) and checks \
         that it lies within an expected range, or below or above a bound."
    }

    fn evaluate(&self, element: &MonitorElement) -> Result<Evaluation, QTestError> {
        let property = self
            .property
            .parse::<Property>()
            .map_err(|err| QTestError::invalid(err.to_string()))?;
        let method = self
            .method
            .parse::<Method>()
            .map_err(|_| QTestError::invalid(format!("unknown method '{}'", self.method)))?;

        let object = element.object();
        let value = property.compute(object, self.percentage).ok_or_else(|| {
            QTestError::invalid(format!(
                "property {property} is not defined for this {} object",
                object.class_name()
            ))
        })?;

        let evaluation = match method {
            Method::WithinRange => {
                let lower = self.bound(self.lower, "DeviationLower")?;
                let upper = self.bound(self.upper, "DeviationUpper")?;
                let width = (upper - lower).abs();
                let quality = if width > 0.0 {
                    stats::chi2_prob(((value - self.expected) / width).powi(2), 1.0)
                } else {
                    0.0
                };
                if lower < value && value < upper {
                    Evaluation::new(quality, true).with_message(format!(
                        "Within expected range: expected {}, got {value}",
                        self.expected
                    ))
                } else {
                    Evaluation::new(quality, false).with_message(format!(
                        "Out of expected range: expected {} in ]{lower}, {upper}[, got {value}",
                        self.expected
                    ))
                }
            }
            Method::LowerThan => {
                let upper = self.bound(self.upper, "DeviationUpper")?;
                if value < upper {
                    Evaluation::new(1.0, true)
                        .with_message(format!("Below expected value: expected < {upper}, got {value}"))
                } else {
                    Evaluation::new(0.0, false)
                        .with_message(format!("Above expected value: expected < {upper}, got {value}"))
                }
            }
            Method::HigherThan => {
                let lower = self.bound(self.lower, "DeviationLower")?;
                if value > lower {
                    Evaluation::new(1.0, true)
                        .with_message(format!("Above expected value: expected > {lower}, got {value}"))
                } else {
                    Evaluation::new(0.0, false)
                        .with_message(format!("Below expected value: expected > {lower}, got {value}"))
                }
            }
        };
        Ok(evaluation.with_extra("value", value))
    }
}

impl ConfigurableTest for PropertyWithinExpectedTest {
    const TYPE_NAME: &'static str = "PropertyWithinExpectedTest";

    fn read_settings(settings: QualityTestSettings, config: &ConfigElement) -> Result<Self> {
        Ok(Self {
            settings,
            property: config.required_parameter("Property")?,
            method: config.parameter_or("Method", Method::WithinRange.to_string())?,
            percentage: config.parameter_or("Percentage", 1.0)?,
            expected: config.parameter_or("ExpectedValue", 0.0)?,
            lower: config.parameter("DeviationLower")?,
            upper: config.parameter("DeviationUpper")?,
        })
    }

    fn init(&mut self) -> Result<()> {
        if !(self.percentage > 0.0 && self.percentage <= 1.0) {
            return Err(DqmError::invalid(format!(
                "qtest '{}': Percentage {} outside ]0, 1]",
                self.settings.name, self.percentage
            )));
        }
        if let (Some(lower), Some(upper)) = (self.lower, self.upper) {
            if lower > upper {
                return Err(DqmError::invalid(format!(
                    "qtest '{}': DeviationLower {lower} is above DeviationUpper {upper}",
                    self.settings.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qtest::{execute, BuiltinFactory, QualityTestFactory};
    use dqmwatch_types::{Axis, Graph, Histogram1D, MonitorObject, QualityReport, Scalar, Verdict};

    fn histogram() -> Histogram1D {
        let mut h = Histogram1D::new("h", "", Axis::new(21, 0.0, 21.0));
        for x in [2.0, 5.0, 6.0, 8.0, 8.0, 10.0, 10.0, 10.0, 10.0, 12.0, 12.0, 14.0, 15.0, 18.0] {
            h.fill(x + 0.5);
        }
        h
    }

    fn graph() -> Graph {
        [1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 3.0]
            .into_iter()
            .enumerate()
            .fold(Graph::new("g", ""), |g, (i, y)| g.with_point(i as f64, y))
    }

    fn config(property: &str, method: &str) -> ConfigElement {
        ConfigElement::qtest("prop", "PropertyWithinExpectedTest")
            .with_parameter("Property", property)
            .with_parameter("Method", method)
    }

    fn within(property: &str, expected: f64, lower: f64, upper: f64) -> ConfigElement {
        config(property, "WithinRange")
            .with_parameter("ExpectedValue", expected)
            .with_parameter("DeviationLower", lower)
            .with_parameter("DeviationUpper", upper)
    }

    fn run(config: ConfigElement, object: MonitorObject) -> QualityReport {
        let test = BuiltinFactory::<PropertyWithinExpectedTest>::new().create(&config).unwrap();
        execute(test.as_ref(), "/", &MonitorElement::new(object)).unwrap()
    }

    #[test]
    fn mean_within_range() {
        let report = run(within("Mean", 10.5, 8.5, 12.5), histogram().into());
        assert_eq!(report.verdict, Verdict::Success);
        assert!((report.extra["value"] - 10.5).abs() < 1e-9);
        assert!((report.quality.unwrap() - 1.0).abs() < 1e-9);

        let report = run(within("Mean", 20.0, 18.0, 22.0), histogram().into());
        assert_eq!(report.verdict, Verdict::Error);
        assert!(report.message.starts_with("Out of expected range"));
    }

    #[test]
    fn graph_properties() {
        let report = run(within("Mean", 2.5, 2.0, 3.0), graph().into());
        assert_eq!(report.verdict, Verdict::Success);
        assert_eq!(run(within("Mean", 5.0, 4.5, 5.5), graph().into()).verdict, Verdict::Error);
        assert_eq!(run(within("Median", 3.0, 2.5, 3.5), graph().into()).verdict, Verdict::Success);
    }

    #[test]
    fn bounds() {
        let lower_than = config("Mean", "LowerThan").with_parameter("DeviationUpper", 11.0);
        let report = run(lower_than, histogram().into());
        assert_eq!(report.verdict, Verdict::Success);
        assert_eq!(report.quality, Some(1.0));

        let higher_than = config("Mean", "HigherThan").with_parameter("DeviationLower", 11.0);
        let report = run(higher_than, histogram().into());
        assert_eq!(report.verdict, Verdict::Error);
        assert_eq!(report.quality, Some(0.0));
        assert!(report.message.starts_with("Below expected value"));
    }

    #[test]
    fn unknown_names_are_invalid() {
        let report = run(within("Skewness", 0.0, -1.0, 1.0), histogram().into());
        assert_eq!(report.verdict, Verdict::Invalid);
        assert_eq!(report.quality, None);

        let report = run(config("Mean", "Around").with_parameter("DeviationUpper", 1.0), histogram().into());
        assert_eq!(report.verdict, Verdict::Invalid);
    }

    #[test]
    fn missing_bound_or_property_is_invalid() {
        let report = run(config("Mean", "HigherThan"), histogram().into());
        assert_eq!(report.verdict, Verdict::Invalid);

        let report = run(within("Mean", 1.0, 0.0, 2.0), Scalar::int("s", 1).into());
        assert_eq!(report.verdict, Verdict::Invalid);
    }

    #[test]
    fn creation_checks() {
        let factory = BuiltinFactory::<PropertyWithinExpectedTest>::new();
        let no_property = ConfigElement::qtest("prop", "PropertyWithinExpectedTest");
        assert!(factory.create(&no_property).is_err());
        assert!(factory.create(&within("Mean", 0.0, 2.0, 1.0)).is_err());
        assert!(factory.create(&within("Mean", 0.0, 1.0, 2.0).with_parameter("Percentage", 1.5)).is_err());
    }
}
