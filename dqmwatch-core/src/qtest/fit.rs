//! Fit of the object and range check of one fitted parameter.

use super::{ConfigurableTest, Evaluation, QTestError, QualityTest, QualityTestSettings};
use crate::config::ConfigElement;
use crate::element::MonitorElement;
use crate::error::{DqmError, Result};
use crate::fitter::{self, FitData, FitError, FitMethod, FitOptions};
use crate::formula::Formula;

/// Fits the object with `FitFormula` and checks that parameter
/// `TestParameter` lies in `[DeviationLower, DeviationUpper]`.
///
/// With `ExpectedValue` set, the window applies to the ratio
/// `value / ExpectedValue` instead of the raw value.
#[derive(Debug, Clone)]
pub struct FitParamInRangeTest {
    settings: QualityTestSettings,
    formula: Formula,
    test_parameter: usize,
    lower: f64,
    upper: f64,
    expected: Option<f64>,
    guess: Vec<f64>,
    options: FitOptions,
}

impl QualityTest for FitParamInRangeTest {
    fn settings(&self) -> &QualityTestSettings {
        &self.settings
    }

    fn description(&self) -> &str {
        "Fits the object with a user formula and checks that one of the fitted parameters \
         lies within the configured window."
    }

    fn evaluate(&self, element: &MonitorElement) -> Result<Evaluation, QTestError> {
        let data = FitData::from_object(element.object(), self.options.range).map_err(fit_error)?;
        let guess = if self.guess.is_empty() {
            fitter::initial_guess(&self.formula, &data)
        } else {
            self.guess.clone()
        };

        let result = fitter::fit(&self.formula, &data, &guess, &self.options).map_err(fit_error)?;
        let value = result.parameters[self.test_parameter];
        let error = result.errors.get(self.test_parameter).copied().unwrap_or(0.0);

        let tested = match self.expected {
            Some(expected) => value / expected,
            None => value,
        };
        let passed = self.lower <= tested && tested <= self.upper;
        let message = format!(
            "parameter {} = {value} +/- {error}, {} [{}, {}]",
            self.test_parameter,
            if passed { "within" } else { "outside" },
            self.lower,
            self.upper
        );
        Ok(Evaluation::new(if passed { 1.0 } else { 0.0 }, passed)
            .with_message(message)
            .with_extra("value", value)
            .with_extra("error", error)
            .with_extra("chi2", result.chi2)
            .with_extra("ndf", result.ndf as f64))
    }
}

fn fit_error(err: FitError) -> QTestError {
    match err {
        FitError::NotFinite => QTestError::internal(err.to_string()),
        _ => QTestError::invalid(err.to_string()),
    }
}

impl ConfigurableTest for FitParamInRangeTest {
    const TYPE_NAME: &'static str = "FitParamInRangeTest";

    fn read_settings(settings: QualityTestSettings, config: &ConfigElement) -> Result<Self> {
        let source: String = config.required_parameter("FitFormula")?;
        let formula = Formula::parse(&source)
            .map_err(|err| DqmError::invalid(format!("qtest '{}': bad FitFormula '{source}': {err}", settings.name)))?;

        let range: Vec<f64> = config.vector_parameter("FunctionRange")?.unwrap_or_default();
        let range = match range[..] {
            [] => None,
            [min, max] if min < max => Some((min, max)),
            _ => {
                return Err(DqmError::invalid(format!(
                    "qtest '{}': FunctionRange needs two increasing values",
                    settings.name
                )))
            }
        };
        let method = match (
            config.flag("UseLoglikelihood", false)?,
            config.flag("UsePearsonChi2", false)?,
        ) {
            (true, _) => FitMethod::Likelihood,
            (false, true) => FitMethod::Pearson,
            (false, false) => FitMethod::Neyman,
        };

        Ok(Self {
            test_parameter: config.required_parameter("TestParameter")?,
            lower: config.required_parameter("DeviationLower")?,
            upper: config.required_parameter("DeviationUpper")?,
            expected: config.parameter("ExpectedValue")?,
            guess: config.vector_parameter("GuessParameters")?.unwrap_or_default(),
            options: FitOptions {
                method,
                improve: config.flag("ImproveFitResult", false)?,
                range,
                ..Default::default()
            },
            formula,
            settings,
        })
    }

    fn init(&mut self) -> Result<()> {
        let name = &self.settings.name;
        let npar = self.formula.npar();
        if self.test_parameter >= npar {
            return Err(DqmError::invalid(format!(
                "qtest '{name}': TestParameter {} but '{}' has {npar} parameter(s)",
                self.test_parameter,
                self.formula.source()
            )));
        }
        if self.guess.len() > npar {
            return Err(DqmError::invalid(format!(
                "qtest '{name}': {} guess parameter(s) for {npar} parameter(s)",
                self.guess.len()
            )));
        }
        if self.lower > self.upper {
            return Err(DqmError::invalid(format!(
                "qtest '{name}': DeviationLower {} is above DeviationUpper {}",
                self.lower, self.upper
            )));
        }
        if self.expected == Some(0.0) {
            return Err(DqmError::invalid(format!("qtest '{name}': ExpectedValue must not be zero")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qtest::{execute, BuiltinFactory, QualityTestFactory};
    use crate::StatusCode;
    use dqmwatch_types::{Axis, BinPrecision, Graph, Graph2D, Histogram1D, MonitorObject, QualityReport, Verdict};
    use std::sync::Arc;

    fn config(formula: &str, parameter: usize, lower: f64, upper: f64) -> ConfigElement {
        ConfigElement::qtest("fit", "FitParamInRangeTest")
            .with_parameter("FitFormula", formula)
            .with_parameter("TestParameter", parameter)
            .with_parameter("DeviationLower", lower)
            .with_parameter("DeviationUpper", upper)
    }

    fn create(config: &ConfigElement) -> Result<Arc<dyn QualityTest>> {
        BuiltinFactory::<FitParamInRangeTest>::new().create(config)
    }

    fn run(config: ConfigElement, object: MonitorObject) -> QualityReport {
        let test = create(&config).unwrap();
        execute(test.as_ref(), "/", &MonitorElement::new(object)).unwrap()
    }

    fn gaussian() -> MonitorObject {
        let mut h = Histogram1D::with_precision("h", "", Axis::new(101, -10.0, 10.0), BinPrecision::Double);
        for bin in 1..=101 {
            let x = h.bin_center(bin);
            h.set_bin_content(bin, 1000.0 * (-0.5 * x * x).exp());
        }
        h.into()
    }

    fn line() -> MonitorObject {
        (0..100)
            .fold(Graph::new("g", ""), |g, i| {
                let x = i as f64;
                g.with_point(x, 0.7 * x + if i % 2 == 0 { 0.01 } else { -0.01 })
            })
            .into()
    }

    // ========================================================================
    // Creation Tests
    // ========================================================================

    #[test]
    fn bad_formula_fails_creation() {
        let err = create(&config("dfgaus(0)", 1, -0.5, 0.5)).unwrap_err();
        assert_eq!(err.code(), StatusCode::InvalidParameter);
    }

    #[test]
    fn parameter_index_out_of_range_fails_creation() {
        let err = create(&config("gaus(0)", 5, -0.5, 0.5)).unwrap_err();
        assert_eq!(err.code(), StatusCode::InvalidParameter);
        assert!(create(&config("gaus(0)", 2, -0.5, 0.5)).is_ok());
    }

    #[test]
    fn oversized_parameter_sets_fail_creation() {
        for formula in ["[18446744073709551615]", "[0]+[99999999]*0", "pol1000", "gaus(99)"] {
            let err = create(&config(formula, 0, -1.0, 1.0)).unwrap_err();
            assert_eq!(err.code(), StatusCode::InvalidParameter, "{formula}");
        }
    }

    #[test]
    fn missing_parameters_fail_creation() {
        let config = ConfigElement::qtest("fit", "FitParamInRangeTest").with_parameter("FitFormula", "pol1");
        assert_eq!(create(&config).unwrap_err().code(), StatusCode::NotFound);
    }

    #[test]
    fn empty_vectors_are_ignored() {
        let config = config("gaus", 1, -0.5, 0.5)
            .with_parameter("GuessParameters", "")
            .with_parameter("FunctionRange", "");
        assert!(create(&config).is_ok());
    }

    // ========================================================================
    // Evaluation Tests
    // ========================================================================

    #[test]
    fn gaussian_mean_in_range() {
        let report = run(config("gaus(0)", 1, -0.5, 0.5), gaussian());
        assert_eq!(report.verdict, Verdict::Success);
        assert_eq!(report.quality, Some(1.0));
        assert!(report.extra["value"].abs() < 1e-3);

        let report = run(config("gaus(0)", 1, 0.5, 1.0), gaussian());
        assert_eq!(report.verdict, Verdict::Error);
        assert_eq!(report.quality, Some(0.0));
    }

    #[test]
    fn relative_window_on_expected_value() {
        let config = config("gaus(0)", 0, 0.99, 1.01).with_parameter("ExpectedValue", 1000.0);
        assert_eq!(run(config, gaussian()).verdict, Verdict::Success);
    }

    #[test]
    fn graph_slope_in_range() {
        assert_eq!(run(config("[0]*x+[1]", 0, 0.6, 0.8), line()).verdict, Verdict::Success);
        assert_eq!(run(config("pol1", 1, -0.1, 0.1), line()).verdict, Verdict::Success);
        assert_eq!(run(config("pol1", 1, 0.5, 1.0), line()).verdict, Verdict::Error);
    }

    #[test]
    fn loglikelihood_and_range_options() {
        let config = config("gaus", 1, -0.5, 0.5)
            .with_parameter("UseLoglikelihood", true)
            .with_parameter("ImproveFitResult", true)
            .with_parameter("FunctionRange", "-4 4");
        assert_eq!(run(config, gaussian()).verdict, Verdict::Success);
    }

    #[test]
    fn graph2d_surface() {
        let mut g = Graph2D::new("g", "");
        for i in 0..10 {
            for j in 0..10 {
                let (x, y) = (i as f64, j as f64);
                g.push(x, y, 0.7 * x * y + 3.0);
            }
        }
        let report = run(config("[0]*x*y+[1]", 0, 0.65, 0.75), g.into());
        assert_eq!(report.verdict, Verdict::Success);
    }

    #[test]
    fn empty_object_is_invalid() {
        let report = run(config("pol0", 0, 0.0, 1.0), Graph::new("g", "").into());
        assert_eq!(report.verdict, Verdict::Invalid);
    }
}
