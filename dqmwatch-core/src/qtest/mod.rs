//! Quality test abstraction and the built-in algorithms.
//!
//! A quality test is created once from configuration and is immutable
//! afterwards, so a single instance can be shared by many monitor elements
//! and run from several threads. Running a test on an element always yields
//! one [`QualityReport`] whose verdict follows a single protocol:
//!
//! - the test could not judge (no reference, mismatched shapes, unknown
//!   setting, disabled test) → `INVALID`, no quality
//! - the test judged and the criterion failed → `ERROR`
//! - the test judged and the criterion held → `SUCCESS`

mod chi2;
mod exact;
mod fit;
mod kolmogorov;
mod property;
mod registry;

pub use chi2::{Chi2Test, ComparisonType};
pub use exact::ExactRefCompareTest;
pub use fit::FitParamInRangeTest;
pub use kolmogorov::KolmogorovTest;
pub use property::{Method, PropertyWithinExpectedTest};
pub use registry::FactoryRegistry;

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use dqmwatch_types::{current_timestamp_ms, MonitorObject, QualityReport, Verdict};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ConfigElement;
use crate::element::MonitorElement;
use crate::error::{DqmError, Result};

/// Quality threshold used when `ErrorLimit` is not configured.
pub const DEFAULT_ERROR_LIMIT: f64 = 0.05;

/// Message of the report produced by a disabled test.
pub const DISABLED_MESSAGE: &str = "quality test is disabled";

/// Settings shared by every quality test.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityTestSettings {
    /// Unique name of the instance.
    pub name: String,
    /// Registered type name, e.g. `Chi2Test`.
    pub qtest_type: String,
    pub enabled: bool,
    /// Threshold below which a quality is an error.
    pub error_limit: f64,
}

impl QualityTestSettings {
    /// Read the `name`, `type` and `enabled` attributes and the `ErrorLimit`
    /// parameter.
    pub fn from_config(config: &ConfigElement) -> Result<Self> {
        let name = config.required_attribute("name")?.to_string();
        let qtest_type = config.required_attribute("type")?.to_string();
        let enabled = match config.attribute("enabled") {
            None => true,
            Some(text) => match text.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => true,
                "false" | "0" | "no" | "off" => false,
                other => {
                    return Err(DqmError::invalid(format!(
                        "qtest '{name}': invalid 'enabled' attribute '{other}'"
                    )))
                }
            },
        };
        let error_limit = config.parameter_or("ErrorLimit", DEFAULT_ERROR_LIMIT)?;
        if !(0.0..=1.0).contains(&error_limit) {
            return Err(DqmError::invalid(format!(
                "qtest '{name}': ErrorLimit {error_limit} outside [0, 1]"
            )));
        }
        Ok(Self {
            name,
            qtest_type,
            enabled,
            error_limit,
        })
    }
}

/// Result of a successful evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub quality: f64,
    pub passed: bool,
    pub message: String,
    pub extra: BTreeMap<String, f64>,
}

impl Evaluation {
    pub fn new(quality: f64, passed: bool) -> Self {
        Self {
            quality,
            passed,
            message: String::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Passed iff `quality >= limit`.
    pub fn threshold(quality: f64, limit: f64) -> Self {
        Self::new(quality, quality >= limit)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: f64) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Why an evaluation produced no judgement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QTestError {
    /// The test cannot meaningfully run on this input.
    #[error("{0}")]
    Invalid(String),

    /// Unexpected failure inside the algorithm.
    #[error("{0}")]
    Internal(String),
}

impl QTestError {
    pub fn invalid(message: impl Into<String>) -> Self {
        QTestError::Invalid(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        QTestError::Internal(message.into())
    }
}

/// A named, configured algorithm judging monitor elements.
///
/// Implementations hold only configuration parsed at creation time.
/// [`QualityTest::evaluate`] must not depend on earlier calls.
pub trait QualityTest: Send + Sync + Debug {
    /// Settings read from the common attributes and parameters.
    fn settings(&self) -> &QualityTestSettings;

    /// Human-readable description of the algorithm.
    fn description(&self) -> &str;

    /// Judge the element's object, usually against its reference.
    fn evaluate(&self, element: &MonitorElement) -> Result<Evaluation, QTestError>;

    fn name(&self) -> &str {
        &self.settings().name
    }

    fn qtest_type(&self) -> &str {
        &self.settings().qtest_type
    }

    fn is_enabled(&self) -> bool {
        self.settings().enabled
    }

    fn error_limit(&self) -> f64 {
        self.settings().error_limit
    }
}

/// Creates quality tests of one type from configuration.
pub trait QualityTestFactory: Send + Sync {
    /// Type name matched against the `type` attribute.
    fn type_name(&self) -> &str;

    /// Build and validate a test. Nothing is registered on failure.
    fn create(&self, config: &ConfigElement) -> Result<Arc<dyn QualityTest>>;
}

/// A quality test built from configuration by a [`BuiltinFactory`].
pub trait ConfigurableTest: QualityTest + Sized + 'static {
    const TYPE_NAME: &'static str;

    /// Parse the algorithm-specific parameters.
    fn read_settings(settings: QualityTestSettings, config: &ConfigElement) -> Result<Self>;

    /// Check domain preconditions once the parameters are read.
    fn init(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Factory for any [`ConfigurableTest`].
pub struct BuiltinFactory<T>(PhantomData<fn() -> T>);

impl<T> BuiltinFactory<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for BuiltinFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ConfigurableTest> QualityTestFactory for BuiltinFactory<T> {
    fn type_name(&self) -> &str {
        T::TYPE_NAME
    }

    fn create(&self, config: &ConfigElement) -> Result<Arc<dyn QualityTest>> {
        let settings = QualityTestSettings::from_config(config)?;
        let mut test = T::read_settings(settings, config)?;
        test.init()?;
        Ok(Arc::new(test))
    }
}

/// The element's reference, or INVALID.
pub(crate) fn require_reference(element: &MonitorElement) -> Result<&MonitorObject, QTestError> {
    element
        .reference()
        .ok_or_else(|| QTestError::invalid("no reference attached to monitor element"))
}

/// Run `test` on `element` and build its report.
///
/// INVALID judgements become reports. Internal failures, including panics
/// inside the algorithm, are returned as [`QTestError::Internal`] so that
/// the caller decides between an ERROR report and aborting.
pub fn execute(
    test: &dyn QualityTest,
    path: &str,
    element: &MonitorElement,
) -> Result<QualityReport, QTestError> {
    use crate::directory::Named;

    let builder = QualityReport::builder(test.name(), path, element.name())
        .qtest_type(test.qtest_type())
        .element_type(element.class_name())
        .timestamp_ms(current_timestamp_ms());

    if !test.is_enabled() {
        return Ok(builder.message(DISABLED_MESSAGE).build());
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| test.evaluate(element)))
        .unwrap_or_else(|payload| Err(QTestError::Internal(panic_message(payload.as_ref()))));

    let report = match outcome {
        Ok(evaluation) => {
            let verdict = if evaluation.passed {
                Verdict::Success
            } else {
                Verdict::Error
            };
            builder
                .success(true)
                .quality(evaluation.quality)
                .verdict(verdict)
                .message(evaluation.message)
                .extras(evaluation.extra)
                .build()
        }
        Err(QTestError::Invalid(message)) => builder.message(message).build(),
        Err(err @ QTestError::Internal(_)) => {
            warn!("Quality test '{}' failed on '{}/{}': {}", test.name(), path, element.name(), err);
            return Err(err);
        }
    };
    debug!(
        "Quality test '{}' on '{}/{}': {} ({:?})",
        report.qtest_name, path, report.element_name, report.verdict, report.quality
    );
    Ok(report)
}

/// ERROR report for an internal failure of `test` on `element`.
pub fn internal_error_report(
    test: &dyn QualityTest,
    path: &str,
    element: &MonitorElement,
    message: impl Into<String>,
) -> QualityReport {
    use crate::directory::Named;

    QualityReport::builder(test.name(), path, element.name())
        .qtest_type(test.qtest_type())
        .element_type(element.class_name())
        .timestamp_ms(current_timestamp_ms())
        .verdict(Verdict::Error)
        .message(message)
        .build()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("quality test panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("quality test panicked: {s}")
    } else {
        "quality test panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dqmwatch_types::Scalar;

    #[derive(Debug)]
    struct Fixed {
        settings: QualityTestSettings,
        outcome: Result<Evaluation, QTestError>,
    }

    impl QualityTest for Fixed {
        fn settings(&self) -> &QualityTestSettings {
            &self.settings
        }

        fn description(&self) -> &str {
            "returns a fixed outcome"
        }

        fn evaluate(&self, _element: &MonitorElement) -> Result<Evaluation, QTestError> {
            self.outcome.clone()
        }
    }

    #[derive(Debug)]
    struct Panicking(QualityTestSettings);

    impl QualityTest for Panicking {
        fn settings(&self) -> &QualityTestSettings {
            &self.0
        }

        fn description(&self) -> &str {
            "always panics"
        }

        fn evaluate(&self, _element: &MonitorElement) -> Result<Evaluation, QTestError> {
            panic!("boom")
        }
    }

    fn settings(enabled: bool) -> QualityTestSettings {
        QualityTestSettings {
            name: "fixed".into(),
            qtest_type: "Fixed".into(),
            enabled,
            error_limit: DEFAULT_ERROR_LIMIT,
        }
    }

    fn element() -> MonitorElement {
        MonitorElement::new(Scalar::int("counter", 1).into())
    }

    // ========================================================================
    // Settings Tests
    // ========================================================================

    #[test]
    fn settings_from_config() {
        let config = ConfigElement::qtest("t", "Chi2Test")
            .with_attribute("enabled", "false")
            .with_parameter("ErrorLimit", 0.2);
        let settings = QualityTestSettings::from_config(&config).unwrap();
        assert_eq!(settings.name, "t");
        assert_eq!(settings.qtest_type, "Chi2Test");
        assert!(!settings.enabled);
        assert_eq!(settings.error_limit, 0.2);
    }

    #[test]
    fn settings_require_name_and_type() {
        let config = ConfigElement::new("qtest").with_attribute("type", "Chi2Test");
        assert_eq!(
            QualityTestSettings::from_config(&config).unwrap_err().code(),
            crate::StatusCode::NotFound
        );
    }

    #[test]
    fn settings_reject_error_limit_out_of_range() {
        let config = ConfigElement::qtest("t", "Chi2Test").with_parameter("ErrorLimit", 1.5);
        assert_eq!(
            QualityTestSettings::from_config(&config).unwrap_err().code(),
            crate::StatusCode::InvalidParameter
        );
    }

    // ========================================================================
    // Execution Tests
    // ========================================================================

    #[test]
    fn passed_evaluation_is_success() {
        let test = Fixed {
            settings: settings(true),
            outcome: Ok(Evaluation::new(0.8, true).with_extra("chi2", 1.5)),
        };
        let report = execute(&test, "/a", &element()).unwrap();
        assert_eq!(report.verdict, Verdict::Success);
        assert!(report.success);
        assert_eq!(report.quality, Some(0.8));
        assert_eq!(report.extra.get("chi2"), Some(&1.5));
        assert_eq!(report.qtest_type, "Fixed");
        assert_eq!(report.element_type, "ScalarInt");
    }

    #[test]
    fn failed_evaluation_is_error() {
        let test = Fixed {
            settings: settings(true),
            outcome: Ok(Evaluation::threshold(0.01, 0.05)),
        };
        let report = execute(&test, "/a", &element()).unwrap();
        assert_eq!(report.verdict, Verdict::Error);
        assert!(report.success);
    }

    #[test]
    fn invalid_evaluation_has_no_quality() {
        let test = Fixed {
            settings: settings(true),
            outcome: Err(QTestError::invalid("no reference")),
        };
        let report = execute(&test, "/a", &element()).unwrap();
        assert_eq!(report.verdict, Verdict::Invalid);
        assert!(!report.success);
        assert_eq!(report.quality, None);
        assert_eq!(report.message, "no reference");
    }

    #[test]
    fn disabled_test_is_invalid() {
        let test = Fixed {
            settings: settings(false),
            outcome: Ok(Evaluation::new(1.0, true)),
        };
        let report = execute(&test, "/a", &element()).unwrap();
        assert_eq!(report.verdict, Verdict::Invalid);
        assert_eq!(report.message, DISABLED_MESSAGE);
    }

    #[test]
    fn internal_failures_are_returned() {
        let test = Fixed {
            settings: settings(true),
            outcome: Err(QTestError::internal("bad state")),
        };
        assert_eq!(
            execute(&test, "/a", &element()).unwrap_err(),
            QTestError::Internal("bad state".into())
        );

        let report = internal_error_report(&test, "/a", &element(), "bad state");
        assert_eq!(report.verdict, Verdict::Error);
        assert!(!report.success);
        assert_eq!(report.quality, None);
    }

    #[test]
    fn panics_become_internal_failures() {
        let test = Panicking(settings(true));
        match execute(&test, "/a", &element()) {
            Err(QTestError::Internal(message)) => assert!(message.contains("boom")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
