//! Quality test verdicts and reports.

use std::collections::BTreeMap;
use core::fmt;
use core::str::FromStr;

/// Outcome of a single quality test execution.
///
/// Ordered from worst to best so that `min()` over a set of reports gives
/// the overall verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
#[cfg_attr(feature = "minicbor", cbor(index_only))]
pub enum Verdict {
    /// The test could not judge the element.
    #[cfg_attr(feature = "minicbor", n(0))]
    Invalid,
    /// The test ran and the criterion failed.
    #[cfg_attr(feature = "minicbor", n(1))]
    Error,
    /// The test ran and the criterion was satisfied.
    #[cfg_attr(feature = "minicbor", n(2))]
    Success,
}

impl Verdict {
    /// Returns the display label.
    pub fn symbol(&self) -> &'static str {
        match self {
            Verdict::Invalid => "INVALID",
            Verdict::Error => "ERROR",
            Verdict::Success => "SUCCESS",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Error returned when parsing an unknown verdict label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVerdict(pub String);

impl fmt::Display for UnknownVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown verdict '{}'", self.0)
    }
}

impl std::error::Error for UnknownVerdict {}

impl FromStr for Verdict {
    type Err = UnknownVerdict;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INVALID" => Ok(Verdict::Invalid),
            "ERROR" => Ok(Verdict::Error),
            "SUCCESS" => Ok(Verdict::Success),
            _ => Err(UnknownVerdict(s.to_string())),
        }
    }
}

/// The recorded outcome of running one quality test on one monitor element.
///
/// Field order is the serialized order: test name, element path, element
/// name, success flag, quality, verdict, message, timestamp, then the
/// descriptive extras.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct QualityReport {
    /// Name of the quality test instance.
    #[cfg_attr(feature = "serde", serde(rename = "qtest"))]
    #[cfg_attr(feature = "minicbor", n(0))]
    pub qtest_name: String,

    /// Directory path of the monitor element.
    #[cfg_attr(feature = "minicbor", n(1))]
    pub path: String,

    /// Name of the monitor element.
    #[cfg_attr(feature = "serde", serde(rename = "name"))]
    #[cfg_attr(feature = "minicbor", n(2))]
    pub element_name: String,

    /// Whether the test ran without an internal error.
    #[cfg_attr(feature = "minicbor", n(3))]
    pub success: bool,

    /// Quality score in [0, 1]. Absent when the test could not judge.
    #[cfg_attr(feature = "minicbor", n(4))]
    pub quality: Option<f64>,

    #[cfg_attr(feature = "minicbor", n(5))]
    pub verdict: Verdict,

    #[cfg_attr(feature = "serde", serde(default))]
    #[cfg_attr(feature = "minicbor", n(6))]
    pub message: String,

    /// Unix timestamp in milliseconds when the test ran.
    #[cfg_attr(feature = "serde", serde(rename = "timestamp"))]
    #[cfg_attr(feature = "minicbor", n(7))]
    pub timestamp_ms: u64,

    /// Registered type of the quality test (e.g. `Chi2Test`).
    #[cfg_attr(feature = "serde", serde(rename = "type", default))]
    #[cfg_attr(feature = "minicbor", n(8))]
    pub qtest_type: String,

    /// Class name of the judged object.
    #[cfg_attr(feature = "serde", serde(rename = "elementType", default))]
    #[cfg_attr(feature = "minicbor", n(9))]
    pub element_type: String,

    /// Algorithm-specific numbers (statistic, degrees of freedom, ...).
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "BTreeMap::is_empty"))]
    #[cfg_attr(feature = "minicbor", n(10))]
    pub extra: BTreeMap<String, f64>,
}

impl QualityReport {
    /// Create a builder for a report on `path`/`element_name` by `qtest_name`.
    pub fn builder(
        qtest_name: impl Into<String>,
        path: impl Into<String>,
        element_name: impl Into<String>,
    ) -> QualityReportBuilder {
        QualityReportBuilder::new(qtest_name, path, element_name)
    }

    /// Check if the test passed.
    pub fn is_success(&self) -> bool {
        self.verdict == Verdict::Success
    }

    /// Key identifying the judged element.
    pub fn element_key(&self) -> (&str, &str) {
        (&self.path, &self.element_name)
    }
}

/// Builder for [`QualityReport`].
#[derive(Debug, Clone)]
pub struct QualityReportBuilder {
    report: QualityReport,
}

impl QualityReportBuilder {
    /// Create a builder. The verdict defaults to INVALID with no quality.
    pub fn new(
        qtest_name: impl Into<String>,
        path: impl Into<String>,
        element_name: impl Into<String>,
    ) -> Self {
        Self {
            report: QualityReport {
                qtest_name: qtest_name.into(),
                path: path.into(),
                element_name: element_name.into(),
                success: false,
                quality: None,
                verdict: Verdict::Invalid,
                message: String::new(),
                timestamp_ms: 0,
                qtest_type: String::new(),
                element_type: String::new(),
                extra: BTreeMap::new(),
            },
        }
    }

    pub fn qtest_type(mut self, qtest_type: impl Into<String>) -> Self {
        self.report.qtest_type = qtest_type.into();
        self
    }

    pub fn element_type(mut self, element_type: impl Into<String>) -> Self {
        self.report.element_type = element_type.into();
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.report.success = success;
        self
    }

    pub fn quality(mut self, quality: f64) -> Self {
        self.report.quality = Some(quality.clamp(0.0, 1.0));
        self
    }

    pub fn verdict(mut self, verdict: Verdict) -> Self {
        self.report.verdict = verdict;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.report.message = message.into();
        self
    }

    pub fn timestamp_ms(mut self, timestamp_ms: u64) -> Self {
        self.report.timestamp_ms = timestamp_ms;
        self
    }

    /// Add an algorithm-specific value.
    pub fn extra(mut self, key: impl Into<String>, value: f64) -> Self {
        self.report.extra.insert(key.into(), value);
        self
    }

    /// Add several algorithm-specific values.
    pub fn extras(mut self, extra: BTreeMap<String, f64>) -> Self {
        self.report.extra.extend(extra);
        self
    }

    pub fn build(self) -> QualityReport {
        self.report
    }
}

/// Current Unix time in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
