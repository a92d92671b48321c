//! Accumulated quality reports and their exported document.

use std::collections::BTreeMap;

use dqmwatch_types::{current_timestamp_ms, QualityReport, SchemaVersion};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{DqmError, Result};

type ElementKey = (String, String);

/// Reports keyed by element (path, name), then by quality-test name.
///
/// A later report for the same (path, name, test) replaces the earlier one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportStorage {
    reports: BTreeMap<ElementKey, BTreeMap<String, QualityReport>>,
}

impl ReportStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `report`, returning the one it replaces.
    pub fn add_report(&mut self, report: QualityReport) -> Option<QualityReport> {
        let key = (report.path.clone(), report.element_name.clone());
        let replaced = self
            .reports
            .entry(key)
            .or_default()
            .insert(report.qtest_name.clone(), report);
        if let Some(old) = &replaced {
            warn!(
                "Replacing report of quality test '{}' on '{}/{}'",
                old.qtest_name, old.path, old.element_name
            );
        }
        replaced
    }

    /// Store every report of `other`.
    pub fn add_reports(&mut self, other: ReportStorage) {
        for report in other.into_reports() {
            self.add_report(report);
        }
    }

    /// The report of `qtest` on element `path`/`name`.
    pub fn report(&self, path: &str, name: &str, qtest: &str) -> Result<&QualityReport> {
        self.reports
            .get(&(path.to_string(), name.to_string()))
            .and_then(|tests| tests.get(qtest))
            .ok_or_else(|| DqmError::not_found(format!("report of '{qtest}' on '{path}/{name}'")))
    }

    /// Every report on element `path`/`name`, keyed by quality-test name.
    pub fn reports_for(&self, path: &str, name: &str) -> Option<&BTreeMap<String, QualityReport>> {
        self.reports.get(&(path.to_string(), name.to_string()))
    }

    /// Drop every report on element `path`/`name`.
    pub fn remove_element(&mut self, path: &str, name: &str) -> usize {
        self.reports
            .remove(&(path.to_string(), name.to_string()))
            .map_or(0, |tests| tests.len())
    }

    /// Reports whose quality is strictly above `quality`.
    pub fn reports_with_quality_higher(&self, quality: f64) -> Vec<&QualityReport> {
        self.iter().filter(|r| r.quality.is_some_and(|q| q > quality)).collect()
    }

    /// Reports whose quality is strictly below `quality`.
    pub fn reports_with_quality_lower(&self, quality: f64) -> Vec<&QualityReport> {
        self.iter().filter(|r| r.quality.is_some_and(|q| q < quality)).collect()
    }

    /// Number of reports.
    pub fn len(&self) -> usize {
        self.reports.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn clear(&mut self) {
        self.reports.clear();
    }

    /// All reports ordered by path, element name and test name.
    pub fn iter(&self) -> impl Iterator<Item = &QualityReport> {
        self.reports.values().flat_map(BTreeMap::values)
    }

    pub fn into_reports(self) -> impl Iterator<Item = QualityReport> {
        self.reports.into_values().flat_map(BTreeMap::into_values)
    }
}

impl Extend<QualityReport> for ReportStorage {
    fn extend<I: IntoIterator<Item = QualityReport>>(&mut self, iter: I) {
        for report in iter {
            self.add_report(report);
        }
    }
}

impl FromIterator<QualityReport> for ReportStorage {
    fn from_iter<I: IntoIterator<Item = QualityReport>>(iter: I) -> Self {
        let mut storage = Self::new();
        storage.extend(iter);
        storage
    }
}

/// Where and when a report document was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMeta {
    pub host: String,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
}

impl ReportMeta {
    /// Metadata for the local host, stamped now.
    pub fn now() -> Self {
        let host = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .unwrap_or_else(|_| "localhost".to_string());
        Self {
            host,
            timestamp_ms: current_timestamp_ms(),
        }
    }
}

/// Serializable snapshot of a [`ReportStorage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub version: SchemaVersion,
    pub meta: ReportMeta,
    pub qreports: Vec<QualityReport>,
}

impl ReportDocument {
    pub fn new(storage: &ReportStorage) -> Self {
        Self {
            version: SchemaVersion::current(),
            meta: ReportMeta::now(),
            qreports: storage.iter().cloned().collect(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reads a document written by [`ReportDocument::to_json_pretty`].
    ///
    /// Documents with a different major layout version are refused.
    pub fn from_json(json: &str) -> Result<Self> {
        let document: Self = serde_json::from_str(json)?;
        if !document.version.is_compatible() {
            return Err(DqmError::invalid(format!(
                "report document version {} is not readable (expected {})",
                document.version,
                SchemaVersion::current()
            )));
        }
        if document.version.is_newer_revision() {
            warn!(version = %document.version, "report document written by a newer revision");
        }
        Ok(document)
    }

    pub fn into_storage(self) -> ReportStorage {
        self.qreports.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dqmwatch_types::Verdict;

    fn report(path: &str, name: &str, qtest: &str, quality: Option<f64>) -> QualityReport {
        let builder = QualityReport::builder(qtest, path, name);
        match quality {
            Some(q) => builder.success(true).quality(q).verdict(Verdict::Success).build(),
            None => builder.build(),
        }
    }

    #[test]
    fn reports_are_keyed_by_element_and_test() {
        let mut storage = ReportStorage::new();
        storage.add_report(report("/a", "h", "chi2", Some(0.9)));
        storage.add_report(report("/a", "h", "ks", Some(0.2)));
        storage.add_report(report("/b", "h", "chi2", None));

        assert_eq!(storage.len(), 3);
        assert_eq!(storage.report("/a", "h", "ks").unwrap().quality, Some(0.2));
        assert_eq!(storage.reports_for("/a", "h").unwrap().len(), 2);
        assert_eq!(
            storage.report("/a", "h", "exact").unwrap_err().code(),
            crate::StatusCode::NotFound
        );
    }

    #[test]
    fn later_report_replaces_earlier() {
        let mut storage = ReportStorage::new();
        assert!(storage.add_report(report("/a", "h", "chi2", Some(0.1))).is_none());
        let old = storage.add_report(report("/a", "h", "chi2", Some(0.7)));
        assert_eq!(old.unwrap().quality, Some(0.1));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn quality_filters_skip_invalid_reports() {
        let storage: ReportStorage = [
            report("/a", "x", "t", Some(0.9)),
            report("/a", "y", "t", Some(0.3)),
            report("/a", "z", "t", None),
        ]
        .into_iter()
        .collect();
        assert_eq!(storage.reports_with_quality_higher(0.5).len(), 1);
        assert_eq!(storage.reports_with_quality_lower(0.5).len(), 1);
    }

    #[test]
    fn merge_remove_and_clear() {
        let mut storage = ReportStorage::new();
        storage.add_report(report("/a", "h", "t1", Some(1.0)));
        let other: ReportStorage = [report("/a", "h", "t2", Some(1.0)), report("/b", "g", "t1", None)]
            .into_iter()
            .collect();
        storage.add_reports(other);
        assert_eq!(storage.len(), 3);

        assert_eq!(storage.remove_element("/a", "h"), 2);
        assert_eq!(storage.len(), 1);
        storage.clear();
        assert!(storage.is_empty());
    }

    #[test]
    fn document_serializes_reports() {
        let storage: ReportStorage = [report("/a", "h", "chi2", Some(0.5))].into_iter().collect();
        let document = ReportDocument::new(&storage);
        let json = document.to_json_pretty().unwrap();
        assert!(json.contains("\"qreports\""));
        assert!(json.contains("\"qtest\": \"chi2\""));

        let parsed: ReportDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.qreports, document.qreports);
        assert!(parsed.version.is_compatible());
    }

    #[test]
    fn reading_document_checks_major_version() {
        let storage: ReportStorage = [report("/a", "h", "chi2", Some(0.5))].into_iter().collect();
        let json = ReportDocument::new(&storage).to_json_pretty().unwrap();

        let restored = ReportDocument::from_json(&json).unwrap().into_storage();
        assert_eq!(restored, storage);

        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["version"]["minor"] = serde_json::json!(dqmwatch_types::SCHEMA_VERSION_MINOR + 1);
        assert!(ReportDocument::from_json(&value.to_string()).is_ok());

        value["version"]["major"] = serde_json::json!(dqmwatch_types::SCHEMA_VERSION + 1);
        let err = ReportDocument::from_json(&value.to_string()).unwrap_err();
        assert_eq!(err.code(), crate::StatusCode::InvalidParameter);
    }
}
