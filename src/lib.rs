//! # dqmwatch
//!
//! Command-line runner for data quality monitoring campaigns.
//!
//! A campaign file names an object store, an optional reference store, the
//! quality tests to create and the elements to test. The runner books every
//! element, attaches its tests and references, runs everything once and
//! prints a summary table:
//!
//! ```bash
//! dqm-qtests --input campaign.toml --qreport qreports.json --exit-on error
//! ```
//!
//! The engine itself lives in [`dqmwatch_core`].

pub mod campaign;
pub mod summary;

use std::path::Path;

use anyhow::{Context, Result};
use dqmwatch_core::{ReportDocument, ReportStorage};

pub use campaign::{Campaign, ElementEntry};
pub use summary::{ExitPolicy, Totals};

/// Set up `campaign` and run every attached test once.
pub fn run_campaign(campaign: &Campaign) -> Result<ReportStorage> {
    let manager = campaign.build()?;
    let mut reports = ReportStorage::new();
    manager
        .run_quality_tests(&mut reports)
        .context("quality test run aborted")?;
    Ok(reports)
}

/// Write `reports` as a JSON report document.
pub fn write_reports(path: &Path, reports: &ReportStorage) -> Result<()> {
    let json = ReportDocument::new(reports).to_json_pretty()?;
    std::fs::write(path, json).with_context(|| format!("cannot write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dqmwatch_core::QualityReport;

    #[test]
    fn written_reports_parse_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qreports.json");
        let reports: ReportStorage = [QualityReport::builder("chi2", "/calo", "energy").build()]
            .into_iter()
            .collect();

        write_reports(&path, &reports).unwrap();
        let document: ReportDocument = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(document.qreports.len(), 1);
        assert_eq!(document.qreports[0].path, "/calo");
    }

    #[test]
    fn unwritable_report_path_is_an_error() {
        let reports = ReportStorage::new();
        assert!(write_reports(Path::new("/nonexistent/dir/qreports.json"), &reports).is_err());
    }
}
