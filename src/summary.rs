//! Plain-text report table and the exit policy.

use std::fmt::Write as _;

use clap::ValueEnum;
use dqmwatch_core::{QualityReport, ReportStorage, Verdict};

/// When the runner should exit with a non-zero status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ExitPolicy {
    /// Always exit with success.
    Ignore,
    /// Fail on any ERROR or INVALID report.
    #[default]
    Failure,
    /// Fail on ERROR reports only.
    Error,
}

impl ExitPolicy {
    /// Whether `reports` should make the run fail.
    pub fn fails(&self, reports: &ReportStorage) -> bool {
        match self {
            ExitPolicy::Ignore => false,
            ExitPolicy::Failure => reports.iter().any(|r| r.verdict != Verdict::Success),
            ExitPolicy::Error => reports.iter().any(|r| r.verdict == Verdict::Error),
        }
    }
}

/// Counts of each verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub success: usize,
    pub error: usize,
    pub invalid: usize,
}

impl Totals {
    pub fn of(reports: &ReportStorage) -> Self {
        reports.iter().fold(Self::default(), |mut totals, report| {
            match report.verdict {
                Verdict::Success => totals.success += 1,
                Verdict::Error => totals.error += 1,
                Verdict::Invalid => totals.invalid += 1,
            }
            totals
        })
    }
}

fn quality(report: &QualityReport) -> String {
    report.quality.map_or_else(|| "-".to_string(), |q| format!("{q:.4}"))
}

fn element(report: &QualityReport) -> String {
    if report.path == "/" {
        format!("/{}", report.element_name)
    } else {
        format!("{}/{}", report.path, report.element_name)
    }
}

/// Render the reports as an aligned table, optionally keeping one verdict.
pub fn render(reports: &ReportStorage, only: Option<Verdict>) -> String {
    let rows: Vec<[String; 5]> = reports
        .iter()
        .filter(|r| only.map_or(true, |v| r.verdict == v))
        .map(|r| {
            [
                element(r),
                r.qtest_name.clone(),
                r.verdict.to_string(),
                quality(r),
                r.message.clone(),
            ]
        })
        .collect();

    let header = ["NAME", "QTEST", "STATUS", "QUALITY", "MESSAGE"];
    let mut widths = header.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let mut line = |cells: [&str; 5]| {
        let _ = writeln!(
            out,
            "{:<w0$}  {:<w1$}  {:<w2$}  {:>w3$}  {}",
            cells[0],
            cells[1],
            cells[2],
            cells[3],
            cells[4],
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2],
            w3 = widths[3],
        );
    };
    line(header);
    for row in &rows {
        line([&row[0], &row[1], &row[2], &row[3], &row[4]]);
    }

    let totals = Totals::of(reports);
    let _ = writeln!(
        out,
        "\n{} report(s): {} success, {} error, {} invalid",
        reports.len(),
        totals.success,
        totals.error,
        totals.invalid
    );
    out
}
