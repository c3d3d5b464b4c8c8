use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::aggregate::{AggregationTable, PatternStats};
use crate::error::{Error, Result};
use crate::session::CompletedScan;

/// Final, ordered statistics for one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseReport {
    pub database: u64,
    pub size_hint: Option<u64>,
    /// Sorted by count descending, then pattern ascending.
    pub rows: Vec<PatternStats>,
    pub keys_skipped: u64,
}

impl DatabaseReport {
    pub fn total_keys(&self) -> u64 {
        self.rows.iter().map(|r| r.count).sum()
    }

    pub fn total_size(&self) -> u64 {
        self.rows.iter().map(|r| r.total_size).sum()
    }
}

pub struct ReportBuilder;

impl ReportBuilder {
    pub fn build(database: u64, size_hint: Option<u64>, table: &AggregationTable) -> DatabaseReport {
        let mut rows = table.snapshot();
        sort_rows(&mut rows);
        DatabaseReport {
            database,
            size_hint,
            rows,
            keys_skipped: 0,
        }
    }

    pub fn from_scan(scan: &CompletedScan, size_hint: Option<u64>) -> DatabaseReport {
        DatabaseReport {
            keys_skipped: scan.keys_skipped,
            ..Self::build(scan.database, size_hint, &scan.table)
        }
    }
}

pub fn sort_rows(rows: &mut [PatternStats]) {
    rows.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.pattern.cmp(&b.pattern))
    });
}

/// Destination for finished reports.
pub trait ReportSink {
    fn write_report(&mut self, host_label: &str, report: &DatabaseReport) -> Result<()>;
}

/// A report that could not be written.
#[derive(Debug)]
pub struct WriteFailure {
    pub database: u64,
    pub error: Error,
}

/// Writes every report, carrying on past failures so one unwritable file
/// does not cost the other databases their results.
pub fn write_reports<S: ReportSink + ?Sized>(
    sink: &mut S,
    host_label: &str,
    reports: &[DatabaseReport],
) -> Vec<WriteFailure> {
    let mut failures = Vec::new();
    for report in reports {
        if let Err(err) = sink.write_report(host_label, report) {
            error!("Could not write report for db{}: {}", report.database, err);
            failures.push(WriteFailure {
                database: report.database,
                error: err,
            });
        }
    }
    failures
}

pub const CSV_HEADERS: [&str; 5] = [
    "Key",
    "Count",
    "Size",
    "NeverExpire",
    "AvgTtl(excluded never expire)",
];

/// Writes `redis-analysis-{host}-{db}.csv` files into a directory.
pub struct CsvReportSink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl CsvReportSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            written: Vec::new(),
        }
    }

    pub fn report_path(&self, host_label: &str, database: u64) -> PathBuf {
        self.dir
            .join(format!("redis-analysis-{}-{}.csv", host_label, database))
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl ReportSink for CsvReportSink {
    fn write_report(&mut self, host_label: &str, report: &DatabaseReport) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.report_path(host_label, report.database);

        let mut wtr = csv::Writer::from_path(&path)?;
        wtr.write_record(CSV_HEADERS)?;
        for row in &report.rows {
            wtr.write_record(&[
                row.pattern.clone(),
                row.count.to_string(),
                row.total_size.to_string(),
                row.never_expire.to_string(),
                row.avg_ttl().to_string(),
            ])?;
        }
        wtr.flush()?;

        info!(
            "Wrote {} rows for db{} to {}",
            report.rows.len(),
            report.database,
            path.display()
        );
        self.written.push(path);
        Ok(())
    }
}
