//! Per-database memory usage of a running Redis server, grouped by key pattern.
//!
//! Each database is walked with `SCAN`; every key name is reduced to a pattern
//! by collapsing the segments after its delimiters, and the server's size
//! estimate for the key is added to that pattern's bucket. The result is one
//! report per database, sorted by key count.

pub mod aggregate;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod pattern;
pub mod progress;
pub mod report;
pub mod session;

pub use aggregate::{AggregationTable, KeyTtl, PatternStats};
pub use client::KeyName;
pub use config::{AppConfig, ConfigOverrides};
pub use engine::{AnalysisEngine, AnalysisOutcome, DatabaseFailure, DatabaseTarget};
pub use error::{Error, ErrorKind, Result};
pub use pattern::{DelimiterSet, PatternDeriver};
pub use progress::{ProgressReporter, SilentReporter};
pub use report::{
    write_reports, CsvReportSink, DatabaseReport, ReportBuilder, ReportSink, WriteFailure,
};
pub use session::{ScanOptions, ScanSession, SessionState};
