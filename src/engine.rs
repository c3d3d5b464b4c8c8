use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::client::{ConnectionFactory, DatabaseInfo, KeyspaceClient};
use crate::error::{Error, ErrorKind, Result};
use crate::progress::{ProgressReporter, SilentReporter};
use crate::report::{DatabaseReport, ReportBuilder};
use crate::session::{ScanOptions, ScanSession};

/// A database to scan, with the server's key count when known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseTarget {
    pub id: u64,
    pub size_hint: Option<u64>,
}

impl DatabaseTarget {
    pub fn new(id: u64) -> Self {
        Self { id, size_hint: None }
    }
}

impl From<&DatabaseInfo> for DatabaseTarget {
    fn from(info: &DatabaseInfo) -> Self {
        Self {
            id: info.id,
            size_hint: Some(info.keys),
        }
    }
}

#[derive(Debug)]
pub struct DatabaseFailure {
    pub database: u64,
    pub kind: ErrorKind,
    pub error: Error,
}

/// Per-database results of one run. Reports and failures are ordered by database id.
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub host_label: String,
    pub reports: Vec<DatabaseReport>,
    pub failures: Vec<DatabaseFailure>,
    pub duration: Duration,
}

impl AnalysisOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs one scan session per database, each on its own connection.
pub struct AnalysisEngine<F> {
    factory: Arc<F>,
    options: Arc<ScanOptions>,
    concurrency: usize,
    session_timeout: Option<Duration>,
    reporter: Arc<dyn ProgressReporter>,
}

impl<F> AnalysisEngine<F>
where
    F: ConnectionFactory + 'static,
{
    pub fn new(factory: F, options: ScanOptions) -> Self {
        Self {
            factory: Arc::new(factory),
            options: Arc::new(options),
            concurrency: 1,
            session_timeout: None,
            reporter: Arc::new(SilentReporter),
        }
    }

    /// Number of databases scanned at once; 1 scans them one after another.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// How long to wait for a single database before reporting it as failed.
    pub fn with_session_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn host_label(&self) -> String {
        self.factory.label()
    }

    pub fn discover_databases(&self) -> Result<Vec<DatabaseInfo>> {
        let mut client = self.factory.connect()?;
        let result = client.list_databases();
        if let Err(err) = client.close() {
            warn!("Error closing connection: {}", err);
        }
        result
    }

    pub fn run(&self, targets: &[DatabaseTarget]) -> AnalysisOutcome {
        let start = Instant::now();
        info!(
            "Analyzing {} database(s) on {} with concurrency {}",
            targets.len(),
            self.factory.label(),
            self.concurrency
        );

        let results: Vec<(DatabaseTarget, Result<DatabaseReport>)> = if self.concurrency > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.concurrency)
                .build()
            {
                Ok(pool) => pool.install(|| {
                    targets
                        .par_iter()
                        .map(|target| (*target, self.run_one(*target)))
                        .collect()
                }),
                Err(err) => {
                    warn!("Could not build thread pool, scanning sequentially: {}", err);
                    self.run_sequential(targets)
                }
            }
        } else {
            self.run_sequential(targets)
        };

        let mut reports = Vec::new();
        let mut failures = Vec::new();
        for (target, result) in results {
            match result {
                Ok(report) => reports.push(report),
                Err(error) => {
                    warn!("db{} failed: {}", target.id, error);
                    self.reporter.on_database_failed(target.id, &error);
                    failures.push(DatabaseFailure {
                        database: target.id,
                        kind: error.kind(),
                        error,
                    });
                }
            }
        }
        reports.sort_by_key(|r| r.database);
        failures.sort_by_key(|f| f.database);

        AnalysisOutcome {
            host_label: self.factory.label(),
            reports,
            failures,
            duration: start.elapsed(),
        }
    }

    fn run_sequential(&self, targets: &[DatabaseTarget]) -> Vec<(DatabaseTarget, Result<DatabaseReport>)> {
        targets
            .iter()
            .map(|target| (*target, self.run_one(*target)))
            .collect()
    }

    fn run_one(&self, target: DatabaseTarget) -> Result<DatabaseReport> {
        self.reporter.on_database_start(target.id, target.size_hint);

        let Some(timeout) = self.session_timeout else {
            return scan_database(&*self.factory, &self.options, target, &*self.reporter);
        };

        let factory = Arc::clone(&self.factory);
        let options = Arc::clone(&self.options);
        let reporter = Arc::new(DetachableReporter::new(Arc::clone(&self.reporter)));
        let session_reporter = Arc::clone(&reporter);
        let (tx, rx) = mpsc::channel();

        // The session cannot be interrupted; on timeout it keeps running with
        // its reporter detached and its result is dropped with the channel.
        thread::Builder::new()
            .name(format!("scan-db{}", target.id))
            .spawn(move || {
                let result = scan_database(&*factory, &options, target, &*session_reporter);
                let _ = tx.send(result);
            })?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                reporter.detach();
                Err(Error::Timeout {
                    database: target.id,
                    after: timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::Other(format!(
                "scan thread for db{} exited without a result",
                target.id
            ))),
        }
    }
}

/// Forwards to the engine's reporter until the session is given up on.
struct DetachableReporter {
    inner: Arc<dyn ProgressReporter>,
    detached: AtomicBool,
}

impl DetachableReporter {
    fn new(inner: Arc<dyn ProgressReporter>) -> Self {
        Self {
            inner,
            detached: AtomicBool::new(false),
        }
    }

    fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }

    fn attached(&self) -> bool {
        !self.detached.load(Ordering::SeqCst)
    }
}

impl ProgressReporter for DetachableReporter {
    fn on_database_start(&self, database: u64, size_hint: Option<u64>) {
        if self.attached() {
            self.inner.on_database_start(database, size_hint);
        }
    }

    fn on_scan_progress(&self, database: u64, keys_seen: u64) {
        if self.attached() {
            self.inner.on_scan_progress(database, keys_seen);
        }
    }

    fn on_database_complete(&self, database: u64, patterns: usize, duration_secs: f64) {
        if self.attached() {
            self.inner.on_database_complete(database, patterns, duration_secs);
        }
    }

    fn on_database_failed(&self, database: u64, error: &Error) {
        if self.attached() {
            self.inner.on_database_failed(database, error);
        }
    }
}

/// Connects, selects the database and runs one session to completion.
///
/// Reports progress and completion; announcing the start and reporting
/// failure are left to the caller.
pub fn scan_database<F: ConnectionFactory + ?Sized>(
    factory: &F,
    options: &ScanOptions,
    target: DatabaseTarget,
    reporter: &dyn ProgressReporter,
) -> Result<DatabaseReport> {
    let mut client = factory.connect()?;
    let result = client
        .select_database(target.id)
        .and_then(|_| ScanSession::new(target.id, options).run(&mut client, reporter));
    if let Err(err) = client.close() {
        warn!("Error closing connection for db{}: {}", target.id, err);
    }

    let scan = result?;
    reporter.on_database_complete(target.id, scan.table.len(), scan.duration.as_secs_f64());
    Ok(ReportBuilder::from_scan(&scan, target.size_hint))
}
