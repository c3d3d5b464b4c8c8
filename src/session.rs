//! Scan of a single logical database.
//!
//! A session walks the keyspace with the cursor protocol, one outstanding
//! command at a time, and folds every returned key into its own
//! [`AggregationTable`]. The table only leaves the session through
//! [`ScanSession::finish`] once the cursor has come back to the start value;
//! a failed session drops it.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::aggregate::AggregationTable;
use crate::client::{KeyName, KeyspaceClient, START_CURSOR};
use crate::error::{Error, Result};
use crate::pattern::PatternDeriver;
use crate::progress::ProgressReporter;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub deriver: PatternDeriver,
    /// Glob filter passed to the enumeration command; `None` scans everything.
    pub match_pattern: Option<String>,
    /// Requested keys per enumeration step; the server treats it as a hint.
    pub limit: usize,
    pub collect_ttl: bool,
}

impl ScanOptions {
    pub fn new(deriver: PatternDeriver) -> Self {
        Self {
            deriver,
            match_pattern: None,
            limit: 1000,
            collect_ttl: false,
        }
    }

    pub fn with_match_pattern(mut self, pattern: Option<String>) -> Self {
        // "*" is what the server assumes anyway.
        self.match_pattern = pattern.filter(|p| !p.is_empty() && p != "*");
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn with_ttl(mut self, collect_ttl: bool) -> Self {
        self.collect_ttl = collect_ttl;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    Completed,
    Failed,
}

/// Result of a session that observed a full enumeration cycle.
#[derive(Debug)]
pub struct CompletedScan {
    pub database: u64,
    pub table: AggregationTable,
    pub steps: u64,
    pub keys_seen: u64,
    pub keys_skipped: u64,
    pub duration: Duration,
}

pub struct ScanSession<'a> {
    database: u64,
    options: &'a ScanOptions,
    state: SessionState,
    cursor: u64,
    table: AggregationTable,
    steps: u64,
    keys_seen: u64,
    keys_skipped: u64,
    started: Instant,
}

impl<'a> ScanSession<'a> {
    pub fn new(database: u64, options: &'a ScanOptions) -> Self {
        Self {
            database,
            options,
            state: SessionState::Idle,
            cursor: START_CURSOR,
            table: AggregationTable::new(),
            steps: 0,
            keys_seen: 0,
            keys_skipped: 0,
            started: Instant::now(),
        }
    }

    pub fn database(&self) -> u64 {
        self.database
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn keys_seen(&self) -> u64 {
        self.keys_seen
    }

    pub fn keys_skipped(&self) -> u64 {
        self.keys_skipped
    }

    /// Performs one enumeration step and the lookups for the keys it returned.
    ///
    /// Terminal sessions are left untouched. Any error other than a missing
    /// key moves the session to `Failed`.
    pub fn step<C: KeyspaceClient + ?Sized>(&mut self, client: &mut C) -> Result<SessionState> {
        if matches!(self.state, SessionState::Completed | SessionState::Failed) {
            return Ok(self.state);
        }
        if self.state == SessionState::Idle {
            self.started = Instant::now();
            self.state = SessionState::Scanning;
        }

        let result = self.advance(client);
        if result.is_err() {
            self.state = SessionState::Failed;
        }
        result
    }

    fn advance<C: KeyspaceClient + ?Sized>(&mut self, client: &mut C) -> Result<SessionState> {
        let (next, keys) = client.scan_step(
            self.cursor,
            self.options.match_pattern.as_deref(),
            self.options.limit,
        )?;
        self.cursor = next;
        self.steps += 1;
        debug!(
            "db{} step {}: {} keys, next cursor {}",
            self.database,
            self.steps,
            keys.len(),
            next
        );

        for key in &keys {
            self.keys_seen += 1;
            self.observe_key(client, key)?;
        }

        if next == START_CURSOR {
            self.state = SessionState::Completed;
        }
        Ok(self.state)
    }

    fn observe_key<C: KeyspaceClient + ?Sized>(
        &mut self,
        client: &mut C,
        key: &KeyName,
    ) -> Result<()> {
        // Lookups use the raw name; only the bucket comes from its text form.
        let pattern = self.options.deriver.derive(&key.to_string_lossy());

        let size = match client.estimated_size(key) {
            Ok(size) => size,
            Err(err) if err.is_per_key() => return self.skip(key, &err),
            Err(err) => return Err(err),
        };

        if self.options.collect_ttl {
            let ttl = match client.ttl(key) {
                Ok(ttl) => ttl,
                Err(err) if err.is_per_key() => return self.skip(key, &err),
                Err(err) => return Err(err),
            };
            self.table.observe_with_ttl(&pattern, size, ttl);
        } else {
            self.table.observe(&pattern, size);
        }
        Ok(())
    }

    fn skip(&mut self, key: &KeyName, err: &Error) -> Result<()> {
        self.keys_skipped += 1;
        warn!("db{}: skipping '{}': {}", self.database, key, err);
        Ok(())
    }

    /// Drives the session until the cursor returns to the start value.
    pub fn run<C: KeyspaceClient + ?Sized>(
        mut self,
        client: &mut C,
        reporter: &dyn ProgressReporter,
    ) -> Result<CompletedScan> {
        info!("Scanning db{}...", self.database);
        while self.step(client)? != SessionState::Completed {
            reporter.on_scan_progress(self.database, self.keys_seen);
        }
        reporter.on_scan_progress(self.database, self.keys_seen);
        self.finish()
    }

    /// Hands out the aggregated table. Only a completed session can finish.
    pub fn finish(self) -> Result<CompletedScan> {
        if self.state != SessionState::Completed {
            return Err(Error::Other(format!(
                "scan of db{} finished in state {:?}",
                self.database, self.state
            )));
        }

        let duration = self.started.elapsed();
        info!(
            "db{} scanned in {:.2}s: {} keys, {} skipped, {} patterns",
            self.database,
            duration.as_secs_f64(),
            self.keys_seen,
            self.keys_skipped,
            self.table.len()
        );

        Ok(CompletedScan {
            database: self.database,
            table: self.table,
            steps: self.steps,
            keys_seen: self.keys_seen,
            keys_skipped: self.keys_skipped,
            duration,
        })
    }
}
