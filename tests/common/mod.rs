#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use redis_memory_analysis::client::{ConnectionFactory, DatabaseInfo, KeyName, KeyspaceClient};
use redis_memory_analysis::pattern::{DelimiterSet, PatternDeriver};
use redis_memory_analysis::{Error, KeyTtl, Result, ScanOptions};

/// How a scripted scan step goes wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepFailure {
    /// The connection drops.
    Connection,
    /// The server answers with something that is not a scan reply.
    Protocol,
}

/// Scripted contents of one database.
#[derive(Debug, Clone, Default)]
pub struct FakeDatabase {
    /// `(next_cursor, keys)` returned by successive scan steps.
    pub steps: Vec<(u64, Vec<KeyName>)>,
    pub sizes: HashMap<KeyName, u64>,
    pub ttls: HashMap<KeyName, KeyTtl>,
    /// Keys deleted between the size lookup and the TTL lookup.
    pub vanish_before_ttl: HashSet<KeyName>,
    /// Scan step index (0-based) that fails, and how.
    pub fail_at_step: Option<(usize, StepFailure)>,
    pub step_delay: Option<Duration>,
}

impl FakeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, next_cursor: u64, keys: &[&str]) -> Self {
        self.steps
            .push((next_cursor, keys.iter().map(|&k| KeyName::from(k)).collect()));
        self
    }

    /// A step returning key names that need not be valid UTF-8.
    pub fn raw_step(mut self, next_cursor: u64, keys: &[&[u8]]) -> Self {
        self.steps
            .push((next_cursor, keys.iter().map(|&k| KeyName::from(k)).collect()));
        self
    }

    pub fn key(mut self, name: &str, size: u64) -> Self {
        self.sizes.insert(KeyName::from(name), size);
        self
    }

    pub fn raw_key(mut self, name: &[u8], size: u64) -> Self {
        self.sizes.insert(KeyName::from(name), size);
        self
    }

    pub fn key_with_ttl(mut self, name: &str, size: u64, ttl: KeyTtl) -> Self {
        self.sizes.insert(KeyName::from(name), size);
        self.ttls.insert(KeyName::from(name), ttl);
        self
    }

    /// The size lookup succeeds, then the key expires before its TTL is read.
    pub fn vanishes_before_ttl(mut self, name: &str, size: u64) -> Self {
        self.sizes.insert(KeyName::from(name), size);
        self.vanish_before_ttl.insert(KeyName::from(name));
        self
    }

    pub fn fail_at_step(mut self, step: usize) -> Self {
        self.fail_at_step = Some((step, StepFailure::Connection));
        self
    }

    pub fn malformed_reply_at_step(mut self, step: usize) -> Self {
        self.fail_at_step = Some((step, StepFailure::Protocol));
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.step_delay = Some(delay);
        self
    }
}

/// Everything the fake server saw, shared across connections.
#[derive(Debug, Default)]
pub struct CallLog {
    pub cursors: HashMap<u64, Vec<u64>>,
    pub size_lookups: Vec<KeyName>,
    pub ttl_lookups: Vec<KeyName>,
    pub connections: usize,
    pub closed: usize,
}

#[derive(Clone, Default)]
pub struct FakeFactory {
    pub databases: Arc<HashMap<u64, FakeDatabase>>,
    pub log: Arc<Mutex<CallLog>>,
    pub refuse_connections: bool,
}

impl FakeFactory {
    pub fn new(databases: Vec<(u64, FakeDatabase)>) -> Self {
        Self {
            databases: Arc::new(databases.into_iter().collect()),
            log: Arc::new(Mutex::new(CallLog::default())),
            refuse_connections: false,
        }
    }

    pub fn cursors_sent(&self, database: u64) -> Vec<u64> {
        self.log
            .lock()
            .unwrap()
            .cursors
            .get(&database)
            .cloned()
            .unwrap_or_default()
    }
}

impl ConnectionFactory for FakeFactory {
    type Client = FakeClient;

    fn connect(&self) -> Result<FakeClient> {
        if self.refuse_connections {
            return Err(Error::Connection("connection refused".into()));
        }
        self.log.lock().unwrap().connections += 1;
        Ok(FakeClient {
            databases: Arc::clone(&self.databases),
            log: Arc::clone(&self.log),
            selected: 0,
            step: 0,
        })
    }

    fn label(&self) -> String {
        "fake:6379".to_string()
    }
}

pub struct FakeClient {
    databases: Arc<HashMap<u64, FakeDatabase>>,
    log: Arc<Mutex<CallLog>>,
    selected: u64,
    step: usize,
}

impl FakeClient {
    fn current(&self) -> Result<&FakeDatabase> {
        self.databases
            .get(&self.selected)
            .ok_or_else(|| Error::Protocol(format!("no db{}", self.selected)))
    }
}

impl KeyspaceClient for FakeClient {
    fn list_databases(&mut self) -> Result<Vec<DatabaseInfo>> {
        let mut dbs: Vec<DatabaseInfo> = self
            .databases
            .iter()
            .map(|(&id, db)| DatabaseInfo {
                id,
                keys: db.sizes.len() as u64,
                expires: 0,
                avg_ttl: 0,
            })
            .collect();
        dbs.sort_by_key(|db| db.id);
        Ok(dbs)
    }

    fn select_database(&mut self, id: u64) -> Result<()> {
        self.selected = id;
        self.step = 0;
        self.current().map(|_| ())
    }

    fn scan_step(
        &mut self,
        cursor: u64,
        _match_pattern: Option<&str>,
        _limit: usize,
    ) -> Result<(u64, Vec<KeyName>)> {
        let db = self.current()?.clone();
        self.log
            .lock()
            .unwrap()
            .cursors
            .entry(self.selected)
            .or_default()
            .push(cursor);

        if let Some(delay) = db.step_delay {
            thread::sleep(delay);
        }
        match db.fail_at_step {
            Some((step, StepFailure::Connection)) if step == self.step => {
                return Err(Error::Connection("connection reset by peer".into()));
            }
            Some((step, StepFailure::Protocol)) if step == self.step => {
                return Err(Error::Protocol(
                    "response was of incompatible type: expected (cursor, keys)".into(),
                ));
            }
            _ => {}
        }

        let step = db
            .steps
            .get(self.step)
            .cloned()
            .unwrap_or((0, Vec::new()));
        self.step += 1;
        Ok(step)
    }

    fn estimated_size(&mut self, key: &KeyName) -> Result<u64> {
        self.log.lock().unwrap().size_lookups.push(key.clone());
        self.current()?
            .sizes
            .get(key)
            .copied()
            .ok_or_else(|| Error::MissingKey(key.to_string()))
    }

    fn ttl(&mut self, key: &KeyName) -> Result<KeyTtl> {
        self.log.lock().unwrap().ttl_lookups.push(key.clone());
        let db = self.current()?;
        if !db.sizes.contains_key(key) || db.vanish_before_ttl.contains(key) {
            return Err(Error::MissingKey(key.to_string()));
        }
        Ok(db.ttls.get(key).copied().unwrap_or(KeyTtl::Persistent))
    }

    fn close(self) -> Result<()> {
        self.log.lock().unwrap().closed += 1;
        Ok(())
    }
}

pub fn options(delimiters: &[char]) -> ScanOptions {
    let set = DelimiterSet::new(delimiters.iter().copied()).unwrap();
    ScanOptions::new(PatternDeriver::new(set, '\\').unwrap()).with_limit(10)
}
