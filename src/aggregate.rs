use ahash::AHashMap;

/// Expiry information for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    Persistent,
    /// Remaining time to live in seconds.
    Expires(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternStats {
    pub pattern: String,
    pub count: u64,
    pub total_size: u64,
    /// Keys of this pattern without an expiry; only counted when TTLs are collected.
    pub never_expire: u64,
    pub expiring: u64,
    pub total_ttl: u64,
}

impl PatternStats {
    fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            count: 0,
            total_size: 0,
            never_expire: 0,
            expiring: 0,
            total_ttl: 0,
        }
    }

    /// Mean remaining TTL in seconds over keys that do expire.
    pub fn avg_ttl(&self) -> u64 {
        if self.expiring == 0 {
            0
        } else {
            self.total_ttl / self.expiring
        }
    }
}

/// Per-pattern running totals for one scan session.
#[derive(Debug, Default)]
pub struct AggregationTable {
    entries: AHashMap<String, PatternStats>,
}

impl AggregationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, pattern: &str, estimated_size: u64) {
        self.entry(pattern).add(estimated_size);
    }

    pub fn observe_with_ttl(&mut self, pattern: &str, estimated_size: u64, ttl: KeyTtl) {
        let stats = self.entry(pattern);
        stats.add(estimated_size);
        match ttl {
            KeyTtl::Persistent => stats.never_expire += 1,
            KeyTtl::Expires(secs) => {
                stats.expiring += 1;
                stats.total_ttl = stats.total_ttl.saturating_add(secs);
            }
        }
    }

    fn entry(&mut self, pattern: &str) -> &mut PatternStats {
        self.entries
            .entry(pattern.to_string())
            .or_insert_with(|| PatternStats::new(pattern))
    }

    pub fn get(&self, pattern: &str) -> Option<&PatternStats> {
        self.entries.get(pattern)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Point-in-time copy of every entry, in no particular order.
    pub fn snapshot(&self) -> Vec<PatternStats> {
        self.entries.values().cloned().collect()
    }
}

impl PatternStats {
    fn add(&mut self, estimated_size: u64) {
        self.count += 1;
        self.total_size = self.total_size.saturating_add(estimated_size);
    }
}
