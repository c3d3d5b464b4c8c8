pub mod redis_client;

use std::borrow::Cow;
use std::fmt;

use crate::aggregate::KeyTtl;
use crate::error::Result;

pub use self::redis_client::{RedisConnectionFactory, RedisKeyspaceClient, SizeMethod};

/// Cursor value that both starts an enumeration and signals its completion.
pub const START_CURSOR: u64 = 0;

/// A key name exactly as the server stores it. Names are binary-safe, so
/// lookups always send these bytes back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyName(Vec<u8>);

impl KeyName {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Text form used for pattern derivation and logs.
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

impl From<Vec<u8>> for KeyName {
    fn from(raw: Vec<u8>) -> Self {
        Self(raw)
    }
}

impl From<&[u8]> for KeyName {
    fn from(raw: &[u8]) -> Self {
        Self(raw.to_vec())
    }
}

impl From<String> for KeyName {
    fn from(name: String) -> Self {
        Self(name.into_bytes())
    }
}

impl From<&str> for KeyName {
    fn from(name: &str) -> Self {
        Self(name.as_bytes().to_vec())
    }
}

impl fmt::Display for KeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

/// One logical database as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub id: u64,
    /// Approximate key count, used as a size hint.
    pub keys: u64,
    pub expires: u64,
    pub avg_ttl: u64,
}

/// The commands a scan needs from a key-value store connection.
///
/// A connection has an implicit "selected database"; callers that scan
/// several databases at once must use one connection per database.
pub trait KeyspaceClient {
    fn list_databases(&mut self) -> Result<Vec<DatabaseInfo>>;

    fn select_database(&mut self, id: u64) -> Result<()>;

    /// One enumeration step. Returns the next cursor and the keys of this step;
    /// a returned cursor of [`START_CURSOR`] means the cycle is complete.
    fn scan_step(
        &mut self,
        cursor: u64,
        match_pattern: Option<&str>,
        limit: usize,
    ) -> Result<(u64, Vec<KeyName>)>;

    /// Best-effort serialized size. Fails with `Error::MissingKey` when the key is gone.
    fn estimated_size(&mut self, key: &KeyName) -> Result<u64>;

    /// Fails with `Error::MissingKey` when the key is gone.
    fn ttl(&mut self, key: &KeyName) -> Result<KeyTtl>;

    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Opens fresh, independent connections to the same server.
pub trait ConnectionFactory: Send + Sync {
    type Client: KeyspaceClient + Send;

    fn connect(&self) -> Result<Self::Client>;

    /// Human-readable server identity, e.g. `host:port`.
    fn label(&self) -> String;
}
