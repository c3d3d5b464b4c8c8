use std::time::Duration;

use redis::{
    Client, Connection, ConnectionAddr, ConnectionInfo, ErrorKind as RedisErrorKind,
    RedisConnectionInfo, RedisError,
};
use serde::Deserialize;
use tracing::debug;

use super::{ConnectionFactory, DatabaseInfo, KeyName, KeyspaceClient};
use crate::aggregate::KeyTtl;
use crate::error::{Error, Result};

/// Which server command provides the per-key size estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SizeMethod {
    /// `serializedlength` from `DEBUG OBJECT`
    #[default]
    DebugObject,
    /// `MEMORY USAGE`, for servers with DEBUG disabled
    MemoryUsage,
}

impl From<RedisError> for Error {
    fn from(err: RedisError) -> Self {
        if err.kind() == RedisErrorKind::AuthenticationFailed {
            Error::Authentication(err.to_string())
        } else if err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
        {
            Error::Connection(err.to_string())
        } else {
            Error::Protocol(err.to_string())
        }
    }
}

fn is_no_such_key(err: &RedisError) -> bool {
    err.kind() == RedisErrorKind::ResponseError
        && err.to_string().to_lowercase().contains("no such key")
}

#[derive(Debug, Clone)]
pub struct RedisConnectionFactory {
    host: String,
    port: u16,
    password: Option<String>,
    connect_timeout: Duration,
    io_timeout: Option<Duration>,
    size_method: SizeMethod,
}

impl RedisConnectionFactory {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            password: None,
            connect_timeout: Duration::from_secs(10),
            io_timeout: None,
            size_method: SizeMethod::default(),
        }
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password.filter(|p| !p.is_empty());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Read/write timeout on established connections; a stalled server then
    /// surfaces as a connection error instead of blocking forever.
    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn with_size_method(mut self, size_method: SizeMethod) -> Self {
        self.size_method = size_method;
        self
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                password: self.password.clone(),
                ..Default::default()
            },
        }
    }
}

impl ConnectionFactory for RedisConnectionFactory {
    type Client = RedisKeyspaceClient;

    fn connect(&self) -> Result<RedisKeyspaceClient> {
        let client = Client::open(self.connection_info())?;
        let conn = client
            .get_connection_with_timeout(self.connect_timeout)
            .map_err(|e| match Error::from(e) {
                Error::Protocol(reason) => Error::Connection(reason),
                other => other,
            })?;
        conn.set_read_timeout(self.io_timeout)?;
        conn.set_write_timeout(self.io_timeout)?;
        debug!("Connected to {}", self.label());

        Ok(RedisKeyspaceClient {
            conn,
            size_method: self.size_method,
        })
    }

    fn label(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub struct RedisKeyspaceClient {
    conn: Connection,
    size_method: SizeMethod,
}

impl KeyspaceClient for RedisKeyspaceClient {
    fn list_databases(&mut self) -> Result<Vec<DatabaseInfo>> {
        let info: String = redis::cmd("INFO").arg("keyspace").query(&mut self.conn)?;
        parse_keyspace_info(&info)
    }

    fn select_database(&mut self, id: u64) -> Result<()> {
        redis::cmd("SELECT").arg(id).query::<()>(&mut self.conn)?;
        Ok(())
    }

    fn scan_step(
        &mut self,
        cursor: u64,
        match_pattern: Option<&str>,
        limit: usize,
    ) -> Result<(u64, Vec<KeyName>)> {
        let mut cmd = redis::cmd("SCAN");
        cmd.arg(cursor);
        if let Some(pattern) = match_pattern {
            cmd.arg("MATCH").arg(pattern);
        }
        cmd.arg("COUNT").arg(limit);

        let (next, raw_keys): (u64, Vec<Vec<u8>>) = cmd.query(&mut self.conn)?;
        Ok((next, raw_keys.into_iter().map(KeyName::from).collect()))
    }

    fn estimated_size(&mut self, key: &KeyName) -> Result<u64> {
        match self.size_method {
            SizeMethod::DebugObject => {
                let reply: String = redis::cmd("DEBUG")
                    .arg("OBJECT")
                    .arg(key.as_bytes())
                    .query(&mut self.conn)
                    .map_err(|e| {
                        if is_no_such_key(&e) {
                            Error::MissingKey(key.to_string())
                        } else {
                            Error::from(e)
                        }
                    })?;
                parse_serialized_length(&reply)
            }
            SizeMethod::MemoryUsage => {
                let usage: Option<u64> = redis::cmd("MEMORY")
                    .arg("USAGE")
                    .arg(key.as_bytes())
                    .query(&mut self.conn)?;
                usage.ok_or_else(|| Error::MissingKey(key.to_string()))
            }
        }
    }

    fn ttl(&mut self, key: &KeyName) -> Result<KeyTtl> {
        let ttl: i64 = redis::cmd("TTL").arg(key.as_bytes()).query(&mut self.conn)?;
        ttl_from_reply(key, ttl)
    }

    fn close(self) -> Result<()> {
        drop(self.conn);
        Ok(())
    }
}

fn ttl_from_reply(key: &KeyName, ttl: i64) -> Result<KeyTtl> {
    match ttl {
        -2 => Err(Error::MissingKey(key.to_string())),
        -1 => Ok(KeyTtl::Persistent),
        secs if secs >= 0 => Ok(KeyTtl::Expires(secs as u64)),
        other => Err(Error::Protocol(format!(
            "unexpected TTL reply {} for '{}'",
            other, key
        ))),
    }
}

/// Parses the `# Keyspace` section of `INFO`, e.g. `db0:keys=12,expires=1,avg_ttl=0`.
pub fn parse_keyspace_info(info: &str) -> Result<Vec<DatabaseInfo>> {
    let mut databases = Vec::new();

    for line in info.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (name, fields) = line
            .split_once(':')
            .ok_or_else(|| Error::Protocol(format!("malformed keyspace line '{}'", line)))?;
        let id = name
            .strip_prefix("db")
            .and_then(|n| n.parse::<u64>().ok())
            .ok_or_else(|| Error::Protocol(format!("malformed database name '{}'", name)))?;

        let mut keys = None;
        let mut expires = 0;
        let mut avg_ttl = 0;
        for field in fields.split(',') {
            let (field_name, value) = field
                .split_once('=')
                .ok_or_else(|| Error::Protocol(format!("malformed keyspace field '{}'", field)))?;
            let parse = || {
                value.parse::<u64>().map_err(|_| {
                    Error::Protocol(format!("non-numeric value in keyspace field '{}'", field))
                })
            };
            match field_name {
                "keys" => keys = Some(parse()?),
                "expires" => expires = parse()?,
                "avg_ttl" => avg_ttl = parse()?,
                _ => {}
            }
        }

        let keys = keys
            .ok_or_else(|| Error::Protocol(format!("missing key count for '{}'", name)))?;
        databases.push(DatabaseInfo {
            id,
            keys,
            expires,
            avg_ttl,
        });
    }

    databases.sort_by_key(|db| db.id);
    Ok(databases)
}

/// Extracts `serializedlength` from a `DEBUG OBJECT` reply.
pub fn parse_serialized_length(reply: &str) -> Result<u64> {
    reply
        .split_whitespace()
        .find_map(|token| token.strip_prefix("serializedlength:"))
        .ok_or_else(|| Error::Protocol(format!("no serializedlength in '{}'", reply)))?
        .parse::<u64>()
        .map_err(|e| Error::Protocol(format!("invalid serializedlength: {}", e)))
}
