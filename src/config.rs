use config::{Config, Environment, File as ConfigFile};
use serde::Deserialize;
use std::time::Duration;

use crate::client::{RedisConnectionFactory, SizeMethod};
use crate::error::{Error, Result};
use crate::pattern::{single_char, DelimiterSet, PatternDeriver};
use crate::session::ScanOptions;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// Databases to scan; empty means every database the server lists.
    pub databases: Vec<u64>,
    pub delimiters: Vec<String>,
    pub escape: String,
    pub placeholder: String,
    pub match_pattern: String,
    pub scan_count: usize,
    pub concurrency: usize,
    pub session_timeout_secs: Option<u64>,
    pub connect_timeout_secs: u64,
    pub report_dir: String,
    pub size_method: SizeMethod,
    pub collect_ttl: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            databases: Vec::new(),
            delimiters: vec!["#".to_string(), ":".to_string()],
            escape: "\\".to_string(),
            placeholder: "*".to_string(),
            match_pattern: "*".to_string(),
            scan_count: 1000,
            concurrency: 1,
            session_timeout_secs: None,
            connect_timeout_secs: 10,
            report_dir: "./reports".to_string(),
            size_method: SizeMethod::DebugObject,
            collect_ttl: true,
        }
    }
}

/// Values given on the command line; they win over file and environment.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub databases: Option<Vec<u64>>,
    pub delimiters: Option<Vec<String>>,
    pub match_pattern: Option<String>,
    pub scan_count: Option<usize>,
    pub concurrency: Option<usize>,
    pub session_timeout_secs: Option<u64>,
    pub report_dir: Option<String>,
    pub size_method: Option<String>,
}

/// Loads `Config.toml` (or `path`), then `RMA_*` environment variables, then `overrides`.
pub fn load_configuration(path: Option<&str>, overrides: &ConfigOverrides) -> Result<AppConfig> {
    let file = match path {
        Some(path) => ConfigFile::with_name(path).required(true),
        None => ConfigFile::with_name("Config").required(false),
    };

    let builder = Config::builder()
        .add_source(file)
        .add_source(Environment::with_prefix("RMA").try_parsing(true))
        .set_override_option("host", overrides.host.clone())?
        .set_override_option("port", overrides.port.map(i64::from))?
        .set_override_option("password", overrides.password.clone())?
        .set_override_option(
            "databases",
            overrides
                .databases
                .as_ref()
                .map(|dbs| dbs.iter().map(|&db| db as i64).collect::<Vec<i64>>()),
        )?
        .set_override_option("delimiters", overrides.delimiters.clone())?
        .set_override_option("match_pattern", overrides.match_pattern.clone())?
        .set_override_option("scan_count", overrides.scan_count.map(|n| n as i64))?
        .set_override_option("concurrency", overrides.concurrency.map(|n| n as i64))?
        .set_override_option(
            "session_timeout_secs",
            overrides.session_timeout_secs.map(|n| n as i64),
        )?
        .set_override_option("report_dir", overrides.report_dir.clone())?
        .set_override_option("size_method", overrides.size_method.clone())?
        .build()?;

    Ok(builder.try_deserialize::<AppConfig>()?)
}

impl AppConfig {
    pub fn pattern_deriver(&self) -> Result<PatternDeriver> {
        let delimiters = DelimiterSet::from_strings(&self.delimiters)?;
        let escape = single_char("escape", &self.escape)?;
        PatternDeriver::with_placeholder(delimiters, escape, &self.placeholder)
    }

    pub fn scan_options(&self) -> Result<ScanOptions> {
        if self.scan_count == 0 {
            return Err(Error::invalid_option("scan_count", "must be at least 1"));
        }
        if self.concurrency == 0 {
            return Err(Error::invalid_option("concurrency", "must be at least 1"));
        }

        Ok(ScanOptions::new(self.pattern_deriver()?)
            .with_match_pattern(Some(self.match_pattern.clone()))
            .with_limit(self.scan_count)
            .with_ttl(self.collect_ttl))
    }

    pub fn connection_factory(&self) -> RedisConnectionFactory {
        RedisConnectionFactory::new(&self.host, self.port)
            .with_password(self.password.clone())
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .with_size_method(self.size_method)
    }

    pub fn session_timeout(&self) -> Option<Duration> {
        self.session_timeout_secs.map(Duration::from_secs)
    }
}
