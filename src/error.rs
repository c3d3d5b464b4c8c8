use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level failure; fatal to the affected scan session only
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Malformed or unexpected reply from the server
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The key disappeared between enumeration and lookup
    #[error("Key no longer exists: '{0}'")]
    MissingKey(String),

    #[error("Database {database} did not finish within {after:?}")]
    Timeout { database: u64, after: Duration },

    #[error("Invalid option '{name}': {reason}")]
    InvalidOption { name: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{0}")]
    Other(String),
}

/// Coarse classification used when listing failed databases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Authentication,
    ProtocolParse,
    MissingKey,
    Timeout,
    Configuration,
    Io,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Connection => "ConnectionError",
            ErrorKind::Authentication => "AuthenticationError",
            ErrorKind::ProtocolParse => "ProtocolParseError",
            ErrorKind::MissingKey => "MissingKey",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Configuration => "ConfigurationError",
            ErrorKind::Io => "IoError",
            ErrorKind::Other => "Error",
        };
        f.write_str(name)
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection(_) => ErrorKind::Connection,
            Error::Authentication(_) => ErrorKind::Authentication,
            Error::Protocol(_) => ErrorKind::ProtocolParse,
            Error::MissingKey(_) => ErrorKind::MissingKey,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::InvalidOption { .. } | Error::Config(_) => ErrorKind::Configuration,
            Error::Io(_) | Error::Csv(_) => ErrorKind::Io,
            Error::Other(_) => ErrorKind::Other,
        }
    }

    /// True for errors that only affect a single key and must not abort a scan.
    pub fn is_per_key(&self) -> bool {
        matches!(self, Error::MissingKey(_))
    }

    pub(crate) fn invalid_option(name: &str, reason: impl Into<String>) -> Self {
        Error::InvalidOption {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
