use clap::{ArgAction, Args, Parser, Subcommand};
use redis_memory_analysis::ConfigOverrides;

#[derive(Debug, Parser)]
#[command(name = "redis-memory-analysis")]
#[command(about = "Redis memory usage grouped by key pattern", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub options: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan the selected databases and write one CSV report per database
    Analyze,
    /// Print the databases reported by the server
    ListDatabases,
    /// Print the pattern each key would be grouped under
    Derive {
        /// Key names to derive patterns for
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// More log output: -v for debug, -vv for trace
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file (defaults to ./Config.toml when present)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[arg(long, global = true)]
    pub host: Option<String>,

    #[arg(long, global = true)]
    pub port: Option<u16>,

    #[arg(long, global = true, env = "REDIS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Database to scan; repeat for several (default: all)
    #[arg(long = "db", global = true)]
    pub databases: Vec<u64>,

    /// Single-character key delimiter; repeat for several
    #[arg(short = 'd', long = "delimiter", global = true)]
    pub delimiters: Vec<String>,

    /// Only scan keys matching this glob
    #[arg(long = "match", global = true)]
    pub match_pattern: Option<String>,

    /// Keys requested per SCAN step
    #[arg(long = "count", global = true)]
    pub scan_count: Option<usize>,

    /// Databases scanned at once
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    /// Give up on a database after this many seconds
    #[arg(long = "timeout", global = true)]
    pub session_timeout_secs: Option<u64>,

    #[arg(long, global = true)]
    pub report_dir: Option<String>,

    /// debug-object or memory-usage
    #[arg(long, global = true)]
    pub size_method: Option<String>,
}

impl GlobalArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            host: self.host.clone(),
            port: self.port,
            password: self.password.clone(),
            databases: non_empty(&self.databases),
            delimiters: non_empty(&self.delimiters),
            match_pattern: self.match_pattern.clone(),
            scan_count: self.scan_count,
            concurrency: self.concurrency,
            session_timeout_secs: self.session_timeout_secs,
            report_dir: self.report_dir.clone(),
            size_method: self.size_method.clone(),
        }
    }
}

fn non_empty<T: Clone>(values: &[T]) -> Option<Vec<T>> {
    if values.is_empty() {
        None
    } else {
        Some(values.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repeated_flags() {
        let cli = Cli::parse_from([
            "redis-memory-analysis",
            "--host",
            "cache",
            "-d",
            "#",
            "-d",
            ":",
            "--db",
            "0",
            "--db",
            "3",
            "analyze",
        ]);
        assert!(matches!(cli.command, Some(Commands::Analyze)));
        let overrides = cli.options.overrides();
        assert_eq!(overrides.host.as_deref(), Some("cache"));
        assert_eq!(overrides.delimiters, Some(vec!["#".to_string(), ":".to_string()]));
        assert_eq!(overrides.databases, Some(vec![0, 3]));
        assert!(overrides.report_dir.is_none());
    }

    #[test]
    fn test_derive_requires_keys() {
        assert!(Cli::try_parse_from(["redis-memory-analysis", "derive"]).is_err());
        let cli = Cli::parse_from(["redis-memory-analysis", "derive", "user#1"]);
        assert!(matches!(cli.command, Some(Commands::Derive { .. })));
    }

    #[test]
    fn test_verbosity_counts() {
        let cli = Cli::parse_from(["redis-memory-analysis", "-vv", "list-databases"]);
        assert_eq!(cli.options.verbose, 2);
        let cli = Cli::parse_from(["redis-memory-analysis", "analyze"]);
        assert_eq!(cli.options.verbose, 0);
    }
}
