mod cli;
mod logging;
mod progress_bars;

use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use colored::*;
use dotenv::dotenv;
use indicatif::{HumanBytes, HumanCount};
use progress_bars::CliReporter;
use redis_memory_analysis::config::load_configuration;
use redis_memory_analysis::{
    write_reports, AnalysisEngine, AnalysisOutcome, AppConfig, CsvReportSink, DatabaseTarget,
    WriteFailure,
};
use tracing::{error, info};

fn main() {
    dotenv().ok();

    let args = Cli::parse();

    let guard = logging::init_logger(args.options.verbose);

    let config = match load_configuration(args.options.config.as_deref(), &args.options.overrides())
    {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(2);
        }
    };

    let result = match args.command {
        Some(Commands::Analyze) | None => run_analyze(&config),
        Some(Commands::ListDatabases) => run_list_databases(&config).map(|_| true),
        Some(Commands::Derive { keys }) => run_derive(&config, &keys).map(|_| true),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
            Ok(true)
        }
    };

    let code = match result {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(err) => {
            error!("Error: {:#}", err);
            2
        }
    };

    // Flush the file log before exiting.
    drop(guard);
    process::exit(code);
}

/// Returns `Ok(false)` when at least one database could not be analyzed or
/// its report could not be written.
fn run_analyze(config: &AppConfig) -> Result<bool> {
    let options = config.scan_options().context("invalid scan options")?;
    let engine = AnalysisEngine::new(config.connection_factory(), options)
        .with_concurrency(config.concurrency)
        .with_session_timeout(config.session_timeout())
        .with_reporter(Arc::new(CliReporter::new()));

    let discovered = engine
        .discover_databases()
        .with_context(|| format!("listing databases on {}", engine.host_label()))?;

    let targets: Vec<DatabaseTarget> = if config.databases.is_empty() {
        discovered.iter().map(DatabaseTarget::from).collect()
    } else {
        config
            .databases
            .iter()
            .map(|&id| DatabaseTarget {
                id,
                size_hint: discovered.iter().find(|db| db.id == id).map(|db| db.keys),
            })
            .collect()
    };

    if targets.is_empty() {
        info!("No databases with keys on {}", engine.host_label());
        return Ok(true);
    }

    let outcome = engine.run(&targets);

    let mut sink = CsvReportSink::new(&config.report_dir);
    let write_failures = write_reports(&mut sink, &outcome.host_label, &outcome.reports);

    print_summary(&outcome, &write_failures);
    Ok(outcome.is_complete() && write_failures.is_empty())
}

fn print_summary(outcome: &AnalysisOutcome, write_failures: &[WriteFailure]) {
    println!();
    info!(
        "Analyzed {} in {}",
        outcome.host_label,
        format!("{:.2}s", outcome.duration.as_secs_f64()).green(),
    );
    for report in &outcome.reports {
        info!(
            "db{}: {} keys, {} patterns, {} estimated, {} skipped",
            report.database,
            format!("{}", HumanCount(report.total_keys())).cyan(),
            format!("{}", report.rows.len()).cyan(),
            format!("{}", HumanBytes(report.total_size())).cyan(),
            report.keys_skipped,
        );
    }
    for failure in &outcome.failures {
        error!(
            "db{} failed ({}): {}",
            failure.database,
            format!("{}", failure.kind).red(),
            failure.error,
        );
    }
    for failure in write_failures {
        error!(
            "db{} report not written: {}",
            failure.database,
            format!("{}", failure.error).red(),
        );
    }
}

fn run_list_databases(config: &AppConfig) -> Result<()> {
    let engine = AnalysisEngine::new(config.connection_factory(), config.scan_options()?);
    let databases = engine
        .discover_databases()
        .with_context(|| format!("listing databases on {}", engine.host_label()))?;

    if databases.is_empty() {
        println!("{}: no databases with keys", engine.host_label());
    }
    for db in databases {
        println!(
            "db{}\tkeys={}\texpires={}\tavg_ttl={}",
            db.id, db.keys, db.expires, db.avg_ttl
        );
    }
    Ok(())
}

fn run_derive(config: &AppConfig, keys: &[String]) -> Result<()> {
    let deriver = config.pattern_deriver().context("invalid delimiter settings")?;
    for key in keys {
        println!("{}\t{}", key, deriver.derive(key));
    }
    Ok(())
}
