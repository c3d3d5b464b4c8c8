use indicatif::{HumanCount, MultiProgress, ProgressBar, ProgressStyle};
use redis_memory_analysis::{Error, ProgressReporter};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

const SPINNER_TEMPLATE: &str = "{spinner:.cyan} {prefix:.bold} {wide_msg}";
const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter: one spinner per database being scanned.
pub struct CliReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<u64, ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn take_bar(&self, database: u64) -> Option<ProgressBar> {
        self.bars.lock().unwrap().remove(&database)
    }
}

impl ProgressReporter for CliReporter {
    fn on_database_start(&self, database: u64, size_hint: Option<u64>) {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(
            ProgressStyle::with_template(SPINNER_TEMPLATE)
                .unwrap()
                .tick_chars(TICK_CHARS),
        );
        pb.set_prefix(format!("db{}", database));
        match size_hint {
            Some(keys) => pb.set_message(format!("Scanning ~{} keys...", HumanCount(keys))),
            None => pb.set_message("Scanning..."),
        }
        pb.enable_steady_tick(Duration::from_millis(80));
        self.bars.lock().unwrap().insert(database, pb);
    }

    fn on_scan_progress(&self, database: u64, keys_seen: u64) {
        let guard = self.bars.lock().unwrap();
        if let Some(pb) = guard.get(&database) {
            pb.set_message(format!("Scanning... {} keys seen", HumanCount(keys_seen)));
        }
    }

    fn on_database_complete(&self, database: u64, patterns: usize, duration_secs: f64) {
        // No bar means the database was already given up on.
        if let Some(pb) = self.take_bar(database) {
            pb.finish_and_clear();
            let _ = self.multi.println(format!(
                "  \x1b[32m✓\x1b[0m db{}: {} patterns in {:.2}s",
                database, patterns, duration_secs
            ));
        }
    }

    fn on_database_failed(&self, database: u64, error: &Error) {
        if let Some(pb) = self.take_bar(database) {
            pb.finish_and_clear();
        }
        let _ = self.multi.println(format!(
            "  \x1b[31m✗\x1b[0m db{}: {}",
            database,
            error.kind()
        ));
    }
}
