//! Progress reporting for the CLI
//!
//! A spinner fed by the traversal's metrics sink, plus header and summary
//! printing.

use crate::fs::SearchStats;
use crate::walker::{MetricsSink, MetricsSnapshot};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

/// Spinner that displays live scheduler metrics
#[derive(Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        let msg = format!(
            "Tasks: {} | Rate: {:.0}/s | Steals: {} | Inline: {} | Queue max: {}",
            format_number(snapshot.tasks_processed),
            snapshot.tasks_per_second(),
            format_number(snapshot.steals),
            format_number(snapshot.inline_tasks),
            snapshot.queue_len_max,
        );

        self.bar.set_message(msg);
    }

    /// Metrics sink that drives this reporter
    pub fn sink(&self) -> MetricsSink {
        let reporter = self.clone();
        Arc::new(move |snapshot: &MetricsSnapshot| reporter.update(snapshot))
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut out = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Print a header at the start of a run
pub fn print_header(command: &str, root: &str, workers: usize) {
    eprintln!();
    eprintln!(
        "{} {}",
        style("dfs-walker").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("{}", style("─".repeat(50)).dim());
    eprintln!("  {} {}", style("Command:").bold(), command);
    eprintln!("  {} {}", style("Root:").bold(), root);
    eprintln!("  {} {}", style("Workers:").bold(), workers);
    eprintln!();
}

/// Print a summary of a filesystem search
pub fn print_summary(stats: &SearchStats, metrics: &MetricsSnapshot, errors: usize) {
    let secs = metrics.elapsed.as_secs_f64();

    eprintln!();
    eprintln!("{}", style("Search Complete").green().bold());
    eprintln!("{}", style("─".repeat(50)).dim());
    eprintln!("  {} {}", style("Directories:").bold(), format_number(stats.dirs_visited));
    eprintln!("  {} {}", style("Files:").bold(), format_number(stats.files_visited));
    eprintln!("  {} {}", style("Matches:").bold(), format_number(stats.matches));
    eprintln!("  {} {}", style("Pruned:").bold(), format_number(stats.pruned));
    if stats.bytes_scanned > 0 {
        eprintln!(
            "  {} {}",
            style("Scanned:").bold(),
            format_size(stats.bytes_scanned, BINARY)
        );
    }
    eprintln!(
        "  {} {:.3}s ({:.0} tasks/sec)",
        style("Duration:").bold(),
        secs,
        metrics.tasks_per_second()
    );
    if errors > 0 {
        eprintln!("  {} {}", style("Errors:").yellow().bold(), format_number(errors as u64));
    }
    eprintln!();
}

/// Print scheduler metrics
pub fn print_metrics(metrics: &MetricsSnapshot) {
    let rows: [(&str, u64); 12] = [
        ("Tasks processed:", metrics.tasks_processed),
        ("Pushes:", metrics.pushes),
        ("Pops:", metrics.pops),
        ("Steals:", metrics.steals),
        ("Steal chunks:", metrics.steal_chunks),
        ("Queue high hits:", metrics.queue_high_hits),
        ("Queue len max:", metrics.queue_len_max),
        ("Inline tasks:", metrics.inline_tasks),
        ("Idle yields:", metrics.idle_yields),
        ("Duplicates:", metrics.duplicates),
        ("Evaluations:", metrics.evaluations),
        ("Expand errors:", metrics.expand_errors),
    ];

    eprintln!("{}", style("Scheduler").bold());
    for (label, value) in rows {
        eprintln!("  {:<18} {}", label, format_number(value));
    }
    if let Some(depth) = metrics.min_stolen_depth {
        eprintln!("  {:<18} {}", "Min stolen depth:", depth);
    }
    eprintln!(
        "  {:<18} {:.3}s",
        "Elapsed:",
        metrics.elapsed.as_secs_f64()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_number(1234567890), "1,234,567,890");
    }
}
