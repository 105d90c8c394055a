//! Progress reporting for the paginated fetch
//!
//! Provides real-time progress display using indicatif progress bars.

use crate::pager::FetchProgress;
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays fetch status
pub struct ProgressReporter {
    /// Progress bar
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &FetchProgress) {
        self.bar.set_message(format_progress(progress));
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
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

fn format_progress(progress: &FetchProgress) -> String {
    let mut msg = format!(
        "Pages: {} | Records: {} | Rate: {:.0}/s | Queue: {} | Workers: {}/{}",
        format_number(progress.pages),
        format_number(progress.records as u64),
        progress.records_per_second(),
        progress.queued,
        progress.active_workers,
        progress.total_workers,
    );
    if progress.dropped > 0 {
        msg.push_str(&format!(" | Dropped: {}", progress.dropped));
    }
    msg
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Final numbers for the summary block
#[derive(Debug, Clone)]
pub struct Summary<'a> {
    pub pages: u64,
    pub records: usize,
    pub dropped_tokens: u64,
    pub duration: Duration,
    pub output: &'a str,
    pub output_bytes: u64,
}

/// Print a summary of the fetch results
pub fn print_summary(summary: &Summary<'_>) {
    let duration_secs = summary.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        summary.records as f64 / duration_secs
    } else {
        0.0
    };

    eprintln!();
    eprintln!("{}", style("Fetch Complete").green().bold());
    eprintln!("{}", style("─".repeat(50)).dim());
    eprintln!("  {} {}", style("Pages:").bold(), format_number(summary.pages));
    eprintln!(
        "  {} {}",
        style("Records:").bold(),
        format_number(summary.records as u64)
    );
    eprintln!(
        "  {} {:.1}s ({:.0} records/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if summary.dropped_tokens > 0 {
        eprintln!(
            "  {} {} (result set incomplete)",
            style("Dropped tokens:").yellow().bold(),
            format_number(summary.dropped_tokens)
        );
    }
    eprintln!(
        "  {} {} ({})",
        style("Output:").bold(),
        summary.output,
        format_size(summary.output_bytes, BINARY)
    );
    eprintln!();
}

/// Print a header at the start of the fetch
pub fn print_header(source: &str, workers: usize, output: &str) {
    eprintln!();
    eprintln!(
        "{} {}",
        style("page-walker").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("{}", style("─".repeat(50)).dim());
    eprintln!("  {} {}", style("Source:").bold(), source);
    eprintln!("  {} {}", style("Workers:").bold(), workers);
    eprintln!("  {} {}", style("Output:").bold(), output);
    eprintln!();
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

    #[test]
    fn test_format_progress() {
        let progress = FetchProgress {
            pages: 12,
            records: 1200,
            queued: 1,
            active_workers: 3,
            total_workers: 8,
            dropped: 0,
            elapsed: Duration::from_secs(2),
        };
        assert_eq!(
            format_progress(&progress),
            "Pages: 12 | Records: 1,200 | Rate: 600/s | Queue: 1 | Workers: 3/8"
        );

        let progress = FetchProgress {
            dropped: 2,
            ..progress
        };
        assert!(format_progress(&progress).ends_with("| Dropped: 2"));
    }
}
