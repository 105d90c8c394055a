//! Configuration types for page-walker
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime fetch configuration with validation
//! - Settings for the simulated paginated API used by the binary

use crate::error::ConfigError;
use crate::pager::detector::DEFAULT_POLL_INTERVAL;
use crate::pager::queue::DEFAULT_QUEUE_CAPACITY;
use crate::simulate::SimulatedApi;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Maximum reasonable worker count
pub const MAX_WORKERS: usize = 512;

/// Minimum queue capacity
pub const MIN_QUEUE_CAPACITY: usize = 1;

/// Default number of fetch workers
pub const DEFAULT_WORKERS: usize = 10;

/// Default time a worker waits for a token before exiting
pub const DEFAULT_POP_TIMEOUT: Duration = Duration::from_secs(2);

/// Parallel fetcher for paginated APIs
#[derive(Parser, Debug, Clone)]
#[command(
    name = "page-walker",
    version,
    about = "Fetch every page of a paginated API with a pool of workers",
    long_about = "Fetches a complete result set from a paginated API whose continuation \
                  tokens are only discovered one page at a time.\n\n\
                  This build drives a simulated in-process API and writes the collected \
                  records as JSON Lines.",
    after_help = "EXAMPLES:\n    \
        page-walker --pages 200 --page-size 100 -o findings.jsonl\n    \
        page-walker -w 32 --pages 1000 --latency-ms 25 -v\n    \
        page-walker --pages 10 --fail-at 4   # exercise failure handling"
)]
pub struct CliArgs {
    /// Output file for collected records ("-" for stdout)
    #[arg(short, long, default_value = "records.jsonl", value_name = "FILE", env = "OUTPUT_FILE")]
    pub output: PathBuf,

    /// Number of parallel fetch workers
    #[arg(
        short = 'w',
        long,
        default_value_t = DEFAULT_WORKERS,
        value_name = "NUM",
        env = "WORKER_COUNT"
    )]
    pub workers: usize,

    /// Maximum number of queued continuation tokens
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY, value_name = "NUM")]
    pub queue_capacity: usize,

    /// How long an idle worker waits for a token before exiting (ms)
    #[arg(long, default_value = "2000", value_name = "MS")]
    pub pop_timeout_ms: u64,

    /// Termination detector heartbeat interval (ms)
    #[arg(long, default_value = "500", value_name = "MS")]
    pub poll_interval_ms: u64,

    /// Number of pages the simulated API serves
    #[arg(long, default_value = "50", value_name = "NUM")]
    pub pages: usize,

    /// Records per simulated page
    #[arg(long, default_value = "100", value_name = "NUM")]
    pub page_size: usize,

    /// Simulated per-request latency (ms)
    #[arg(long, default_value = "20", value_name = "MS")]
    pub latency_ms: u64,

    /// Make the simulated API fail on this page index
    #[arg(long, value_name = "PAGE")]
    pub fail_at: Option<usize>,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Validated fetch configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// Number of worker threads
    pub worker_count: usize,

    /// Token queue capacity
    pub queue_capacity: usize,

    /// Per-dequeue wait before an idle worker exits
    pub pop_timeout: Duration,

    /// Termination detector heartbeat
    pub poll_interval: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            pop_timeout: DEFAULT_POP_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl FetchConfig {
    /// Set the worker count
    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the token queue capacity
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Set the per-dequeue timeout
    pub fn with_pop_timeout(mut self, pop_timeout: Duration) -> Self {
        self.pop_timeout = pop_timeout;
        self
    }

    /// Set the detector heartbeat interval
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Check all settings are in range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 || self.worker_count > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: self.worker_count,
                max: MAX_WORKERS,
            });
        }

        if self.queue_capacity < MIN_QUEUE_CAPACITY {
            return Err(ConfigError::InvalidQueueCapacity {
                capacity: self.queue_capacity,
                min: MIN_QUEUE_CAPACITY,
            });
        }

        if self.pop_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout {
                name: "pop timeout",
            });
        }

        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout {
                name: "poll interval",
            });
        }

        Ok(())
    }

    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let config = Self {
            worker_count: args.workers,
            queue_capacity: args.queue_capacity,
            pop_timeout: Duration::from_millis(args.pop_timeout_ms),
            poll_interval: Duration::from_millis(args.poll_interval_ms),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Validated settings for a CLI run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Fetch engine settings
    pub fetch: FetchConfig,

    /// Simulated source
    pub api: SimulatedApi,

    /// Output path, `None` for stdout
    pub output_path: Option<PathBuf>,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl RunConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let fetch = FetchConfig::from_args(&args)?;

        if args.page_size == 0 {
            return Err(ConfigError::InvalidSimulation {
                name: "page-size",
                reason: "must be at least 1".into(),
            });
        }

        if let Some(fail_at) = args.fail_at {
            if fail_at >= args.pages.max(1) {
                return Err(ConfigError::InvalidSimulation {
                    name: "fail-at",
                    reason: format!("page {} is beyond the last page", fail_at),
                });
            }
        }

        let output_path = if args.output.as_os_str() == "-" {
            None
        } else {
            if let Some(parent) = args.output.parent() {
                if parent.is_file() {
                    return Err(ConfigError::InvalidOutputPath {
                        path: args.output.clone(),
                        reason: format!("'{}' is a file, not a directory", parent.display()),
                    });
                }
            }
            Some(args.output)
        };

        let mut api = SimulatedApi::new(args.pages, args.page_size)
            .with_latency(Duration::from_millis(args.latency_ms));
        if let Some(fail_at) = args.fail_at {
            api = api.failing_at(fail_at);
        }

        Ok(Self {
            fetch,
            api,
            output_path,
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }

    /// Human-readable output location
    pub fn output_display(&self) -> String {
        match &self.output_path {
            Some(path) => path.display().to_string(),
            None => "<stdout>".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["page-walker"];
        argv.extend_from_slice(extra);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn test_default_config() {
        let config = FetchConfig::default();
        assert_eq!(config.worker_count, 10);
        assert_eq!(config.queue_capacity, 1000);
        assert_eq!(config.pop_timeout, Duration::from_secs(2));
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_worker_count() {
        let config = FetchConfig::default().with_workers(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWorkerCount { count: 0, .. })
        ));

        let config = FetchConfig::default().with_workers(MAX_WORKERS + 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_capacity_and_timeouts() {
        let config = FetchConfig::default().with_queue_capacity(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidQueueCapacity { capacity: 0, .. })
        ));

        let config = FetchConfig::default().with_pop_timeout(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout { name: "pop timeout" })
        ));

        let config = FetchConfig::default().with_poll_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_args() {
        let config = RunConfig::from_args(args(&[
            "-w",
            "4",
            "--queue-capacity",
            "16",
            "--pop-timeout-ms",
            "250",
            "--pages",
            "7",
            "--fail-at",
            "3",
            "-o",
            "-",
            "-q",
        ]))
        .unwrap();

        assert_eq!(config.fetch.worker_count, 4);
        assert_eq!(config.fetch.queue_capacity, 16);
        assert_eq!(config.fetch.pop_timeout, Duration::from_millis(250));
        assert_eq!(config.api.pages(), 7);
        assert_eq!(config.api.fail_at(), Some(3));
        assert!(config.output_path.is_none());
        assert_eq!(config.output_display(), "<stdout>");
        assert!(!config.show_progress);
    }

    #[test]
    fn test_from_args_rejects_bad_simulation() {
        assert!(matches!(
            RunConfig::from_args(args(&["--pages", "5", "--fail-at", "5"])),
            Err(ConfigError::InvalidSimulation { name: "fail-at", .. })
        ));
        assert!(matches!(
            RunConfig::from_args(args(&["--page-size", "0"])),
            Err(ConfigError::InvalidSimulation { name: "page-size", .. })
        ));
        assert!(matches!(
            RunConfig::from_args(args(&["-w", "0"])),
            Err(ConfigError::InvalidWorkerCount { .. })
        ));
    }
}
