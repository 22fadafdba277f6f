//! Configuration types for dfs-walker
//!
//! This module defines:
//! - `Options`, the immutable engine snapshot captured at traversal start
//! - CLI argument parsing using clap derive macros
//! - Runtime search configuration with validation

use crate::error::ConfigError;
use crate::tree::TreeShape;
use clap::Parser;
use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;

/// Maximum reasonable worker count
pub const MAX_WORKERS: usize = 512;

/// File pattern used by `grep` when none is given
pub const DEFAULT_GREP_FILES: &str = r"\.(go|c|h|py|js|ts|rs)$";

/// Progress refresh interval when progress output is enabled
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Engine configuration snapshot
///
/// Captured by value when a traversal starts and never mutated afterwards.
/// Every worker reads the same snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// Number of worker threads
    pub max_workers: usize,

    /// Depth at or above which all children are published between watermarks
    pub depth_parallel_threshold: usize,

    /// Round-robin victim selection instead of randomized
    pub deterministic: bool,

    /// Cancel the traversal on the first visitor error
    pub cancel_on_error: bool,

    /// Tasks shallower than this are never stolen
    pub steal_depth_min: usize,

    /// Tasks taken per steal (1 = single steal)
    pub chunk_steal_size: usize,

    /// Local queue length at or below which all children are published
    pub queue_pressure_low: usize,

    /// Local queue length at or above which only one child is published
    pub queue_pressure_high: usize,

    /// Run the visitor on a separate evaluator pool
    pub two_stage: bool,

    /// Periodic metrics sampling interval (None = only at completion)
    pub metrics_interval: Option<Duration>,

    /// Siblings beyond the first with less estimated work stay on the worker
    pub min_work_to_parallelize: usize,

    /// Seed for randomized victim selection
    pub seed: Option<u64>,

    /// Evaluator pool size for two-stage mode (defaults to `max_workers`)
    pub evaluator_workers: Option<usize>,

    /// Evaluation queue capacity (defaults to `4 * max_workers`)
    pub eval_queue_capacity: Option<usize>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_workers: default_workers(),
            depth_parallel_threshold: 12,
            deterministic: false,
            cancel_on_error: true,
            steal_depth_min: 8,
            chunk_steal_size: 1,
            queue_pressure_low: 2,
            queue_pressure_high: 64,
            two_stage: false,
            metrics_interval: None,
            min_work_to_parallelize: 0,
            seed: None,
            evaluator_workers: None,
            eval_queue_capacity: None,
        }
    }
}

impl Options {
    /// Defaults tuned for directory trees: shallow steal floor, chunked steals
    pub fn for_filesystem(workers: usize) -> Self {
        let workers = if workers == 0 { default_workers() } else { workers };
        Self {
            max_workers: workers,
            depth_parallel_threshold: 3,
            cancel_on_error: false,
            steal_depth_min: 2,
            chunk_steal_size: 4,
            queue_pressure_low: 4,
            queue_pressure_high: 64,
            ..Self::default()
        }
    }

    /// Validate the snapshot before any worker is started
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 || self.max_workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: self.max_workers,
                max: MAX_WORKERS,
            });
        }

        if self.chunk_steal_size == 0 {
            return Err(ConfigError::InvalidChunkSize {
                size: self.chunk_steal_size,
            });
        }

        if let Some(count) = self.evaluator_workers {
            if count == 0 || count > MAX_WORKERS {
                return Err(ConfigError::InvalidEvaluatorCount {
                    count,
                    max: MAX_WORKERS,
                });
            }
        }

        if self.eval_queue_capacity == Some(0) {
            return Err(ConfigError::InvalidQueueCapacity { capacity: 0 });
        }

        Ok(())
    }

    /// Effective evaluator pool size
    pub fn evaluator_count(&self) -> usize {
        self.evaluator_workers.unwrap_or(self.max_workers)
    }

    /// Effective evaluation queue capacity
    pub fn eval_capacity(&self) -> usize {
        self.eval_queue_capacity
            .unwrap_or(self.max_workers * 4)
            .max(1)
    }
}

fn default_workers() -> usize {
    num_cpus::get().max(1)
}

/// Parallel find/grep/count over a directory tree
#[derive(Parser, Debug, Clone)]
#[command(
    name = "dfs-walker",
    version,
    about = "Parallel find/grep/count using a work-stealing traversal engine",
    long_about = "Walks a directory tree with a fixed pool of workers that balance load by \
                  stealing from each other's deques.\n\n\
                  Dotfiles and common build/VCS directories are skipped unless \
                  --no-default-prune is given.",
    after_help = "EXAMPLES:\n    \
        dfs-walker find '\\.rs$' ~/src\n    \
        dfs-walker grep 'TODO' --files '\\.go$' . -w 8\n    \
        dfs-walker count /var/log --exclude 'archive'\n    \
        dfs-walker bench --nodes 1023 --shape balanced --deterministic"
)]
pub struct CliArgs {
    /// What to do
    #[command(subcommand)]
    pub command: Command,

    /// Number of worker threads
    #[arg(short = 'w', long, global = true, value_name = "NUM")]
    pub workers: Option<usize>,

    /// Round-robin victim selection
    #[arg(long, global = true)]
    pub deterministic: bool,

    /// Seed for randomized victim selection
    #[arg(long, global = true, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Never steal tasks shallower than this depth
    #[arg(long, global = true, value_name = "DEPTH")]
    pub steal_depth_min: Option<usize>,

    /// Tasks taken per steal
    #[arg(long, global = true, value_name = "NUM")]
    pub chunk_steal_size: Option<usize>,

    /// Queue length at or below which all children are published
    #[arg(long, global = true, value_name = "NUM")]
    pub queue_low: Option<usize>,

    /// Queue length at or above which only one child is published
    #[arg(long, global = true, value_name = "NUM")]
    pub queue_high: Option<usize>,

    /// Depth at or above which children are published between watermarks
    #[arg(long, global = true, value_name = "DEPTH")]
    pub depth_parallel_threshold: Option<usize>,

    /// Stop on the first visitor error
    #[arg(long, global = true)]
    pub cancel_on_error: bool,

    /// Keep sibling directories with less estimated work than this local
    #[arg(long = "min-work", global = true, value_name = "NUM")]
    pub min_work_to_parallelize: Option<usize>,

    /// Run matching on a separate evaluator pool (always on for grep)
    #[arg(long, global = true)]
    pub two_stage: bool,

    /// Evaluator threads in two-stage mode (defaults to --workers)
    #[arg(long = "evaluators", global = true, value_name = "NUM")]
    pub evaluator_workers: Option<usize>,

    /// Evaluation queue capacity in two-stage mode
    #[arg(long = "eval-queue", global = true, value_name = "NUM")]
    pub eval_queue_capacity: Option<usize>,

    /// Give up after this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Metrics sampling interval in milliseconds (logged at debug level)
    #[arg(long, global = true, value_name = "MS")]
    pub metrics_interval_ms: Option<u64>,

    /// Exclude paths matching pattern (can be repeated)
    #[arg(long = "exclude", global = true, value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Do not skip dotfiles and build/VCS directories
    #[arg(long, global = true)]
    pub no_default_prune: bool,

    /// Follow symbolic links to directories
    #[arg(long, global = true)]
    pub follow_links: bool,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

/// Subcommands
#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Find files whose name matches a regex
    Find {
        /// Filename regex (empty matches everything)
        #[arg(value_name = "PATTERN", default_value = "")]
        pattern: String,

        /// Directory to search (defaults to the current directory)
        #[arg(value_name = "ROOT")]
        root: Option<PathBuf>,
    },

    /// Search file contents
    Grep {
        /// Content regex
        #[arg(value_name = "PATTERN")]
        pattern: String,

        /// Directory to search (defaults to the current directory)
        #[arg(value_name = "ROOT")]
        root: Option<PathBuf>,

        /// Filename regex selecting which files are read
        #[arg(long = "files", value_name = "REGEX", default_value = DEFAULT_GREP_FILES)]
        file_pattern: String,
    },

    /// Count files and directories
    Count {
        /// Directory to count (defaults to the current directory)
        #[arg(value_name = "ROOT")]
        root: Option<PathBuf>,
    },

    /// Traverse an in-memory binary tree and report scheduler metrics
    Bench {
        /// Number of nodes
        #[arg(short = 'n', long, default_value = "1023")]
        nodes: usize,

        /// Tree shape
        #[arg(long, value_enum, default_value = "balanced")]
        shape: TreeShape,

        /// Repeat the traversal this many times
        #[arg(long, default_value = "1")]
        rounds: usize,
    },
}

/// What a validated configuration will run
#[derive(Debug, Clone)]
pub enum SearchMode {
    /// Filename search
    Find { pattern: Regex },

    /// Content search
    Grep { files: Regex, content: Regex },

    /// File and directory totals
    Count,

    /// In-memory binary tree benchmark
    Bench {
        nodes: usize,
        shape: TreeShape,
        rounds: usize,
    },
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Operation to run
    pub mode: SearchMode,

    /// Root directory (unused by `bench`)
    pub root: PathBuf,

    /// Engine options
    pub options: Options,

    /// Compiled exclude patterns
    pub exclude_patterns: Vec<Regex>,

    /// Apply the default dotfile/build-directory prune
    pub default_prune: bool,

    /// Follow symbolic links to directories
    pub follow_links: bool,

    /// Caller-side timeout
    pub timeout: Option<Duration>,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl SearchConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let (mode, root, two_stage) = match args.command {
            Command::Find { pattern, root } => {
                let pattern = if pattern.is_empty() { ".*".to_string() } else { pattern };
                (SearchMode::Find { pattern: compile(&pattern)? }, root, args.two_stage)
            }
            Command::Grep {
                pattern,
                root,
                file_pattern,
            } => {
                let files = compile(&file_pattern)?;
                let content = compile(&pattern)?;
                (SearchMode::Grep { files, content }, root, true)
            }
            Command::Count { root } => (SearchMode::Count, root, args.two_stage),
            Command::Bench { nodes, shape, rounds } => (
                SearchMode::Bench {
                    nodes,
                    shape,
                    rounds: rounds.max(1),
                },
                None,
                args.two_stage,
            ),
        };

        let root = match root {
            Some(root) => root,
            None => std::env::current_dir().map_err(|e| ConfigError::InvalidRoot {
                path: PathBuf::from("."),
                reason: e.to_string(),
            })?,
        };

        let mut options = match mode {
            SearchMode::Bench { .. } => Options::default(),
            _ => Options::for_filesystem(0),
        };
        if let Some(workers) = args.workers {
            options.max_workers = workers;
        }
        if let Some(depth) = args.steal_depth_min {
            options.steal_depth_min = depth;
        }
        if let Some(size) = args.chunk_steal_size {
            options.chunk_steal_size = size;
        }
        if let Some(low) = args.queue_low {
            options.queue_pressure_low = low;
        }
        if let Some(high) = args.queue_high {
            options.queue_pressure_high = high;
        }
        if let Some(depth) = args.depth_parallel_threshold {
            options.depth_parallel_threshold = depth;
        }
        if let Some(work) = args.min_work_to_parallelize {
            options.min_work_to_parallelize = work;
        }
        options.evaluator_workers = args.evaluator_workers;
        options.eval_queue_capacity = args.eval_queue_capacity;
        options.deterministic = args.deterministic;
        options.seed = args.seed;
        options.two_stage = two_stage;
        options.cancel_on_error |= args.cancel_on_error;
        options.metrics_interval = match args.metrics_interval_ms {
            Some(ms) if ms > 0 => Some(Duration::from_millis(ms)),
            _ if !args.quiet => Some(PROGRESS_INTERVAL),
            _ => None,
        };
        options.validate()?;

        let exclude_patterns = args
            .exclude_patterns
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            mode,
            root,
            options,
            exclude_patterns,
            default_prune: !args.no_default_prune,
            follow_links: args.follow_links,
            timeout: args.timeout.map(Duration::from_secs),
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }

    /// Check if a path should be excluded
    pub fn is_excluded(&self, path: &str) -> bool {
        self.exclude_patterns.iter().any(|re| re.is_match(path))
    }
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_default_options_valid() {
        assert!(Options::default().validate().is_ok());
        assert!(Options::for_filesystem(4).validate().is_ok());
    }

    #[test]
    fn test_filesystem_defaults() {
        let opts = Options::for_filesystem(4);
        assert_eq!(opts.max_workers, 4);
        assert_eq!(opts.depth_parallel_threshold, 3);
        assert_eq!(opts.steal_depth_min, 2);
        assert_eq!(opts.chunk_steal_size, 4);
        assert!(!opts.cancel_on_error);
        assert_eq!(opts.eval_capacity(), 16);
        assert_eq!(opts.evaluator_count(), 4);
    }

    #[test]
    fn test_invalid_worker_count() {
        let opts = Options {
            max_workers: 0,
            ..Options::default()
        };
        assert_eq!(
            opts.validate(),
            Err(ConfigError::InvalidWorkerCount {
                count: 0,
                max: MAX_WORKERS
            })
        );

        let opts = Options {
            max_workers: MAX_WORKERS + 1,
            ..Options::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_invalid_chunk_and_evaluators() {
        let opts = Options {
            chunk_steal_size: 0,
            ..Options::default()
        };
        assert_eq!(
            opts.validate(),
            Err(ConfigError::InvalidChunkSize { size: 0 })
        );

        let opts = Options {
            evaluator_workers: Some(0),
            ..Options::default()
        };
        assert!(matches!(
            opts.validate(),
            Err(ConfigError::InvalidEvaluatorCount { .. })
        ));
    }

    #[test]
    fn test_find_config() {
        let config = SearchConfig::from_args(parse(&[
            "dfs-walker", "find", r"\.txt$", "/tmp", "-w", "3", "--deterministic", "-q",
        ]))
        .unwrap();

        assert_eq!(config.root, PathBuf::from("/tmp"));
        assert_eq!(config.options.max_workers, 3);
        assert!(config.options.deterministic);
        assert!(!config.options.two_stage);
        assert!(config.options.metrics_interval.is_none());
        assert!(config.default_prune);
        match config.mode {
            SearchMode::Find { pattern } => assert!(pattern.is_match("a.txt")),
            other => panic!("unexpected mode {other:?}"),
        }
    }

    #[test]
    fn test_grep_enables_two_stage() {
        let config =
            SearchConfig::from_args(parse(&["dfs-walker", "grep", "TODO", "/src", "--files", r"\.rs$"]))
                .unwrap();
        assert!(config.options.two_stage);
        assert!(config.options.metrics_interval.is_some());
        assert!(matches!(config.mode, SearchMode::Grep { .. }));
    }

    #[test]
    fn test_engine_flags_reach_options() {
        let config = SearchConfig::from_args(parse(&[
            "dfs-walker", "count", "/src", "--two-stage", "--min-work", "8", "--evaluators", "3",
            "--eval-queue", "32",
        ]))
        .unwrap();
        assert!(config.options.two_stage);
        assert_eq!(config.options.min_work_to_parallelize, 8);
        assert_eq!(config.options.evaluator_count(), 3);
        assert_eq!(config.options.eval_capacity(), 32);

        let err = SearchConfig::from_args(parse(&["dfs-walker", "find", "x", "--eval-queue", "0"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidQueueCapacity { .. }));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = SearchConfig::from_args(parse(&["dfs-walker", "find", "(unclosed"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn test_exclude_pattern() {
        let config = SearchConfig::from_args(parse(&[
            "dfs-walker", "count", "/data", "--exclude", r"\.snapshot",
        ]))
        .unwrap();

        assert!(config.is_excluded("/data/.snapshot/hourly.0"));
        assert!(!config.is_excluded("/data/myfile.txt"));
    }

    #[test]
    fn test_bench_uses_tree_defaults() {
        let config = SearchConfig::from_args(parse(&[
            "dfs-walker", "bench", "--nodes", "1023", "--shape", "random", "--rounds", "0",
        ]))
        .unwrap();
        assert_eq!(config.options.steal_depth_min, 8);
        assert!(config.options.cancel_on_error);
        match config.mode {
            SearchMode::Bench { nodes, shape, rounds } => {
                assert_eq!(nodes, 1023);
                assert_eq!(shape, TreeShape::Random);
                assert_eq!(rounds, 1);
            }
            other => panic!("unexpected mode {other:?}"),
        }
    }
}
