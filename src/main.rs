//! dfs-walker - Parallel find/grep/count
//!
//! Entry point for the CLI application.

use anyhow::{bail, Context as _, Result};
use clap::Parser;
use dfs_walker::config::{CliArgs, SearchConfig, SearchMode};
use dfs_walker::fs::FsWalker;
use dfs_walker::progress::{print_header, print_metrics, print_summary, ProgressReporter};
use dfs_walker::tree::{BinaryTree, TreeShape};
use dfs_walker::walker::{serial_traverse, Context, MetricsSnapshot, Traversal};
use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();

    setup_logging(args.verbose)?;

    let config = SearchConfig::from_args(args).context("Invalid configuration")?;

    let ctx = match config.timeout {
        Some(timeout) => Context::with_timeout(timeout),
        None => Context::background(),
    };

    // Ctrl-C cancels the running traversal
    let handle = ctx.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        handle.cancel();
    })
    .context("Failed to set signal handler")?;

    match config.mode {
        SearchMode::Bench { nodes, shape, rounds } => run_bench(&ctx, &config, nodes, shape, rounds),
        _ => run_search(&ctx, &config),
    }
}

fn run_search(ctx: &Context, config: &SearchConfig) -> Result<()> {
    let command = match config.mode {
        SearchMode::Find { .. } => "find",
        SearchMode::Grep { .. } => "grep",
        _ => "count",
    };

    let progress = config.show_progress.then(ProgressReporter::new);
    let mut walker = FsWalker::from_config(config);
    if let Some(p) = &progress {
        print_header(command, &config.root.display().to_string(), config.options.max_workers);
        walker = walker.metrics_sink(p.sink());
    }

    let result = walker.search(ctx, config);
    if let Some(p) = &progress {
        match &result {
            Ok(_) => p.finish_and_clear(),
            Err(_) => p.finish("Search interrupted"),
        }
    }
    let result = result.with_context(|| format!("{} failed in {}", command, config.root.display()))?;

    if !matches!(config.mode, SearchMode::Count) {
        for line in &result.matches {
            println!("{}", line);
        }
    }
    for err in &result.errors {
        eprintln!("{}", err);
    }

    if matches!(config.mode, SearchMode::Count) || config.show_progress {
        print_summary(&result.stats, &result.metrics, result.errors.len());
    }
    if config.verbose {
        print_metrics(&result.metrics);
    }

    if !result.errors.is_empty() {
        info!(errors = result.errors.len(), "Search completed with errors");
    }
    Ok(())
}

fn run_bench(ctx: &Context, config: &SearchConfig, nodes: usize, shape: TreeShape, rounds: usize) -> Result<()> {
    let seed = config.options.seed.unwrap_or(42);
    let mut tree = BinaryTree::generate(shape, nodes, seed);
    let size = tree.compute_subtree_sizes();
    let Some(root) = tree.root() else {
        bail!("tree is empty");
    };
    info!(nodes = size, depth = tree.max_depth(), ?shape, "Tree generated");

    let serial_start = Instant::now();
    let serial = serial_traverse(&tree, root, |_| Ok(())).map_err(|e| anyhow::anyhow!(e))?;
    let serial_elapsed = serial_start.elapsed();

    for round in 1..=rounds {
        tree.reset_visited();
        let visits = AtomicU64::new(0);

        let mut traversal = Traversal::new(&tree, config.options.clone()).visitor(|_| {
            visits.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });
        if config.verbose {
            traversal = traversal.metrics_sink(Arc::new(|s: &MetricsSnapshot| {
                debug!(tasks = s.tasks_processed, steals = s.steals, "Metrics sample");
            }));
        }

        let report = traversal
            .run(ctx, root)
            .with_context(|| format!("bench round {} failed", round))?;

        let visited = visits.load(Ordering::Relaxed);
        if visited != serial.visited || tree.visited_count() != size {
            bail!(
                "round {}: visited {} nodes, expected {}",
                round,
                visited,
                serial.visited
            );
        }

        println!(
            "round {}: {} nodes in {:.3}ms (serial {:.3}ms), {} steals, {} inline",
            round,
            visited,
            report.metrics.elapsed.as_secs_f64() * 1e3,
            serial_elapsed.as_secs_f64() * 1e3,
            report.metrics.steals,
            report.metrics.inline_tasks,
        );
        if config.show_progress {
            print_metrics(&report.metrics);
        }
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("dfs_walker=debug,warn")
    } else {
        EnvFilter::new("dfs_walker=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
