//! Integration tests for dfs-walker
//!
//! Filesystem searches run against throwaway directory trees built with
//! tempfile; nothing outside the temp directory is touched.

use clap::Parser;
use dfs_walker::config::{CliArgs, Options, SearchConfig, SearchMode};
use dfs_walker::error::{ConfigError, TraverseError, WalkerError};
use dfs_walker::fs::{default_prune, serial_find, FsWalker, MAX_DEPTH};
use dfs_walker::walker::{Context, MetricsSink, MetricsSnapshot};
use parking_lot::Mutex;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn walker(workers: usize) -> FsWalker {
    FsWalker::new(Options {
        seed: Some(3),
        ..Options::for_filesystem(workers)
    })
}

fn touch(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn sorted(mut v: Vec<String>) -> Vec<String> {
    v.sort();
    v
}

/// A few hundred files spread over nested directories
fn populate(root: &Path) {
    for a in 0..6 {
        for b in 0..5 {
            let dir = root.join(format!("d{a}")).join(format!("s{b}"));
            for f in 0..8 {
                let ext = if f % 3 == 0 { "rs" } else { "txt" };
                touch(&dir.join(format!("f{f}.{ext}")), "line\n");
            }
        }
        touch(&root.join(format!("d{a}")).join("README.md"), "readme\n");
    }
    touch(&root.join(".git").join("config"), "[core]\n");
    touch(&root.join("target").join("debug").join("out.rs"), "fn main() {}\n");
}

#[test]
fn test_find_skips_vcs_directory() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    touch(&root.join("a.txt"), "");
    touch(&root.join("b").join("c.txt"), "");
    touch(&root.join(".git").join("ignored"), "");

    let pattern = Regex::new(r"\.txt$").unwrap();
    let result = walker(4).find(&Context::background(), root, &pattern).unwrap();

    let expected = sorted(vec![
        root.join("a.txt").display().to_string(),
        root.join("b").join("c.txt").display().to_string(),
    ]);
    assert_eq!(sorted(result.matches), expected);
    assert!(result.errors.is_empty());

    // Only the root and b/ are enumerated; .git is dropped as a child
    assert_eq!(result.stats.dirs_visited, 2);
    assert_eq!(result.stats.files_visited, 2);
    assert_eq!(result.stats.pruned, 1);
}

#[test]
fn test_parallel_find_matches_serial() {
    let dir = tempdir().unwrap();
    populate(dir.path());
    let pattern = Regex::new(r"\.rs$").unwrap();

    let serial = sorted(serial_find(dir.path(), &pattern, Arc::new(default_prune)).unwrap());
    assert_eq!(serial.len(), 6 * 5 * 3);

    for workers in [1, 2, 4, 8] {
        let result = walker(workers)
            .find(&Context::background(), dir.path(), &pattern)
            .unwrap();
        assert_eq!(sorted(result.matches), serial, "workers={workers}");
    }
}

#[test]
fn test_count_includes_dirs_and_files() {
    let dir = tempdir().unwrap();
    populate(dir.path());

    let result = walker(4).count(&Context::background(), dir.path()).unwrap();

    // 6 + 30 directories, 240 + 6 files; root, .git and target excluded
    assert_eq!(result.matches.len(), 36 + 246);
    assert_eq!(result.stats.matches, 282);
    assert_eq!(result.stats.dirs_visited, 37);
    assert_eq!(result.stats.files_visited, 246);
    assert_eq!(result.metrics.tasks_processed, 283);
    // Files never go through a deque
    assert!(result.metrics.inline_tasks >= 246);
}

#[test]
fn test_queue_pressure_counts_directories_only() {
    let dir = tempdir().unwrap();
    for i in 0..200 {
        touch(&dir.path().join(format!("file{i}.txt")), "");
    }
    for i in 0..3 {
        fs::create_dir(dir.path().join(format!("sub{i}"))).unwrap();
    }

    let result = walker(1).count(&Context::background(), dir.path()).unwrap();

    assert_eq!(result.matches.len(), 203);
    assert_eq!(result.metrics.queue_len_max, 3);
    assert_eq!(result.metrics.queue_high_hits, 0);
    assert_eq!(result.metrics.inline_tasks, 200);
}

#[test]
fn test_custom_prune_and_no_default_prune() {
    let dir = tempdir().unwrap();
    populate(dir.path());
    let pattern = Regex::new(r"\.rs$").unwrap();

    let everything = walker(3)
        .prune(|_, _| false)
        .find(&Context::background(), dir.path(), &pattern)
        .unwrap();
    assert_eq!(everything.matches.len(), 91);
    assert_eq!(everything.stats.pruned, 0);

    let no_d0 = walker(3)
        .prune(|path, is_dir| is_dir && path.ends_with("d0"))
        .find(&Context::background(), dir.path(), &pattern)
        .unwrap();
    assert_eq!(no_d0.matches.len(), 91 - 15);
}

#[test]
fn test_grep_reports_matching_lines() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    touch(&root.join("main.rs"), "fn main() {\n    // TODO: parse args\n}\n");
    touch(&root.join("lib").join("util.rs"), "  TODO first  \nnothing\nTODO second\n");
    touch(&root.join("notes.md"), "TODO not read\n");
    touch(&root.join("clean.rs"), "fn clean() {}\n");

    let files = Regex::new(r"\.rs$").unwrap();
    let content = Regex::new("TODO").unwrap();
    let result = walker(4)
        .grep(&Context::background(), root, &files, &content)
        .unwrap();

    let main = root.join("main.rs").display().to_string();
    let util = root.join("lib").join("util.rs").display().to_string();
    let expected = sorted(vec![
        format!("{main}:2: // TODO: parse args"),
        format!("{util}:1: TODO first"),
        format!("{util}:3: TODO second"),
    ]);
    assert_eq!(sorted(result.matches), expected);
    assert_eq!(result.stats.matches, 3);
    assert!(result.stats.bytes_scanned > 0);

    // Every file is visited but only .rs files are read
    assert_eq!(result.stats.files_visited, 4);
    assert_eq!(result.metrics.evaluations, 6);
}

#[cfg(unix)]
#[test]
fn test_grep_read_failure_is_not_fatal() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    touch(&root.join("ok.txt"), "needle\n");
    std::os::unix::fs::symlink(root.join("missing.txt"), root.join("dangling.txt")).unwrap();

    let files = Regex::new(r"\.txt$").unwrap();
    let content = Regex::new("needle").unwrap();
    let result = walker(2)
        .grep(&Context::background(), root, &files, &content)
        .unwrap();

    assert_eq!(result.matches.len(), 1);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("dangling.txt"));
}

#[cfg(unix)]
#[test]
fn test_symlink_cycle_terminates() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    touch(&root.join("a").join("file.txt"), "");
    std::os::unix::fs::symlink(root, root.join("a").join("loop")).unwrap();

    let result = walker(4)
        .follow_links(true)
        .count(&Context::background(), root)
        .unwrap();

    // root and a/ are walked once; a/loop resolves back to root
    assert_eq!(result.stats.dirs_visited, 2);
    assert_eq!(result.stats.files_visited, 1);
    assert!(result.metrics.duplicates >= 1);

    // Without following, the link is a plain leaf
    let result = walker(4).count(&Context::background(), root).unwrap();
    assert_eq!(result.stats.dirs_visited, 2);
    assert_eq!(result.stats.files_visited, 2);
    assert_eq!(result.metrics.duplicates, 0);
}

#[test]
fn test_depth_cap() {
    let dir = tempdir().unwrap();
    let mut path = dir.path().to_path_buf();
    for level in 0..MAX_DEPTH + 5 {
        path = path.join(format!("l{level}"));
        touch(&path.join("f.txt"), "");
    }
    touch(&dir.path().join("f.txt"), "");

    let pattern = Regex::new(r"^f\.txt$").unwrap();
    let result = walker(4)
        .find(&Context::background(), dir.path(), &pattern)
        .unwrap();

    // Directories at depth 0..=MAX_DEPTH are enumerated, one file each; the
    // directory one level below is visited but not read
    assert_eq!(result.matches.len(), MAX_DEPTH + 1);
    assert_eq!(result.stats.dirs_visited as usize, MAX_DEPTH + 2);
}

#[test]
fn test_invalid_root() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope");
    let pattern = Regex::new(".*").unwrap();

    let err = walker(2)
        .find(&Context::background(), &missing, &pattern)
        .unwrap_err();
    assert!(matches!(err, WalkerError::Config(ConfigError::InvalidRoot { .. })));

    let err = serial_find(&missing, &pattern, Arc::new(default_prune)).unwrap_err();
    assert!(matches!(err, WalkerError::Config(ConfigError::InvalidRoot { .. })));
}

#[test]
fn test_invalid_options_rejected() {
    let dir = tempdir().unwrap();
    let walker = FsWalker::new(Options {
        chunk_steal_size: 0,
        ..Options::for_filesystem(2)
    });
    let err = walker.count(&Context::background(), dir.path()).unwrap_err();
    assert!(matches!(err, WalkerError::Config(ConfigError::InvalidChunkSize { size: 0 })));
}

#[test]
fn test_cancelled_context() {
    let dir = tempdir().unwrap();
    populate(dir.path());

    let ctx = Context::background();
    ctx.cancel();
    let err = walker(4).count(&ctx, dir.path()).unwrap_err();
    assert!(matches!(err, WalkerError::Traverse(TraverseError::Cancelled)));

    let ctx = Context::with_timeout(Duration::ZERO);
    let err = walker(4).count(&ctx, dir.path()).unwrap_err();
    assert!(matches!(err, WalkerError::Traverse(TraverseError::DeadlineExceeded)));
}

#[test]
fn test_metrics_sink_sees_final_snapshot() {
    let dir = tempdir().unwrap();
    populate(dir.path());

    let seen = Arc::new(Mutex::new(Vec::<MetricsSnapshot>::new()));
    let sink_seen = Arc::clone(&seen);
    let sink: MetricsSink = Arc::new(move |s: &MetricsSnapshot| sink_seen.lock().push(s.clone()));

    let result = walker(4)
        .metrics_sink(sink)
        .count(&Context::background(), dir.path())
        .unwrap();

    assert_eq!(seen.lock().last(), Some(&result.metrics));
}

#[test]
fn test_estimate_work_does_not_change_results() {
    let dir = tempdir().unwrap();
    populate(dir.path());
    let pattern = Regex::new(r"\.txt$").unwrap();

    let plain = walker(4)
        .find(&Context::background(), dir.path(), &pattern)
        .unwrap();
    let coarse = FsWalker::new(Options {
        min_work_to_parallelize: 4,
        ..Options::for_filesystem(4)
    })
    .estimate_work(|path| if path.extension().is_some() { 1 } else { 100 })
    .find(&Context::background(), dir.path(), &pattern)
    .unwrap();

    assert_eq!(sorted(plain.matches), sorted(coarse.matches));
}

#[test]
fn test_search_from_cli_args() {
    let dir = tempdir().unwrap();
    populate(dir.path());
    let root = dir.path().display().to_string();

    let args = CliArgs::try_parse_from([
        "dfs-walker",
        "find",
        r"\.rs$",
        root.as_str(),
        "-w",
        "3",
        "-q",
        "--exclude",
        "/d1/",
    ])
    .unwrap();
    let config = SearchConfig::from_args(args).unwrap();
    assert!(matches!(config.mode, SearchMode::Find { .. }));
    assert_eq!(config.options.max_workers, 3);
    assert!(!config.options.two_stage);

    let result = FsWalker::from_config(&config)
        .search(&Context::background(), &config)
        .unwrap();
    assert_eq!(result.matches.len(), 5 * 5 * 3);
    assert!(result.matches.iter().all(|m| !m.contains("/d1/")));

    let args = CliArgs::try_parse_from([
        "dfs-walker",
        "grep",
        "readme",
        root.as_str(),
        "--files",
        r"\.md$",
        "-q",
    ])
    .unwrap();
    let config = SearchConfig::from_args(args).unwrap();
    assert!(config.options.two_stage);
    let result = FsWalker::from_config(&config)
        .search(&Context::background(), &config)
        .unwrap();
    assert_eq!(result.matches.len(), 6);

    let args = CliArgs::try_parse_from([
        "dfs-walker",
        "find",
        r"\.rs$",
        root.as_str(),
        "-q",
        "--min-work",
        "4",
        "--evaluators",
        "2",
        "--eval-queue",
        "16",
        "--two-stage",
    ])
    .unwrap();
    let config = SearchConfig::from_args(args).unwrap();
    assert!(config.options.two_stage);
    assert_eq!(config.options.min_work_to_parallelize, 4);
    assert_eq!(config.options.evaluator_workers, Some(2));
    assert_eq!(config.options.eval_queue_capacity, Some(16));

    let result = FsWalker::from_config(&config)
        .search(&Context::background(), &config)
        .unwrap();
    assert_eq!(result.matches.len(), 6 * 5 * 3);
    // Every visited path went through the evaluator pool
    assert_eq!(
        result.metrics.evaluations,
        result.stats.dirs_visited + result.stats.files_visited
    );
}

#[test]
fn test_bad_cli_pattern() {
    let args = CliArgs::try_parse_from(["dfs-walker", "find", "(unclosed", "-q"]).unwrap();
    let err = SearchConfig::from_args(args).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidPattern { .. }));
}
