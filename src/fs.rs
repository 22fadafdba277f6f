//! Parallel filesystem search on top of the traversal engine
//!
//! Directories are expanded by reading their entries; files are leaves. A
//! concurrent visited set keyed by canonical directory path keeps symlink
//! cycles from being walked twice. Directories deeper than [`MAX_DEPTH`]
//! are visited but not enumerated, regardless of engine options.

use crate::config::{Options, SearchConfig, SearchMode};
use crate::error::{ConfigError, ExpandError, Result, WalkerError};
use crate::walker::serial::serial_traverse;
use crate::walker::{Context, Heuristics, MetricsSink, MetricsSnapshot, SearchSpace, Traversal};
use dashmap::DashSet;
use parking_lot::Mutex;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Deepest directory level that is still enumerated; entries of a
/// directory at this depth are visited one level below it
pub const MAX_DEPTH: usize = 20;

/// Directory names skipped by [`default_prune`]
const PRUNED_DIRS: &[&str] = &[
    "node_modules",
    "__pycache__",
    "target",
    "vendor",
    ".git",
    ".svn",
    ".hg",
    "build",
    "dist",
];

/// Predicate over a path and whether it is a directory
pub type PathPredicate = Arc<dyn Fn(&Path, bool) -> bool + Send + Sync>;

/// Work estimate for a path
pub type PathEstimate = Arc<dyn Fn(&Path) -> usize + Send + Sync>;

/// Skip hidden directories and common build/VCS directories
pub fn default_prune(path: &Path, is_dir: bool) -> bool {
    if !is_dir {
        return false;
    }
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.starts_with('.') || PRUNED_DIRS.contains(&name),
        None => false,
    }
}

fn file_name(path: &Path) -> std::borrow::Cow<'_, str> {
    path.file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_else(|| path.to_string_lossy())
}

/// A path in the walk
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FsNode {
    pub path: PathBuf,
    pub is_dir: bool,
}

impl FsNode {
    pub fn new(path: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self {
            path: path.into(),
            is_dir,
        }
    }
}

/// Per-walk filesystem counters
#[derive(Debug, Default)]
struct FsCounters {
    dirs_visited: AtomicU64,
    files_visited: AtomicU64,
    pruned: AtomicU64,
    matches: AtomicU64,
    bytes_scanned: AtomicU64,
}

/// Filesystem totals for one search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub dirs_visited: u64,
    pub files_visited: u64,
    pub pruned: u64,
    pub matches: u64,
    pub bytes_scanned: u64,
}

/// Directory tree as a search space
pub struct FsSpace {
    prune: PathPredicate,
    follow_links: bool,
    visited: DashSet<PathBuf>,
    counters: FsCounters,
}

impl FsSpace {
    pub fn new(prune: PathPredicate, follow_links: bool) -> Self {
        Self {
            prune,
            follow_links,
            visited: DashSet::new(),
            counters: FsCounters::default(),
        }
    }

    pub fn stats(&self) -> SearchStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        SearchStats {
            dirs_visited: load(&self.counters.dirs_visited),
            files_visited: load(&self.counters.files_visited),
            pruned: load(&self.counters.pruned),
            matches: load(&self.counters.matches),
            bytes_scanned: load(&self.counters.bytes_scanned),
        }
    }

    fn entry_is_dir(&self, entry: &fs::DirEntry) -> bool {
        match entry.file_type() {
            Ok(ft) if ft.is_symlink() && self.follow_links => {
                fs::metadata(entry.path()).map(|m| m.is_dir()).unwrap_or(false)
            }
            Ok(ft) => ft.is_dir(),
            Err(_) => false,
        }
    }
}

impl SearchSpace for FsSpace {
    type Node = FsNode;

    fn expand(&self, node: &FsNode, depth: usize) -> std::result::Result<Vec<FsNode>, ExpandError> {
        if !node.is_dir || depth > MAX_DEPTH {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&node.path)
            .map_err(|e| ExpandError::new(node.path.display().to_string(), e))?;

        let mut children = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(path = %node.path.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            let path = entry.path();
            let is_dir = self.entry_is_dir(&entry);
            if (self.prune)(&path, is_dir) {
                self.counters.pruned.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            children.push(FsNode { path, is_dir });
        }
        Ok(children)
    }

    /// First claim of a path wins; directories are keyed by canonical path
    fn mark_visited(&self, node: &FsNode) -> bool {
        let key = if node.is_dir {
            fs::canonicalize(&node.path).unwrap_or_else(|_| node.path.clone())
        } else {
            node.path.clone()
        };
        if !self.visited.insert(key) {
            return false;
        }

        let counter = if node.is_dir {
            &self.counters.dirs_visited
        } else {
            &self.counters.files_visited
        };
        counter.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn label(&self, node: &FsNode) -> String {
        node.path.display().to_string()
    }

    fn is_leaf(&self, node: &FsNode) -> bool {
        !node.is_dir
    }
}

/// Result of a filesystem search
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    /// Matched paths, or `path:line: text` for grep (order not guaranteed)
    pub matches: Vec<String>,

    /// Enumeration and read errors
    pub errors: Vec<String>,

    /// Final engine metrics
    pub metrics: MetricsSnapshot,

    /// Filesystem totals
    pub stats: SearchStats,
}

#[derive(Default)]
struct Collector {
    matches: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

/// Parallel find/grep/count over a directory tree
#[derive(Clone)]
pub struct FsWalker {
    options: Options,
    prune: PathPredicate,
    estimate: Option<PathEstimate>,
    follow_links: bool,
    sink: Option<MetricsSink>,
}

impl FsWalker {
    /// Walker with the default prune and no symlink following
    pub fn new(options: Options) -> Self {
        Self {
            options,
            prune: Arc::new(default_prune),
            estimate: None,
            follow_links: false,
            sink: None,
        }
    }

    /// Build a walker from CLI configuration
    ///
    /// A nonzero `min_work_to_parallelize` installs [`entry_count`] as the
    /// work estimate so small sibling directories stay local.
    pub fn from_config(config: &SearchConfig) -> Self {
        let filter = config.clone();
        let prune = move |path: &Path, is_dir: bool| {
            (filter.default_prune && default_prune(path, is_dir)) || filter.is_excluded(&path.to_string_lossy())
        };

        let walker = Self::new(config.options.clone())
            .prune(prune)
            .follow_links(config.follow_links);
        if config.options.min_work_to_parallelize > 0 {
            walker.estimate_work(entry_count)
        } else {
            walker
        }
    }

    /// Replace the prune predicate
    pub fn prune(mut self, f: impl Fn(&Path, bool) -> bool + Send + Sync + 'static) -> Self {
        self.prune = Arc::new(f);
        self
    }

    /// Estimate of the work under a directory, used for coarsening
    pub fn estimate_work(mut self, f: impl Fn(&Path) -> usize + Send + Sync + 'static) -> Self {
        self.estimate = Some(Arc::new(f));
        self
    }

    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    pub fn metrics_sink(mut self, sink: MetricsSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Paths whose file name matches `pattern`
    pub fn find(&self, ctx: &Context, root: &Path, pattern: &Regex) -> Result<SearchResult> {
        let pattern = pattern.clone();
        self.find_matching(ctx, root, move |path, _| pattern.is_match(&file_name(path)))
    }

    /// Paths accepted by an arbitrary match predicate
    pub fn find_matching(
        &self,
        ctx: &Context,
        root: &Path,
        matcher: impl Fn(&Path, bool) -> bool + Send + Sync,
    ) -> Result<SearchResult> {
        self.walk(ctx, root, false, |node, space, collector| {
            if matcher(&node.path, node.is_dir) {
                space.counters.matches.fetch_add(1, Ordering::Relaxed);
                collector.matches.lock().push(node.path.display().to_string());
            }
        })
    }

    /// Every file and directory below `root`
    pub fn count(&self, ctx: &Context, root: &Path) -> Result<SearchResult> {
        self.find_matching(ctx, root, |_, _| true)
    }

    /// Lines matching `content` in files whose name matches `files`
    ///
    /// File reads always run on the evaluator pool.
    pub fn grep(&self, ctx: &Context, root: &Path, files: &Regex, content: &Regex) -> Result<SearchResult> {
        self.walk(ctx, root, true, |node, space, collector| {
            if node.is_dir || !files.is_match(&file_name(&node.path)) {
                return;
            }

            let bytes = match fs::read(&node.path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!(path = %node.path.display(), error = %e, "Failed to read file");
                    collector
                        .errors
                        .lock()
                        .push(format!("{}: {}", node.path.display(), e));
                    return;
                }
            };
            space
                .counters
                .bytes_scanned
                .fetch_add(bytes.len() as u64, Ordering::Relaxed);

            let text = String::from_utf8_lossy(&bytes);
            if !content.is_match(&text) {
                return;
            }

            let found: Vec<String> = text
                .lines()
                .enumerate()
                .filter(|(_, line)| content.is_match(line))
                .map(|(i, line)| format!("{}:{}: {}", node.path.display(), i + 1, line.trim()))
                .collect();
            space
                .counters
                .matches
                .fetch_add(found.len() as u64, Ordering::Relaxed);
            collector.matches.lock().extend(found);
        })
    }

    /// Run one search from CLI configuration
    pub fn search(&self, ctx: &Context, config: &SearchConfig) -> Result<SearchResult> {
        match &config.mode {
            SearchMode::Find { pattern } => self.find(ctx, &config.root, pattern),
            SearchMode::Grep { files, content } => self.grep(ctx, &config.root, files, content),
            SearchMode::Count => self.count(ctx, &config.root),
            SearchMode::Bench { .. } => Err(ConfigError::InvalidRoot {
                path: config.root.clone(),
                reason: "bench does not walk a filesystem".into(),
            }
            .into()),
        }
    }

    fn walk<F>(&self, ctx: &Context, root: &Path, two_stage: bool, visit: F) -> Result<SearchResult>
    where
        F: Fn(&FsNode, &FsSpace, &Collector) + Send + Sync,
    {
        let mut options = self.options.clone();
        options.two_stage |= two_stage;
        options.validate()?;

        let root_node = resolve_root(root)?;
        let space = FsSpace::new(Arc::clone(&self.prune), self.follow_links);
        let collector = Collector::default();

        let mut traversal = Traversal::new(&space, options).visitor(|node: &FsNode| {
            // The starting directory itself is never a match
            if !(node.is_dir && node.path == root_node.path) {
                visit(node, &space, &collector);
            }
            Ok(())
        });
        if let Some(estimate) = &self.estimate {
            let estimate = Arc::clone(estimate);
            traversal = traversal.heuristics(Heuristics::new().estimate_work(move |n: &FsNode| estimate(&n.path)));
        }
        if let Some(sink) = &self.sink {
            traversal = traversal.metrics_sink(Arc::clone(sink));
        }

        let report = traversal.run(ctx, root_node.clone())?;
        drop(traversal);

        let mut errors = report.errors;
        errors.extend(collector.errors.into_inner());
        let result = SearchResult {
            matches: collector.matches.into_inner(),
            errors,
            metrics: report.metrics,
            stats: space.stats(),
        };

        info!(
            root = %root.display(),
            matches = result.matches.len(),
            dirs = result.stats.dirs_visited,
            files = result.stats.files_visited,
            errors = result.errors.len(),
            "Search complete"
        );
        Ok(result)
    }
}

/// Work estimate for a path: one per file, one plus the entry count for a
/// readable directory
pub fn entry_count(path: &Path) -> usize {
    match fs::read_dir(path) {
        Ok(entries) => 1 + entries.count(),
        Err(_) => 1,
    }
}

fn resolve_root(root: &Path) -> std::result::Result<FsNode, ConfigError> {
    let meta = fs::metadata(root).map_err(|e| ConfigError::InvalidRoot {
        path: root.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(FsNode::new(root, meta.is_dir()))
}

/// Single-threaded find, used as a reference for the parallel walker
pub fn serial_find(root: &Path, pattern: &Regex, prune: PathPredicate) -> Result<Vec<String>> {
    let root_node = resolve_root(root)?;
    let space = FsSpace::new(prune, false);
    let mut matches = Vec::new();

    serial_traverse(&space, root_node.clone(), |node| {
        if !(node.is_dir && node.path == root_node.path) && pattern.is_match(&file_name(&node.path)) {
            matches.push(node.path.display().to_string());
        }
        Ok(())
    })
    .map_err(|e| WalkerError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

    Ok(matches)
}
