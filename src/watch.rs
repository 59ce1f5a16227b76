//! Filesystem watching with debounce.
//!
//! Editors produce bursts of events for a single save (temp file, write,
//! rename). The watcher collapses each burst into one [`Signal::Changed`]
//! by holding events until the burst has been quiet for the debounce
//! window.
//!
//! ```text
//! notify events ──> filter (ignored paths, temp files)
//!                        │
//!                   Debouncer (quiet for 300ms?)
//!                        │
//!                   Signal::Changed ──> rebuild loop
//! ```

use crate::{log, rebuild::Signal};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use rustc_hash::FxHashSet;
use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{Receiver, RecvTimeoutError, Sender, channel},
    },
    time::{Duration, Instant},
};

/// Quiet period a burst must satisfy before a rebuild is signalled.
const DEBOUNCE_MS: u64 = 300;

/// Upper bound on how long `run` sleeps with nothing pending; bounds the
/// latency of noticing the stop flag.
const IDLE_TICK_MS: u64 = 500;

// ============================================================================
// Filtering
// ============================================================================

/// Editor and OS scratch files that never represent content changes.
fn is_temp_file(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        return false;
    };

    name.ends_with('~')
        || name.ends_with(".swp")
        || name.ends_with(".swx")
        || name.ends_with(".tmp")
        || name.starts_with(".#")
        || (name.starts_with('#') && name.ends_with('#'))
        || name == ".DS_Store"
        || name == "4913"
}

fn is_ignored(path: &Path, ignore_paths: &[PathBuf]) -> bool {
    ignore_paths.iter().any(|ignored| path.starts_with(ignored))
}

/// An event is relevant when it mutates the tree and at least one of its
/// paths survives the ignore and temp-file filters.
fn is_relevant(event: &Event, ignore_paths: &[PathBuf]) -> bool {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return false;
    }
    event
        .paths
        .iter()
        .any(|path| !is_ignored(path, ignore_paths) && !is_temp_file(path))
}

// ============================================================================
// Debouncer
// ============================================================================

/// Accumulates changed paths until the burst has gone quiet.
struct Debouncer {
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
}

impl Debouncer {
    fn new() -> Self {
        Self {
            pending: FxHashSet::default(),
            last_event: None,
        }
    }

    fn add(&mut self, event: Event) {
        self.pending.extend(event.paths);
        self.last_event = Some(Instant::now());
    }

    /// Whether the pending burst has been quiet for the full window.
    fn ready(&self) -> bool {
        match self.last_event {
            Some(last) if !self.pending.is_empty() => {
                last.elapsed() >= Duration::from_millis(DEBOUNCE_MS)
            }
            _ => false,
        }
    }

    /// Drop the pending burst, returning how many paths it covered.
    fn flush(&mut self) -> usize {
        self.last_event = None;
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    /// How long `run` may block waiting for the next event.
    fn timeout(&self) -> Duration {
        match self.last_event {
            Some(last) if !self.pending.is_empty() => {
                Duration::from_millis(DEBOUNCE_MS).saturating_sub(last.elapsed())
            }
            _ => Duration::from_millis(IDLE_TICK_MS),
        }
    }
}

// ============================================================================
// Watcher
// ============================================================================

/// Recursive watcher over the project root.
pub struct Watcher {
    // Held for its Drop; dropping it stops event delivery.
    _inner: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
    ignore_paths: Vec<PathBuf>,
}

impl Watcher {
    /// Start watching `root` recursively. Failure here is fatal to the
    /// serve session; there is no degraded watch mode.
    pub fn start(root: &Path, ignore_paths: Vec<PathBuf>) -> Result<Self> {
        let (tx, events) = channel();
        let mut inner = notify::recommended_watcher(tx)
            .context("failed to initialize the file watcher")?;
        inner
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch {}", root.display()))?;

        log!("watch"; "watching {} for changes", root.display());

        Ok(Self {
            _inner: inner,
            events,
            ignore_paths,
        })
    }

    /// Consume events until the stop flag is raised or the rebuild side
    /// goes away, emitting one [`Signal::Changed`] per settled burst.
    pub fn run(self, tx: Sender<Signal>, stop: Arc<AtomicBool>) {
        let mut debouncer = Debouncer::new();

        loop {
            if stop.load(Ordering::Relaxed) {
                break;
            }

            match self.events.recv_timeout(debouncer.timeout()) {
                Ok(Ok(event)) => {
                    if is_relevant(&event, &self.ignore_paths) {
                        debouncer.add(event);
                    }
                }
                Ok(Err(err)) => {
                    log!("watch"; "watch error: {err}");
                }
                Err(RecvTimeoutError::Timeout) => {
                    if debouncer.ready() {
                        let count = debouncer.flush();
                        log!("watch"; "{count} change(s) detected, rebuilding...");
                        if tx.send(Signal::Changed).is_err() {
                            break;
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
