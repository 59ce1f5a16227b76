//! Rebuild coordination for the development server.
//!
//! One dedicated thread owns all rebuilds, so builds never overlap. A
//! burst of change signals that arrives while a build is running is
//! collapsed into at most one follow-up build: before building, the loop
//! drains everything already queued.
//!
//! A failed rebuild is logged and the previously published snapshot
//! keeps serving; only the initial build (owned by `serve`) is fatal.

use crate::{
    build::{BuildOptions, Builder},
    log,
    store::SharedStore,
};
use std::sync::{Arc, mpsc::Receiver};

/// Messages the rebuild loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Content changed; a rebuild is wanted.
    Changed,
    /// Shut the loop down.
    Stop,
}

/// Drain every queued signal. Returns `true` when a stop was queued.
fn drain(rx: &Receiver<Signal>) -> bool {
    while let Ok(signal) = rx.try_recv() {
        if signal == Signal::Stop {
            return true;
        }
    }
    false
}

/// Serve rebuilds until a [`Signal::Stop`] arrives or every sender is
/// dropped.
pub fn rebuild_loop(
    builder: Arc<dyn Builder>,
    options: BuildOptions,
    store: SharedStore,
    rx: Receiver<Signal>,
) {
    while let Ok(signal) = rx.recv() {
        match signal {
            Signal::Stop => break,
            Signal::Changed => {
                // Collapse signals queued behind this one; a stop queued
                // during the burst wins over the rebuild.
                if drain(&rx) {
                    break;
                }

                log!("serve"; "rebuilding project...");
                match builder.build(&options) {
                    Ok(snapshot) => {
                        store.swap(snapshot);
                        log!("serve"; "project rebuilt");
                    }
                    Err(err) => {
                        log!("error"; "rebuild failed: {err:#}");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ArtifactStore;
    use anyhow::{Result, bail};
    use std::{
        path::{Path, PathBuf},
        sync::{
            atomic::{AtomicUsize, Ordering},
            mpsc::channel,
        },
        thread,
    };

    struct CountingBuilder {
        builds: AtomicUsize,
    }

    impl Builder for CountingBuilder {
        fn build(&self, _options: &BuildOptions) -> Result<ArtifactStore> {
            let n = self.builds.fetch_add(1, Ordering::SeqCst);
            let mut store = ArtifactStore::new();
            store.insert(Path::new("public/index.html"), format!("build {n}").into_bytes());
            Ok(store)
        }
    }

    struct FailingBuilder;

    impl Builder for FailingBuilder {
        fn build(&self, _options: &BuildOptions) -> Result<ArtifactStore> {
            bail!("syntax error in content/post.md")
        }
    }

    fn make_options() -> BuildOptions {
        BuildOptions {
            overwrite: true,
            recompile_templates: true,
            output: PathBuf::from("public"),
        }
    }

    #[test]
    fn test_stop_exits_loop() {
        let builder = Arc::new(CountingBuilder {
            builds: AtomicUsize::new(0),
        });
        let store = SharedStore::new(ArtifactStore::new());
        let (tx, rx) = channel();

        tx.send(Signal::Stop).unwrap();
        rebuild_loop(builder.clone(), make_options(), store, rx);

        assert_eq!(builder.builds.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dropped_senders_exit_loop() {
        let builder = Arc::new(CountingBuilder {
            builds: AtomicUsize::new(0),
        });
        let store = SharedStore::new(ArtifactStore::new());
        let (tx, rx) = channel();
        drop(tx);

        rebuild_loop(builder, make_options(), store, rx);
    }

    #[test]
    fn test_burst_collapses_to_one_build() {
        let builder = Arc::new(CountingBuilder {
            builds: AtomicUsize::new(0),
        });
        let store = SharedStore::new(ArtifactStore::new());
        let (tx, rx) = channel();

        // Everything queued before the loop wakes collapses into the
        // first build.
        for _ in 0..10 {
            tx.send(Signal::Changed).unwrap();
        }
        tx.send(Signal::Stop).unwrap();
        rebuild_loop(builder.clone(), make_options(), store, rx);

        assert_eq!(builder.builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_queued_during_burst_wins() {
        let builder = Arc::new(CountingBuilder {
            builds: AtomicUsize::new(0),
        });
        let store = SharedStore::new(ArtifactStore::new());
        let (tx, rx) = channel();

        tx.send(Signal::Changed).unwrap();
        tx.send(Signal::Stop).unwrap();
        rebuild_loop(builder.clone(), make_options(), store, rx);

        assert_eq!(builder.builds.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_successful_rebuild_swaps_snapshot() {
        let builder = Arc::new(CountingBuilder {
            builds: AtomicUsize::new(0),
        });
        let store = SharedStore::new(ArtifactStore::new());
        let (tx, rx) = channel();

        tx.send(Signal::Changed).unwrap();
        drop(tx);
        rebuild_loop(builder, make_options(), store.clone(), rx);

        assert_eq!(
            store.load().get(Path::new("public/index.html")),
            Some(&b"build 0"[..])
        );
    }

    #[test]
    fn test_failed_rebuild_keeps_old_snapshot() {
        let mut initial = ArtifactStore::new();
        initial.insert(Path::new("public/index.html"), b"good".to_vec());
        let store = SharedStore::new(initial);
        let (tx, rx) = channel();

        tx.send(Signal::Changed).unwrap();
        drop(tx);
        rebuild_loop(Arc::new(FailingBuilder), make_options(), store.clone(), rx);

        assert_eq!(
            store.load().get(Path::new("public/index.html")),
            Some(&b"good"[..])
        );
    }

    #[test]
    fn test_sequential_changes_build_sequentially() {
        let builder = Arc::new(CountingBuilder {
            builds: AtomicUsize::new(0),
        });
        let store = SharedStore::new(ArtifactStore::new());
        let (tx, rx) = channel();

        let loop_builder = builder.clone();
        let loop_store = store.clone();
        let handle =
            thread::spawn(move || rebuild_loop(loop_builder, make_options(), loop_store, rx));

        // Distinct edits separated in time each get their own build.
        tx.send(Signal::Changed).unwrap();
        while builder.builds.load(Ordering::SeqCst) < 1 {
            thread::yield_now();
        }
        tx.send(Signal::Changed).unwrap();
        while builder.builds.load(Ordering::SeqCst) < 2 {
            thread::yield_now();
        }
        tx.send(Signal::Stop).unwrap();
        handle.join().unwrap();

        assert_eq!(builder.builds.load(Ordering::SeqCst), 2);
        assert_eq!(
            store.load().get(Path::new("public/index.html")),
            Some(&b"build 1"[..])
        );
    }
}
