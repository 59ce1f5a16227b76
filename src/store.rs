//! In-memory build output snapshots.
//!
//! Three views of the same data, one per lifecycle stage:
//!
//! - [`ArtifactStore`]: an immutable, path-addressed snapshot of one
//!   complete build's output.
//! - [`ScratchStore`]: the shared-writer handle used *while* a build runs.
//!   Page writes and plugin writes race during the parallel phase, so
//!   access goes through an `RwLock`; the handle is finalized into an
//!   exclusive `ArtifactStore` when the build ends.
//! - [`SharedStore`]: the currently-served snapshot. Replaced wholesale via
//!   `ArcSwap` so a reader observes either the fully-old or the fully-new
//!   build, never a mix.

use anyhow::{Result, bail};
use arc_swap::ArcSwap;
use parking_lot::RwLock;
use std::{
    collections::BTreeMap,
    fs,
    path::{Component, Path},
    sync::Arc,
};

// ============================================================================
// ArtifactStore
// ============================================================================

/// One complete build's output: a mapping from normalized relative path
/// to byte content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactStore {
    files: BTreeMap<String, Vec<u8>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file, replacing any previous content at the same path.
    pub fn insert(&mut self, path: &Path, content: Vec<u8>) {
        self.files.insert(normalize(path), content);
    }

    pub fn get(&self, path: &Path) -> Option<&[u8]> {
        self.files.get(&normalize(path)).map(Vec::as_slice)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(&normalize(path))
    }

    /// Check whether any file lives at or under `prefix`.
    pub fn contains_prefix(&self, prefix: &Path) -> bool {
        let prefix = normalize(prefix);
        if prefix.is_empty() {
            return !self.files.is_empty();
        }
        let dir = format!("{prefix}/");
        self.files
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(key, _)| *key == prefix || key.starts_with(&dir))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterate stored paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Write every stored file to disk under `root`, creating parent
    /// directories as needed.
    pub fn write_to_disk(&self, root: &Path) -> Result<()> {
        for (path, content) in &self.files {
            let target = root.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, content)?;
        }
        Ok(())
    }
}

/// Normalize a path to a forward-slash relative key.
///
/// Strips root/current-dir components and resolves `..` so request paths
/// cannot escape the store.
fn normalize(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(c) => parts.push(c.to_string_lossy().into_owned()),
            Component::ParentDir => {
                parts.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    parts.join("/")
}

// ============================================================================
// ScratchStore
// ============================================================================

/// Shared-writer handle to a store under construction.
///
/// Cloned into every plugin created for one build. Each build starts from
/// an empty scratch, so a duplicate path can only mean two producers chose
/// the same output location - that is always an error.
#[derive(Debug, Clone, Default)]
pub struct ScratchStore(Arc<RwLock<ArtifactStore>>);

impl ScratchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write one file into the store being built.
    pub fn write(&self, path: &Path, content: Vec<u8>) -> Result<()> {
        let mut store = self.0.write();
        if store.contains(path) {
            bail!("output path written twice: {}", path.display());
        }
        store.insert(path, content);
        Ok(())
    }

    /// Finalize into an exclusive snapshot.
    ///
    /// All plugin clones must have been dropped by the time the build
    /// finalizes; a leaked handle is a pipeline bug.
    pub fn into_store(self) -> Result<ArtifactStore> {
        match Arc::try_unwrap(self.0) {
            Ok(lock) => Ok(lock.into_inner()),
            Err(_) => bail!("build finished with outstanding store handles"),
        }
    }
}

// ============================================================================
// SharedStore
// ============================================================================

/// The currently-served snapshot, replaced atomically on rebuild.
///
/// Single writer (the rebuild loop, via full replacement), many readers
/// (one load per request). A reader's `Arc` keeps its snapshot alive even
/// across a concurrent swap.
#[derive(Debug, Clone)]
pub struct SharedStore(Arc<ArcSwap<ArtifactStore>>);

impl SharedStore {
    pub fn new(initial: ArtifactStore) -> Self {
        Self(Arc::new(ArcSwap::from_pointee(initial)))
    }

    /// Load the current snapshot. Lock-free.
    pub fn load(&self) -> Arc<ArtifactStore> {
        self.0.load_full()
    }

    /// Publish a new snapshot. Readers holding the old one are unaffected.
    pub fn swap(&self, store: ArtifactStore) {
        self.0.store(Arc::new(store));
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("public/index.html")), "public/index.html");
        assert_eq!(normalize(Path::new("/public/index.html")), "public/index.html");
        assert_eq!(normalize(Path::new("./public/./a.css")), "public/a.css");
        assert_eq!(normalize(Path::new("public/../public/a.css")), "public/a.css");
        // `..` cannot escape the store root
        assert_eq!(normalize(Path::new("../../etc/passwd")), "etc/passwd");
    }

    #[test]
    fn test_insert_and_get() {
        let mut store = ArtifactStore::new();
        store.insert(Path::new("public/index.html"), b"hello".to_vec());

        assert_eq!(store.get(Path::new("public/index.html")), Some(&b"hello"[..]));
        assert_eq!(store.get(Path::new("/public/index.html")), Some(&b"hello"[..]));
        assert_eq!(store.get(Path::new("public/missing.html")), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_contains_prefix() {
        let mut store = ArtifactStore::new();
        store.insert(Path::new("public/posts/a/index.html"), vec![1]);

        assert!(store.contains_prefix(Path::new("public")));
        assert!(store.contains_prefix(Path::new("public/posts")));
        assert!(!store.contains_prefix(Path::new("dist")));
        // a path-prefix match is not a directory match
        assert!(!store.contains_prefix(Path::new("pub")));
    }

    #[test]
    fn test_contains_prefix_exact_file() {
        let mut store = ArtifactStore::new();
        store.insert(Path::new("public/atom.xml"), vec![1]);

        assert!(store.contains_prefix(Path::new("public/atom.xml")));
    }

    #[test]
    fn test_scratch_rejects_duplicate_path() {
        let scratch = ScratchStore::new();
        scratch.write(Path::new("public/index.html"), vec![1]).unwrap();

        let result = scratch.write(Path::new("public/index.html"), vec![2]);
        assert!(result.is_err());
    }

    #[test]
    fn test_scratch_finalize() {
        let scratch = ScratchStore::new();
        scratch.write(Path::new("public/a"), vec![1]).unwrap();

        let clone = scratch.clone();
        clone.write(Path::new("public/b"), vec![2]).unwrap();
        drop(clone);

        let store = scratch.into_store().unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_scratch_finalize_with_leaked_handle() {
        let scratch = ScratchStore::new();
        let _leak = scratch.clone();

        assert!(scratch.into_store().is_err());
    }

    #[test]
    fn test_shared_store_swap_is_atomic_for_readers() {
        let mut old = ArtifactStore::new();
        old.insert(Path::new("public/index.html"), b"old".to_vec());
        let shared = SharedStore::new(old);

        // A reader loads a snapshot, then a rebuild swaps underneath it.
        let snapshot = shared.load();

        let mut new = ArtifactStore::new();
        new.insert(Path::new("public/index.html"), b"new".to_vec());
        shared.swap(new);

        // The old snapshot stays fully intact for the in-flight reader...
        assert_eq!(snapshot.get(Path::new("public/index.html")), Some(&b"old"[..]));
        // ...while new readers observe the fully-new build.
        assert_eq!(
            shared.load().get(Path::new("public/index.html")),
            Some(&b"new"[..])
        );
    }

    #[test]
    fn test_write_to_disk() {
        use tempfile::TempDir;

        let mut store = ArtifactStore::new();
        store.insert(Path::new("public/index.html"), b"<html>".to_vec());
        store.insert(Path::new("public/posts/a/index.html"), b"post".to_vec());

        let dir = TempDir::new().unwrap();
        store.write_to_disk(dir.path()).unwrap();

        let index = std::fs::read(dir.path().join("public/index.html")).unwrap();
        assert_eq!(index, b"<html>");
        assert!(dir.path().join("public/posts/a/index.html").exists());
    }

    #[test]
    fn test_paths_sorted() {
        let mut store = ArtifactStore::new();
        store.insert(Path::new("b"), vec![]);
        store.insert(Path::new("a"), vec![]);

        let paths: Vec<PathBuf> = store.paths().map(PathBuf::from).collect();
        assert_eq!(paths, vec![PathBuf::from("a"), PathBuf::from("b")]);
    }
}
