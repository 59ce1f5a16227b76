//! `[build]` section configuration.
//!
//! Contains build paths: content source, output directory, static files
//! and the active theme.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// `[build]` section in verso.toml - build pipeline paths.
///
/// All paths are relative to the project root.
///
/// # Example
/// ```toml
/// [build]
/// content = "content"   # Source directory
/// output = "public"     # Output directory
/// static = "static"
/// theme = "default"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Content source directory.
    #[serde(default = "defaults::build::content")]
    #[educe(Default = defaults::build::content())]
    pub content: PathBuf,

    /// Output directory the built site is addressed under.
    #[serde(default = "defaults::build::output")]
    #[educe(Default = defaults::build::output())]
    pub output: PathBuf,

    /// Static files directory. Its `generated` subdirectory is written by
    /// the build and must not re-trigger the watcher.
    #[serde(rename = "static", default = "defaults::build::static_dir")]
    #[educe(Default = defaults::build::static_dir())]
    pub static_dir: PathBuf,

    /// Active theme name.
    #[serde(default = "defaults::build::theme")]
    #[educe(Default = defaults::build::theme())]
    pub theme: String,
}

impl BuildConfig {
    /// Build-generated static files, relative to the project root.
    pub fn generated_static_dir(&self) -> PathBuf {
        self.static_dir.join("generated")
    }

    /// Build-generated theme files, relative to the project root.
    pub fn generated_theme_dir(&self) -> PathBuf {
        Path::new("themes").join(&self.theme).join("generated")
    }
}
