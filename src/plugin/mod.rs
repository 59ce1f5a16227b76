//! Build plugins producing derived artifacts.
//!
//! A plugin instance lives for exactly one build: it is constructed fresh
//! from `(Meta, ScratchStore, output_dir)` when the build starts and
//! dropped when the build ends, so no state survives across builds.
//!
//! # Hook lifecycle
//!
//! ```text
//! for every page (possibly in parallel):  process_page(page)
//!                                              │
//!                              join: all pages processed
//!                                              │
//! in registration order:                  pre_write(site)
//! in registration order:                  post_write()
//! ```
//!
//! `process_page` calls for different pages may race; implementations
//! guard any shared accumulator themselves. The write hooks run after the
//! join, so they observe every accumulated page.

pub mod atom;

use crate::{
    site::{Meta, Page, Site},
    store::ScratchStore,
};
use anyhow::Result;
use std::path::PathBuf;

/// A unit of per-build artifact generation.
///
/// Any hook error aborts the build it belongs to.
pub trait Plugin: Send + Sync {
    /// Called once per page produced by the build.
    fn process_page(&self, page: &Page) -> Result<()>;

    /// Called after all pages were processed, before artifacts are written.
    fn pre_write(&self, _site: &Site) -> Result<()> {
        Ok(())
    }

    /// Called last; serializes whatever the plugin accumulated.
    fn post_write(&self) -> Result<()> {
        Ok(())
    }
}

/// Constructor invoked once per build for every registered plugin.
pub type PluginFactory = fn(Meta, ScratchStore, PathBuf) -> Box<dyn Plugin>;

/// The plugins every build carries by default.
pub fn default_plugins() -> Vec<PluginFactory> {
    vec![atom::create]
}
