//! Atom 1.0 feed plugin.
//!
//! Accumulates one entry per qualifying page while pages are processed
//! (possibly in parallel) and serializes the feed to `atom.xml` at the
//! output-directory root during `post_write`.
//!
//! Hidden pages and synthetic list pages never appear in the feed.

use super::Plugin;
use crate::{
    site::{Meta, Page},
    store::ScratchStore,
};
use anyhow::{Context, Result};
use atom_syndication::{Entry, EntryBuilder, FeedBuilder, LinkBuilder, PersonBuilder, Text};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::path::PathBuf;

/// Fixed feed filename, written at the output-directory root.
const FILENAME: &str = "atom.xml";

/// Plugin factory registered with the build pipeline.
pub fn create(meta: Meta, store: ScratchStore, output_dir: PathBuf) -> Box<dyn Plugin> {
    Box::new(AtomPlugin::new(meta, store, output_dir))
}

/// One accumulated feed entry, derived from a qualifying page.
#[derive(Debug, Clone)]
struct FeedEntry {
    title: String,
    link: String,
    description: String,
    date: Option<DateTime<Utc>>,
}

/// The atom plugin. Entries accumulate behind an `RwLock` because
/// `process_page` calls for different pages race within one build;
/// `post_write` runs after the pipeline's join point, so its read
/// observes every insertion.
pub struct AtomPlugin {
    meta: Meta,
    created: DateTime<Utc>,
    entries: RwLock<Vec<FeedEntry>>,
    store: ScratchStore,
    output_dir: PathBuf,
}

impl AtomPlugin {
    pub fn new(meta: Meta, store: ScratchStore, output_dir: PathBuf) -> Self {
        Self {
            meta,
            created: Utc::now(),
            entries: RwLock::new(Vec::new()),
            store,
            output_dir,
        }
    }

    fn into_xml(&self, mut entries: Vec<FeedEntry>) -> String {
        // Insertion order depends on page-processing interleaving;
        // sort for stable output across builds.
        entries.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.link.cmp(&b.link)));

        // The feed has no separate description slot in Atom 1.0; the site
        // description stands in when no subtitle is configured.
        let subtitle = if self.meta.subtitle.is_empty() {
            &self.meta.description
        } else {
            &self.meta.subtitle
        };

        let feed = FeedBuilder::default()
            .title(Text::plain(self.meta.title.clone()))
            .id(self.meta.base.clone())
            .updated(self.created.fixed_offset())
            .links(vec![
                LinkBuilder::default()
                    .href(self.meta.base.clone())
                    .rel("alternate".to_string())
                    .build(),
            ])
            .authors(vec![
                PersonBuilder::default().name(self.meta.author.clone()).build(),
            ])
            .subtitle(Some(Text::plain(subtitle.clone())))
            .entries(entries.iter().map(|e| self.to_entry(e)).collect::<Vec<_>>())
            .build();

        feed.to_string()
    }

    fn to_entry(&self, entry: &FeedEntry) -> Entry {
        let updated = entry.date.unwrap_or(self.created);

        EntryBuilder::default()
            .title(Text::plain(entry.title.clone()))
            .id(entry.link.clone())
            .updated(updated.fixed_offset())
            .links(vec![
                LinkBuilder::default()
                    .href(entry.link.clone())
                    .rel("alternate".to_string())
                    .build(),
            ])
            .summary(Some(Text::plain(entry.description.clone())))
            .build()
    }
}

impl Plugin for AtomPlugin {
    /// Derive a feed entry from a qualifying page.
    fn process_page(&self, page: &Page) -> Result<()> {
        if page.hidden || page.is_list_page() {
            return Ok(());
        }

        let entry = FeedEntry {
            title: page.title.clone(),
            link: page.canonical(&self.meta.base),
            description: page.description.clone(),
            date: page.date,
        };

        self.entries.write().push(entry);
        Ok(())
    }

    /// Serialize the accumulated feed into the store being built.
    ///
    /// Zero qualifying pages still produce a valid empty feed file.
    fn post_write(&self) -> Result<()> {
        let entries = self.entries.read().clone();
        let xml = self.into_xml(entries);

        let path = self.output_dir.join(FILENAME);
        self.store
            .write(&path, xml.into_bytes())
            .with_context(|| format!("failed to write {FILENAME}"))
    }
}
