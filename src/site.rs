//! Core page and site metadata types.

use chrono::{DateTime, Utc};

/// Distinguishes ordinary content pages from synthetic list pages
/// generated for a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageKind {
    #[default]
    Standard,
    List,
}

/// One content unit produced by a build.
///
/// Consumed read-only by plugins; the rendered bytes travel separately
/// (see `build::RenderedPage`).
#[derive(Debug, Clone)]
pub struct Page {
    /// Route the page lives under, e.g. `/posts`. Empty for the site root.
    pub route: String,
    /// Identifier within the route, derived from the source file stem.
    pub id: String,
    pub title: String,
    pub description: String,
    pub author: String,
    pub date: Option<DateTime<Utc>>,
    /// Hidden pages are built and served but excluded from derived artifacts.
    pub hidden: bool,
    pub kind: PageKind,
}

impl Page {
    pub const fn is_list_page(&self) -> bool {
        matches!(self.kind, PageKind::List)
    }

    /// Canonical URL of the page: `{base}{route}/{id}`.
    pub fn canonical(&self, base: &str) -> String {
        format!("{}{}/{}", base, self.route, self.id)
    }
}

/// Site-wide metadata, sourced from the `[site]` config section.
/// Read-only input to plugin construction.
#[derive(Debug, Clone, Default)]
pub struct Meta {
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub author: String,
    /// Base URL used for absolute links in derived artifacts.
    pub base: String,
}

/// Everything one build produced, handed to plugin write hooks.
#[derive(Debug, Clone)]
pub struct Site {
    pub meta: Meta,
    pub pages: Vec<Page>,
}
