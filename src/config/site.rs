//! `[site]` section configuration.
//!
//! Contains site metadata like title, author, description, etc.

use super::defaults;
use crate::site::Meta;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[site]` section in verso.toml - site-wide metadata.
///
/// # Example
/// ```toml
/// [site]
/// title = "My Blog"
/// subtitle = "Notes on things"
/// description = "A personal blog about Rust"
/// author = "Alice"
/// url = "https://myblog.com"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteInfo {
    /// Site title displayed in headers and the feed.
    pub title: String,

    /// Site subtitle for the feed.
    #[serde(default)]
    pub subtitle: String,

    /// Site description for SEO meta tags and the feed.
    pub description: String,

    /// Author name for the feed and meta tags.
    #[serde(default = "defaults::site::author")]
    #[educe(Default = defaults::site::author())]
    pub author: String,

    /// Base URL for absolute links in the feed.
    #[serde(default = "defaults::site::url")]
    #[educe(Default = defaults::site::url())]
    pub url: Option<String>,
}

impl SiteInfo {
    /// Snapshot the metadata handed to plugin construction.
    pub fn meta(&self) -> Meta {
        Meta {
            title: self.title.clone(),
            subtitle: self.subtitle.clone(),
            description: self.description.clone(),
            author: self.author.clone(),
            base: self.url.clone().unwrap_or_default(),
        }
    }
}
