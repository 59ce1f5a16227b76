//! Build pipeline: collect content, render pages, run plugins, produce
//! one immutable [`ArtifactStore`] snapshot.
//!
//! The pipeline is the single [`Builder`] implementation; the rebuild
//! loop and the `build` subcommand both drive it through that trait so
//! tests can substitute counting or failing builders.

use crate::{
    config::SiteConfig,
    plugin::{Plugin, PluginFactory, default_plugins},
    site::{Meta, Page, PageKind, Site},
    store::{ArtifactStore, ScratchStore},
};
use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, NaiveDate, Utc};
use rayon::prelude::*;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// ============================================================================
// Options & Traits
// ============================================================================

/// Per-build options, fixed for the lifetime of a serve session.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Replace existing on-disk output. Forced on while watching.
    pub overwrite: bool,
    /// Recompile templates from scratch instead of reusing caches.
    pub recompile_templates: bool,
    /// Relative prefix the built site is addressed under in the store,
    /// e.g. `public`.
    pub output: PathBuf,
}

/// Produces a complete output snapshot from the current content state.
pub trait Builder: Send + Sync {
    fn build(&self, options: &BuildOptions) -> Result<ArtifactStore>;
}

/// One collected page together with its rendered markup.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub page: Page,
    pub html: String,
}

/// Source of renderable pages. The filesystem source is the production
/// implementation; tests substitute in-memory fixtures.
pub trait PageSource: Send + Sync {
    fn collect(&self, recompile_templates: bool) -> Result<Vec<RenderedPage>>;
}

// ============================================================================
// Front matter
// ============================================================================

const FRONT_MATTER_FENCE: &str = "+++";

/// TOML front matter delimited by `+++` fences at the top of a file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FrontMatter {
    title: String,
    description: String,
    author: String,
    date: Option<String>,
    hidden: bool,
    list: bool,
}

/// Split a source file into `(front_matter, body)`.
///
/// A file without a fence has no metadata; the whole text is body.
fn split_front_matter(source: &str) -> Result<(FrontMatter, &str)> {
    let Some(rest) = source.strip_prefix(FRONT_MATTER_FENCE) else {
        return Ok((FrontMatter::default(), source));
    };
    let (raw, body) = rest
        .split_once(FRONT_MATTER_FENCE)
        .ok_or_else(|| anyhow!("unclosed front matter fence"))?;

    let matter: FrontMatter = toml::from_str(raw).context("invalid front matter")?;
    Ok((matter, body))
}

/// Accepts RFC 3339 timestamps and plain `YYYY-MM-DD` dates; the latter
/// resolve to midnight UTC.
fn parse_date(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Ok(date.to_utc());
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid date: {raw}"))?;
    date.and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .ok_or_else(|| anyhow!("invalid date: {raw}"))
}

// ============================================================================
// FsPageSource
// ============================================================================

/// Collects `.md` and `.html` files under the content directory.
pub struct FsPageSource {
    content_dir: PathBuf,
}

impl FsPageSource {
    pub fn new(content_dir: PathBuf) -> Self {
        Self { content_dir }
    }

    fn collect_file(&self, path: &Path) -> Result<RenderedPage> {
        let source = std::fs::read_to_string(path)?;
        let (matter, body) = split_front_matter(&source)?;

        let date = matter.date.as_deref().map(parse_date).transpose()?;
        let id = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("source file has no stem"))?;

        let page = Page {
            route: self.route_of(path),
            id,
            title: matter.title,
            description: matter.description,
            author: matter.author,
            date,
            hidden: matter.hidden,
            kind: if matter.list { PageKind::List } else { PageKind::Standard },
        };

        let is_html = path.extension().is_some_and(|ext| ext == "html");
        let html = render_page(&page, body, is_html);

        Ok(RenderedPage { page, html })
    }

    /// Route from the file's directory relative to the content root:
    /// `content/posts/a.md` lives under `/posts`, `content/about.md`
    /// under the empty root route.
    fn route_of(&self, path: &Path) -> String {
        let relative = path
            .parent()
            .and_then(|parent| parent.strip_prefix(&self.content_dir).ok())
            .unwrap_or(Path::new(""));

        relative
            .components()
            .map(|c| format!("/{}", c.as_os_str().to_string_lossy()))
            .collect()
    }
}

impl PageSource for FsPageSource {
    fn collect(&self, _recompile_templates: bool) -> Result<Vec<RenderedPage>> {
        let mut pages = Vec::new();
        for entry in WalkDir::new(&self.content_dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let renderable = entry
                .path()
                .extension()
                .is_some_and(|ext| ext == "md" || ext == "html");
            if !renderable {
                continue;
            }
            let page = self
                .collect_file(entry.path())
                .with_context(|| format!("failed to collect {}", entry.path().display()))?;
            pages.push(page);
        }
        Ok(pages)
    }
}

/// Minimal markup pass. HTML sources pass through verbatim; markdown
/// bodies get headings and paragraphs.
fn render_page(page: &Page, body: &str, is_html: bool) -> String {
    let body = if is_html {
        body.trim().to_string()
    } else {
        render_markdown(body)
    };

    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n<h1>{}</h1>\n{}\n</body>\n</html>\n",
        escape_html(&page.title),
        escape_html(&page.title),
        body
    )
}

fn render_markdown(body: &str) -> String {
    body.split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(|block| {
            if let Some(heading) = block.strip_prefix("# ") {
                format!("<h2>{}</h2>", escape_html(heading))
            } else {
                format!("<p>{}</p>", escape_html(block))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

// ============================================================================
// SitePipeline
// ============================================================================

/// The production [`Builder`]: pages from a [`PageSource`], artifacts
/// from the registered plugins, everything written into one scratch
/// store that finalizes into the snapshot.
pub struct SitePipeline {
    meta: Meta,
    source: Box<dyn PageSource>,
    plugins: Vec<PluginFactory>,
}

impl SitePipeline {
    pub fn new(meta: Meta, source: Box<dyn PageSource>) -> Self {
        Self {
            meta,
            source,
            plugins: default_plugins(),
        }
    }

    pub fn from_config(config: &SiteConfig) -> Self {
        Self::new(
            config.site.meta(),
            Box::new(FsPageSource::new(config.content_dir())),
        )
    }

    #[cfg(test)]
    pub fn with_plugins(mut self, plugins: Vec<PluginFactory>) -> Self {
        self.plugins = plugins;
        self
    }

    /// Store path a page's markup lands at. List pages render as their
    /// route's directory index; standard pages get a directory of their
    /// own so they serve under a clean URL.
    fn page_output_path(output: &Path, page: &Page) -> PathBuf {
        let route = page.route.trim_start_matches('/');
        let base = output.join(route);
        match page.kind {
            PageKind::List => base.join("index.html"),
            PageKind::Standard => base.join(&page.id).join("index.html"),
        }
    }
}

impl Builder for SitePipeline {
    fn build(&self, options: &BuildOptions) -> Result<ArtifactStore> {
        let rendered = self.source.collect(options.recompile_templates)?;

        let scratch = ScratchStore::new();
        let plugins: Vec<Box<dyn Plugin>> = self
            .plugins
            .iter()
            .map(|create| create(self.meta.clone(), scratch.clone(), options.output.clone()))
            .collect();

        rendered.par_iter().try_for_each(|rendered| {
            let path = Self::page_output_path(&options.output, &rendered.page);
            scratch.write(&path, rendered.html.clone().into_bytes())?;
            for plugin in &plugins {
                plugin.process_page(&rendered.page)?;
            }
            Ok::<_, anyhow::Error>(())
        })?;

        let site = Site {
            meta: self.meta.clone(),
            pages: rendered.into_iter().map(|r| r.page).collect(),
        };
        for plugin in &plugins {
            plugin.pre_write(&site)?;
        }
        // Consuming the plugins drops their scratch handles so the store
        // can finalize below.
        for plugin in plugins {
            plugin.post_write()?;
        }

        let store = scratch.into_store()?;
        if store.is_empty() {
            bail!("build produced no output");
        }
        Ok(store)
    }
}

// ============================================================================
// Tests
// ============================================================================
