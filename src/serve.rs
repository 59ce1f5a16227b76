//! Development server.
//!
//! Serves the current in-memory snapshot over HTTP and, while watching,
//! keeps it fresh through the watcher and rebuild loop:
//!
//! ```text
//! watcher thread ──Signal──> rebuild thread ──swap──> SharedStore
//!                                                        │ load
//! http loop (this thread) <──────────────────────────────┘
//! ```
//!
//! Each request loads the snapshot exactly once, so a response is always
//! served from a single consistent build even when a swap lands mid-request.

use crate::{
    build::{BuildOptions, Builder, SitePipeline},
    config::SiteConfig,
    log,
    rebuild::{Signal, rebuild_loop},
    store::{ArtifactStore, SharedStore},
    watch::Watcher,
};
use anyhow::{Context, Result, anyhow, bail};
use std::{
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::channel,
    },
    thread,
};
use tiny_http::{Header, Request, Response, Server};

// ============================================================================
// Options
// ============================================================================

/// Resolved serve parameters.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub build: BuildOptions,
    pub ip: IpAddr,
    pub port: u16,
    pub watch: bool,
}

impl ServeOptions {
    pub fn from_config(config: &SiteConfig) -> Result<Self> {
        let ip: IpAddr = config.serve.interface.parse().with_context(|| {
            format!("invalid [serve.interface]: {}", config.serve.interface)
        })?;

        Ok(Self {
            // Serving never touches the disk output, so overwrite is
            // moot; templates recompile per build only while watching.
            build: BuildOptions {
                overwrite: true,
                recompile_templates: config.serve.watch,
                output: config.build.output.clone(),
            },
            ip,
            port: config.serve.port,
            watch: config.serve.watch,
        })
    }
}

/// Build outputs the watcher must not re-trigger on.
fn watch_ignore_paths(config: &SiteConfig) -> Vec<PathBuf> {
    vec![
        config.root.join(&config.build.output),
        config.root.join(config.build.generated_static_dir()),
        config.root.join(config.build.generated_theme_dir()),
    ]
}

// ============================================================================
// Entry point
// ============================================================================

/// Run the development server until interrupted.
///
/// Fatal errors: invalid interface, watcher start failure, a failed or
/// empty initial build, bind failure. Everything after the server is up
/// is recoverable and only logged.
pub fn serve_site(config: &SiteConfig) -> Result<()> {
    let options = ServeOptions::from_config(config)?;
    let builder: Arc<dyn Builder> = Arc::new(SitePipeline::from_config(config));

    let (tx, rx) = channel::<Signal>();
    let stop = Arc::new(AtomicBool::new(false));

    let watcher_handle = if options.watch {
        let watcher = Watcher::start(&config.root, watch_ignore_paths(config))?;
        let watcher_tx = tx.clone();
        let watcher_stop = stop.clone();
        Some(thread::spawn(move || watcher.run(watcher_tx, watcher_stop)))
    } else {
        None
    };

    // The initial build must succeed; there is nothing to serve otherwise.
    let initial = builder.build(&options.build)?;
    if !initial.contains_prefix(&options.build.output) {
        bail!(
            "build produced no files under {}",
            options.build.output.display()
        );
    }

    let store = SharedStore::new(initial);
    let rebuild_store = store.clone();
    let rebuild_builder = builder.clone();
    let rebuild_options = options.build.clone();
    let rebuild_handle =
        thread::spawn(move || rebuild_loop(rebuild_builder, rebuild_options, rebuild_store, rx));

    let result = listen_and_serve(&options, store);

    // Wind the helper threads down regardless of how serving ended.
    stop.store(true, Ordering::Relaxed);
    let _ = tx.send(Signal::Stop);
    if let Some(handle) = watcher_handle {
        let _ = handle.join();
    }
    let _ = rebuild_handle.join();

    result
}

/// Accept requests until interrupted.
fn listen_and_serve(options: &ServeOptions, store: SharedStore) -> Result<()> {
    let addr = SocketAddr::new(options.ip, options.port);
    let server =
        Server::http(addr).map_err(|err| anyhow!("failed to bind {addr}: {err}"))?;
    let server = Arc::new(server);

    log!("serve"; "serving site at http://{addr}/ (press Ctrl+C to stop)");

    let unblock_server = server.clone();
    ctrlc::set_handler(move || unblock_server.unblock())
        .context("failed to install the interrupt handler")?;

    for request in server.incoming_requests() {
        // One snapshot per request keeps the response internally
        // consistent across concurrent swaps.
        let snapshot = store.load();
        handle_request(request, &snapshot, &options.build.output);
    }

    log!("serve"; "shutting down");
    Ok(())
}

// ============================================================================
// Request handling
// ============================================================================

fn handle_request(request: Request, store: &ArtifactStore, output: &Path) {
    log!("serve"; "{} {}", request.method(), request.url());

    let response = match resolve(store, output, request.url()) {
        Some((path, content)) => {
            Response::from_data(content).with_header(content_type_header(&path))
        }
        None => Response::from_data(&b"404 Not Found"[..])
            .with_status_code(404)
            .with_header(header("Content-Type", "text/plain")),
    };

    if let Err(err) = request.respond(response) {
        log!("error"; "failed to send response: {err}");
    }
}

/// Map a request URL to a stored file: the exact path first, then its
/// directory index.
fn resolve(store: &ArtifactStore, output: &Path, url: &str) -> Option<(PathBuf, Vec<u8>)> {
    let decoded = urlencoding::decode(url).ok()?;
    let trimmed = decoded
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_matches('/');

    let exact = output.join(trimmed);
    if let Some(content) = store.get(&exact) {
        return Some((exact, content.to_vec()));
    }

    let index = exact.join("index.html");
    store.get(&index).map(|content| (index, content.to_vec()))
}

fn header(field: &str, value: &str) -> Header {
    // Infallible for the static field names and ASCII values used here.
    Header::from_bytes(field.as_bytes(), value.as_bytes())
        .unwrap_or_else(|_| unreachable!("static header"))
}

fn content_type_header(path: &Path) -> Header {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let value = match extension.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    };

    header("Content-Type", value)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_addr_formatting() {
        let v4 = SocketAddr::new("127.0.0.1".parse().unwrap(), 8080);
        assert_eq!(v4.to_string(), "127.0.0.1:8080");
        assert_eq!(format!("http://{v4}/"), "http://127.0.0.1:8080/");

        // IPv6 addresses are bracketed so the port stays unambiguous.
        let v6 = SocketAddr::new("::1".parse().unwrap(), 8080);
        assert_eq!(v6.to_string(), "[::1]:8080");
        assert_eq!(format!("http://{v6}/"), "http://[::1]:8080/");
    }

    #[test]
    fn test_options_reject_bad_interface() {
        let mut config = SiteConfig::default();
        config.serve.interface = "localhost".to_string();

        assert!(ServeOptions::from_config(&config).is_err());
    }

    #[test]
    fn test_options_accept_ipv6_interface() {
        let mut config = SiteConfig::default();
        config.serve.interface = "::".to_string();

        let options = ServeOptions::from_config(&config).unwrap();
        assert!(options.ip.is_unspecified());
    }

    fn fixture_store() -> ArtifactStore {
        let mut store = ArtifactStore::new();
        store.insert(Path::new("public/index.html"), b"root".to_vec());
        store.insert(Path::new("public/posts/a/index.html"), b"post a".to_vec());
        store.insert(Path::new("public/style.css"), b"css".to_vec());
        store.insert(Path::new("public/with space.html"), b"spaced".to_vec());
        store
    }

    fn resolve_str(store: &ArtifactStore, url: &str) -> Option<String> {
        resolve(store, Path::new("public"), url)
            .map(|(_, content)| String::from_utf8(content).unwrap())
    }

    #[test]
    fn test_resolve_root_to_index() {
        let store = fixture_store();
        assert_eq!(resolve_str(&store, "/").as_deref(), Some("root"));
    }

    #[test]
    fn test_resolve_directory_to_index() {
        let store = fixture_store();
        assert_eq!(resolve_str(&store, "/posts/a").as_deref(), Some("post a"));
        assert_eq!(resolve_str(&store, "/posts/a/").as_deref(), Some("post a"));
    }

    #[test]
    fn test_resolve_exact_file() {
        let store = fixture_store();
        assert_eq!(resolve_str(&store, "/style.css").as_deref(), Some("css"));
    }

    #[test]
    fn test_resolve_strips_query() {
        let store = fixture_store();
        assert_eq!(resolve_str(&store, "/style.css?v=2").as_deref(), Some("css"));
    }

    #[test]
    fn test_resolve_decodes_url() {
        let store = fixture_store();
        assert_eq!(
            resolve_str(&store, "/with%20space.html").as_deref(),
            Some("spaced")
        );
    }

    #[test]
    fn test_resolve_missing_is_none() {
        let store = fixture_store();
        assert_eq!(resolve_str(&store, "/nope"), None);
    }

    #[test]
    fn test_resolve_cannot_escape_output() {
        let store = fixture_store();
        // `..` segments resolve inside the store, never outside it.
        assert_eq!(
            resolve_str(&store, "/posts/../style.css").as_deref(),
            Some("css")
        );
        assert_eq!(resolve_str(&store, "/../../etc/passwd"), None);
    }

    #[test]
    fn test_content_types() {
        let html = content_type_header(Path::new("public/index.html"));
        assert_eq!(html.value.as_str(), "text/html; charset=utf-8");

        let xml = content_type_header(Path::new("public/atom.xml"));
        assert_eq!(xml.value.as_str(), "application/xml");

        let unknown = content_type_header(Path::new("public/blob"));
        assert_eq!(unknown.value.as_str(), "application/octet-stream");
    }
}
