//! Offline request router.
//!
//! Decides, per request, between network-first, cache-first and
//! stale-while-revalidate, backed by two named cache partitions (static and
//! dynamic) that are versioned so a new release can discard stale ones.

mod cache;

pub use cache::CacheStorage;

use std::process::Command;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const PARTITION_PREFIX: &str = "ideatrium-";

const OFFLINE_PAGE: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <title>Ideatrium - Offline</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
  </head>
  <body>
    <h1>You're Offline</h1>
    <p>Ideatrium is offline. Your ideas are stored locally and will sync when you're back online.</p>
    <button onclick="window.location.reload()">Try Again</button>
  </body>
</html>
"#;

const OFFLINE_JSON: &str =
    r#"{"error":"Offline","message":"This request requires an internet connection."}"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: String,
    /// A top-level page navigation rather than a subresource fetch.
    pub navigate: bool,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Request {
            method: "GET".into(),
            url: url.into(),
            navigate: false,
        }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Request {
            navigate: true,
            ..Request::get(url)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl Response {
    pub fn ok(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Response {
            status: 200,
            content_type: content_type.to_string(),
            body: body.into(),
        }
    }

    /// 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network access for the router. Errors mean the network was unreachable;
/// HTTP error statuses come back as `Ok` responses.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Response>;
}

/// Fetches with `curl`. A trailer line carries the status and content type.
pub struct CurlFetcher;

const CURL_TRAILER: &str = "\n%{http_code} %{content_type}";

fn split_trailer(mut raw: Vec<u8>) -> Result<Response> {
    let at = raw
        .iter()
        .rposition(|b| *b == b'\n')
        .ok_or_else(|| Error::Backend("curl output has no status trailer".into()))?;
    let trailer = String::from_utf8_lossy(&raw[at + 1..]).into_owned();
    raw.truncate(at);
    let (code, content_type) = trailer.split_once(' ').unwrap_or((trailer.as_str(), ""));
    let status = code
        .trim()
        .parse::<u16>()
        .map_err(|_| Error::Backend(format!("unreadable status '{code}'")))?;
    if status == 0 {
        return Err(Error::Backend("no response".into()));
    }
    Ok(Response {
        status,
        content_type: content_type.trim().to_string(),
        body: raw,
    })
}

impl Fetcher for CurlFetcher {
    fn fetch(&self, url: &str) -> Result<Response> {
        let output = Command::new("curl")
            .args(["-sS", "-L", "-w", CURL_TRAILER, url])
            .output()
            .map_err(|e| Error::Backend(format!("failed to run curl: {e}")))?;
        if !output.status.success() {
            return Err(Error::Backend(format!(
                "fetch of {url} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        split_trailer(output.stdout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    NetworkFirst,
    CacheFirst,
    StaleWhileRevalidate,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::NetworkFirst => "network-first",
            Strategy::CacheFirst => "cache-first",
            Strategy::StaleWhileRevalidate => "stale-while-revalidate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Network,
    Cache,
    /// Canned offline page or offline error body.
    Offline,
}

pub struct Served {
    pub strategy: Strategy,
    pub source: Source,
    pub response: Response,
    /// Background cache refresh started by stale-while-revalidate.
    pub revalidation: Option<JoinHandle<()>>,
}

/// Pattern tables and cache naming.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub cache_version: String,
    /// Substrings of the full URL.
    pub network_first: Vec<String>,
    /// Path prefixes.
    pub cache_first: Vec<String>,
    /// Paths fetched into the static partition on install.
    pub precache: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            cache_version: "v1.0.0".into(),
            network_first: strings(&[
                "/api/",
                "https://generativelanguage.googleapis.com/",
                ".supabase.co/",
            ]),
            cache_first: strings(&["/logo.svg", "/favicon.ico", "/screenshots/", "/_next/static/"]),
            precache: strings(&["/", "/tasks", "/manifest.json", "/logo.svg", "/favicon.ico"]),
        }
    }
}

impl RouterConfig {
    pub fn static_partition(&self) -> String {
        format!("{PARTITION_PREFIX}static-{}", self.cache_version)
    }

    pub fn dynamic_partition(&self) -> String {
        format!("{PARTITION_PREFIX}dynamic-{}", self.cache_version)
    }
}

/// The pieces of a URL the router looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    scheme: String,
    href: String,
    path: String,
}

impl Target {
    /// Relative references (`/path`) resolve against `origin`.
    fn parse(url: &str, origin: &str) -> Option<Self> {
        let href = if url.starts_with('/') {
            format!("{}{url}", origin.trim_end_matches('/'))
        } else {
            url.to_string()
        };
        let (scheme, rest) = href.split_once("://")?;
        let scheme = scheme.to_ascii_lowercase();
        let after_host = rest.find('/').map_or("", |i| &rest[i..]);
        let path_end = after_host.find(['?', '#']).unwrap_or(after_host.len());
        let path = match &after_host[..path_end] {
            "" => "/".to_string(),
            p => p.to_string(),
        };
        Some(Target { scheme, href, path })
    }

    fn is_http(&self) -> bool {
        self.scheme == "http" || self.scheme == "https"
    }
}

pub struct Router {
    config: RouterConfig,
    origin: String,
    cache: CacheStorage,
    fetcher: Arc<dyn Fetcher>,
}

impl Router {
    pub fn new(
        config: RouterConfig,
        origin: impl Into<String>,
        cache: CacheStorage,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Router {
            config,
            origin: origin.into(),
            cache,
            fetcher,
        }
    }

    pub fn cache(&self) -> &CacheStorage {
        &self.cache
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Strategy for `request`, or `None` when it passes through untouched
    /// (non-GET, or not http/https).
    pub fn strategy_for(&self, request: &Request) -> Option<Strategy> {
        if !request.method.eq_ignore_ascii_case("GET") {
            return None;
        }
        let target = Target::parse(&request.url, &self.origin)?;
        if !target.is_http() {
            return None;
        }
        Some(self.classify(&target))
    }

    fn classify(&self, target: &Target) -> Strategy {
        if self
            .config
            .network_first
            .iter()
            .any(|p| target.href.contains(p.as_str()))
        {
            Strategy::NetworkFirst
        } else if self
            .config
            .cache_first
            .iter()
            .any(|p| target.path.starts_with(p.as_str()))
        {
            Strategy::CacheFirst
        } else {
            Strategy::StaleWhileRevalidate
        }
    }

    /// Serve `request`, or `None` if it is not intercepted.
    pub fn handle(&self, request: &Request) -> Option<Served> {
        let strategy = self.strategy_for(request)?;
        let target = Target::parse(&request.url, &self.origin)?;
        tracing::debug!("{} {}", strategy.as_str(), target.href);

        let attempt = match strategy {
            Strategy::NetworkFirst => self.network_first(&target.href),
            Strategy::CacheFirst => self.cache_first(&target.href),
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(&target.href),
        };
        let served = match attempt {
            Ok((source, response, revalidation)) => Served {
                strategy,
                source,
                response,
                revalidation,
            },
            Err(e) => {
                tracing::warn!("{} failed for {}: {e}", strategy.as_str(), target.href);
                Served {
                    strategy,
                    source: Source::Offline,
                    response: self.offline_response(request),
                    revalidation: None,
                }
            }
        };
        Some(served)
    }

    fn store_if_success(&self, partition: &str, href: &str, response: &Response) {
        if !response.is_success() {
            return;
        }
        if let Err(e) = self.cache.put(partition, href, response.clone()) {
            tracing::warn!("could not cache {href}: {e}");
        }
    }

    fn network_first(&self, href: &str) -> Result<(Source, Response, Option<JoinHandle<()>>)> {
        match self.fetcher.fetch(href) {
            Ok(response) => {
                self.store_if_success(&self.config.dynamic_partition(), href, &response);
                Ok((Source::Network, response, None))
            }
            Err(e) => match self.cache.match_any(href)? {
                Some(cached) => {
                    tracing::debug!("network failed, serving cached {href}");
                    Ok((Source::Cache, cached, None))
                }
                None => Err(e),
            },
        }
    }

    fn cache_first(&self, href: &str) -> Result<(Source, Response, Option<JoinHandle<()>>)> {
        if let Some(cached) = self.cache.match_any(href)? {
            return Ok((Source::Cache, cached, None));
        }
        let response = self.fetcher.fetch(href)?;
        self.store_if_success(&self.config.static_partition(), href, &response);
        Ok((Source::Network, response, None))
    }

    fn stale_while_revalidate(
        &self,
        href: &str,
    ) -> Result<(Source, Response, Option<JoinHandle<()>>)> {
        let partition = self.config.dynamic_partition();
        match self.cache.get(&partition, href)? {
            Some(cached) => {
                let handle = self.revalidate(partition, href.to_string());
                Ok((Source::Cache, cached, Some(handle)))
            }
            None => {
                let response = self.fetcher.fetch(href)?;
                self.store_if_success(&partition, href, &response);
                Ok((Source::Network, response, None))
            }
        }
    }

    fn revalidate(&self, partition: String, href: String) -> JoinHandle<()> {
        let fetcher = Arc::clone(&self.fetcher);
        let cache = self.cache.clone();
        thread::spawn(move || match fetcher.fetch(&href) {
            Ok(response) if response.is_success() => {
                if let Err(e) = cache.put(&partition, &href, response) {
                    tracing::warn!("revalidation could not cache {href}: {e}");
                }
            }
            Ok(response) => {
                tracing::debug!("revalidation of {href} got {}", response.status);
            }
            Err(e) => tracing::debug!("revalidation of {href} failed: {e}"),
        })
    }

    /// Cached home page or the offline page for navigations; a 503 JSON body
    /// for everything else.
    pub fn offline_response(&self, request: &Request) -> Response {
        if !request.navigate {
            return Response {
                status: 503,
                content_type: "application/json".into(),
                body: OFFLINE_JSON.as_bytes().to_vec(),
            };
        }
        let home = format!("{}/", self.origin.trim_end_matches('/'));
        match self.cache.match_any(&home) {
            Ok(Some(cached)) => cached,
            Ok(None) => Response::ok("text/html", OFFLINE_PAGE),
            Err(e) => {
                tracing::warn!("cache lookup for offline page failed: {e}");
                Response::ok("text/html", OFFLINE_PAGE)
            }
        }
    }

    // ── Lifecycle ──

    fn fetch_all(&self, urls: &[String]) -> Result<Vec<(String, Response)>> {
        urls.iter()
            .map(|url| {
                let target = Target::parse(url, &self.origin)
                    .ok_or_else(|| Error::validation(format!("invalid URL '{url}'")))?;
                let response = self.fetcher.fetch(&target.href)?;
                if !response.is_success() {
                    return Err(Error::Backend(format!(
                        "{} answered {}",
                        target.href, response.status
                    )));
                }
                Ok((target.href, response))
            })
            .collect()
    }

    /// Fetch the precache list into the static partition. All or nothing.
    pub fn install(&self) -> Result<usize> {
        let entries = self.fetch_all(&self.config.precache)?;
        let count = entries.len();
        self.cache.put_all(&self.config.static_partition(), entries)?;
        tracing::info!("precached {count} assets");
        Ok(count)
    }

    /// Delete every `ideatrium-*` partition other than the current two.
    pub fn activate(&self) -> Result<Vec<String>> {
        let keep = [self.config.static_partition(), self.config.dynamic_partition()];
        let mut deleted = Vec::new();
        for name in self.cache.names()? {
            if name.starts_with(PARTITION_PREFIX) && !keep.contains(&name) {
                self.cache.delete(&name)?;
                tracing::info!("deleted stale cache {name}");
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    /// Add `urls` to the dynamic partition on request. All or nothing.
    pub fn cache_urls(&self, urls: &[String]) -> Result<usize> {
        let entries = self.fetch_all(urls)?;
        let count = entries.len();
        self.cache.put_all(&self.config.dynamic_partition(), entries)?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    const ORIGIN: &str = "https://ideatrium.app";

    /// Serves canned bodies; unknown URLs or `online = false` fail.
    #[derive(Default)]
    struct FakeNet {
        online: Mutex<bool>,
        pages: Mutex<HashMap<String, Response>>,
        hits: Mutex<Vec<String>>,
    }

    impl FakeNet {
        fn online() -> Arc<Self> {
            let net = FakeNet::default();
            *net.online.lock().unwrap() = true;
            Arc::new(net)
        }

        fn serve(&self, url: &str, body: &str) {
            self.pages
                .lock()
                .unwrap()
                .insert(url.into(), Response::ok("text/plain", body));
        }

        fn set_online(&self, online: bool) {
            *self.online.lock().unwrap() = online;
        }

        fn hits(&self) -> usize {
            self.hits.lock().unwrap().len()
        }
    }

    impl Fetcher for FakeNet {
        fn fetch(&self, url: &str) -> Result<Response> {
            self.hits.lock().unwrap().push(url.to_string());
            if !*self.online.lock().unwrap() {
                return Err(Error::Backend("network unreachable".into()));
            }
            Ok(self
                .pages
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .unwrap_or(Response {
                    status: 404,
                    content_type: "text/plain".into(),
                    body: Vec::new(),
                }))
        }
    }

    fn router(net: &Arc<FakeNet>) -> Router {
        let fetcher: Arc<dyn Fetcher> = Arc::clone(net) as Arc<dyn Fetcher>;
        Router::new(RouterConfig::default(), ORIGIN, CacheStorage::new(), fetcher)
    }

    fn body(served: &Served) -> &str {
        std::str::from_utf8(&served.response.body).unwrap()
    }

    #[test]
    fn strategy_table() {
        let net = FakeNet::online();
        let r = router(&net);
        let pick = |url: &str| r.strategy_for(&Request::get(url));

        assert_eq!(pick("/api/ideas"), Some(Strategy::NetworkFirst));
        assert_eq!(
            pick("https://generativelanguage.googleapis.com/v1beta/models/x"),
            Some(Strategy::NetworkFirst)
        );
        assert_eq!(
            pick("https://abc.supabase.co/rest/v1/ideas"),
            Some(Strategy::NetworkFirst)
        );
        assert_eq!(pick("/logo.svg"), Some(Strategy::CacheFirst));
        assert_eq!(pick("/_next/static/chunk.js?v=2"), Some(Strategy::CacheFirst));
        assert_eq!(pick("/tasks"), Some(Strategy::StaleWhileRevalidate));
        assert_eq!(pick("chrome-extension://abc/script.js"), None);

        let post = Request {
            method: "POST".into(),
            ..Request::get("/api/ideas")
        };
        assert_eq!(r.strategy_for(&post), None);
        assert!(r.handle(&post).is_none());
    }

    #[test]
    fn network_first_caches_then_falls_back_to_cache() {
        let net = FakeNet::online();
        let url = format!("{ORIGIN}/api/ideas");
        net.serve(&url, "fresh");
        let r = router(&net);

        let served = r.handle(&Request::get(url.as_str())).unwrap();
        assert_eq!(served.source, Source::Network);
        assert_eq!(
            r.cache().get(&r.config().dynamic_partition(), &url).unwrap().unwrap().body,
            b"fresh"
        );

        net.set_online(false);
        let served = r.handle(&Request::get(url.as_str())).unwrap();
        assert_eq!(served.source, Source::Cache);
        assert_eq!(body(&served), "fresh");
    }

    #[test]
    fn network_first_offline_without_cache_gives_503_json() {
        let net = FakeNet::online();
        net.set_online(false);
        let r = router(&net);
        let served = r.handle(&Request::get("/api/ideas")).unwrap();
        assert_eq!(served.source, Source::Offline);
        assert_eq!(served.response.status, 503);
        let json: serde_json::Value = serde_json::from_slice(&served.response.body).unwrap();
        assert_eq!(json["error"], "Offline");
    }

    #[test]
    fn error_statuses_are_not_cached() {
        let net = FakeNet::online();
        let r = router(&net);
        let served = r.handle(&Request::get("/api/missing")).unwrap();
        assert_eq!(served.response.status, 404);
        assert!(r.cache().is_empty(&r.config().dynamic_partition()).unwrap());
    }

    #[test]
    fn cache_first_skips_network_once_cached() {
        let net = FakeNet::online();
        net.serve(&format!("{ORIGIN}/logo.svg"), "<svg/>");
        let r = router(&net);

        assert_eq!(r.handle(&Request::get("/logo.svg")).unwrap().source, Source::Network);
        let served = r.handle(&Request::get("/logo.svg")).unwrap();
        assert_eq!(served.source, Source::Cache);
        assert_eq!(net.hits(), 1);
        assert_eq!(r.cache().len(&r.config().static_partition()).unwrap(), 1);
    }

    #[test]
    fn stale_while_revalidate_serves_stale_and_refreshes() {
        let net = FakeNet::online();
        let url = format!("{ORIGIN}/tasks");
        net.serve(&url, "v1");
        let r = router(&net);

        let first = r.handle(&Request::navigate("/tasks")).unwrap();
        assert_eq!(first.source, Source::Network);
        assert!(first.revalidation.is_none());

        net.serve(&url, "v2");
        let second = r.handle(&Request::navigate("/tasks")).unwrap();
        assert_eq!(second.source, Source::Cache);
        assert_eq!(body(&second), "v1");
        second.revalidation.unwrap().join().unwrap();

        let third = r.handle(&Request::navigate("/tasks")).unwrap();
        assert_eq!(body(&third), "v2");
        if let Some(handle) = third.revalidation {
            handle.join().unwrap();
        }
    }

    #[test]
    fn offline_navigation_prefers_cached_home_page() {
        let net = FakeNet::online();
        net.set_online(false);
        let r = router(&net);

        let served = r.handle(&Request::navigate("/ideas/42")).unwrap();
        assert_eq!(served.source, Source::Offline);
        assert!(body(&served).contains("You're Offline"));

        r.cache()
            .put(&r.config().static_partition(), &format!("{ORIGIN}/"), Response::ok("text/html", "home"))
            .unwrap();
        let served = r.handle(&Request::navigate("/ideas/42")).unwrap();
        assert_eq!(body(&served), "home");
    }

    #[test]
    fn install_precaches_and_activate_prunes_old_versions() {
        let net = FakeNet::online();
        for path in &RouterConfig::default().precache {
            net.serve(&format!("{ORIGIN}{path}"), "asset");
        }
        let r = router(&net);
        r.cache().open("ideatrium-static-v0.9.0").unwrap();
        r.cache().open("ideatrium-dynamic-v0.9.0").unwrap();
        r.cache().open("someone-else").unwrap();

        assert_eq!(r.install().unwrap(), 5);
        let mut deleted = r.activate().unwrap();
        deleted.sort();
        assert_eq!(deleted, vec!["ideatrium-dynamic-v0.9.0", "ideatrium-static-v0.9.0"]);
        assert!(r.cache().names().unwrap().contains(&"someone-else".to_string()));
    }

    #[test]
    fn install_is_all_or_nothing() {
        let net = FakeNet::online();
        net.serve(&format!("{ORIGIN}/"), "home");
        let r = router(&net);
        assert!(r.install().is_err());
        assert!(r.cache().is_empty(&r.config().static_partition()).unwrap());
    }

    #[test]
    fn cache_urls_fills_dynamic_partition() {
        let net = FakeNet::online();
        net.serve(&format!("{ORIGIN}/auth/callback"), "cb");
        let r = router(&net);
        assert_eq!(r.cache_urls(&["/auth/callback".to_string()]).unwrap(), 1);
        assert_eq!(r.cache().len(&r.config().dynamic_partition()).unwrap(), 1);
    }

    #[test]
    fn curl_trailer_is_split_from_body() {
        let raw = b"<h1>hi</h1>\n200 text/html; charset=utf-8".to_vec();
        let response = split_trailer(raw).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type, "text/html; charset=utf-8");
        assert_eq!(response.body, b"<h1>hi</h1>");
        assert!(split_trailer(b"\n000 ".to_vec()).is_err());
        assert!(split_trailer(b"no trailer".to_vec()).is_err());
    }

    #[test]
    fn target_parsing() {
        let t = Target::parse("HTTPS://host.io/a/b?q=1#frag", ORIGIN).unwrap();
        assert!(t.is_http());
        assert_eq!(t.path, "/a/b");
        assert_eq!(Target::parse("https://host.io", ORIGIN).unwrap().path, "/");
        assert!(Target::parse("not a url", ORIGIN).is_none());
    }
}
