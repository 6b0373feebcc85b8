// src/session.rs
//
// Authenticated HTTP session against the portal. One `Session` owns one
// cookie jar and is only ever used from one unit of execution at a time;
// the parallel batch path builds a fresh session per worker instead of
// sharing this one.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER, USER_AGENT};
use reqwest::Url;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::{Error, Result};

/// The portal expects this charset on every HTML page it serves.
pub const PORTAL_CHARSET: &str = "iso-8859-1";

/// Cookie carrying the organization selection, expected before login.
const ORG_COOKIE: &str = "SIP_U_GOVMG_SEI";

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub struct Session {
    client: Client,
    jar: Arc<Jar>,
}

impl Session {
    /// Build a session with browser-like headers, a cookie store and the
    /// organization cookie pre-set.
    pub fn new(settings: &Settings) -> Result<Self> {
        let jar = Arc::new(Jar::default());

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );

        let client = Client::builder()
            .cookie_provider(jar.clone())
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("could not build HTTP client: {e}")))?;

        let session = Self { client, jar };
        session.set_org_cookie(settings);
        Ok(session)
    }

    /// (Re-)set the organization cookie for the portal domain.
    pub fn set_org_cookie(&self, settings: &Settings) {
        if settings.org.is_empty() {
            return;
        }
        if let Ok(base) = Url::parse(&settings.base_url) {
            let cookie = format!("{ORG_COOKIE}={}; Path=/", settings.org);
            self.jar.add_cookie_str(&cookie, &base);
        }
    }

    /// GET a page and decode it with the portal charset.
    pub fn get_text(&self, url: &str, timeout: Duration) -> reqwest::Result<String> {
        debug!(url, "GET");
        self.client
            .get(url)
            .timeout(timeout)
            .send()?
            .error_for_status()?
            .text_with_charset(PORTAL_CHARSET)
    }

    /// POST form fields and decode the response with the portal charset.
    pub fn post_form<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        data: &T,
        referer: Option<&str>,
        timeout: Duration,
    ) -> reqwest::Result<String> {
        debug!(url, "POST");
        let mut req = self.client.post(url).form(data).timeout(timeout);
        if let Some(r) = referer {
            req = req.header(REFERER, r);
        }
        req.send()?.error_for_status()?.text_with_charset(PORTAL_CHARSET)
    }

    /// GET with query parameters, for forms that declare `method="get"`.
    pub fn get_with_params<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        data: &T,
        referer: Option<&str>,
        timeout: Duration,
    ) -> reqwest::Result<String> {
        debug!(url, "GET (form)");
        let mut req = self.client.get(url).query(data).timeout(timeout);
        if let Some(r) = referer {
            req = req.header(REFERER, r);
        }
        req.send()?.error_for_status()?.text_with_charset(PORTAL_CHARSET)
    }

    /// Whether any stored cookie for the portal has `fragment` in its name.
    pub fn has_cookie_containing(&self, settings: &Settings, fragment: &str) -> bool {
        use reqwest::cookie::CookieStore;
        let Ok(url) = Url::parse(&settings.base_url) else { return false };
        self.jar
            .cookies(&url)
            .and_then(|h| h.to_str().map(|s| s.contains(fragment)).ok())
            .unwrap_or(false)
    }

    /// GET returning the raw response for streamed binary reads.
    pub fn get_raw(&self, url: &str, accept: &str, timeout: Duration) -> reqwest::Result<Response> {
        debug!(url, "GET (binary)");
        self.client
            .get(url)
            .header(ACCEPT, accept)
            .timeout(timeout)
            .send()?
            .error_for_status()
    }
}

/// Resolve an href from the portal's markup to an absolute URL.
pub fn absolute_url(settings: &Settings, href: &str) -> String {
    if href.starts_with("http") {
        return href.to_string();
    }
    let base = format!("{}/sei/", settings.base_url.trim_end_matches('/'));
    match Url::parse(&base).and_then(|b| b.join(href)) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{base}{}", href.trim_start_matches('/')),
    }
}

/// First value of `name` in the URL's query string, empty when absent.
/// Works on relative hrefs too, which is what the tree parser hands us.
pub fn query_param(url: &str, name: &str) -> String {
    let Some(query) = url.splitn(2, '?').nth(1) else { return s!() };
    let query = query.splitn(2, '#').next().unwrap_or("");
    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        if parts.next() == Some(name) {
            return parts.next().unwrap_or("").to_string();
        }
    }
    s!()
}

/// Dump fetched HTML under the debug directory when enabled. Failures are
/// logged, never raised.
pub fn save_html(settings: &Settings, path: &Path, html: &str) {
    if !settings.save_debug_html {
        return;
    }
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!("could not create {}: {e}", parent.display());
            return;
        }
    }
    match std::fs::write(path, html) {
        Ok(()) => debug!("saved {} ({} chars)", path.display(), html.len()),
        Err(e) => warn!("could not save {}: {e}", path.display()),
    }
}
