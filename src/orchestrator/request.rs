//! Fetch requests.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::UpstreamConfig;
use crate::error::{FetchError, Result};

const MAX_TARGET_LEN: usize = 2048;

/// Data volatility class. Selects the cache TTL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    #[default]
    Search,
    Detail,
    VideoLinks,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Search => "search",
            RequestKind::Detail => "detail",
            RequestKind::VideoLinks => "video_links",
        }
    }
}

/// A single fetch. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// A URL, a search query, or a detail id depending on `kind`.
    pub target: String,
    #[serde(default)]
    pub kind: RequestKind,
    #[serde(default)]
    pub page: Option<u32>,
    /// Carried through the queue; dispatch order is FIFO regardless.
    #[serde(default)]
    pub priority: u8,
    /// Per-attempt deadline override.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl FetchRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            kind: RequestKind::default(),
            page: None,
            priority: 0,
            timeout_ms: None,
        }
    }

    pub fn with_kind(mut self, kind: RequestKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let target = self.target.trim();
        if target.is_empty() {
            return Err(FetchError::InvalidRequest("target must not be empty".into()));
        }
        if target.len() > MAX_TARGET_LEN {
            return Err(FetchError::InvalidRequest(format!(
                "target longer than {} bytes",
                MAX_TARGET_LEN
            )));
        }
        if self.page == Some(0) {
            return Err(FetchError::InvalidRequest("page starts at 1".into()));
        }
        if self.timeout_ms == Some(0) {
            return Err(FetchError::InvalidRequest("timeout_ms must be greater than 0".into()));
        }
        match self.kind {
            RequestKind::VideoLinks if self.target_url().is_none() => Err(FetchError::InvalidRequest(
                "video_links requests need a URL target".into(),
            )),
            RequestKind::Detail if self.target_url().is_none() && target.contains(char::is_whitespace) => {
                Err(FetchError::InvalidRequest("detail id must not contain whitespace".into()))
            }
            _ => Ok(()),
        }
    }

    /// `target` parsed as an absolute http(s) URL.
    pub fn target_url(&self) -> Option<Url> {
        let url = Url::parse(self.target.trim()).ok()?;
        matches!(url.scheme(), "http" | "https").then_some(url)
    }

    /// Target in canonical form: URLs re-serialized, search queries
    /// trimmed, whitespace-collapsed and lowercased. Detail ids are only
    /// trimmed; the upstream may treat their case as significant.
    pub fn normalized_target(&self) -> String {
        if let Some(url) = self.target_url() {
            return url.to_string();
        }
        match self.kind {
            RequestKind::Detail => self.target.trim().to_string(),
            _ => self
                .target
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase(),
        }
    }

    /// Page number, 1 when absent.
    pub fn page_or_default(&self) -> u32 {
        self.page.unwrap_or(1)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// The URL a worker should fetch.
    pub fn resolve_url(&self, upstream: &UpstreamConfig) -> Result<Url> {
        if let Some(url) = self.target_url() {
            return Ok(url);
        }

        let base = upstream.base_url.trim_end_matches('/');
        let invalid = |e: url::ParseError| FetchError::InvalidRequest(format!("cannot build upstream URL: {}", e));

        match self.kind {
            RequestKind::Search => {
                let mut url = Url::parse(&format!("{}{}", base, upstream.search_path)).map_err(invalid)?;
                url.query_pairs_mut()
                    .append_pair("q", &self.normalized_target())
                    .append_pair("page", &self.page_or_default().to_string());
                Ok(url)
            }
            RequestKind::Detail => {
                let mut url = Url::parse(&format!("{}{}", base, upstream.detail_path)).map_err(invalid)?;
                url.path_segments_mut()
                    .map_err(|_| FetchError::InvalidRequest("upstream base URL cannot have a path".into()))?
                    .pop_if_empty()
                    .push(&self.normalized_target());
                Ok(url)
            }
            RequestKind::VideoLinks => Err(FetchError::InvalidRequest(
                "video_links requests need a URL target".into(),
            )),
        }
    }
}

/// Breaker key for a resolved URL: host, plus port when explicit.
pub fn upstream_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or("unknown");
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_query() {
        let req = FetchRequest::new("  Cowboy   BEBOP ");
        assert_eq!(req.normalized_target(), "cowboy bebop");
    }

    #[test]
    fn test_search_resolution() {
        let req = FetchRequest::new("Cowboy Bebop").with_page(2);
        let url = req.resolve_url(&UpstreamConfig::default()).unwrap();
        assert_eq!(url.as_str(), "https://api.jikan.moe/v4/anime?q=cowboy+bebop&page=2");
        assert_eq!(upstream_key(&url), "api.jikan.moe");
    }

    #[test]
    fn test_detail_resolution() {
        let req = FetchRequest::new("5114").with_kind(RequestKind::Detail);
        let url = req.resolve_url(&UpstreamConfig::default()).unwrap();
        assert_eq!(url.as_str(), "https://api.jikan.moe/v4/anime/5114");
    }

    #[test]
    fn test_url_target_passes_through() {
        let req = FetchRequest::new("http://127.0.0.1:9000/embed?id=1").with_kind(RequestKind::VideoLinks);
        assert!(req.validate().is_ok());
        let url = req.resolve_url(&UpstreamConfig::default()).unwrap();
        assert_eq!(upstream_key(&url), "127.0.0.1:9000");
    }

    #[test]
    fn test_detail_id_keeps_case() {
        let req = FetchRequest::new("  ABC ").with_kind(RequestKind::Detail);
        assert_eq!(req.normalized_target(), "ABC");
        let url = req.resolve_url(&UpstreamConfig::default()).unwrap();
        assert_eq!(url.as_str(), "https://api.jikan.moe/v4/anime/ABC");
    }

    #[test]
    fn test_validation() {
        assert!(FetchRequest::new("   ").validate().is_err());
        assert!(FetchRequest::new("x").with_page(0).validate().is_err());
        assert!(FetchRequest::new("x").with_kind(RequestKind::VideoLinks).validate().is_err());
        assert!(FetchRequest::new("a b").with_kind(RequestKind::Detail).validate().is_err());
        assert!(FetchRequest::new("naruto").validate().is_ok());
    }
}
