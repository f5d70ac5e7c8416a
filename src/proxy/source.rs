//! Proxy list sources.
//!
//! A source yields normalized `host:port` strings. Sources fail soft: the
//! manager logs a failing source and keeps going with the rest.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{FetchError, Result};
use crate::proxy::entry::parse_address;

/// Somewhere proxy addresses come from.
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// Name used in logs and in `ProxySource` errors.
    fn name(&self) -> &str;

    /// Fetch the current list of addresses.
    async fn fetch(&self) -> Result<Vec<String>>;
}

/// Parse a plain-text proxy list.
///
/// Entries may be separated by newlines, whitespace or commas. Lines
/// starting with `#` are comments. Malformed entries are skipped.
pub fn parse_proxy_list(body: &str) -> Vec<String> {
    let mut skipped = 0usize;
    let addresses: Vec<String> = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .flat_map(|line| line.split(|c: char| c == ',' || c.is_whitespace()))
        .filter(|token| !token.is_empty())
        .filter_map(|token| {
            let parsed = parse_address(token);
            if parsed.is_none() {
                skipped += 1;
            }
            parsed
        })
        .collect();

    if skipped > 0 {
        tracing::debug!(skipped, "Skipped malformed proxy entries");
    }
    addresses
}

/// Downloads a plain `host:port` list over HTTP.
#[derive(Debug, Clone)]
pub struct HttpProxySource {
    url: String,
    client: reqwest::Client,
}

impl HttpProxySource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            url: url.into(),
            client,
        }
    }

    fn error(&self, message: impl ToString) -> FetchError {
        FetchError::ProxySource {
            source_name: self.url.clone(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl ProxySource for HttpProxySource {
    fn name(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| self.error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.error(format!("status {}", status)));
        }

        let body = response.text().await.map_err(|e| self.error(e))?;
        Ok(parse_proxy_list(&body))
    }
}

/// Addresses listed directly in the configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticProxySource {
    addresses: Vec<String>,
}

impl StaticProxySource {
    pub fn new(raw: &[String]) -> Self {
        Self {
            addresses: raw.iter().filter_map(|r| parse_address(r)).collect(),
        }
    }
}

#[async_trait]
impl ProxySource for StaticProxySource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> Result<Vec<String>> {
        Ok(self.addresses.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_proxy_list_formats() {
        let body = "# free list\n10.0.0.1:8080\n10.0.0.2:3128, 10.0.0.3:80 http://10.0.0.4:8000\n\nnot-a-proxy\n10.0.0.5:0\n";
        assert_eq!(
            parse_proxy_list(body),
            vec!["10.0.0.1:8080", "10.0.0.2:3128", "10.0.0.3:80", "10.0.0.4:8000"]
        );
    }

    #[tokio::test]
    async fn test_static_source_drops_malformed() {
        let source = StaticProxySource::new(&["10.0.0.1:1".into(), "garbage".into()]);
        assert_eq!(source.fetch().await.unwrap(), vec!["10.0.0.1:1"]);
    }
}
