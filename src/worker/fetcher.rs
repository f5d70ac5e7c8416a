//! Execution contexts bound to a worker.
//!
//! A [`Session`] is what a worker runs fetches on. The shipped
//! [`HttpSessionFactory`] opens a `reqwest` client per worker, routed through
//! the worker's proxy with its user agent; browser-backed sessions plug in
//! through the same traits.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ConfigHandle;
use crate::error::{FetchError, Result};
use crate::proxy::ProxyBinding;

/// Raw upstream response handed to the result processor.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPage {
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// A live execution context (HTTP client, browser page, ...).
#[async_trait]
pub trait Session: Send + Sync {
    /// Fetch a resolved URL. Non-success statuses are errors.
    async fn fetch(&self, url: &str) -> Result<RawPage>;

    /// Release the context. Called at most once per session.
    async fn close(&self) {}
}

/// Opens sessions for new workers.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, binding: &ProxyBinding) -> Result<Arc<dyn Session>>;
}

/// Opens one `reqwest` client per worker.
#[derive(Debug, Clone)]
pub struct HttpSessionFactory {
    config: Arc<ConfigHandle>,
}

impl HttpSessionFactory {
    pub fn new(config: Arc<ConfigHandle>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    async fn open(&self, binding: &ProxyBinding) -> Result<Arc<dyn Session>> {
        let config = self.config.load();

        let mut builder = reqwest::Client::builder()
            .user_agent(binding.user_agent.as_ref())
            .timeout(config.timeouts.attempt());

        builder = match &binding.proxy {
            Some(proxy) => {
                let proxy = reqwest::Proxy::all(proxy.url())
                    .map_err(|e| FetchError::Internal(format!("invalid proxy {}: {}", proxy.address(), e)))?;
                builder.proxy(proxy)
            }
            None => builder.no_proxy(),
        };

        let client = builder
            .build()
            .map_err(|e| FetchError::Internal(format!("failed to build session client: {}", e)))?;

        Ok(Arc::new(HttpSession { client }))
    }
}

#[derive(Debug)]
struct HttpSession {
    client: reqwest::Client,
}

#[async_trait]
impl Session for HttpSession {
    async fn fetch(&self, url: &str) -> Result<RawPage> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json, text/html;q=0.9, */*;q=0.8")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UpstreamStatus {
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let body = response.text().await?;
        Ok(RawPage {
            url: final_url,
            status: status.as_u16(),
            body,
        })
    }
}
