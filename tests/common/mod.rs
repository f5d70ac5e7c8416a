//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use scrape_orchestrator::config::OrchestratorConfig;
use scrape_orchestrator::error::{FetchError, Result};
use scrape_orchestrator::lifecycle::Shutdown;
use scrape_orchestrator::proxy::ProxyBinding;
use scrape_orchestrator::worker::{RawPage, Session, SessionFactory};
use scrape_orchestrator::FetchOrchestrator;

type Behavior = Arc<dyn Fn(String, usize) -> BoxFuture<'static, Result<RawPage>> + Send + Sync>;

/// Counters shared by every session a [`FakeSessionFactory`] opens.
#[derive(Debug, Default)]
pub struct Counters {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub fetches: AtomicUsize,
    pub active: AtomicUsize,
    pub peak_active: AtomicUsize,
}

impl Counters {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn peak_active(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }
}

/// Session factory whose sessions run a scripted behavior.
///
/// The behavior gets the URL and the 0-based index of the fetch across all
/// sessions.
pub struct FakeSessionFactory {
    pub counters: Arc<Counters>,
    pub bindings: std::sync::Mutex<Vec<Option<String>>>,
    behavior: Behavior,
}

impl FakeSessionFactory {
    pub fn new<F, Fut>(behavior: F) -> Arc<Self>
    where
        F: Fn(String, usize) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<RawPage>> + Send + 'static,
    {
        Arc::new(Self {
            counters: Arc::new(Counters::default()),
            bindings: std::sync::Mutex::new(Vec::new()),
            behavior: Arc::new(move |url, n| behavior(url, n).boxed()),
        })
    }

    /// Sessions that answer `body` after `delay`.
    pub fn ok_after(body: &'static str, delay: Duration) -> Arc<Self> {
        Self::new(move |url, _| async move {
            tokio::time::sleep(delay).await;
            Ok(page(&url, body))
        })
    }

    pub fn proxies_bound(&self) -> Vec<Option<String>> {
        self.bindings.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionFactory for FakeSessionFactory {
    async fn open(&self, binding: &ProxyBinding) -> Result<Arc<dyn Session>> {
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        self.bindings
            .lock()
            .unwrap()
            .push(binding.proxy_address().map(str::to_string));
        Ok(Arc::new(FakeSession {
            counters: Arc::clone(&self.counters),
            behavior: Arc::clone(&self.behavior),
        }))
    }
}

struct FakeSession {
    counters: Arc<Counters>,
    behavior: Behavior,
}

/// Decrements `active` even when the fetch is cancelled by a deadline.
struct ActiveGuard(Arc<Counters>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn fetch(&self, url: &str) -> Result<RawPage> {
        let n = self.counters.fetches.fetch_add(1, Ordering::SeqCst);
        let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak_active.fetch_max(active, Ordering::SeqCst);
        let _guard = ActiveGuard(Arc::clone(&self.counters));

        (self.behavior)(url.to_string(), n).await
    }

    async fn close(&self) {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn page(url: &str, body: &str) -> RawPage {
    RawPage {
        url: url.to_string(),
        status: 200,
        body: body.to_string(),
    }
}

pub fn upstream_error(status: u16) -> FetchError {
    FetchError::UpstreamStatus { status }
}

/// Config with a fixed-size pool and no background surprises.
pub fn test_config(workers: usize) -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.pool.initial_size = workers;
    config.pool.min_size = workers;
    config.pool.max_size = workers;
    config.pool.autoscale = false;
    config
}

pub async fn orchestrator(
    config: OrchestratorConfig,
    factory: Arc<FakeSessionFactory>,
) -> (FetchOrchestrator, Shutdown) {
    let shutdown = Shutdown::new();
    let orchestrator = FetchOrchestrator::builder(config)
        .session_factory(factory)
        .build(&shutdown)
        .await
        .unwrap();
    (orchestrator, shutdown)
}

/// Let spawned tasks (session closes, flight cleanup) run.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Start a programmable mock backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;

                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}
