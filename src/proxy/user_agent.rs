//! User-agent rotation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Used when the configuration lists no user agents.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
];

/// Round-robin over a fixed list of user agents.
#[derive(Debug)]
pub struct UserAgentRotator {
    agents: Vec<Arc<str>>,
    counter: AtomicUsize,
}

impl UserAgentRotator {
    pub fn new(agents: &[String]) -> Self {
        let agents: Vec<Arc<str>> = if agents.is_empty() {
            DEFAULT_USER_AGENTS.iter().map(|ua| Arc::from(*ua)).collect()
        } else {
            agents.iter().map(|ua| Arc::from(ua.as_str())).collect()
        };
        Self {
            agents,
            counter: AtomicUsize::new(0),
        }
    }

    pub fn next(&self) -> Arc<str> {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.agents.len();
        Arc::clone(&self.agents[index])
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for UserAgentRotator {
    fn default() -> Self {
        Self::new(&[])
    }
}
