//! Test helpers for postal-server integration tests.
//!
//! - [`TestServer`]: a real listener on `127.0.0.1:0` with its own
//!   cancellation token
//! - [`SlowParser`]: a parser that sleeps before answering
//! - [`SelectiveParser`]: slow only for addresses starting with `slow`

#![allow(dead_code)] // Not every test file uses every helper

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use postal_core::config::{DEFAULT_MAX_BODY_BYTES, ServerConfig};
use postal_core::lifecycle::{DrainResult, LifecycleConfig, LifecycleManager};
use postal_core::{AddressParser, ParseError, ParsedComponent, ParserOptions};
use postal_server::PostalServer;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Running server plus the handles a test needs to stop and inspect it.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: CancellationToken,
    pub lifecycle: Arc<LifecycleManager>,
    pub handle: JoinHandle<DrainResult>,
}

impl TestServer {
    pub async fn start(parser: Arc<dyn AddressParser>) -> Self {
        Self::start_with(parser, LifecycleConfig::default(), DEFAULT_MAX_BODY_BYTES).await
    }

    pub async fn start_with(
        parser: Arc<dyn AddressParser>,
        lifecycle_config: LifecycleConfig,
        max_body_bytes: usize,
    ) -> Self {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_body_bytes,
        };
        let shutdown = CancellationToken::new();
        let lifecycle = Arc::new(LifecycleManager::new(lifecycle_config, shutdown.clone()));

        let server = PostalServer::bind(&config, parser, lifecycle.clone())
            .await
            .expect("bind test server");
        let addr = server.local_addr().expect("local addr");
        let handle = tokio::spawn(server.run());

        // Wait for the accept loop to start.
        for _ in 0..50 {
            if lifecycle.is_ready() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        Self {
            addr,
            shutdown,
            lifecycle,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Cancel the token and wait for the server to finish draining.
    pub async fn stop(self) -> DrainResult {
        self.shutdown.cancel();
        self.handle.await.expect("server task")
    }
}

/// Client without connection pooling, so each request opens a new socket.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(30))
        .build()
        .expect("build client")
}

/// Answers `[{"label":"road","value":<address>}]` after `delay`.
#[derive(Default)]
pub struct SlowParser {
    pub delay: Duration,
    pub started: AtomicUsize,
}

impl SlowParser {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: AtomicUsize::new(0),
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    async fn answer(&self, address: &str) -> Result<Vec<ParsedComponent>, ParseError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(vec![ParsedComponent::new("road", address)])
    }
}

#[async_trait]
impl AddressParser for SlowParser {
    async fn parse(&self, address: &str) -> Result<Vec<ParsedComponent>, ParseError> {
        self.answer(address).await
    }

    async fn parse_with_options(
        &self,
        address: &str,
        _options: ParserOptions,
    ) -> Result<Vec<ParsedComponent>, ParseError> {
        self.answer(address).await
    }
}

/// Poll until the parser has started `count` calls.
pub async fn wait_for_started(parser: &SlowParser, count: usize) {
    for _ in 0..200 {
        if parser.started() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("parser never started {count} call(s)");
}

/// Sleeps `slow_delay` for addresses starting with `slow`, answers at once
/// otherwise.
pub struct SelectiveParser {
    pub slow_delay: Duration,
}

impl SelectiveParser {
    async fn answer(&self, address: &str) -> Result<Vec<ParsedComponent>, ParseError> {
        if address.starts_with("slow") {
            tokio::time::sleep(self.slow_delay).await;
        }
        Ok(vec![ParsedComponent::new("road", address)])
    }
}

#[async_trait]
impl AddressParser for SelectiveParser {
    async fn parse(&self, address: &str) -> Result<Vec<ParsedComponent>, ParseError> {
        self.answer(address).await
    }

    async fn parse_with_options(
        &self,
        address: &str,
        _options: ParserOptions,
    ) -> Result<Vec<ParsedComponent>, ParseError> {
        self.answer(address).await
    }
}
