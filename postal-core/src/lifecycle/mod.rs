//! Operational lifecycle management for the postal service.
//!
//! This module provides:
//! - Lifecycle state tracking
//! - Per-connection request accounting for graceful draining
//! - Shutdown coordination through an injected `CancellationToken`
//!
//! ## Lifecycle States
//!
//! ```text
//! Starting → Ready → ShuttingDown → Stopped
//! ```
//!
//! - **Starting**: Listener not bound yet
//! - **Ready**: Accepting traffic
//! - **ShuttingDown**: Accept loop stopped, in-flight work draining
//! - **Stopped**: Shutdown complete
//!
//! The shutdown window bounded by [`LifecycleConfig::drain_timeout`] is
//! independent of the per-request parse deadline; neither is derived from the
//! other.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default upper bound for draining in-flight requests after a stop signal.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DRAIN_LOG_INTERVAL: Duration = Duration::from_secs(5);

// ============================================================================
// Lifecycle State
// ============================================================================

/// Lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Listener not bound yet
    Starting,
    /// Accepting traffic
    Ready,
    /// Draining, rejecting new connections
    ShuttingDown,
    /// Shutdown complete
    Stopped,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Ready => write!(f, "ready"),
            Self::ShuttingDown => write!(f, "shutting_down"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for lifecycle management.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// How long in-flight requests may keep running after shutdown begins
    /// (default: 10s)
    pub drain_timeout: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

// ============================================================================
// Lifecycle Manager
// ============================================================================

/// The lifecycle manager coordinates readiness, request accounting and
/// shutdown.
///
/// It does not create its own stop signal: the owner passes a
/// `CancellationToken` at construction and remains the single party that
/// decides when the service stops (usually the signal handler in `main`).
///
/// # Thread Safety
///
/// All state is held in atomics or `ArcSwap`, so the manager can be shared
/// behind an `Arc` by the accept loop and every connection task.
pub struct LifecycleManager {
    /// Current lifecycle state
    state: ArcSwap<LifecycleState>,

    /// When the manager was created
    started_at: Instant,

    /// Shutdown cancellation token (injected by the owner)
    shutdown_token: CancellationToken,

    /// Active connection counter (for draining)
    active_requests: AtomicUsize,

    /// Configuration
    config: LifecycleConfig,

    /// Version string (from Cargo.toml)
    version: &'static str,
}

impl LifecycleManager {
    /// Creates a new lifecycle manager in the `Starting` state.
    #[must_use]
    pub fn new(config: LifecycleConfig, shutdown_token: CancellationToken) -> Self {
        Self {
            state: ArcSwap::new(Arc::new(LifecycleState::Starting)),
            started_at: Instant::now(),
            shutdown_token,
            active_requests: AtomicUsize::new(0),
            config,
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        **self.state.load()
    }

    /// Returns true if the service is accepting traffic.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.state(), LifecycleState::Ready)
    }

    /// Returns true if the service is shutting down or stopped.
    ///
    /// A cancelled token counts as shutting down even before
    /// [`begin_shutdown`](Self::begin_shutdown) has been called, so a
    /// connection accepted in that window is never tracked.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
            || matches!(
                self.state(),
                LifecycleState::ShuttingDown | LifecycleState::Stopped
            )
    }

    /// Transition to Ready state.
    pub fn mark_ready(&self) {
        self.state.store(Arc::new(LifecycleState::Ready));
        info!(
            version = %self.version,
            startup_duration_ms = self.started_at.elapsed().as_millis(),
            "Postal server ready"
        );
    }

    /// Returns a clone of the shutdown token.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Begin graceful shutdown.
    ///
    /// Sets state to ShuttingDown and cancels the shutdown token so the
    /// accept loop and every connection task observe it. Idempotent.
    pub fn begin_shutdown(&self) {
        self.state.store(Arc::new(LifecycleState::ShuttingDown));
        self.shutdown_token.cancel();
        info!(
            active_requests = self.active_requests.load(Ordering::SeqCst),
            "Shutdown initiated"
        );
    }

    /// Track an active connection (returns RAII guard).
    ///
    /// Returns `None` once shutdown has begun; late connections are not
    /// served. The guard decrements the counter when dropped, including when
    /// the owning task panics or is aborted.
    #[must_use]
    pub fn track_request(self: &Arc<Self>) -> Option<RequestGuard> {
        if self.is_shutting_down() {
            return None;
        }
        self.active_requests.fetch_add(1, Ordering::SeqCst);
        Some(RequestGuard {
            manager: Arc::clone(self),
        })
    }

    /// Returns the current active connection count.
    #[must_use]
    pub fn active_request_count(&self) -> usize {
        self.active_requests.load(Ordering::SeqCst)
    }

    /// Returns uptime in seconds.
    #[must_use]
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Returns the version string.
    #[must_use]
    pub fn version(&self) -> &'static str {
        self.version
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Drain active requests with timeout.
    ///
    /// Polls every 100ms until the active count reaches zero
    /// (`DrainResult::Complete`) or the drain timeout passes
    /// (`DrainResult::Timeout`). Logs progress at most every 5 seconds.
    pub async fn drain_requests(&self) -> DrainResult {
        let deadline = Instant::now() + self.config.drain_timeout;
        let mut last_log = Instant::now();

        loop {
            let active = self.active_requests.load(Ordering::SeqCst);

            if active == 0 {
                return DrainResult::Complete;
            }

            if Instant::now() >= deadline {
                warn!(
                    active_requests = active,
                    drain_timeout_secs = self.config.drain_timeout.as_secs(),
                    "Drain timeout exceeded, forcing shutdown"
                );
                return DrainResult::Timeout { remaining: active };
            }

            if last_log.elapsed() >= DRAIN_LOG_INTERVAL {
                info!(active_requests = active, "Draining requests...");
                last_log = Instant::now();
            }

            let wait = DRAIN_POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now()));
            tokio::time::sleep(wait).await;
        }
    }

    /// Mark as stopped.
    pub fn mark_stopped(&self) {
        self.state.store(Arc::new(LifecycleState::Stopped));
    }
}

// ============================================================================
// Request Guard
// ============================================================================

/// RAII guard for connection tracking.
///
/// Holds an `Arc` to the manager so it can be moved into spawned tasks.
pub struct RequestGuard {
    manager: Arc<LifecycleManager>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.manager.active_requests.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Drain Result
// ============================================================================

/// Result of draining requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainResult {
    /// All requests completed before timeout
    Complete,
    /// Timeout reached with remaining requests
    Timeout {
        /// Number of requests still active
        remaining: usize,
    },
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(config: LifecycleConfig) -> Arc<LifecycleManager> {
        Arc::new(LifecycleManager::new(config, CancellationToken::new()))
    }

    #[test]
    fn test_lifecycle_state_transitions() {
        let lifecycle = manager(LifecycleConfig::default());
        assert_eq!(lifecycle.state(), LifecycleState::Starting);
        assert!(!lifecycle.is_ready());
        assert!(!lifecycle.is_shutting_down());

        lifecycle.mark_ready();
        assert_eq!(lifecycle.state(), LifecycleState::Ready);
        assert!(lifecycle.is_ready());

        lifecycle.begin_shutdown();
        assert_eq!(lifecycle.state(), LifecycleState::ShuttingDown);
        assert!(!lifecycle.is_ready());
        assert!(lifecycle.is_shutting_down());

        lifecycle.mark_stopped();
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
        assert!(lifecycle.is_shutting_down());
    }

    #[test]
    fn test_request_tracking() {
        let lifecycle = manager(LifecycleConfig::default());
        lifecycle.mark_ready();

        {
            let guard = lifecycle.track_request();
            assert!(guard.is_some());
            assert_eq!(lifecycle.active_request_count(), 1);
        }

        assert_eq!(lifecycle.active_request_count(), 0);
    }

    #[test]
    fn test_request_tracking_rejects_during_shutdown() {
        let lifecycle = manager(LifecycleConfig::default());
        lifecycle.mark_ready();

        lifecycle.begin_shutdown();
        assert!(lifecycle.track_request().is_none());
        assert_eq!(lifecycle.active_request_count(), 0);
    }

    #[test]
    fn test_cancelled_token_counts_as_shutting_down() {
        let token = CancellationToken::new();
        let lifecycle = Arc::new(LifecycleManager::new(
            LifecycleConfig::default(),
            token.clone(),
        ));
        lifecycle.mark_ready();

        // The owner cancels before the manager transitions state.
        token.cancel();
        assert!(lifecycle.is_shutting_down());
        assert!(lifecycle.track_request().is_none());
    }

    #[test]
    fn test_shutdown_cancels_injected_token() {
        let token = CancellationToken::new();
        let lifecycle = LifecycleManager::new(LifecycleConfig::default(), token.clone());

        assert!(!token.is_cancelled());
        lifecycle.begin_shutdown();
        assert!(token.is_cancelled());
        assert!(lifecycle.shutdown_token().is_cancelled());
    }

    #[test]
    fn test_config_defaults() {
        assert_eq!(LifecycleConfig::default().drain_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_version_and_uptime() {
        let lifecycle = manager(LifecycleConfig::default());
        assert!(!lifecycle.version().is_empty());
        assert!(lifecycle.uptime_seconds() < 2);
    }

    #[tokio::test]
    async fn test_drain_completes_no_requests() {
        let lifecycle = manager(LifecycleConfig::default());
        lifecycle.mark_ready();
        lifecycle.begin_shutdown();

        assert_eq!(lifecycle.drain_requests().await, DrainResult::Complete);
    }

    #[tokio::test]
    async fn test_drain_waits_for_in_flight_request() {
        let lifecycle = manager(LifecycleConfig {
            drain_timeout: Duration::from_millis(500),
        });
        lifecycle.mark_ready();

        let guard = lifecycle.track_request();
        assert!(guard.is_some());
        lifecycle.begin_shutdown();

        let lifecycle_clone = lifecycle.clone();
        let drain_handle = tokio::spawn(async move { lifecycle_clone.drain_requests().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(guard);

        assert_eq!(drain_handle.await.unwrap(), DrainResult::Complete);
    }

    #[tokio::test]
    async fn test_drain_timeout() {
        let lifecycle = manager(LifecycleConfig {
            drain_timeout: Duration::from_millis(100),
        });
        lifecycle.mark_ready();

        let _guard = lifecycle.track_request();
        lifecycle.begin_shutdown();

        let start = Instant::now();
        let result = lifecycle.drain_requests().await;
        assert!(matches!(result, DrainResult::Timeout { remaining: 1 }));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_request_guard_released_on_panic() {
        let lifecycle = manager(LifecycleConfig::default());
        lifecycle.mark_ready();

        let lifecycle_clone = lifecycle.clone();
        let handle = tokio::spawn(async move {
            let _guard = lifecycle_clone.track_request();
            tokio::time::sleep(Duration::from_millis(10)).await;
            panic!("Simulated panic in request handler");
        });

        assert!(handle.await.is_err());
        assert_eq!(lifecycle.active_request_count(), 0);
    }

    #[tokio::test]
    async fn test_request_guard_released_on_abort() {
        let lifecycle = manager(LifecycleConfig::default());
        lifecycle.mark_ready();

        let guard = lifecycle.track_request().unwrap();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        assert_eq!(lifecycle.active_request_count(), 1);

        handle.abort();
        let _ = handle.await;
        assert_eq!(lifecycle.active_request_count(), 0);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LifecycleState::Starting.to_string(), "starting");
        assert_eq!(LifecycleState::Ready.to_string(), "ready");
        assert_eq!(LifecycleState::ShuttingDown.to_string(), "shutting_down");
        assert_eq!(LifecycleState::Stopped.to_string(), "stopped");
    }
}
