//! Route table for the postal service.
//!
//! | Method | Path      | Handler              |
//! |--------|-----------|----------------------|
//! | GET    | `/health` | [`handlers::health`] |
//! | POST   | `/parse`  | [`handlers::parse`]  |
//!
//! Anything else, including a known path with the wrong method, answers
//! `404 page not found`.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use postal_core::AddressParser;
use postal_core::config::DEFAULT_MAX_BODY_BYTES;

use crate::handlers;
use crate::logging_layer::logging_layer;

/// Shared state handed to handlers.
#[derive(Clone)]
pub struct AppState {
    pub parser: Arc<dyn AddressParser>,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(parser: Arc<dyn AddressParser>) -> Self {
        Self {
            parser,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    #[must_use]
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/health",
            get(handlers::health).fallback(handlers::not_found),
        )
        .route(
            "/parse",
            post(handlers::parse).fallback(handlers::not_found),
        )
        .fallback(handlers::not_found)
        .layer(logging_layer())
        .with_state(state)
}
