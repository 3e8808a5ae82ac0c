//! Postal Server - HTTP front end for the address parsing service.
//!
//! Exposes `GET /health` and `POST /parse` over HTTP/1.1 and HTTP/2 and
//! shuts down gracefully when the injected cancellation token fires.
//! Parsing itself is delegated to any [`postal_core::AddressParser`].

pub mod error;
pub mod handlers;
pub mod logging_layer;
pub mod router;
pub mod server;

pub use error::{ApiError, ServerError};
pub use router::{AppState, router};
pub use server::PostalServer;
