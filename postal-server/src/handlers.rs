//! HTTP handlers for `/health`, `/parse` and unmatched routes.
//!
//! `/parse` runs strictly in order: read the body, decode it, validate the
//! address, call the parser under a fresh deadline, encode the components.
//! The first failing step decides the response.

use std::fmt;

use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use postal_core::{PARSE_DEADLINE, ParserOptions, parse_within};
use serde::Deserialize;
use serde::de::{Deserializer, IgnoredAny, MapAccess, Visitor};
use tracing::debug;

use crate::error::ApiError;
use crate::router::AppState;

/// Body of `POST /parse`.
///
/// Decoding is lenient:
/// - keys match `addr`, `lang` and `country` ignoring ASCII case
/// - a repeated key overwrites the earlier value
/// - `null` leaves the field untouched, absent fields are empty
/// - unknown keys are skipped
///
/// A value of the wrong type, or a document that is not an object, fails.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParseRequest {
    addr: String,
    lang: String,
    country: String,
}

impl ParseRequest {
    /// Decode a request body. A literal `null` body decodes to an empty
    /// request.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice::<Option<Self>>(body).map(Option::unwrap_or_default)
    }

    pub fn address(&self) -> &str {
        &self.addr
    }

    pub fn language(&self) -> &str {
        &self.lang
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    fn field_mut(&mut self, key: &str) -> Option<&mut String> {
        if key.eq_ignore_ascii_case("addr") {
            Some(&mut self.addr)
        } else if key.eq_ignore_ascii_case("lang") {
            Some(&mut self.lang)
        } else if key.eq_ignore_ascii_case("country") {
            Some(&mut self.country)
        } else {
            None
        }
    }
}

impl<'de> Deserialize<'de> for ParseRequest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ParseRequestVisitor)
    }
}

struct ParseRequestVisitor;

impl<'de> Visitor<'de> for ParseRequestVisitor {
    type Value = ParseRequest;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object with string fields addr, lang and country")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut request = ParseRequest::default();
        while let Some(key) = map.next_key::<String>()? {
            match request.field_mut(&key) {
                Some(slot) => {
                    if let Some(value) = map.next_value::<Option<String>>()? {
                        *slot = value;
                    }
                }
                None => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(request)
    }
}

/// `GET /health`: liveness only, independent of the parser.
pub async fn health() -> &'static str {
    "OK"
}

/// `POST /parse`
pub async fn parse(State(state): State<AppState>, body: Body) -> Result<Response, ApiError> {
    let bytes = axum::body::to_bytes(body, state.max_body_bytes)
        .await
        .map_err(ApiError::Transport)?;

    let request = ParseRequest::from_slice(&bytes).map_err(ApiError::Malformed)?;

    let address = request.address();
    if address.is_empty() {
        return Err(ApiError::Validation);
    }

    let options = ParserOptions::from_hints(request.language(), request.country());
    debug!(
        address_len = address.len(),
        with_options = options.is_some(),
        "Parsing address"
    );

    // Deadline is per call; the shutdown window never shortens or extends it.
    let components = parse_within(state.parser.as_ref(), address, options, PARSE_DEADLINE).await?;

    let encoded = serde_json::to_vec(&components).map_err(ApiError::Internal)?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        encoded,
    )
        .into_response())
}

/// Fallback for unknown paths and methods.
pub async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "404 page not found")
}
