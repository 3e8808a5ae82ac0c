//! Address parsing capability contract.
//!
//! The parsing algorithm itself is a collaborator behind the [`AddressParser`]
//! trait. The service only relies on three things from it:
//!
//! - two entry points, one without locale hints and one with [`ParserOptions`]
//! - safe concurrent invocation (`Send + Sync`, shared as `Arc<dyn AddressParser>`)
//! - an error surface expressed as [`ParseError`]
//!
//! Deadlines are enforced by [`parse_within`], which wraps whichever entry
//! point applies in a fresh `tokio::time::timeout`. When the timeout fires the
//! parse future is dropped, which cancels that request's work and nothing else.
//!
//! ## Dispatch
//!
//! ```text
//! options: None        → AddressParser::parse
//! options: Some(opts)  → AddressParser::parse_with_options
//! ```
//!
//! `ParserOptions` can only be built with at least one non-empty hint (see
//! [`ParserOptions::from_hints`]), so "options supplied but empty" never
//! reaches the capability.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

mod rules;

pub use rules::RuleBasedParser;

/// Upper bound for a single parse call made on behalf of one HTTP request.
pub const PARSE_DEADLINE: Duration = Duration::from_secs(2);

// ============================================================================
// Types
// ============================================================================

/// One labeled token of a parsed address.
///
/// `label` is the semantic role (`house_number`, `road`, `city`, ...) and
/// `value` is the substring assigned to it, in normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedComponent {
    pub label: String,
    pub value: String,
}

impl ParsedComponent {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Locale hints that narrow parsing behavior.
///
/// At least one of the two fields is always non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserOptions {
    language: String,
    country: String,
}

impl ParserOptions {
    /// Build options from raw request hints.
    ///
    /// Returns `None` when both hints are empty; the caller must then use the
    /// hint-free entry point instead.
    #[must_use]
    pub fn from_hints(language: &str, country: &str) -> Option<Self> {
        if language.is_empty() && country.is_empty() {
            return None;
        }
        Some(Self {
            language: language.to_string(),
            country: country.to_string(),
        })
    }

    /// Language hint, empty when not supplied.
    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Country hint, empty when not supplied.
    #[must_use]
    pub fn country(&self) -> &str {
        &self.country
    }
}

/// Failures reported by an address parsing capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The capability could not make sense of the input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The call did not complete within its deadline and was cancelled.
    #[error("context deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// The capability is not able to serve requests (e.g. data not loaded).
    #[error("parser unavailable: {0}")]
    Unavailable(String),
}

impl ParseError {
    /// Returns true when the error came from deadline expiry.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::DeadlineExceeded(_))
    }
}

// ============================================================================
// Capability trait
// ============================================================================

/// Address parsing capability.
///
/// Implementations must be safe to call concurrently from many requests and
/// must be cancellation-safe: dropping a returned future abandons the call.
#[async_trait]
pub trait AddressParser: Send + Sync {
    /// Parse an address without locale hints.
    async fn parse(&self, address: &str) -> Result<Vec<ParsedComponent>, ParseError>;

    /// Parse an address with locale hints.
    async fn parse_with_options(
        &self,
        address: &str,
        options: ParserOptions,
    ) -> Result<Vec<ParsedComponent>, ParseError>;
}

/// Invoke the capability under a deadline scoped to this call alone.
///
/// Picks the options-aware entry point when `options` is `Some`, otherwise
/// the hint-free one. Expiry yields [`ParseError::DeadlineExceeded`] as soon
/// as the deadline passes, regardless of how long the capability would have
/// kept running.
pub async fn parse_within(
    parser: &dyn AddressParser,
    address: &str,
    options: Option<ParserOptions>,
    deadline: Duration,
) -> Result<Vec<ParsedComponent>, ParseError> {
    let call = async {
        match options {
            Some(opts) => {
                debug!(
                    language = opts.language(),
                    country = opts.country(),
                    "Dispatching parse with options"
                );
                parser.parse_with_options(address, opts).await
            }
            None => parser.parse(address).await,
        }
    };

    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_elapsed) => Err(ParseError::DeadlineExceeded(deadline)),
    }
}

// ============================================================================
// Tests
// ============================================================================
