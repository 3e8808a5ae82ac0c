//! Postal Core - transport-agnostic pieces of the address parsing service.
//!
//! This library provides the contract through which the HTTP front end
//! invokes an address parsing capability, the deadline-scoped dispatch used
//! for every request, a small rule-based parser used by the default binary,
//! the operational lifecycle state machine, and environment-driven
//! configuration.
//!
//! The HTTP surface (handlers, router, listener) lives in `postal-server`.

pub mod config;
pub mod lifecycle;
pub mod parser;

pub use parser::{
    AddressParser, PARSE_DEADLINE, ParseError, ParsedComponent, ParserOptions, RuleBasedParser,
    parse_within,
};
