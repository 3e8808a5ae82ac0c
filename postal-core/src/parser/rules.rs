//! Rule-based address labeler used by the default binary.
//!
//! This is a deliberately small heuristic parser: it understands the common
//! comma-separated layout `<street>, <locality>, <region> <postcode>, <country>`
//! and labels each piece with the same component names a statistical parser
//! would use. Anything it cannot place is still emitted, so the values of the
//! returned components always cover the normalized input in order.
//!
//! Segments after the street are first classified on their own (postcode,
//! country, region code, region + postcode, or plain text). Plain pieces are
//! resolved afterwards because their role depends on what follows them:
//!
//! ```text
//! region present:    ..., suburb, city, <region>
//! no region, n >= 2: ..., suburb, city, state
//! no region, n == 1: city
//! ```

use async_trait::async_trait;
use tracing::debug;

use super::{AddressParser, ParseError, ParsedComponent, ParserOptions};

const HOUSE: &str = "house";
const HOUSE_NUMBER: &str = "house_number";
const ROAD: &str = "road";
const SUBURB: &str = "suburb";
const CITY: &str = "city";
const STATE: &str = "state";
const POSTCODE: &str = "postcode";
const COUNTRY: &str = "country";

const STREET_SUFFIXES: &[&str] = &[
    "st", "street", "ave", "av", "avenue", "rd", "road", "blvd", "boulevard", "ln", "lane", "dr",
    "drive", "ct", "court", "way", "pl", "place", "sq", "square", "ter", "terrace", "hwy",
    "highway", "pkwy", "parkway", "cir", "circle", "row", "close", "cres", "crescent", "gardens",
    "strasse", "straße",
];

const STREET_PREFIXES: &[&str] = &["rue", "via", "calle", "avenida", "avenue", "rua", "boulevard"];

const KNOWN_COUNTRIES: &[&str] = &[
    "usa",
    "us",
    "united states",
    "united states of america",
    "uk",
    "united kingdom",
    "great britain",
    "england",
    "scotland",
    "wales",
    "canada",
    "australia",
    "new zealand",
    "ireland",
    "france",
    "germany",
    "deutschland",
    "spain",
    "españa",
    "italy",
    "italia",
    "netherlands",
    "belgium",
    "switzerland",
    "austria",
    "portugal",
    "brazil",
    "brasil",
    "mexico",
    "méxico",
    "japan",
    "india",
];

/// A piece of a segment, with a label when the segment alone decides it.
type Piece = (Option<&'static str>, String);

/// Heuristic parser for comma-separated postal addresses.
///
/// Stateless; one instance can be shared across all requests.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedParser;

impl RuleBasedParser {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Label an address. `country_hint` is compared against trailing
    /// segments; an empty hint disables that check.
    pub fn label(
        &self,
        address: &str,
        country_hint: &str,
    ) -> Result<Vec<ParsedComponent>, ParseError> {
        let segments = normalize(address);
        if segments.is_empty() {
            return Err(ParseError::InvalidInput(
                "address contains no parseable tokens".to_string(),
            ));
        }

        let country_hint = country_hint.trim().to_lowercase();
        let mut pieces: Vec<Piece> = Vec::new();
        let mut street_pending = true;

        for (idx, segment) in segments.iter().enumerate() {
            if street_pending {
                if let Some((number, rest)) = split_house_number(segment) {
                    pieces.push((Some(HOUSE_NUMBER), number.to_string()));
                    if !rest.is_empty() {
                        pieces.push((Some(ROAD), rest.to_string()));
                        street_pending = false;
                    }
                    continue;
                }

                // A leading number alone ("10, Downing St") leaves the road pending.
                if pieces.last().is_some_and(|(l, _)| *l == Some(HOUSE_NUMBER)) {
                    pieces.push((Some(ROAD), segment.clone()));
                    street_pending = false;
                    continue;
                }

                let next_is_street = segments
                    .get(idx + 1)
                    .is_some_and(|next| split_house_number(next).is_some());
                if idx == 0 && next_is_street && !has_street_marker(segment) {
                    pieces.push((Some(HOUSE), segment.clone()));
                    continue;
                }

                pieces.push((Some(ROAD), segment.clone()));
                street_pending = false;
                continue;
            }

            pieces.extend(classify_locality(segment, &country_hint));
        }

        resolve_plain_pieces(&mut pieces);

        Ok(pieces
            .into_iter()
            .map(|(label, value)| ParsedComponent::new(label.unwrap_or(CITY), value))
            .collect())
    }
}

#[async_trait]
impl AddressParser for RuleBasedParser {
    async fn parse(&self, address: &str) -> Result<Vec<ParsedComponent>, ParseError> {
        self.label(address, "")
    }

    async fn parse_with_options(
        &self,
        address: &str,
        options: ParserOptions,
    ) -> Result<Vec<ParsedComponent>, ParseError> {
        debug!(
            language = options.language(),
            country = options.country(),
            "Rule-based parse with locale hints"
        );
        self.label(address, options.country())
    }
}

// ============================================================================
// Normalization
// ============================================================================

/// Lowercase, split on commas, collapse whitespace, and strip trailing dots
/// from tokens. Segments without any alphanumeric character are dropped.
fn normalize(address: &str) -> Vec<String> {
    address
        .to_lowercase()
        .split([',', ';', '\n'])
        .map(|segment| {
            segment
                .split_whitespace()
                .map(|token| token.trim_end_matches('.'))
                .filter(|token| !token.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|segment| segment.chars().any(char::is_alphanumeric))
        .collect()
}

// ============================================================================
// Street segment
// ============================================================================

/// Split `"221b baker st"` into `("221b", "baker st")`.
fn split_house_number(segment: &str) -> Option<(&str, &str)> {
    let (first, rest) = match segment.split_once(' ') {
        Some((first, rest)) => (first, rest.trim()),
        None => (segment, ""),
    };
    if is_house_number(first) && !(rest.is_empty() && is_postcode(first)) {
        Some((first, rest))
    } else {
        None
    }
}

/// `12`, `12b`, `10-12`, `3/4`: digits first, then digits, one letter, or a
/// range/fraction separator.
fn is_house_number(token: &str) -> bool {
    if !token.starts_with(|c: char| c.is_ascii_digit()) || token.len() > 8 {
        return false;
    }
    let letters = token.chars().filter(|c| c.is_alphabetic()).count();
    letters <= 1
        && token
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_alphabetic() || c == '-' || c == '/')
}

fn has_street_marker(segment: &str) -> bool {
    let first = segment.split(' ').next().unwrap_or_default();
    let last = segment.rsplit(' ').next().unwrap_or_default();
    STREET_PREFIXES.contains(&first) || STREET_SUFFIXES.contains(&last)
}

// ============================================================================
// Locality segments
// ============================================================================

fn classify_locality(segment: &str, country_hint: &str) -> Vec<Piece> {
    if is_postcode(segment) {
        return vec![(Some(POSTCODE), segment.to_string())];
    }
    if is_country(segment, country_hint) {
        return vec![(Some(COUNTRY), segment.to_string())];
    }
    if let Some(pieces) = split_trailing_postcode(segment) {
        return pieces;
    }
    if let Some(pieces) = split_leading_postcode(segment) {
        return pieces;
    }
    if is_region_code(segment) {
        return vec![(Some(STATE), segment.to_string())];
    }
    vec![(None, segment.to_string())]
}

/// `"springfield il 62701"`, `"il 62701"`, `"london sw1a 2aa"`.
fn split_trailing_postcode(segment: &str) -> Option<Vec<Piece>> {
    let tokens: Vec<&str> = segment.split(' ').collect();

    // Two-token postcodes (UK, Canada) take precedence over one-token ones.
    for width in [2, 1] {
        if tokens.len() <= width {
            continue;
        }
        let split = tokens.len() - width;
        let code = tokens[split..].join(" ");
        if !is_postcode(&code) {
            continue;
        }

        let mut prefix = &tokens[..split];
        let mut pieces = Vec::new();
        let region = prefix
            .last()
            .copied()
            .filter(|token| is_region_code(token));
        if region.is_some() {
            prefix = &prefix[..prefix.len() - 1];
        }
        if !prefix.is_empty() {
            pieces.push((None, prefix.join(" ")));
        }
        if let Some(region) = region {
            pieces.push((Some(STATE), region.to_string()));
        }
        pieces.push((Some(POSTCODE), code));
        return Some(pieces);
    }
    None
}

/// `"75008 paris"`, `"10115 berlin"`.
fn split_leading_postcode(segment: &str) -> Option<Vec<Piece>> {
    let (first, rest) = segment.split_once(' ')?;
    if is_numeric_postcode(first) && rest.chars().any(char::is_alphabetic) {
        Some(vec![
            (Some(POSTCODE), first.to_string()),
            (None, rest.to_string()),
        ])
    } else {
        None
    }
}

fn is_postcode(value: &str) -> bool {
    is_numeric_postcode(value)
        || is_zip_plus_four(value)
        || is_uk_postcode(value)
        || is_ca_postcode(value)
}

/// Four to six digits: US ZIP, most of Europe, Australia.
fn is_numeric_postcode(value: &str) -> bool {
    (4..=6).contains(&value.len()) && value.chars().all(|c| c.is_ascii_digit())
}

fn is_zip_plus_four(value: &str) -> bool {
    match value.split_once('-') {
        Some((zip, ext)) => {
            zip.len() == 5
                && ext.len() == 4
                && zip.chars().all(|c| c.is_ascii_digit())
                && ext.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Outward code `a9`, `a99`, `aa9`, `aa99`, `a9a`, `aa9a`; inward code `9aa`.
fn is_uk_postcode(value: &str) -> bool {
    let Some((outward, inward)) = value.split_once(' ') else {
        return false;
    };
    let inward: Vec<char> = inward.chars().collect();
    let inward_ok = inward.len() == 3
        && inward[0].is_ascii_digit()
        && inward[1].is_ascii_lowercase()
        && inward[2].is_ascii_lowercase();

    let outward: Vec<char> = outward.chars().collect();
    let letters = outward.iter().take_while(|c| c.is_ascii_lowercase()).count();
    let outward_ok = (2..=4).contains(&outward.len())
        && (1..=2).contains(&letters)
        && outward.get(letters).is_some_and(char::is_ascii_digit)
        && outward[letters + 1..]
            .iter()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase());

    inward_ok && outward_ok
}

/// `k1a 0b1` or `k1a0b1`.
fn is_ca_postcode(value: &str) -> bool {
    let compact: Vec<char> = value.chars().filter(|c| *c != ' ').collect();
    compact.len() == 6
        && value.len() <= 7
        && compact
            .iter()
            .enumerate()
            .all(|(i, c)| if i % 2 == 0 { c.is_ascii_lowercase() } else { c.is_ascii_digit() })
}

/// Two or three letter region abbreviations (`il`, `nsw`).
fn is_region_code(value: &str) -> bool {
    (2..=3).contains(&value.len()) && value.chars().all(|c| c.is_ascii_lowercase())
}

fn is_country(segment: &str, country_hint: &str) -> bool {
    (!country_hint.is_empty() && segment == country_hint) || KNOWN_COUNTRIES.contains(&segment)
}

// ============================================================================
// Plain piece resolution
// ============================================================================

fn resolve_plain_pieces(pieces: &mut [Piece]) {
    let has_state = pieces.iter().any(|(label, _)| *label == Some(STATE));
    let plain: Vec<usize> = pieces
        .iter()
        .enumerate()
        .filter(|(_, (label, _))| label.is_none())
        .map(|(idx, _)| idx)
        .collect();

    let mut remaining = plain.len();
    for idx in plain {
        remaining -= 1;
        let label = match (has_state, remaining) {
            (true, 0) => CITY,
            (false, 0) if pieces_before_is_city(pieces, idx) => STATE,
            (false, 0) => CITY,
            (false, 1) => CITY,
            _ => SUBURB,
        };
        pieces[idx].0 = Some(label);
    }
}

fn pieces_before_is_city(pieces: &[Piece], idx: usize) -> bool {
    pieces[..idx]
        .iter()
        .rev()
        .find(|(label, _)| *label != Some(POSTCODE))
        .is_some_and(|(label, _)| *label == Some(CITY))
}
