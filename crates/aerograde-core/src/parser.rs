//! Tolerant extraction of a field map from a free-form model reply.
//!
//! Replies arrive as raw text: sometimes clean JSON, sometimes JSON wrapped
//! in prose or fenced code blocks, sometimes an upstream transport error
//! message. The parser tries strategies in a fixed order and returns the
//! first object that parses; validation of the values themselves is the
//! verifiers' job.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::schema::FieldMap;

/// Closed list of transport-layer failure markers. A case-insensitive
/// substring match against any of these short-circuits the pipeline.
pub const TRANSPORT_ERROR_MARKERS: [&str; 19] = [
    "api error",
    "api request failed",
    "timeout",
    "http error",
    "status code",
    "forbidden",
    "access denied",
    "unauthorized",
    "time out",
    "internal server error",
    "rate limit exceeded",
    "connection error",
    "network error",
    "failed to connect",
    "service unavailable",
    "bad request",
    "invalid request",
    "authentication failed",
    "quota exceeded",
];

lazy_static! {
    static ref FENCED_BLOCK: Regex =
        Regex::new(r"(?is)```(?:[a-zA-Z0-9_-]+)?\s*(\{.*?\})\s*```").unwrap();
}

/// Result of parsing one reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// A JSON object was recovered.
    Parsed(FieldMap),
    /// The reply is an upstream transport failure, not a prediction.
    TransportError { marker: String },
    /// No strategy produced a JSON object.
    NoJson,
}

impl ParseOutcome {
    pub fn field_map(&self) -> Option<&FieldMap> {
        match self {
            ParseOutcome::Parsed(map) => Some(map),
            _ => None,
        }
    }
}

/// Check the raw reply against the transport-error marker list.
pub fn detect_transport_error(reply: &str) -> Option<&'static str> {
    let lower = reply.to_lowercase();
    TRANSPORT_ERROR_MARKERS
        .iter()
        .find(|marker| lower.contains(*marker))
        .copied()
}

/// Parse a reply into a field map.
///
/// Strategy order: transport-error scan, whole-text JSON, fenced code
/// blocks, balanced brace-matched substrings. The first successful object
/// parse wins.
pub fn parse_reply(reply: &str) -> ParseOutcome {
    if let Some(marker) = detect_transport_error(reply) {
        return ParseOutcome::TransportError {
            marker: marker.to_string(),
        };
    }

    if let Some(map) = parse_object(reply.trim()) {
        return ParseOutcome::Parsed(map);
    }

    for capture in FENCED_BLOCK.captures_iter(reply) {
        if let Some(map) = parse_object(&capture[1]) {
            return ParseOutcome::Parsed(map);
        }
    }

    for candidate in balanced_objects(reply) {
        if let Some(map) = parse_object(candidate) {
            return ParseOutcome::Parsed(map);
        }
    }

    ParseOutcome::NoJson
}

fn parse_object(text: &str) -> Option<FieldMap> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(FieldMap::from(map)),
        _ => None,
    }
}

/// All top-level balanced `{...}` substrings, left to right.
///
/// Tracks string literals and escapes so braces inside JSON strings do not
/// unbalance the scan.
fn balanced_objects(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut candidates = Vec::new();
    let mut start: Option<usize> = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        candidates.push(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }

    candidates
}
