pub mod client;

pub use client::{HttpReply, ReqwestTransport, Transport};

use std::time::Duration;

use anyhow::anyhow;
use reqwest::Method;
use url::Url;

/// Ordered header pairs as the operator pasted them, after merging repeats.
pub type HeaderList = Vec<(String, String)>;

const REQUEST_LINE_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH"];

/// A single outbound probe request.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderList,
    pub timeout: Duration,
}

impl ProbeRequest {
    pub fn new(method: Method, url: Url, headers: HeaderList, timeout: Duration) -> Self {
        Self {
            method,
            url,
            headers,
            timeout,
        }
    }
}

/// Parses a pasted block of raw HTTP headers.
///
/// A leading request line (`GET /path HTTP/1.1`) and lines without a colon are
/// discarded. Repeated keys are merged: `Cookie` values with `"; "`, anything
/// else with `", "`.
pub fn parse_header_block(raw: &str) -> HeaderList {
    let mut headers: HeaderList = Vec::new();

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || is_request_line(line) {
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim_start();

        match headers.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) if key.eq_ignore_ascii_case("cookie") => {
                let kept = existing.trim_end_matches([';', ' ']).to_string();
                *existing = format!("{}; {}", kept, value);
            }
            Some((_, existing)) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            None => headers.push((key.to_string(), value.to_string())),
        }
    }

    headers
}

fn is_request_line(line: &str) -> bool {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 3 {
        return false;
    }
    let method = tokens[0].to_ascii_uppercase();
    let version = tokens[tokens.len() - 1].to_ascii_uppercase();
    REQUEST_LINE_METHODS.contains(&method.as_str()) && version.contains("HTTP/")
}

/// Upper-cases the operator's method, defaulting to GET when blank.
///
/// Any valid HTTP token is accepted; non-standard ones go out as a generic request.
pub fn normalize_method(raw: &str) -> anyhow::Result<Method> {
    let upper = raw.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return Ok(Method::GET);
    }
    Method::from_bytes(upper.as_bytes()).map_err(|_| anyhow!("invalid HTTP method '{}'", raw.trim()))
}

/// Validates the operator supplied target URL.
pub fn parse_target(raw: &str) -> anyhow::Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("target (URL) not provided."));
    }
    Url::parse(trimmed).map_err(|e| anyhow!("invalid target URL '{}': {}", trimmed, e))
}

/// Rounds to a fixed number of decimals for reporting.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
