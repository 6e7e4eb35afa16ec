//! Set-Cookie extraction, parsing and attribute policy checks.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use log::{debug, warn};
use regex::Regex;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::http::{round_to, ProbeRequest, Transport};

const SET_COOKIE: &str = "set-cookie";

/// Security flags of a single cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieFlags {
    pub secure: bool,
    pub httponly: bool,
    pub samesite: Option<String>,
}

/// One parsed `Set-Cookie` header occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieRecord {
    pub raw: String,
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub expires: Option<String>,
    pub flags: CookieFlags,
    pub attrs: BTreeMap<String, String>,
}

/// Parses `NAME=VALUE; Attr=x; Flag` into a [`CookieRecord`].
///
/// Attribute keys are lower-cased. Only `Secure` and `HttpOnly` are recognised
/// as bare flags; other bare tokens are ignored.
pub fn parse_set_cookie(header_value: &str) -> CookieRecord {
    let mut parts = header_value.split(';').map(str::trim);

    let first = parts.next().unwrap_or("");
    let (name, value) = match first.split_once('=') {
        Some((n, v)) => (n.trim().to_string(), v.trim().to_string()),
        None => (first.to_string(), String::new()),
    };

    let mut attrs = BTreeMap::new();
    let mut flags = CookieFlags::default();

    for attr in parts.filter(|p| !p.is_empty()) {
        match attr.split_once('=') {
            Some((k, v)) => {
                let key = k.trim().to_lowercase();
                let val = v.trim().to_string();
                if key == "samesite" {
                    flags.samesite = Some(val.clone());
                }
                attrs.insert(key, val);
            }
            None => match attr.to_lowercase().as_str() {
                "secure" => flags.secure = true,
                "httponly" => flags.httponly = true,
                _ => {}
            },
        }
    }

    CookieRecord {
        raw: header_value.to_string(),
        name,
        value,
        domain: attrs.get("domain").cloned(),
        path: attrs.get("path").cloned(),
        expires: attrs.get("expires").cloned(),
        flags,
        attrs,
    }
}

fn cookie_boundary() -> &'static Regex {
    static BOUNDARY: OnceLock<Regex> = OnceLock::new();
    BOUNDARY.get_or_init(|| Regex::new(r", [A-Za-z0-9_\-]+=").expect("static regex"))
}

/// Splits a folded `Set-Cookie` value into individual cookies.
///
/// Multi-line input is split per line. Otherwise `", "` only separates cookies
/// when followed by a `name=` token, so commas inside `Expires` dates survive.
pub fn split_set_cookie_block(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }

    if raw.contains('\n') {
        let lines: Vec<String> = raw
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect();
        if lines.len() > 1 {
            return lines;
        }
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for boundary in cookie_boundary().find_iter(raw) {
        pieces.push(&raw[start..boundary.start()]);
        // skip the ", " separator, keep the name
        start = boundary.start() + 2;
    }
    pieces.push(&raw[start..]);

    pieces
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read access to response headers.
///
/// `all_values` is the multi-value accessor; sources that collapse repeated
/// headers return `None` there and only offer `folded_value`.
pub trait HeaderLookup {
    fn all_values(&self, name: &str) -> Option<Vec<String>>;

    fn folded_value(&self, name: &str) -> Option<String>;
}

impl HeaderLookup for HeaderMap {
    fn all_values(&self, name: &str) -> Option<Vec<String>> {
        let values: Vec<String> = self
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect();
        Some(values)
    }

    fn folded_value(&self, name: &str) -> Option<String> {
        let values = self.all_values(name)?;
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }
}

/// Header source holding at most one (possibly comma-joined) value per name.
#[derive(Debug, Clone, Default)]
pub struct FoldedHeaders {
    values: HashMap<String, String>,
}

impl FoldedHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_lowercase(), value.into());
    }
}

impl HeaderLookup for FoldedHeaders {
    fn all_values(&self, _name: &str) -> Option<Vec<String>> {
        None
    }

    fn folded_value(&self, name: &str) -> Option<String> {
        self.values.get(&name.to_lowercase()).cloned()
    }
}

/// Collects every `Set-Cookie` occurrence, preferring the multi-value accessor,
/// then the heuristic split, then the untouched folded value.
pub fn extract_set_cookies(headers: &dyn HeaderLookup) -> Vec<String> {
    if let Some(values) = headers.all_values(SET_COOKIE) {
        if !values.is_empty() {
            return values;
        }
    }

    match headers.folded_value(SET_COOKIE) {
        Some(folded) if !folded.is_empty() => {
            let split = split_set_cookie_block(&folded);
            if split.is_empty() {
                vec![folded]
            } else {
                split
            }
        }
        _ => Vec::new(),
    }
}

/// One warning per cookie lacking Secure, HttpOnly or SameSite, unless excluded.
pub fn missing_flag_warnings(cookies: &[CookieRecord], exclude: &[String]) -> Vec<String> {
    let excluded: HashSet<String> = exclude.iter().map(|n| n.to_lowercase()).collect();

    cookies
        .iter()
        .filter(|c| !excluded.contains(&c.name.to_lowercase()))
        .filter_map(|cookie| {
            let mut missing = Vec::new();
            if !cookie.flags.secure {
                missing.push("Secure");
            }
            if !cookie.flags.httponly {
                missing.push("HttpOnly");
            }
            if cookie.flags.samesite.is_none() {
                missing.push("SameSite");
            }
            if missing.is_empty() {
                None
            } else {
                Some(format!("Cookie '{}' missing flags: {}", cookie.name, missing.join(", ")))
            }
        })
        .collect()
}

/// Outcome of a single cookie inspection request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CookieReport {
    pub raw_set_cookie_headers: Vec<String>,
    pub cookies: Vec<CookieRecord>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_seconds: f64,
}

/// Sends one request and evaluates the cookies it sets.
pub struct CookieAnalyzer {
    transport: Arc<dyn Transport>,
}

impl CookieAnalyzer {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn analyze(&self, request: &ProbeRequest, exclude: &[String]) -> CookieReport {
        let start = Instant::now();

        let reply = match self.transport.send(request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Cookie request to {} failed: {:#}", request.url, e);
                return CookieReport {
                    error: Some(format!("Request failed: {:#}", e)),
                    duration_seconds: round_to(start.elapsed().as_secs_f64(), 4),
                    ..CookieReport::default()
                };
            }
        };

        let raw = extract_set_cookies(&reply.headers);
        let cookies: Vec<CookieRecord> = raw.iter().map(|h| parse_set_cookie(h)).collect();
        let warnings = missing_flag_warnings(&cookies, exclude);
        debug!(
            "{} returned {} cookie(s), {} warning(s)",
            request.url,
            cookies.len(),
            warnings.len()
        );

        CookieReport {
            raw_set_cookie_headers: raw,
            cookies,
            warnings,
            status_code: Some(reply.status),
            error: None,
            duration_seconds: round_to(start.elapsed().as_secs_f64(), 4),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, SET_COOKIE as SET_COOKIE_HEADER};

    #[test]
    fn test_parse_full_cookie() {
        let cookie = parse_set_cookie("NAME=VAL; Path=/; Secure; HttpOnly; SameSite=Lax");
        assert_eq!(cookie.name, "NAME");
        assert_eq!(cookie.value, "VAL");
        assert!(cookie.flags.secure);
        assert!(cookie.flags.httponly);
        assert_eq!(cookie.flags.samesite.as_deref(), Some("Lax"));
        assert_eq!(cookie.attrs.get("path").map(String::as_str), Some("/"));
        assert_eq!(cookie.path.as_deref(), Some("/"));
        assert_eq!(cookie.domain, None);
    }

    #[test]
    fn test_parse_cookie_without_value_and_odd_attrs() {
        let cookie = parse_set_cookie("flag; Domain=.example.com; EXPIRES=Wed, 21 Oct 2020 07:28:00 GMT; SameSite; Partitioned");
        assert_eq!(cookie.name, "flag");
        assert_eq!(cookie.value, "");
        assert_eq!(cookie.domain.as_deref(), Some(".example.com"));
        assert_eq!(cookie.expires.as_deref(), Some("Wed, 21 Oct 2020 07:28:00 GMT"));
        // bare SameSite carries no value
        assert_eq!(cookie.flags.samesite, None);
        assert!(!cookie.flags.secure);
        assert_eq!(cookie.attrs.len(), 2);
    }

    #[test]
    fn test_parse_keeps_equals_in_value() {
        let cookie = parse_set_cookie("token=abc==; path=/");
        assert_eq!(cookie.value, "abc==");
    }

    #[test]
    fn test_split_respects_expires_dates() {
        let parts = split_set_cookie_block("Expires=Wed, 21 Oct 2020 07:28:00 GMT, SESSID=abc123");
        assert_eq!(parts, vec!["Expires=Wed, 21 Oct 2020 07:28:00 GMT", "SESSID=abc123"]);
    }

    #[test]
    fn test_split_multiline_and_empty() {
        assert!(split_set_cookie_block("").is_empty());
        let parts = split_set_cookie_block("a=1; Path=/\n\nb=2; Secure\n");
        assert_eq!(parts, vec!["a=1; Path=/", "b=2; Secure"]);
        assert_eq!(split_set_cookie_block("solo=1\n"), vec!["solo=1"]);
    }

    #[test]
    fn test_warning_lists_all_missing_flags() {
        let cookies = vec![parse_set_cookie("tracker=1; Path=/")];
        let warnings = missing_flag_warnings(&cookies, &[]);
        assert_eq!(warnings, vec!["Cookie 'tracker' missing flags: Secure, HttpOnly, SameSite"]);
    }

    #[test]
    fn test_excluded_cookie_is_not_warned() {
        let cookies = vec![
            parse_set_cookie("csrftoken=1; Path=/"),
            parse_set_cookie("sid=2; Secure; SameSite=Strict"),
        ];
        let warnings = missing_flag_warnings(&cookies, &["CSRFToken".to_string()]);
        assert_eq!(warnings, vec!["Cookie 'sid' missing flags: HttpOnly"]);
    }

    #[test]
    fn test_extract_prefers_multi_value_accessor() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE_HEADER, HeaderValue::from_static("a=1; Expires=Wed, 21 Oct 2020 07:28:00 GMT"));
        headers.append(SET_COOKIE_HEADER, HeaderValue::from_static("b=2; Secure"));

        let values = extract_set_cookies(&headers);
        assert_eq!(values, vec!["a=1; Expires=Wed, 21 Oct 2020 07:28:00 GMT", "b=2; Secure"]);
    }

    #[test]
    fn test_extract_falls_back_to_split() {
        let mut headers = FoldedHeaders::new();
        headers.insert("Set-Cookie", "a=1; HttpOnly, b=2; Expires=Wed, 21 Oct 2020 07:28:00 GMT");

        let values = extract_set_cookies(&headers);
        assert_eq!(values, vec!["a=1; HttpOnly", "b=2; Expires=Wed, 21 Oct 2020 07:28:00 GMT"]);
    }

    #[test]
    fn test_extract_with_no_cookies() {
        assert!(extract_set_cookies(&HeaderMap::new()).is_empty());
        assert!(extract_set_cookies(&FoldedHeaders::new()).is_empty());
    }
}
