use async_trait::async_trait;
use log::warn;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder};

use super::ProbeRequest;

const MAX_REDIRECTS: usize = 10;

/// Status line and headers of a completed exchange.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub reason: String,
    pub headers: HeaderMap,
}

/// Sends one probe request. Implementations must not share mutable
/// session state (cookies, pooled connections) between calls.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ProbeRequest) -> anyhow::Result<HttpReply>;
}

/// reqwest-backed transport that builds an isolated client for every request.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport;

impl ReqwestTransport {
    pub fn new() -> Self {
        Self
    }

    fn build_client(request: &ProbeRequest) -> Result<Client, reqwest::Error> {
        ClientBuilder::new()
            .timeout(request.timeout)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .danger_accept_invalid_certs(true)
            .pool_max_idle_per_host(0)
            .build()
    }
}

/// Converts the operator's header pairs, skipping anything that is not valid on the wire.
pub fn to_header_map(headers: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (key, val) in headers {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(val),
        ) {
            (Ok(name), Ok(value)) => {
                map.append(name, value);
            }
            _ => warn!("Skipping invalid request header '{}'", key),
        }
    }
    map
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ProbeRequest) -> anyhow::Result<HttpReply> {
        let client = Self::build_client(request)?;

        let response = client
            .request(request.method.clone(), request.url.clone())
            .headers(to_header_map(&request.headers))
            .send()
            .await?;

        let status = response.status();
        Ok(HttpReply {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            headers: response.headers().clone(),
        })
    }
}
