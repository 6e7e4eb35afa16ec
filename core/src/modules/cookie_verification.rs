use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::info;
use serde_json::Value;

use crate::core::cookie_analyzer::CookieAnalyzer;
use crate::http::{normalize_method, parse_header_block, parse_target, ProbeRequest, ReqwestTransport, Transport};
use crate::modules::{headers_to_json, to_output};
use crate::probe::{error_output, InputBundle, InputSpec, Probe, ProbeOutput};

pub const NAME: &str = "cookie-verification";

/// Requests a URL and checks the Secure, HttpOnly and SameSite attributes of every cookie it sets.
pub struct CookieVerificationProbe {
    transport: Arc<dyn Transport>,
}

impl CookieVerificationProbe {
    pub fn new() -> Self {
        Self::with_transport(Arc::new(ReqwestTransport::new()))
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

impl Default for CookieVerificationProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Probe for CookieVerificationProbe {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Sends a request and inspects the returned Set-Cookie headers for Secure/HttpOnly/SameSite."
    }

    fn requires(&self) -> Vec<InputSpec> {
        vec![
            InputSpec::line("target", "Target URL (e.g. https://example.com/path): "),
            InputSpec::line("method", "HTTP method (GET or POST) [GET]: "),
            InputSpec::line("timeout", "Request timeout in seconds [5]: "),
            InputSpec::line(
                "exclude_list",
                "Cookies to EXCLUDE from the check (comma separated, e.g. csrftoken,jsessionid) [optional]: ",
            ),
            InputSpec::block("headers", "Paste the HTTP request headers, finish with an empty line:"),
        ]
    }

    async fn run(&self, inputs: &InputBundle) -> anyhow::Result<ProbeOutput> {
        let target = match parse_target(inputs.text("target")) {
            Ok(url) => url,
            Err(e) => return Ok(error_output(e.to_string())),
        };
        let method = match normalize_method(inputs.text("method")) {
            Ok(m) => m,
            Err(e) => return Ok(error_output(e.to_string())),
        };
        let timeout = inputs.seconds("timeout");
        let exclude = inputs.list("exclude_list");
        let headers = parse_header_block(inputs.raw("headers").unwrap_or(""));

        info!("Checking cookies of {} {}", method, target);

        let request = ProbeRequest::new(
            method.clone(),
            target.clone(),
            headers.clone(),
            Duration::from_secs_f64(timeout),
        );
        let report = CookieAnalyzer::new(Arc::clone(&self.transport))
            .analyze(&request, &exclude)
            .await;

        let mut output = to_output(&report)?;
        output.insert("target".into(), Value::String(inputs.text("target").to_string()));
        output.insert("method".into(), Value::String(method.to_string()));
        output.insert("timeout_seconds".into(), Value::from(timeout));
        output.insert("raw_request_headers".into(), headers_to_json(&headers));
        Ok(output)
    }
}
