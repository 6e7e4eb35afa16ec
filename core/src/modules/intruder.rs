use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::engine::{RequestRunner, RunnerConfig};
use crate::http::{normalize_method, parse_header_block, parse_target, ReqwestTransport, Transport};
use crate::modules::to_output;
use crate::probe::{error_output, InputBundle, InputSpec, Probe, ProbeOutput};

pub const NAME: &str = "intruder";

/// Fires a batch of concurrent requests at one URL and reports status and latency statistics.
pub struct IntruderProbe {
    transport: Arc<dyn Transport>,
}

impl IntruderProbe {
    pub fn new() -> Self {
        Self::with_transport(Arc::new(ReqwestTransport::new()))
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

impl Default for IntruderProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Probe for IntruderProbe {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Sends many concurrent requests (GET/POST) to a URL. Headers can be pasted as a multi-line block."
    }

    fn requires(&self) -> Vec<InputSpec> {
        vec![
            InputSpec::line("target", "Target URL (e.g. https://example.com/path): "),
            InputSpec::line("method", "HTTP method (GET or POST) [GET]: "),
            InputSpec::line("total", "Total number of requests (e.g. 100): "),
            InputSpec::line("concurrency", "Number of simultaneous requests (e.g. 10): "),
            InputSpec::line("timeout", "Per-request timeout in seconds (e.g. 10) [5]: "),
            InputSpec::block(
                "headers",
                "Paste the HTTP request headers, finish with an empty line and press Enter:",
            ),
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

        let config = RunnerConfig {
            target,
            method,
            total: inputs.count("total"),
            concurrency: inputs.count("concurrency"),
            timeout: Duration::from_secs_f64(inputs.seconds("timeout")),
            headers: parse_header_block(inputs.raw("headers").unwrap_or("")),
        };

        let summary = RequestRunner::new(Arc::clone(&self.transport)).run(config).await;
        let mut output = to_output(&summary)?;
        output.insert("target".into(), Value::String(inputs.text("target").to_string()));
        Ok(output)
    }
}
