use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

/// Open-ended result of a probe run: string keys mapped to arbitrary JSON values.
pub type ProbeOutput = Map<String, Value>;

const DEFAULT_TIMEOUT_SECONDS: f64 = 5.0;

/// How the console should collect an input value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// A single line of free text.
    Line,
    /// Several lines, terminated by an empty line (pasted headers).
    Block,
}

/// One declared input of a probe: the bundle key and the text shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    pub key: &'static str,
    pub prompt: &'static str,
    pub kind: InputKind,
}

impl InputSpec {
    pub const fn line(key: &'static str, prompt: &'static str) -> Self {
        Self { key, prompt, kind: InputKind::Line }
    }

    pub const fn block(key: &'static str, prompt: &'static str) -> Self {
        Self { key, prompt, kind: InputKind::Block }
    }
}

/// A self-contained security check.
///
/// `run` reports expected failures (missing target, network errors) through an
/// `error` key in the returned map. An `Err` means a defect; callers log it and move on.
#[async_trait]
pub trait Probe: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Ordered inputs the operator must supply before `run`.
    fn requires(&self) -> Vec<InputSpec> {
        Vec::new()
    }

    async fn run(&self, inputs: &InputBundle) -> anyhow::Result<ProbeOutput>;
}

/// Raw operator answers keyed by [`InputSpec::key`].
#[derive(Debug, Clone, Default)]
pub struct InputBundle {
    values: HashMap<String, String>,
}

impl InputBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Untrimmed raw value, if supplied.
    pub fn raw(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Trimmed value, empty when absent.
    pub fn text(&self, key: &str) -> &str {
        self.raw(key).map(str::trim).unwrap_or("")
    }

    /// Positive integer; anything blank, unparsable or below 1 becomes 1.
    pub fn count(&self, key: &str) -> usize {
        self.text(key)
            .parse::<i64>()
            .ok()
            .filter(|n| *n >= 1)
            .map(|n| n as usize)
            .unwrap_or(1)
    }

    /// Strictly positive number of seconds that fits in a `Duration`; falls back to 5.0.
    pub fn seconds(&self, key: &str) -> f64 {
        self.text(key)
            .parse::<f64>()
            .ok()
            .filter(|s| *s > 0.0 && Duration::try_from_secs_f64(*s).is_ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS)
    }

    /// Comma separated list with blank items dropped.
    pub fn list(&self, key: &str) -> Vec<String> {
        self.text(key)
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Shorthand for the `{"error": ...}` result used on input validation failures.
pub fn error_output(message: impl Into<String>) -> ProbeOutput {
    let mut out = ProbeOutput::new();
    out.insert("error".to_string(), Value::String(message.into()));
    out
}
