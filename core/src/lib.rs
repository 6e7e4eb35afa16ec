pub mod core;
pub mod http;
pub mod modules;
pub mod probe;
pub mod registry;
pub mod utils;

use std::fs;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub use crate::core::cookie_analyzer::{
    extract_set_cookies, missing_flag_warnings, parse_set_cookie, split_set_cookie_block,
    CookieAnalyzer, CookieFlags, CookieRecord, CookieReport, FoldedHeaders, HeaderLookup,
};
pub use crate::core::engine::{RequestRunner, RunnerConfig};
pub use crate::core::result_aggregator::{RequestOutcome, RunSummary, DETAILS_SAMPLE_LIMIT};
pub use crate::http::{parse_header_block, HttpReply, ProbeRequest, ReqwestTransport, Transport};
pub use crate::probe::{InputBundle, InputKind, InputSpec, Probe, ProbeOutput};
pub use crate::registry::ProbeRegistry;
pub use crate::utils::results::{enrich, ResultStore};

/// Toolbox settings shared by every frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolboxConfig {
    pub results_dir: String,
    pub verbose: bool,
}

impl Default for ToolboxConfig {
    fn default() -> Self {
        Self {
            results_dir: "results".to_string(),
            verbose: false,
        }
    }
}

impl ToolboxConfig {
    /// Reads a JSON config file; missing fields keep their defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path).with_context(|| format!("failed to read config '{}'", path))?;
        serde_json::from_str(&data).with_context(|| format!("invalid config '{}'", path))
    }

    pub fn result_store(&self) -> ResultStore {
        ResultStore::new(&self.results_dir)
    }
}
