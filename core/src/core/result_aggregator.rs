use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::http::round_to;

/// Only this many outcomes are kept verbatim in a [`RunSummary`]; all are counted.
pub const DETAILS_SAMPLE_LIMIT: usize = 100;

/// Result of one HTTP attempt inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestOutcome {
    pub index: usize,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_seconds: f64,
}

impl RequestOutcome {
    pub fn success(index: usize, status_code: u16, reason: String, elapsed_seconds: f64) -> Self {
        Self {
            index,
            ok: true,
            status_code: Some(status_code),
            reason: Some(reason),
            error: None,
            elapsed_seconds: round_to(elapsed_seconds, 4),
        }
    }

    pub fn failure(index: usize, error: String, elapsed_seconds: f64) -> Self {
        Self {
            index,
            ok: false,
            status_code: None,
            reason: None,
            error: Some(error),
            elapsed_seconds: round_to(elapsed_seconds, 4),
        }
    }
}

/// Aggregate statistics over one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub target: String,
    pub method: String,
    pub total_requested: usize,
    pub concurrency: usize,
    pub timeout_seconds: f64,
    pub wall_time_seconds: f64,
    pub requests_sent: usize,
    pub successes: usize,
    pub failures: usize,
    pub errors: usize,
    pub status_counts: BTreeMap<String, usize>,
    pub avg_latency_seconds: Option<f64>,
    pub p50_latency_seconds: Option<f64>,
    pub p95_latency_seconds: Option<f64>,
    pub details_sample: Vec<RequestOutcome>,
}

/// Everything the aggregator learned from the channel.
#[derive(Debug, Clone, Default)]
pub struct AggregatedOutcomes {
    pub outcomes: Vec<RequestOutcome>,
    pub status_counts: BTreeMap<String, usize>,
    pub successes: usize,
    pub failures: usize,
    pub latencies: Vec<f64>,
}

impl AggregatedOutcomes {
    fn record(&mut self, outcome: RequestOutcome) {
        match (outcome.ok, outcome.status_code) {
            (true, Some(code)) => {
                self.successes += 1;
                *self.status_counts.entry(code.to_string()).or_insert(0) += 1;
            }
            _ => self.failures += 1,
        }
        self.latencies.push(outcome.elapsed_seconds);
        self.outcomes.push(outcome);
    }

    pub fn mean_latency(&self) -> Option<f64> {
        if self.latencies.is_empty() {
            return None;
        }
        let sum: f64 = self.latencies.iter().sum();
        Some(round_to(sum / self.latencies.len() as f64, 4))
    }

    pub fn median_latency(&self) -> Option<f64> {
        let sorted = self.sorted_latencies();
        let len = sorted.len();
        if len == 0 {
            return None;
        }
        let median = if len % 2 == 1 {
            sorted[len / 2]
        } else {
            (sorted[len / 2 - 1] + sorted[len / 2]) / 2.0
        };
        Some(round_to(median, 4))
    }

    pub fn p95_latency(&self) -> Option<f64> {
        let sorted = self.sorted_latencies();
        if sorted.is_empty() {
            return None;
        }
        let idx = ((sorted.len() as f64 * 0.95) as usize).min(sorted.len() - 1);
        Some(round_to(sorted[idx], 4))
    }

    fn sorted_latencies(&self) -> Vec<f64> {
        let mut sorted = self.latencies.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        sorted
    }
}

/// Single owner of the batch counters. Workers only ever send outcomes.
pub struct OutcomeAggregator;

impl OutcomeAggregator {
    /// Drains the channel until every sender is dropped.
    pub async fn run(mut receiver: mpsc::Receiver<RequestOutcome>) -> AggregatedOutcomes {
        let mut aggregated = AggregatedOutcomes::default();
        while let Some(outcome) = receiver.recv().await {
            aggregated.record(outcome);
        }
        aggregated
    }
}
