use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info};
use reqwest::Method;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use url::Url;

use crate::core::result_aggregator::{
    OutcomeAggregator, RequestOutcome, RunSummary, DETAILS_SAMPLE_LIMIT,
};
use crate::http::{round_to, HeaderList, ProbeRequest, Transport};

/// Parameters of one request batch, already validated and coerced.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub target: Url,
    pub method: Method,
    pub total: usize,
    pub concurrency: usize,
    pub timeout: Duration,
    pub headers: HeaderList,
}

impl RunnerConfig {
    /// Number of requests allowed in flight at once.
    pub fn effective_parallelism(&self) -> usize {
        self.concurrency.min(self.total).max(1)
    }
}

/// Concurrent request runner.
///
/// The runner:
/// 1. Hands out `min(concurrency, total)` semaphore permits
/// 2. Spawns one task per request index, each doing a single independent exchange
/// 3. Streams every outcome over a channel to the aggregator
/// 4. Waits for all tasks, then builds the summary
pub struct RequestRunner {
    transport: Arc<dyn Transport>,
}

impl RequestRunner {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn run(&self, config: RunnerConfig) -> RunSummary {
        let total = config.total.max(1);
        let workers = config.effective_parallelism();
        let request = Arc::new(ProbeRequest::new(
            config.method.clone(),
            config.target.clone(),
            config.headers.clone(),
            config.timeout,
        ));

        info!(
            "Sending {} {} request(s) to {} with {} worker(s)",
            total, config.method, config.target, workers
        );

        let start = Instant::now();
        let (outcome_tx, outcome_rx) = mpsc::channel::<RequestOutcome>(100);

        let (_, aggregated) = tokio::join!(
            dispatch(Arc::clone(&self.transport), request, total, workers, outcome_tx),
            OutcomeAggregator::run(outcome_rx)
        );

        let wall_time = start.elapsed().as_secs_f64();

        let details_sample = aggregated
            .outcomes
            .iter()
            .take(DETAILS_SAMPLE_LIMIT)
            .cloned()
            .collect();

        RunSummary {
            target: config.target.to_string(),
            method: config.method.to_string(),
            total_requested: total,
            concurrency: config.concurrency,
            timeout_seconds: config.timeout.as_secs_f64(),
            wall_time_seconds: round_to(wall_time, 4),
            requests_sent: aggregated.outcomes.len(),
            successes: aggregated.successes,
            failures: aggregated.failures,
            errors: aggregated.failures,
            avg_latency_seconds: aggregated.mean_latency(),
            p50_latency_seconds: aggregated.median_latency(),
            p95_latency_seconds: aggregated.p95_latency(),
            status_counts: aggregated.status_counts,
            details_sample,
        }
    }
}

/// Issues `total` requests with at most `workers` in flight. Finished tasks are
/// reaped as the loop goes, so only running tasks are held.
async fn dispatch(
    transport: Arc<dyn Transport>,
    request: Arc<ProbeRequest>,
    total: usize,
    workers: usize,
    outcome_tx: mpsc::Sender<RequestOutcome>,
) {
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();

    for index in 0..total {
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                error!("Worker pool closed before request #{}: {}", index, e);
                break;
            }
        };

        let transport = Arc::clone(&transport);
        let request = Arc::clone(&request);
        let tx = outcome_tx.clone();

        tasks.spawn(async move {
            let _permit = permit;
            let outcome = send_one(transport.as_ref(), &request, index).await;
            let _ = tx.send(outcome).await;
        });

        while let Some(result) = tasks.try_join_next() {
            report_aborted(result);
        }
    }

    drop(outcome_tx);

    while let Some(result) = tasks.join_next().await {
        report_aborted(result);
    }
}

fn report_aborted(result: Result<(), JoinError>) {
    if let Err(e) = result {
        error!("Request worker aborted: {}", e);
    }
}

async fn send_one(transport: &dyn Transport, request: &ProbeRequest, index: usize) -> RequestOutcome {
    let start = Instant::now();
    let result = transport.send(request).await;
    let elapsed = start.elapsed().as_secs_f64();

    match result {
        Ok(reply) => RequestOutcome::success(index, reply.status, reply.reason, elapsed),
        Err(e) => {
            debug!("Request #{} to {} failed: {:#}", index, request.url, e);
            RequestOutcome::failure(index, format!("{:#}", e), elapsed)
        }
    }
}
