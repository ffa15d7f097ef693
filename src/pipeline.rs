//! Concurrent screening pipeline
//!
//! Pulls the ticker universe, fans the tickers out to a fixed pool of worker
//! tasks (fetch + score), waits for every worker and returns the ranked
//! candidates. A failing ticker never aborts the run.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::api::{MarketDataSource, TickerUniverseProvider};
use crate::error::ScreeningError;
use crate::fetcher::{RetryPolicy, SnapshotFetcher};
use crate::models::{RunStats, ScoredCandidate, ScreeningResult, TickerSymbol};
use crate::scorer::Scorer;

/// Configuration for concurrent screening
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub worker_count: usize,
    /// Minimum spacing between calls of one worker
    pub throttle_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: 10,
            throttle_delay: Duration::from_millis(200),
            retry: RetryPolicy::default(),
        }
    }
}

/// Cooperative cancellation, checked by workers before taking the next ticker
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::SeqCst)
    }
}

/// Ranking order: score descending, then beta ascending, then symbol and
/// market ascending so equal candidates always land in the same order.
pub fn compare_candidates(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.snapshot.beta.total_cmp(&b.snapshot.beta))
        .then_with(|| a.ticker().symbol().cmp(b.ticker().symbol()))
        .then_with(|| a.ticker().market().cmp(&b.ticker().market()))
}

pub fn rank_candidates(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by(compare_candidates);
}

/// What one worker produced
#[derive(Debug, Default)]
struct WorkerOutcome {
    candidates: Vec<ScoredCandidate>,
    stats: RunStats,
}

pub struct ScreeningPipeline {
    universe: Arc<dyn TickerUniverseProvider>,
    source: Arc<dyn MarketDataSource>,
    scorer: Arc<Scorer>,
    config: PipelineConfig,
}

impl ScreeningPipeline {
    pub fn new(
        universe: Arc<dyn TickerUniverseProvider>,
        source: Arc<dyn MarketDataSource>,
        scorer: Scorer,
        config: PipelineConfig,
    ) -> Self {
        Self {
            universe,
            source,
            scorer: Arc::new(scorer),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run a full screening pass
    pub async fn run(&self) -> ScreeningResult {
        self.run_with_cancel(&CancellationFlag::new()).await
    }

    /// Run a screening pass that stops dispatching tickers once `cancel`
    /// trips. Tickers already in flight finish; the rest are counted as
    /// cancelled.
    pub async fn run_with_cancel(&self, cancel: &CancellationFlag) -> ScreeningResult {
        let started_at = Utc::now();

        let tickers = match self.universe.list().await {
            Ok(tickers) => tickers,
            Err(e) => {
                error!("Screening with an empty universe: {}", e);
                return ScreeningResult::empty(started_at);
            }
        };
        let universe_size = tickers.len();

        if tickers.is_empty() {
            info!("Ticker universe is empty, nothing to screen");
            return ScreeningResult::empty(started_at);
        }

        let worker_count = self.config.worker_count.clamp(1, universe_size);
        info!(
            "Screening {} tickers with {} workers",
            universe_size, worker_count
        );

        let queue = Arc::new(Mutex::new(VecDeque::from(tickers)));

        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let queue = Arc::clone(&queue);
            let fetcher = SnapshotFetcher::new(
                Arc::clone(&self.source),
                self.config.throttle_delay,
                self.config.retry,
            );
            let scorer = Arc::clone(&self.scorer);
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                screening_worker(worker_id, queue, fetcher, scorer, cancel).await
            }));
        }

        let mut stats = RunStats {
            universe_size,
            ..RunStats::default()
        };
        let mut candidates = Vec::new();

        for joined in join_all(handles).await {
            match joined {
                Ok(outcome) => {
                    stats.absorb(&outcome.stats);
                    candidates.extend(outcome.candidates);
                }
                Err(e) => error!("Screening worker failed: {}", e),
            }
        }

        stats.cancelled += queue.lock().await.len();

        rank_candidates(&mut candidates);

        info!(
            "Screening complete: {} candidates, {} ineligible, {} unavailable, {} rate limited, {} cancelled",
            candidates.len(),
            stats.ineligible,
            stats.unavailable,
            stats.rate_limited,
            stats.cancelled
        );

        ScreeningResult {
            generated_at: started_at,
            candidates,
            stats,
        }
    }
}

async fn screening_worker(
    worker_id: usize,
    queue: Arc<Mutex<VecDeque<TickerSymbol>>>,
    fetcher: SnapshotFetcher,
    scorer: Arc<Scorer>,
    cancel: CancellationFlag,
) -> WorkerOutcome {
    let mut outcome = WorkerOutcome::default();

    loop {
        if cancel.is_cancelled() {
            debug!("Worker {}: cancelled", worker_id);
            break;
        }

        let ticker = match queue.lock().await.pop_front() {
            Some(ticker) => ticker,
            None => break,
        };

        let snapshot = match fetcher.fetch(&ticker).await {
            Ok(snapshot) => snapshot,
            Err(ScreeningError::RateLimited { .. }) => {
                outcome.stats.rate_limited += 1;
                continue;
            }
            Err(e) => {
                debug!("Worker {}: {}", worker_id, e);
                outcome.stats.unavailable += 1;
                continue;
            }
        };

        match scorer.evaluate(&snapshot) {
            Ok(candidate) => {
                debug!(
                    "Worker {}: {} scored {:.2}",
                    worker_id, ticker, candidate.score
                );
                outcome.stats.scored += 1;
                outcome.candidates.push(candidate);
            }
            Err(reason) => {
                debug!("Worker {}: {} ineligible: {}", worker_id, ticker, reason);
                outcome.stats.ineligible += 1;
            }
        }
    }

    outcome
}
