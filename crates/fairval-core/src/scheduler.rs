//! Bounded worker pool that values a batch of tickers under one deadline.
//!
//! ```text
//!  dispatcher ──(bounded queue, 2 × workers)──▶ worker × N ──▶ collector
//!      │                                          │
//!      └──── stops at cancel ◀── watchdog ────────┘ abandon sub-fetches, finish with fallback
//! ```
//!
//! The watchdog cancels the run `shutdown_grace` before the deadline. Workers stop
//! taking jobs and in-flight tickers complete from fallback data. Whatever is
//! still running at the hard deadline is aborted, so [`TaskScheduler::run`]
//! returns by the deadline.

use std::collections::BTreeMap;
use std::pin::pin;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::RunContext;
use crate::error::TickerError;
use crate::fundamentals::FundamentalsAggregator;
use crate::report::{BatchReport, TickerFailure};
use crate::valuation::ValuationEngine;
use crate::{Symbol, ValuationResult};

/// One unit of work, moved into the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerJob {
    pub index: usize,
    pub symbol: Symbol,
}

type JobOutcome = (TickerJob, Result<ValuationResult, TickerError>);
type InFlight = Arc<StdMutex<BTreeMap<usize, Symbol>>>;

/// Fundamentals, growth and valuation for one ticker.
#[derive(Clone)]
pub struct TickerPipeline {
    aggregator: FundamentalsAggregator,
    engine: ValuationEngine,
}

impl TickerPipeline {
    pub fn new(aggregator: FundamentalsAggregator, engine: ValuationEngine) -> Self {
        Self { aggregator, engine }
    }

    pub async fn process(
        &self,
        symbol: &Symbol,
        context: &RunContext,
    ) -> Result<ValuationResult, TickerError> {
        let metrics = self.aggregator.fetch(symbol, context).await;
        let missing = metrics.missing_fields();
        if !missing.is_empty() {
            return Err(TickerError::IncompleteMetrics {
                fields: missing.join(", "),
            });
        }
        Ok(self.engine.evaluate(&metrics))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub workers: usize,
    /// How long before the deadline in-flight work is told to wrap up.
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            shutdown_grace: Duration::from_millis(250),
        }
    }
}

/// Aborts the wrapped task when dropped, so an aborted worker takes its job with it.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn lock(in_flight: &InFlight) -> MutexGuard<'_, BTreeMap<usize, Symbol>> {
    in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct TaskScheduler {
    pipeline: Arc<TickerPipeline>,
    config: SchedulerConfig,
}

impl TaskScheduler {
    pub fn new(pipeline: TickerPipeline, config: SchedulerConfig) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            config: SchedulerConfig {
                workers: config.workers.max(1),
                ..config
            },
        }
    }

    pub fn workers(&self) -> usize {
        self.config.workers
    }

    /// Grace period actually used for a run with `budget` left.
    pub fn grace_for(&self, budget: Duration) -> Duration {
        self.config.shutdown_grace.min(budget / 2)
    }

    /// Values every ticker, returning partial results if the deadline in
    /// `context` fires first.
    pub async fn run(&self, tickers: Vec<Symbol>, context: RunContext) -> BatchReport {
        let started = std::time::Instant::now();
        let mut report = BatchReport::new(Uuid::new_v4());
        let hard_deadline = context.deadline();
        let grace = self.grace_for(context.remaining());
        let soft_deadline = hard_deadline.checked_sub(grace).unwrap_or(hard_deadline);

        info!(
            run_id = %report.run_id,
            tickers = tickers.len(),
            workers = self.config.workers,
            deadline_ms = context.remaining().as_millis() as u64,
            "batch started"
        );

        let watchdog = AbortOnDrop(tokio::spawn({
            let cancel = context.cancel_token().clone();
            async move {
                tokio::time::sleep_until(soft_deadline).await;
                cancel.cancel();
            }
        }));

        let (job_tx, job_rx) = mpsc::channel::<TickerJob>(self.config.workers * 2);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<JobOutcome>();
        let in_flight: InFlight = Arc::new(StdMutex::new(BTreeMap::new()));

        let mut workers = JoinSet::new();
        for _ in 0..self.config.workers {
            workers.spawn(worker_loop(
                Arc::clone(&self.pipeline),
                context.clone(),
                Arc::clone(&job_rx),
                result_tx.clone(),
                Arc::clone(&in_flight),
            ));
        }
        drop(result_tx);

        let mut completed: Vec<JobOutcome> = Vec::with_capacity(tickers.len());
        let mut hard_stop = false;
        {
            let mut dispatch = pin!(dispatch_jobs(
                tickers.clone(),
                job_tx,
                context.cancel_token().clone()
            ));
            let mut dispatch_done = false;
            let mut deadline = pin!(tokio::time::sleep_until(hard_deadline));

            loop {
                tokio::select! {
                    biased;
                    _ = &mut deadline => {
                        hard_stop = true;
                        break;
                    }
                    _ = &mut dispatch, if !dispatch_done => {
                        dispatch_done = true;
                    }
                    received = result_rx.recv() => match received {
                        Some(outcome) => {
                            log_outcome(&outcome);
                            completed.push(outcome);
                        }
                        None => break,
                    }
                }
            }
        }

        if hard_stop {
            warn!(run_id = %report.run_id, "batch deadline reached; aborting workers");
            context.cancel();
            workers.abort_all();
        }
        while workers.join_next().await.is_some() {}
        while let Ok(outcome) = result_rx.try_recv() {
            log_outcome(&outcome);
            completed.push(outcome);
        }

        let soft_fired = watchdog.0.is_finished();
        drop(watchdog);

        let aborted = std::mem::take(&mut *lock(&in_flight));
        let mut finished = vec![false; tickers.len()];
        let mut failures: Vec<(usize, TickerFailure)> = Vec::new();
        report.dispatched = completed.len() + aborted.len();

        for (job, outcome) in completed {
            finished[job.index] = true;
            match outcome {
                Ok(result) => report.results.push(result),
                Err(error) => failures.push((job.index, TickerFailure::new(job.symbol, &error))),
            }
        }
        for (index, symbol) in aborted {
            finished[index] = true;
            failures.push((index, TickerFailure::new(symbol, &TickerError::Aborted)));
        }
        for (index, symbol) in tickers.into_iter().enumerate() {
            if !finished[index] {
                report.not_dispatched += 1;
                failures.push((index, TickerFailure::new(symbol, &TickerError::NotDispatched)));
            }
        }
        failures.sort_by_key(|(index, _)| *index);

        report.failures = failures.into_iter().map(|(_, failure)| failure).collect();
        report.timed_out = hard_stop || soft_fired;
        report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            run_id = %report.run_id,
            results = report.results.len(),
            failures = report.failures.len(),
            not_dispatched = report.not_dispatched,
            timed_out = report.timed_out,
            elapsed_ms = report.elapsed_ms,
            "batch finished"
        );
        report
    }
}

async fn dispatch_jobs(
    tickers: Vec<Symbol>,
    jobs: mpsc::Sender<TickerJob>,
    cancel: CancellationToken,
) {
    for (index, symbol) in tickers.into_iter().enumerate() {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            permit = jobs.reserve() => permit,
        };
        match permit {
            Ok(permit) => permit.send(TickerJob { index, symbol }),
            Err(_) => return,
        }
    }
}

async fn worker_loop(
    pipeline: Arc<TickerPipeline>,
    context: RunContext,
    jobs: Arc<Mutex<mpsc::Receiver<TickerJob>>>,
    results: mpsc::UnboundedSender<JobOutcome>,
    in_flight: InFlight,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = context.cancel_token().cancelled() => break,
            job = async { jobs.lock().await.recv().await } => job,
        };
        let Some(job) = job else {
            break;
        };

        lock(&in_flight).insert(job.index, job.symbol.clone());
        let outcome = run_job(&pipeline, &context, &job).await;
        lock(&in_flight).remove(&job.index);

        if results.send((job, outcome)).is_err() {
            break;
        }
    }
}

async fn run_job(
    pipeline: &Arc<TickerPipeline>,
    context: &RunContext,
    job: &TickerJob,
) -> Result<ValuationResult, TickerError> {
    let mut task = AbortOnDrop(tokio::spawn({
        let pipeline = Arc::clone(pipeline);
        let context = context.clone();
        let symbol = job.symbol.clone();
        async move { pipeline.process(&symbol, &context).await }
    }));

    match (&mut task.0).await {
        Ok(outcome) => outcome,
        Err(error) if error.is_panic() => Err(TickerError::Panicked),
        Err(_) => Err(TickerError::Aborted),
    }
}

fn log_outcome((job, outcome): &JobOutcome) {
    match outcome {
        Ok(result) => debug!(
            ticker = %job.symbol,
            fair_value = result.fair_value,
            status = %result.status,
            "ticker valued"
        ),
        Err(error) => warn!(ticker = %job.symbol, %error, "ticker failed"),
    }
}
