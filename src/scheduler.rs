//! Daily report trigger
//!
//! A single timer task computes the next configured fire time and hands a run
//! request to one runner task. Runs never overlap: a tick that arrives while a
//! run is pending or in progress is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime};
use tokio::sync::{broadcast, mpsc};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{error, info, warn};

use crate::models::ScreeningResult;
use crate::pipeline::ScreeningPipeline;
use crate::report::ReportSink;

/// Next fire instant strictly after `now`, or `None` with no configured times
pub fn next_fire(now: NaiveDateTime, times: &[NaiveTime]) -> Option<NaiveDateTime> {
    let today = now.date();
    let later_today = times
        .iter()
        .map(|time| today.and_time(*time))
        .filter(|candidate| *candidate > now)
        .min();

    later_today.or_else(|| {
        let tomorrow = today + ChronoDuration::days(1);
        times.iter().min().map(|time| tomorrow.and_time(*time))
    })
}

/// Next fire instant after both `now` and the last one that fired. A wall
/// clock that lags the timer must not yield the same instant twice.
pub fn next_fire_after(
    now: NaiveDateTime,
    last_fired: Option<NaiveDateTime>,
    times: &[NaiveTime],
) -> Option<NaiveDateTime> {
    let from = last_fired.map_or(now, |last| last.max(now));
    next_fire(from, times)
}

pub struct ReportTrigger {
    pipeline: Arc<ScreeningPipeline>,
    sink: Arc<dyn ReportSink>,
    times: Vec<NaiveTime>,
}

impl ReportTrigger {
    pub fn new(pipeline: Arc<ScreeningPipeline>, sink: Arc<dyn ReportSink>, times: Vec<NaiveTime>) -> Self {
        Self {
            pipeline,
            sink,
            times,
        }
    }

    /// Screen once and hand the result to the sink
    pub async fn run_once(&self) -> Result<ScreeningResult> {
        let result = self.pipeline.run().await;

        if result.is_empty() {
            info!("No tickers met the criteria this run");
        }
        self.sink.deliver(&result).await?;

        Ok(result)
    }

    /// Fire at every configured local time, daily, until `shutdown` receives
    /// a message or its sender is dropped. Waits for an in-flight run before
    /// returning.
    pub async fn run_until(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let (request_tx, mut request_rx) = mpsc::channel::<NaiveDateTime>(1);
        // Set when a request is handed over, cleared once its run finishes
        let busy = Arc::new(AtomicBool::new(false));

        let runner = {
            let trigger = Arc::clone(&self);
            let busy = Arc::clone(&busy);
            tokio::spawn(async move {
                while let Some(fire_time) = request_rx.recv().await {
                    info!("Starting scheduled screening for {}", fire_time);
                    if let Err(e) = trigger.run_once().await {
                        error!("Scheduled report failed: {}", e);
                    }
                    busy.store(false, Ordering::SeqCst);
                }
            })
        };

        let mut last_fired = None;
        loop {
            let now = Local::now().naive_local();
            let fire_time = match next_fire_after(now, last_fired, &self.times) {
                Some(fire_time) => fire_time,
                None => {
                    warn!("No schedule configured, trigger idle");
                    break;
                }
            };
            let wait = (fire_time - now).to_std().unwrap_or_default();
            info!("Next screening at {}", fire_time);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    last_fired = Some(fire_time);

                    if busy.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
                        warn!("Previous screening still running, skipping {}", fire_time);
                        continue;
                    }
                    match request_tx.try_send(fire_time) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            warn!("Previous screening still pending, skipping {}", fire_time);
                        }
                        Err(TrySendError::Closed(_)) => {
                            error!("Screening runner stopped");
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutdown requested, stopping scheduler");
                    break;
                }
            }
        }

        drop(request_tx);
        runner.await?;
        Ok(())
    }
}
