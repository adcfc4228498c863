//! Client-side polling loop.
//!
//! After a start, the poller asks for status on a fixed period, replaces its
//! view of the stages with each answer and stops on the first terminal
//! report. A failed status call counts as a failed pipeline so the loop can
//! never spin forever. Abandoning the loop sends a courtesy cancel.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use crate::client::{ClientError, PipelineApi};
use crate::pipeline::{Stage, StageStatus, StatusReport};

/// A stage status change seen between two consecutive polls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    Started { id: u32, title: String },
    Completed { id: u32, title: String },
    Failed { id: u32, title: String },
}

/// Compare two views of the same job and report what changed.
///
/// Stages missing from `prev` are treated as PENDING, so the first report
/// of a run diffs against the initial state. A stage that went from PENDING
/// straight to a final status between polls yields only its final event.
pub fn diff_stages(prev: &[Stage], next: &[Stage]) -> Vec<StageEvent> {
    next.iter()
        .enumerate()
        .filter_map(|(i, stage)| {
            let before = prev.get(i).map(|s| s.status).unwrap_or(StageStatus::Pending);
            if before == stage.status {
                return None;
            }
            let id = stage.id();
            let title = stage.title().to_string();
            match stage.status {
                StageStatus::Running => Some(StageEvent::Started { id, title }),
                StageStatus::Completed => Some(StageEvent::Completed { id, title }),
                StageStatus::Failed => Some(StageEvent::Failed { id, title }),
                StageStatus::Pending => None,
            }
        })
        .collect()
}

/// How a watch ended.
#[derive(Debug)]
pub enum PollOutcome {
    /// Every stage completed.
    Completed(StatusReport),
    /// A stage failed.
    Failed(StatusReport),
    /// A start or status call itself failed; treated like a failed pipeline.
    TransportFailed(ClientError),
    /// The caller gave up; a cancel was sent for the job.
    Abandoned,
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Completed(_))
    }

    #[cfg(test)]
    fn has_failed(&self) -> bool {
        matches!(self, PollOutcome::Failed(_) | PollOutcome::TransportFailed(_))
    }
}

/// Receives everything the poller observes.
pub trait PollObserver {
    /// A new pipeline id was handed out by `start`.
    fn started(&mut self, _pipeline_id: &str) {}

    /// A status report arrived; `events` are the changes since the last one.
    fn report(&mut self, _report: &StatusReport, _events: &[StageEvent]) {}

    /// The poller has stopped.
    fn finished(&mut self, _outcome: &PollOutcome) {}
}

/// Observer that ignores everything.
impl PollObserver for () {}

pub struct StatusPoller<A> {
    api: A,
    period: Duration,
}

impl<A: PipelineApi> StatusPoller<A> {
    pub fn new(api: A, period: Duration) -> Self {
        Self { api, period }
    }

    #[cfg(test)]
    fn api(&self) -> &A {
        &self.api
    }

    /// Start a pipeline for `theme`, then watch it.
    ///
    /// Returns the pipeline id when the start call succeeded.
    pub async fn run(
        &self,
        theme: &str,
        abandon: &CancellationToken,
        observer: &mut impl PollObserver,
    ) -> (Option<String>, PollOutcome) {
        let pipeline_id = match self.api.start(theme).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to start pipeline");
                let outcome = PollOutcome::TransportFailed(e);
                observer.finished(&outcome);
                return (None, outcome);
            }
        };
        observer.started(&pipeline_id);

        let outcome = self.watch(&pipeline_id, abandon, observer).await;
        (Some(pipeline_id), outcome)
    }

    /// Poll `pipeline_id` every period until it settles, a call fails, or
    /// `abandon` fires.
    pub async fn watch(
        &self,
        pipeline_id: &str,
        abandon: &CancellationToken,
        observer: &mut impl PollObserver,
    ) -> PollOutcome {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut view: Vec<Stage> = Vec::new();

        let outcome = loop {
            tokio::select! {
                _ = abandon.cancelled() => {
                    if let Err(e) = self.api.cancel(pipeline_id).await {
                        tracing::warn!(pipeline_id, error = %e, "Courtesy cancel failed");
                    }
                    break PollOutcome::Abandoned;
                }
                _ = ticker.tick() => {
                    match self.api.status(pipeline_id).await {
                        Ok(report) => {
                            let events = diff_stages(&view, &report.stages);
                            view = report.stages.clone();
                            observer.report(&report, &events);
                            if report.is_complete {
                                break PollOutcome::Completed(report);
                            }
                            if report.has_failed {
                                break PollOutcome::Failed(report);
                            }
                        }
                        Err(e) => {
                            tracing::warn!(pipeline_id, error = %e, "Status poll failed");
                            break PollOutcome::TransportFailed(e);
                        }
                    }
                }
            }
        };

        observer.finished(&outcome);
        outcome
    }
}
