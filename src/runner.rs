use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::sleep;

use crate::error::{PipelineError, Result};
use crate::pipeline::{StageStatus, TransitionRejected};
use crate::registry::JobRegistry;

/// Timing and failure-injection knobs for a stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageTiming {
    pub base_duration: Duration,
    /// Upper bound of the uniform extra delay added to `base_duration`.
    pub duration_variance: Duration,
    /// Chance, between 0 and 1, that a stage ends FAILED.
    pub failure_probability: f64,
}

impl Default for StageTiming {
    fn default() -> Self {
        Self {
            base_duration: Duration::from_millis(1500),
            duration_variance: Duration::from_millis(1000),
            failure_probability: 0.05,
        }
    }
}

/// Source of randomness for stage durations and failure draws.
///
/// Injected into the runner so tests and reproducible runs can pin outcomes.
pub trait RandomSource: Send + Sync {
    /// Uniform integer in `0..=max`.
    fn below_or_equal(&self, max: u64) -> u64;
    /// Uniform float in `[0, 1)`.
    fn unit(&self) -> f64;
}

/// Thread-local RNG; the default for real runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn below_or_equal(&self, max: u64) -> u64 {
        rand::thread_rng().gen_range(0..=max)
    }

    fn unit(&self) -> f64 {
        rand::thread_rng().r#gen()
    }
}

/// Deterministic RNG seeded once; all runners sharing it draw from one stream.
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut rng)
    }
}

impl RandomSource for SeededRandom {
    fn below_or_equal(&self, max: u64) -> u64 {
        self.with_rng(|rng| rng.gen_range(0..=max))
    }

    fn unit(&self) -> f64 {
        self.with_rng(|rng| rng.r#gen())
    }
}

/// How a run ended. Stage failure is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every stage reached COMPLETED.
    Completed,
    /// The stage with this id ended FAILED; later stages stay PENDING.
    Failed { stage: u32 },
    /// Cancellation was observed while on the stage with this id.
    Cancelled { stage: u32 },
}

/// Advances one job's stages in order, sleeping between start and finish.
pub struct StageRunner {
    timing: StageTiming,
    random: Arc<dyn RandomSource>,
}

impl Default for StageRunner {
    fn default() -> Self {
        Self::new(StageTiming::default(), Arc::new(ThreadRandom))
    }
}

enum Step {
    Proceed,
    Stop(RunOutcome),
}

impl StageRunner {
    pub fn new(timing: StageTiming, random: Arc<dyn RandomSource>) -> Self {
        Self { timing, random }
    }

    pub fn timing(&self) -> StageTiming {
        self.timing
    }

    /// `base + uniform(0, variance)`.
    pub fn stage_duration(&self) -> Duration {
        let variance_ms = self.timing.duration_variance.as_millis() as u64;
        let extra = if variance_ms == 0 {
            0
        } else {
            self.random.below_or_equal(variance_ms)
        };
        self.timing.base_duration + Duration::from_millis(extra)
    }

    /// Bernoulli draw with the configured failure probability.
    pub fn draw_failure(&self) -> bool {
        self.random.unit() < self.timing.failure_probability
    }

    /// Drive the job with `id` until every stage completes, one fails, or
    /// cancellation is observed.
    ///
    /// The cancellation flag is consulted before each stage starts and again
    /// after its delay. A stage that was running when cancellation landed is
    /// left RUNNING. No lock is held while sleeping.
    pub async fn run(&self, registry: &JobRegistry, id: &str) -> Result<RunOutcome> {
        let stage_ids = registry
            .update(id, |job| job.stages.iter().map(|s| s.id()).collect::<Vec<_>>())
            .ok_or_else(|| PipelineError::NotFound(id.to_string()))?;

        for (index, &stage) in stage_ids.iter().enumerate() {
            if let Step::Stop(outcome) =
                Self::write(registry, id, index, stage, StageStatus::Running)?
            {
                return Ok(outcome);
            }
            tracing::debug!(pipeline_id = %id, stage, "Stage started");

            sleep(self.stage_duration()).await;

            if registry.is_cancelled(id) {
                tracing::info!(pipeline_id = %id, stage, "Cancellation observed; stopping");
                return Ok(RunOutcome::Cancelled { stage });
            }
            let next = if self.draw_failure() {
                StageStatus::Failed
            } else {
                StageStatus::Completed
            };
            if let Step::Stop(outcome) = Self::write(registry, id, index, stage, next)? {
                return Ok(outcome);
            }

            if next == StageStatus::Failed {
                tracing::info!(pipeline_id = %id, stage, "Stage failed; halting pipeline");
                return Ok(RunOutcome::Failed { stage });
            }
            tracing::debug!(pipeline_id = %id, stage, "Stage completed");
        }

        tracing::info!(pipeline_id = %id, "Pipeline completed");
        Ok(RunOutcome::Completed)
    }

    fn write(
        registry: &JobRegistry,
        id: &str,
        index: usize,
        stage: u32,
        status: StageStatus,
    ) -> Result<Step> {
        match registry.update(id, |job| job.advance(index, status)) {
            Some(Ok(())) => Ok(Step::Proceed),
            // Only settled jobs are pruned, so a vanished record was cancelled.
            Some(Err(TransitionRejected::Cancelled)) | None => {
                tracing::info!(pipeline_id = %id, stage, "Cancellation observed; stopping");
                Ok(Step::Stop(RunOutcome::Cancelled { stage }))
            }
            Some(Err(rejected)) => {
                tracing::warn!(pipeline_id = %id, stage, error = %rejected, "Stage write rejected");
                Err(rejected.into())
            }
        }
    }
}
