//! Public operations of the engine: submit, status, cancel.
//!
//! This is the only surface the HTTP layer and the in-process demo talk to.
//! Runners are spawned detached; their progress is visible only through
//! the registry.

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::pipeline::{StageDefinition, StatusReport, catalog};
use crate::registry::JobRegistry;
use crate::runner::{RandomSource, SeededRandom, StageRunner, ThreadRandom};

#[derive(Clone)]
pub struct JobService {
    registry: Arc<JobRegistry>,
    runner: Arc<StageRunner>,
}

impl JobService {
    pub fn new(registry: Arc<JobRegistry>, runner: Arc<StageRunner>) -> Self {
        Self { registry, runner }
    }

    /// Build the registry and runner described by `config`.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let random: Arc<dyn RandomSource> = match config.seed {
            Some(seed) => Arc::new(SeededRandom::new(seed)),
            None => Arc::new(ThreadRandom),
        };
        let registry = JobRegistry::new(catalog().to_vec(), config.retention_policy());
        let runner = StageRunner::new(config.stage_timing(), random);
        Self::new(Arc::new(registry), Arc::new(runner))
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Create a job for `theme` and start running it in the background.
    ///
    /// Returns as soon as the job is stored. Must be called from within a
    /// Tokio runtime.
    pub fn submit(&self, theme: &str) -> Result<String> {
        if theme.is_empty() {
            return Err(PipelineError::InvalidArgument("theme is required".into()));
        }

        let id = self.registry.create(theme);
        tracing::info!(pipeline_id = %id, theme, "Pipeline submitted");

        let registry = Arc::clone(&self.registry);
        let runner = Arc::clone(&self.runner);
        let run_id = id.clone();
        tokio::spawn(async move {
            if let Err(e) = runner.run(&registry, &run_id).await {
                tracing::error!(pipeline_id = %run_id, error = %e, "Pipeline runner stopped");
            }
        });

        Ok(id)
    }

    /// Snapshot of a job's stages and its overall state.
    pub fn status(&self, pipeline_id: &str) -> Result<StatusReport> {
        if pipeline_id.is_empty() {
            return Err(PipelineError::InvalidArgument(
                "pipelineId is required".into(),
            ));
        }
        self.registry
            .status(pipeline_id)
            .ok_or_else(|| PipelineError::NotFound(pipeline_id.to_string()))
    }

    /// Ask the job's runner to stop at its next check point.
    ///
    /// Unknown or already finished jobs are accepted without error.
    pub fn cancel(&self, pipeline_id: &str) -> Result<()> {
        if pipeline_id.is_empty() {
            return Err(PipelineError::InvalidArgument(
                "pipelineId is required".into(),
            ));
        }
        if self.registry.mark_cancelled(pipeline_id) {
            tracing::info!(pipeline_id, "Pipeline cancellation requested");
        } else {
            tracing::debug!(pipeline_id, "Cancel ignored: unknown, finished or already cancelled");
        }
        Ok(())
    }

    /// The static stage definitions every job runs through.
    pub fn stages(&self) -> &[StageDefinition] {
        self.registry.definitions()
    }
}
