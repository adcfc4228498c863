use thiserror::Error;

use crate::pipeline::TransitionRejected;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Pipeline not found: {0}")]
    NotFound(String),

    #[error("Stage transition rejected: {0}")]
    Transition(#[from] TransitionRejected),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            PipelineError::InvalidArgument("theme is required".into()).to_string(),
            "Invalid argument: theme is required"
        );
        assert_eq!(
            PipelineError::NotFound("abc".into()).to_string(),
            "Pipeline not found: abc"
        );
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PipelineError>();
    }
}
