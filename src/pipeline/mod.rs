mod job;
mod stage;

pub use job::{Job, StatusReport, TransitionRejected};
pub use stage::{DetailItem, Stage, StageDefinition, StageStatus, catalog};
