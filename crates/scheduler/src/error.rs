use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("no preparator/executor registered for action `{action}` (step {id})")]
    UnregisteredAction { id: String, action: String },
    #[error("unable to find step with id: {0}")]
    UnknownStep(String),
}
