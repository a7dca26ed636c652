use thiserror::Error;

/// Everything that can stop a batch evaluation.  Predicate failures
/// are not in this list: they are reported per segment, and never
/// abort the batch.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// The configuration is well-formed but unusable.
    #[error("invalid evaluator configuration: {0}")]
    InvalidConfig(String),

    /// The configuration could not be parsed.
    #[error("failed to parse evaluator configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// A timely worker could not be started, or panicked.
    #[error("timely worker failed: {0}")]
    Worker(String),
}
