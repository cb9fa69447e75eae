use thiserror::Error;

/// Failures raised while aggregating history or projecting it forward.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("monthly delta series is empty; nothing to resample")]
    EmptyDeltas,
    #[error("invalid projection config: {0}")]
    InvalidConfig(String),
    #[error("invalid condition: {0}")]
    InvalidCondition(String),
}
