use thiserror::Error;

/// Errors returned by broker and client creation/teardown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// A broker must have at least one priority level.
    #[error("broker requires at least one priority level")]
    NoPriorityLevels,
    /// Client names identify consumers in logs and show output.
    #[error("client name must not be empty")]
    InvalidName,
    /// The broker still holds live clients or records; drain and delete
    /// clients before destroying it.
    #[error("broker is not empty")]
    NotEmpty,
}

/// Failure to produce an owned copy of a payload. At publish time the event
/// is counted as dropped; during a consumer advance the client's error
/// counter increments and the cursor still moves past the record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not copy payload: {reason}")]
pub struct CopyError {
    pub reason: &'static str,
}
