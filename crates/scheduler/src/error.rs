//! Scheduler error types.

use thiserror::Error;

use nightshift_core::{ProviderError, ValidationError};

/// Errors that abort a single start/stop invocation.
///
/// Partial alarm failures are not errors; they are reported on the
/// [`ScheduleReport`](crate::ScheduleReport) alongside the power action.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid tag filter: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl SchedulerError {
    /// Whether an external trigger may retry the same invocation later.
    pub fn is_retryable(&self) -> bool {
        match self {
            SchedulerError::Validation(_) => false,
            SchedulerError::Provider(e) => e.is_retryable(),
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_provider_errors_are_retryable() {
        let validation: SchedulerError = ValidationError::EmptyTagKey.into();
        let transient: SchedulerError = ProviderError::transient("StopInstances", "Throttling").into();
        let permanent: SchedulerError =
            ProviderError::permanent("StopInstances", "UnauthorizedOperation").into();

        assert!(!validation.is_retryable());
        assert!(transient.is_retryable());
        assert!(!permanent.is_retryable());
    }

    #[test]
    fn provider_errors_display_transparently() {
        let err: SchedulerError = ProviderError::transient("DescribeInstances", "timed out").into();
        assert_eq!(
            err.to_string(),
            "transient provider error during DescribeInstances: timed out"
        );
    }
}
