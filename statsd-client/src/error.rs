use std::io;

use thiserror::Error;

use crate::kind::InvalidMetricType;

/// Errors that could occur while submitting a metric.
///
/// A metric that is discarded by sampling is not an error.
#[derive(Debug, Error)]
pub enum Error {
    /// The metric type could not be resolved for the configured protocol.
    #[error(transparent)]
    InvalidMetricType(#[from] InvalidMetricType),

    /// The payload could not be sent.
    #[error("failed to send payload: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns `true` if this error was caused by an invalid metric type.
    pub fn is_invalid_metric_type(&self) -> bool {
        matches!(self, Error::InvalidMetricType(_))
    }
}
