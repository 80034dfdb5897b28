use std::{fmt, str::FromStr};

use thiserror::Error;

/// A metric type token could not be resolved to a wire code.
///
/// This indicates a programming mistake at the call site: either the token names no known metric type at all, or the
/// metric type is not carried by the configured [`Protocol`][crate::Protocol].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("metric type '{token}' is invalid")]
pub struct InvalidMetricType {
    token: String,
}

impl InvalidMetricType {
    pub(crate) fn new<S: Into<String>>(token: S) -> Self {
        InvalidMetricType { token: token.into() }
    }

    /// Returns the offending type token.
    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Metric type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricType {
    /// A signed delta applied to a monotonic count.
    Counter,

    /// A duration, in milliseconds.
    ///
    /// Collectors that speak the framed protocol call this a histogram.
    Timing,

    /// An instantaneous value that replaces the previous one.
    Gauge,

    /// An event rate counter.
    Meter,

    /// A raw absolute reading, distinct from a gauge.
    MeterReader,
}

impl MetricType {
    /// Returns the canonical name of this metric type.
    pub const fn as_str(self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Timing => "timing",
            MetricType::Gauge => "gauge",
            MetricType::Meter => "meter",
            MetricType::MeterReader => "meter_reader",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = InvalidMetricType;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "counter" | "c" => Ok(MetricType::Counter),
            "timing" | "ms" | "histogram" | "h" => Ok(MetricType::Timing),
            "gauge" | "g" => Ok(MetricType::Gauge),
            "meter" | "m" => Ok(MetricType::Meter),
            "meter_reader" | "mr" => Ok(MetricType::MeterReader),
            _ => Err(InvalidMetricType::new(token)),
        }
    }
}

/// Conversion into a [`MetricType`].
///
/// Submission paths accept either a `MetricType` or a string token naming one, such as `"counter"` or `"mr"`.
pub trait IntoMetricType {
    /// Resolves `self` to a metric type.
    ///
    /// # Errors
    ///
    /// If the value does not name a known metric type, an error is returned carrying the offending token.
    fn into_metric_type(self) -> Result<MetricType, InvalidMetricType>;
}

impl IntoMetricType for MetricType {
    fn into_metric_type(self) -> Result<MetricType, InvalidMetricType> {
        Ok(self)
    }
}

impl IntoMetricType for &str {
    fn into_metric_type(self) -> Result<MetricType, InvalidMetricType> {
        self.parse()
    }
}

impl IntoMetricType for &String {
    fn into_metric_type(self) -> Result<MetricType, InvalidMetricType> {
        self.parse()
    }
}
