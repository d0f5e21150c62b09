use super::{MetricName, quote};
use std::{fmt, time::Duration};

/// A metric of the performance timing.
#[derive(Debug, Clone)]
pub struct TimingMetric {
    /// Metric name and description.
    metric: MetricName,
    /// Optional timing duration.
    duration: Option<Duration>,
}

impl TimingMetric {
    /// Creates a new instance.
    #[inline]
    pub fn new(metric: MetricName, duration: Option<Duration>) -> Self {
        Self { metric, duration }
    }

    /// Returns the metric name.
    #[inline]
    pub fn metric(&self) -> &MetricName {
        &self.metric
    }

    /// Returns the name.
    #[inline]
    pub fn name(&self) -> &str {
        self.metric.name()
    }

    /// Returns the description.
    #[inline]
    pub fn description(&self) -> Option<&str> {
        self.metric.description()
    }

    /// Returns the timing duration.
    #[inline]
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Returns the timing duration in milliseconds.
    #[inline]
    pub fn duration_millis(&self) -> Option<f64> {
        self.duration
            .map(|duration| duration.as_secs_f64() * 1000.0)
    }

    /// Returns the `dur` parameter value, which always has three fractional digits.
    #[inline]
    pub fn format_duration(&self) -> Option<String> {
        self.duration_millis().map(|millis| format!("{millis:.3}"))
    }

    /// Returns the list of parameters in the order of `dur` and `desc`.
    /// Values are unquoted.
    pub(crate) fn params(&self) -> Vec<(String, String)> {
        let mut params = Vec::with_capacity(2);
        if let Some(duration) = self.format_duration() {
            params.push(("dur".to_owned(), duration));
        }
        if let Some(description) = self.description() {
            params.push(("desc".to_owned(), description.to_owned()));
        }
        params
    }
}

impl fmt::Display for TimingMetric {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())?;
        if let Some(duration) = self.format_duration() {
            write!(f, ";dur={duration}")?;
        }
        if let Some(description) = self.description() {
            write!(f, ";desc={}", quote(description))?;
        }
        Ok(())
    }
}
