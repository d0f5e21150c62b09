//! Configuration of the `Server-Timing` middleware.

use crate::{
    SharedString,
    error::{Error, ErrorKind},
    extension::TomlTableExt,
    profiler::CallGroup,
    trace::{MetricName, OverwritePolicy},
};
use toml::Table;

/// Default memory threshold at which the profiler statistics are cleared.
pub const DEFAULT_MAX_PROFILER_MEMORY: usize = 50_000_000;

/// Metrics to be reported and the calls tracked for each of them.
///
/// The configuration is validated eagerly: a metric name which is not a token,
/// a call site which is not a path, or an unknown overwrite behavior is an error
/// raised before any request is served.
#[derive(Debug, Clone)]
pub struct ServerTimingConfig {
    /// Tracked call groups in the order of the output.
    tracked_calls: Vec<(MetricName, CallGroup)>,
    /// Memory threshold in bytes.
    max_profiler_memory: usize,
    /// Overwrite policy for existing metrics.
    overwrite_policy: OverwritePolicy,
}

impl ServerTimingConfig {
    /// Creates a new instance without tracked calls.
    #[inline]
    pub fn new() -> Self {
        Self {
            tracked_calls: Vec::new(),
            max_profiler_memory: DEFAULT_MAX_PROFILER_MEMORY,
            overwrite_policy: OverwritePolicy::default(),
        }
    }

    /// Tracks the call sites for the metric.
    pub fn track<I, S>(&mut self, metric: MetricName, call_sites: I) -> Result<&mut Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<SharedString>,
    {
        if self.tracked_calls.iter().any(|(name, _)| *name == metric) {
            let message = format!("the metric `{metric}` should be tracked only once");
            return Err(Error::with_kind(ErrorKind::InvalidConfig, message));
        }

        let calls = CallGroup::try_from_paths(call_sites)
            .map_err(|err| err.wrap(format!("fail to track calls for the metric `{metric}`")))?;
        self.tracked_calls.push((metric, calls));
        Ok(self)
    }

    /// Sets the memory threshold at which the profiler statistics are cleared.
    #[inline]
    pub fn set_max_profiler_memory(&mut self, max_profiler_memory: usize) -> &mut Self {
        self.max_profiler_memory = max_profiler_memory;
        self
    }

    /// Sets the overwrite policy for existing metrics.
    #[inline]
    pub fn set_overwrite_policy(&mut self, overwrite_policy: OverwritePolicy) -> &mut Self {
        self.overwrite_policy = overwrite_policy;
        self
    }

    /// Loads the config from the `[server-timing]` table.
    ///
    /// ```toml
    /// [server-timing]
    /// max-profiler-memory = 50000000
    /// overwrite-behavior = "replace"
    ///
    /// [[server-timing.metrics]]
    /// name = "db"
    /// description = "Database"
    /// calls = ["app::db::query"]
    /// ```
    pub fn from_toml(config: &Table) -> Result<Self, Error> {
        let mut server_timing = Self::new();
        if let Some(value) = config.get("max-profiler-memory") {
            let Some(max_profiler_memory) = config.get_usize("max-profiler-memory") else {
                let message = format!(
                    "the `max-profiler-memory` field should be a non-negative integer: {value:?}"
                );
                return Err(Error::with_kind(ErrorKind::InvalidConfig, message));
            };
            server_timing.set_max_profiler_memory(max_profiler_memory);
        }
        if let Some(value) = config.get("overwrite-behavior") {
            server_timing.set_overwrite_policy(OverwritePolicy::from_toml(value)?);
        }
        if let Some(metrics) = config.get_array("metrics") {
            for (index, metric) in metrics.iter().enumerate() {
                let Some(metric) = metric.as_table() else {
                    let message = format!("the metric #{index} should be a table");
                    return Err(Error::with_kind(ErrorKind::InvalidConfig, message));
                };
                server_timing
                    .track_table(metric)
                    .map_err(|err| err.wrap(format!("invalid metric #{index}")))?;
            }
        }
        Ok(server_timing)
    }

    fn track_table(&mut self, metric: &Table) -> Result<&mut Self, Error> {
        let Some(name) = metric.get_str("name") else {
            let message = "the `name` field should be a string";
            return Err(Error::with_kind(ErrorKind::InvalidMetricName, message));
        };
        let name = name.to_owned();
        let metric_name = match metric.get_str("description") {
            Some(description) => MetricName::with_description(name, description.to_owned())?,
            None => MetricName::new(name)?,
        };

        let calls = metric
            .get_array("calls")
            .map(Vec::as_slice)
            .unwrap_or_default();
        let mut call_sites = Vec::with_capacity(calls.len());
        for call in calls {
            let Some(call_site) = call.as_str() else {
                let message = format!("the call site `{call:?}` should be a string");
                return Err(Error::with_kind(ErrorKind::InvalidCallSite, message));
            };
            call_sites.push(call_site.to_owned());
        }
        self.track(metric_name, call_sites)
    }

    /// Returns the tracked call groups in the order of the output.
    #[inline]
    pub fn tracked_calls(&self) -> &[(MetricName, CallGroup)] {
        &self.tracked_calls
    }

    /// Returns the memory threshold in bytes.
    #[inline]
    pub fn max_profiler_memory(&self) -> usize {
        self.max_profiler_memory
    }

    /// Returns the overwrite policy.
    #[inline]
    pub fn overwrite_policy(&self) -> OverwritePolicy {
        self.overwrite_policy
    }
}

impl Default for ServerTimingConfig {
    fn default() -> Self {
        Self::new()
    }
}
