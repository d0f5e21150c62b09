use http::{HeaderMap, HeaderName, HeaderValue};
use std::{sync::Arc, time::Duration};
use tempo_core::{
    config::ServerTimingConfig,
    profiler::{CallStats, Profiler, RequestTag},
    trace::{OverwritePolicy, ServerTiming, TimingMetric},
};
use tracing::Span;

/// The `server-timing` header name.
pub const SERVER_TIMING: HeaderName = HeaderName::from_static("server-timing");

/// State shared by the layer and every service it wraps.
pub(crate) struct TimingState {
    /// Validated configuration.
    config: ServerTimingConfig,
    /// Profiler queried at the end of each request.
    profiler: Arc<dyn Profiler>,
}

impl TimingState {
    /// Registers the task-local tag resolver and starts the profiler.
    pub(crate) fn new(config: ServerTimingConfig, profiler: Arc<dyn Profiler>) -> Self {
        profiler.set_tag_resolver(Arc::new(RequestTag::current));
        profiler.start();
        tracing::info!(
            num_metrics = config.tracked_calls().len(),
            max_profiler_memory = config.max_profiler_memory(),
            overwrite_policy = config.overwrite_policy().as_str(),
            "server timing middleware configured"
        );
        Self { config, profiler }
    }

    /// Returns the config.
    #[inline]
    pub(crate) fn config(&self) -> &ServerTimingConfig {
        &self.config
    }

    /// Collects the metrics of the request in the configured order.
    /// Metrics none of whose calls were observed are omitted.
    pub(crate) fn collect_metrics(&self, tag: RequestTag) -> Vec<TimingMetric> {
        self.config
            .tracked_calls()
            .iter()
            .filter_map(|(metric, calls)| {
                let stats = self.profiler.query(tag, calls);
                if stats.is_empty() {
                    return None;
                }

                let duration = stats.iter().map(CallStats::total_time).sum::<Duration>();
                Some(TimingMetric::new(metric.clone(), Some(duration)))
            })
            .collect()
    }

    /// Writes the metrics of the request into the response headers
    /// and clears the profiler statistics if they take too much memory.
    pub(crate) fn finish(&self, tag: RequestTag, headers: &mut HeaderMap) {
        let metrics = self.collect_metrics(tag);
        tracing::debug!(
            tag = %tag,
            num_metrics = metrics.len(),
            "server timing metrics collected"
        );
        if let Some(value) = write_header(headers, &metrics, self.config.overwrite_policy()) {
            Span::current().record("http.response.header.server_timing", value.as_str());
        }

        let memory_usage = self.profiler.memory_usage();
        if memory_usage >= self.config.max_profiler_memory() {
            tracing::debug!(
                memory_usage,
                max_profiler_memory = self.config.max_profiler_memory(),
                "profiler memory threshold reached"
            );
            self.profiler.clear_stats();
        }
    }
}

/// Writes the metrics into the `server-timing` header according to the policy,
/// returning the new header value if the headers have been changed.
///
/// Existing header lines are combined into one list before merging.
/// They are left untouched when the policy is disabled or there is nothing to merge.
pub(crate) fn write_header(
    headers: &mut HeaderMap,
    metrics: &[TimingMetric],
    policy: OverwritePolicy,
) -> Option<String> {
    if metrics.is_empty() {
        return None;
    }

    let value = if headers.contains_key(SERVER_TIMING) {
        if policy == OverwritePolicy::Disabled {
            return None;
        }

        let mut values = Vec::new();
        for value in headers.get_all(SERVER_TIMING) {
            match value.to_str() {
                Ok(value) => values.push(value),
                Err(err) => {
                    tracing::warn!("existing `server-timing` header is not visible ASCII: {err}");
                    return None;
                }
            }
        }

        let mut server_timing = ServerTiming::parse(&values.join(","));
        if server_timing.merge(metrics, policy) == 0 {
            return None;
        }
        server_timing.to_string()
    } else {
        metrics.iter().collect::<ServerTiming>().to_string()
    };
    match HeaderValue::from_str(&value) {
        Ok(header_value) => {
            headers.insert(SERVER_TIMING, header_value);
            Some(value)
        }
        Err(err) => {
            tracing::warn!(
                value = value.as_str(),
                "fail to encode the `server-timing` header: {err}"
            );
            None
        }
    }
}
