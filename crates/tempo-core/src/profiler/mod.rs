//! Call profiling scoped to requests.
//!
//! The [`Profiler`] trait is the narrow capability the middleware relies on.
//! [`CallProfiler`] implements it in-process: downstream code wraps the calls to
//! be measured with [`CallProfiler::track`] or [`CallProfiler::track_sync`], and
//! each sample is recorded under the [`RequestTag`] returned by the tag resolver.

use std::{sync::Arc, time::Duration};

mod call_profiler;
mod call_site;
mod request_tag;

pub use call_profiler::CallProfiler;
pub use call_site::{CallGroup, CallSite};
pub use request_tag::RequestTag;

/// A callback which labels each recorded sample with the current tag.
pub type TagResolver = Arc<dyn Fn() -> RequestTag + Send + Sync>;

/// A process-wide profiler of wall-clock call timings.
pub trait Profiler: Send + Sync {
    /// Starts recording samples using the wall clock.
    fn start(&self);

    /// Stops recording samples. Aggregated statistics are kept.
    fn stop(&self);

    /// Returns `true` if the profiler is recording samples.
    fn is_running(&self) -> bool;

    /// Sets the callback used to tag recorded samples.
    fn set_tag_resolver(&self, resolver: TagResolver);

    /// Returns the aggregated statistics of each call in the group recorded under the tag.
    /// An empty list means that none of the calls has been recorded.
    fn query(&self, tag: RequestTag, calls: &CallGroup) -> Vec<CallStats>;

    /// Returns the estimated memory usage of the statistics in bytes.
    fn memory_usage(&self) -> usize;

    /// Clears all statistics for every tag.
    fn clear_stats(&self);
}

/// Aggregated statistics of one call site under one tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStats {
    /// Call site.
    call_site: String,
    /// Number of completed calls.
    call_count: u64,
    /// Total wall-clock time spent in the calls.
    total_time: Duration,
}

impl CallStats {
    /// Creates a new instance.
    #[inline]
    pub fn new(call_site: impl Into<String>, call_count: u64, total_time: Duration) -> Self {
        Self {
            call_site: call_site.into(),
            call_count,
            total_time,
        }
    }

    /// Returns the call site.
    #[inline]
    pub fn call_site(&self) -> &str {
        &self.call_site
    }

    /// Returns the number of completed calls.
    #[inline]
    pub fn call_count(&self) -> u64 {
        self.call_count
    }

    /// Returns the total time spent in the calls.
    #[inline]
    pub fn total_time(&self) -> Duration {
        self.total_time
    }
}
