use super::{CallGroup, CallStats, Profiler, RequestTag, TagResolver};
use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};
use std::{
    fmt,
    future::Future,
    mem,
    sync::{
        Arc, LazyLock,
        atomic::{AtomicBool, Ordering::Relaxed},
    },
    time::Duration,
};
use tokio::time::Instant;

/// An in-process profiler which aggregates wall-clock timings per tag and call site.
///
/// Calls are measured explicitly:
///
/// ```rust,ignore
/// let profiler = CallProfiler::shared();
/// let users = profiler.track("app::db::query", db.fetch_users()).await;
/// let body = profiler.track_sync("app::render", || render(&users));
/// ```
///
/// The timing of an async call includes the time spent suspended,
/// which is what the wall clock observes from the client side.
pub struct CallProfiler {
    /// Whether samples are recorded.
    running: AtomicBool,
    /// Callback for tagging samples.
    tag_resolver: RwLock<TagResolver>,
    /// Aggregated statistics.
    store: Mutex<Store>,
}

/// Aggregated statistics grouped by tags.
#[derive(Default)]
struct Store {
    /// Records of call sites for each tag.
    buckets: AHashMap<RequestTag, AHashMap<Box<str>, CallRecord>>,
    /// Estimated memory usage in bytes.
    memory_usage: usize,
}

#[derive(Debug, Clone, Copy)]
struct CallRecord {
    /// Number of completed calls.
    call_count: u64,
    /// Total time spent in the calls.
    total_time: Duration,
}

/// Estimated size of a tag bucket.
const BUCKET_SIZE: usize =
    mem::size_of::<RequestTag>() + mem::size_of::<AHashMap<Box<str>, CallRecord>>();

/// Estimated size of a call record, excluding the call site.
const RECORD_SIZE: usize = mem::size_of::<Box<str>>() + mem::size_of::<CallRecord>();

impl CallProfiler {
    /// Creates a new instance which is stopped and tags every sample as untagged.
    pub fn new() -> Self {
        let untagged: TagResolver = Arc::new(|| RequestTag::UNTAGGED);
        Self {
            running: AtomicBool::new(false),
            tag_resolver: RwLock::new(untagged),
            store: Mutex::new(Store::default()),
        }
    }

    /// Returns the process-wide profiler.
    #[inline]
    pub fn shared() -> &'static Arc<CallProfiler> {
        LazyLock::force(&SHARED_PROFILER)
    }

    /// Returns the tag of the current request as seen by the tag resolver.
    #[inline]
    pub fn current_tag(&self) -> RequestTag {
        let resolver = self.tag_resolver.read().clone();
        resolver()
    }

    /// Measures the future from its first poll to its completion
    /// and records the elapsed time for the call site.
    pub async fn track<F: Future>(&self, call_site: &str, future: F) -> F::Output {
        let tag = self.current_tag();
        let started_at = Instant::now();
        let output = future.await;
        self.record_tagged(tag, call_site, started_at.elapsed());
        output
    }

    /// Measures the closure and records the elapsed time for the call site.
    pub fn track_sync<T>(&self, call_site: &str, f: impl FnOnce() -> T) -> T {
        let tag = self.current_tag();
        let started_at = Instant::now();
        let output = f();
        self.record_tagged(tag, call_site, started_at.elapsed());
        output
    }

    /// Records a sample for the call site under the current tag.
    #[inline]
    pub fn record(&self, call_site: &str, elapsed: Duration) {
        self.record_tagged(self.current_tag(), call_site, elapsed);
    }

    /// Records a sample for the call site under the tag.
    /// Samples are dropped while the profiler is stopped.
    pub fn record_tagged(&self, tag: RequestTag, call_site: &str, elapsed: Duration) {
        if !self.is_running() {
            return;
        }

        let mut store = self.store.lock();
        let Store {
            buckets,
            memory_usage,
        } = &mut *store;
        let bucket = buckets.entry(tag).or_insert_with(|| {
            *memory_usage += BUCKET_SIZE;
            AHashMap::new()
        });
        if let Some(record) = bucket.get_mut(call_site) {
            record.call_count += 1;
            record.total_time += elapsed;
        } else {
            *memory_usage += RECORD_SIZE + call_site.len();
            bucket.insert(
                call_site.into(),
                CallRecord {
                    call_count: 1,
                    total_time: elapsed,
                },
            );
        }
    }
}

impl Profiler for CallProfiler {
    fn start(&self) {
        if !self.running.swap(true, Relaxed) {
            tracing::info!(clock = "wall", "call profiler started");
        }
    }

    fn stop(&self) {
        if self.running.swap(false, Relaxed) {
            tracing::info!("call profiler stopped");
        }
    }

    #[inline]
    fn is_running(&self) -> bool {
        self.running.load(Relaxed)
    }

    #[inline]
    fn set_tag_resolver(&self, resolver: TagResolver) {
        *self.tag_resolver.write() = resolver;
    }

    fn query(&self, tag: RequestTag, calls: &CallGroup) -> Vec<CallStats> {
        let store = self.store.lock();
        let Some(bucket) = store.buckets.get(&tag) else {
            return Vec::new();
        };
        let mut stats = bucket
            .iter()
            .filter(|(call_site, _)| calls.contains(call_site))
            .map(|(call_site, record)| {
                CallStats::new(&**call_site, record.call_count, record.total_time)
            })
            .collect::<Vec<_>>();
        stats.sort_by(|a, b| a.call_site().cmp(b.call_site()));
        stats
    }

    #[inline]
    fn memory_usage(&self) -> usize {
        self.store.lock().memory_usage
    }

    fn clear_stats(&self) {
        let mut store = self.store.lock();
        let num_tags = store.buckets.len();
        let memory_usage = mem::take(&mut store.memory_usage);
        store.buckets.clear();
        tracing::info!(num_tags, memory_usage, "call profiler statistics cleared");
    }
}

impl Default for CallProfiler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallProfiler {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CallProfiler")
            .field("running", &self.is_running())
            .field("memory_usage", &self.memory_usage())
            .finish()
    }
}

/// Shared profiler.
static SHARED_PROFILER: LazyLock<Arc<CallProfiler>> =
    LazyLock::new(|| Arc::new(CallProfiler::new()));
