use std::{
    fmt,
    future::Future,
    sync::atomic::{AtomicU64, Ordering::Relaxed},
};
use tokio::task::futures::TaskLocalFuture;

tokio::task_local! {
    /// Tag of the request which is being handled by the current task.
    static CURRENT_TAG: RequestTag;
}

/// An opaque identifier which scopes profiler samples to one request.
///
/// Tags are allocated from a process-wide counter, so two requests in flight
/// never share a tag. The tag of the running request is stored in task-local
/// storage: concurrent requests interleaved on the same worker thread each observe
/// their own tag, and tasks spawned by a request are not tagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestTag(u64);

impl RequestTag {
    /// The tag of samples recorded outside of any request.
    pub const UNTAGGED: Self = Self(0);

    /// Allocates a new tag.
    #[inline]
    pub fn next() -> Self {
        Self(NEXT_TAG.fetch_add(1, Relaxed))
    }

    /// Returns the tag of the request handled by the current task,
    /// or [`UNTAGGED`](Self::UNTAGGED) outside of a request scope.
    #[inline]
    pub fn current() -> Self {
        CURRENT_TAG.try_with(|tag| *tag).unwrap_or(Self::UNTAGGED)
    }

    /// Runs the future with `self` as the current tag.
    #[inline]
    pub fn scope<F: Future>(self, future: F) -> TaskLocalFuture<RequestTag, F> {
        CURRENT_TAG.scope(self, future)
    }

    /// Runs the closure with `self` as the current tag.
    #[inline]
    pub fn sync_scope<T>(self, f: impl FnOnce() -> T) -> T {
        CURRENT_TAG.sync_scope(self, f)
    }

    /// Returns the tag as `u64`.
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns `true` if it is the untagged bucket.
    #[inline]
    pub fn is_untagged(self) -> bool {
        self == Self::UNTAGGED
    }
}

impl fmt::Display for RequestTag {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// Counter for request tags. Zero is reserved for untagged samples.
static NEXT_TAG: AtomicU64 = AtomicU64::new(1);

#[cfg(test)]
mod tests {
    use super::RequestTag;
    use std::time::Duration;

    #[test]
    fn it_allocates_distinct_tags() {
        let tag = RequestTag::next();
        let next_tag = RequestTag::next();
        assert_ne!(tag, next_tag);
        assert!(!tag.is_untagged());
        assert!(RequestTag::current().is_untagged());
        assert_eq!(tag.sync_scope(RequestTag::current), tag);
    }

    #[tokio::test(start_paused = true)]
    async fn it_isolates_interleaved_tasks() {
        let observe = |tag: RequestTag, millis| {
            tag.scope(async move {
                let mut observed = Vec::new();
                for _ in 0..3 {
                    observed.push(RequestTag::current());
                    tokio::time::sleep(Duration::from_millis(millis)).await;
                }
                observed.push(RequestTag::current());
                observed
            })
        };
        let (a, b) = (RequestTag::next(), RequestTag::next());
        let (observed_a, observed_b) = tokio::join!(observe(a, 10), observe(b, 15));
        assert!(observed_a.iter().all(|tag| *tag == a));
        assert!(observed_b.iter().all(|tag| *tag == b));
        assert!(RequestTag::current().is_untagged());
    }
}
