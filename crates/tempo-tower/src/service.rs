use crate::timing::TimingState;
use http::{Request, Response};
use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, ready},
};
use tempo_core::profiler::RequestTag;
use tokio::task::futures::TaskLocalFuture;
use tower::Service;

/// A middleware service which tags each request and reports its call timings.
///
/// Created by [`ServerTimingLayer`](crate::ServerTimingLayer).
pub struct ServerTimingService<S> {
    /// Inner service.
    inner: S,
    /// Shared state.
    state: Arc<TimingState>,
}

impl<S> ServerTimingService<S> {
    /// Creates a new instance.
    #[inline]
    pub(crate) fn new(inner: S, state: Arc<TimingState>) -> Self {
        Self { inner, state }
    }

    /// Returns a reference to the inner service.
    #[inline]
    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S: Clone> Clone for ServerTimingService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            state: self.state.clone(),
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for ServerTimingService<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ServerTimingService")
            .field("inner", &self.inner)
            .finish()
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for ServerTimingService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    #[inline]
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let tag = RequestTag::next();
        let future = tag.sync_scope(|| self.inner.call(req));
        ResponseFuture {
            inner: Box::pin(tag.scope(future)),
            tag,
            state: self.state.clone(),
        }
    }
}

/// Response future of [`ServerTimingService`].
///
/// The inner future is polled with the request tag in scope.
/// Errors are passed through without touching anything.
pub struct ResponseFuture<F> {
    /// Inner future.
    inner: Pin<Box<TaskLocalFuture<RequestTag, F>>>,
    /// Tag of the request.
    tag: RequestTag,
    /// Shared state.
    state: Arc<TimingState>,
}

impl<F, ResBody, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut res = ready!(this.inner.as_mut().poll(cx))?;
        this.state.finish(this.tag, res.headers_mut());
        Poll::Ready(Ok(res))
    }
}

impl<F> fmt::Debug for ResponseFuture<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ResponseFuture")
            .field("tag", &self.tag)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{SERVER_TIMING, ServerTimingLayer};
    use futures::future;
    use http::{HeaderValue, Request, Response};
    use std::{convert::Infallible, sync::Arc, time::Duration};
    use tempo_core::{
        config::ServerTimingConfig,
        profiler::{CallGroup, CallProfiler, CallStats, Profiler, RequestTag, TagResolver},
        trace::{MetricName, OverwritePolicy, ServerTiming},
    };
    use tower::{Layer, ServiceExt, service_fn};

    /// A profiler which reports fixed timings for every tag.
    struct FixedProfiler;

    impl Profiler for FixedProfiler {
        fn start(&self) {}

        fn stop(&self) {}

        fn is_running(&self) -> bool {
            true
        }

        fn set_tag_resolver(&self, _resolver: TagResolver) {}

        fn query(&self, _tag: RequestTag, calls: &CallGroup) -> Vec<CallStats> {
            [("app::a", 10), ("app::b", 20)]
                .into_iter()
                .filter(|(call_site, _)| calls.contains(call_site))
                .map(|(call_site, millis)| {
                    CallStats::new(call_site, 1, Duration::from_millis(millis))
                })
                .collect()
        }

        fn memory_usage(&self) -> usize {
            0
        }

        fn clear_stats(&self) {}
    }

    fn config(metrics: &[(&'static str, &'static str)]) -> ServerTimingConfig {
        let mut config = ServerTimingConfig::new();
        for &(name, call_site) in metrics {
            config
                .track(MetricName::new(name).unwrap(), [call_site])
                .unwrap();
        }
        config
    }

    fn new_profiler() -> Arc<CallProfiler> {
        Arc::new(CallProfiler::new())
    }

    #[tokio::test]
    async fn it_reports_metrics_in_config_order() {
        let config = config(&[("a", "app::a"), ("b", "app::b"), ("nocall", "app::nocall")]);
        let layer = ServerTimingLayer::with_profiler(config, Arc::new(FixedProfiler));
        let service = layer.layer(service_fn(|_req: Request<()>| async {
            Ok::<_, Infallible>(Response::new(()))
        }));
        let res = service.oneshot(Request::new(())).await.unwrap();
        assert_eq!(res.headers()[SERVER_TIMING], "a;dur=10.000,b;dur=20.000");
    }

    #[tokio::test]
    async fn it_omits_header_without_observed_calls() {
        let profiler = new_profiler();
        let config = config(&[("nocall", "app::nocall")]);
        let layer = ServerTimingLayer::with_profiler(config, profiler.clone());
        let handler = {
            let profiler = profiler.clone();
            service_fn(move |_req: Request<()>| {
                profiler.record("app::render", Duration::from_millis(1));
                future::ready(Ok::<_, Infallible>(Response::new(())))
            })
        };
        let res = layer.layer(handler).oneshot(Request::new(())).await.unwrap();
        assert!(!res.headers().contains_key(SERVER_TIMING));
    }

    #[tokio::test(start_paused = true)]
    async fn it_isolates_concurrent_requests() {
        let profiler = new_profiler();
        let config = config(&[("sleep", "app::sleep")]);
        let layer = ServerTimingLayer::with_profiler(config, profiler.clone());
        let service = layer.layer(service_fn(move |req: Request<u64>| {
            let profiler = profiler.clone();
            async move {
                let sleep = tokio::time::sleep(Duration::from_millis(*req.body()));
                profiler.track("app::sleep", sleep).await;
                Ok::<_, Infallible>(Response::new(()))
            }
        }));

        let (fast, slow) = tokio::join!(
            service.clone().oneshot(Request::new(100)),
            service.clone().oneshot(Request::new(300)),
        );
        let duration = |res: Response<()>| {
            let value = res.headers()[SERVER_TIMING].to_str().unwrap().to_owned();
            let server_timing = ServerTiming::parse(&value);
            server_timing
                .get_param("sleep", "dur")
                .unwrap()
                .parse::<f64>()
                .unwrap()
        };
        let fast = duration(fast.unwrap());
        let slow = duration(slow.unwrap());
        assert!((100.0..300.0).contains(&fast), "{fast}");
        assert!((300.0..400.0).contains(&slow), "{slow}");
    }

    #[tokio::test]
    async fn it_merges_existing_header_by_policy() {
        let cases = [
            (OverwritePolicy::Disabled, "a;desc=\"x\""),
            (OverwritePolicy::Retain, "a;desc=\"x\""),
            (OverwritePolicy::Replace, "a;dur=10.000"),
        ];
        for (policy, expected) in cases {
            let mut config = config(&[("a", "app::a")]);
            config.set_overwrite_policy(policy);
            let layer = ServerTimingLayer::with_profiler(config, Arc::new(FixedProfiler));
            let service = layer.layer(service_fn(|_req: Request<()>| async {
                let mut res = Response::new(());
                res.headers_mut()
                    .insert(SERVER_TIMING, HeaderValue::from_static("a;desc=\"x\""));
                Ok::<_, Infallible>(res)
            }));
            let res = service.oneshot(Request::new(())).await.unwrap();
            assert_eq!(res.headers()[SERVER_TIMING], expected, "{policy}");
        }
    }

    #[tokio::test]
    async fn it_clears_stats_over_memory_threshold() {
        let profiler = new_profiler();
        let mut config = config(&[("render", "app::render")]);
        config.set_max_profiler_memory(1);
        let layer = ServerTimingLayer::with_profiler(config, profiler.clone());
        let handler = {
            let profiler = profiler.clone();
            service_fn(move |_req: Request<()>| {
                profiler.track_sync("app::render", || ());
                future::ready(Ok::<_, Infallible>(Response::new(())))
            })
        };
        let res = layer.layer(handler).oneshot(Request::new(())).await.unwrap();
        assert!(res.headers().contains_key(SERVER_TIMING));
        assert_eq!(profiler.memory_usage(), 0);
    }

    #[tokio::test]
    async fn it_passes_errors_through() {
        let profiler = new_profiler();
        let layer = ServerTimingLayer::with_profiler(config(&[("a", "app::a")]), profiler);
        let service = layer.layer(service_fn(|_req: Request<()>| async {
            Err::<Response<()>, _>("downstream failure")
        }));
        let err = service.oneshot(Request::new(())).await.unwrap_err();
        assert_eq!(err, "downstream failure");
    }
}
