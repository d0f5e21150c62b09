use crate::{service::ServerTimingService, timing::TimingState};
use std::{fmt, sync::Arc};
use tempo_core::{
    config::ServerTimingConfig,
    error::Error,
    profiler::{CallProfiler, Profiler},
};
use toml::Table;
use tower::Layer;

/// A layer which reports the timings of tracked calls in the `server-timing` header.
///
/// Constructing the layer configures the profiler: the tag resolver is set to
/// [`RequestTag::current`](tempo_core::profiler::RequestTag::current)
/// and the profiler is started. Cloning the layer shares the same state.
#[derive(Clone)]
pub struct ServerTimingLayer {
    /// Shared state.
    state: Arc<TimingState>,
}

impl ServerTimingLayer {
    /// Creates a new instance using the shared [`CallProfiler`].
    #[inline]
    pub fn new(config: ServerTimingConfig) -> Self {
        let profiler: Arc<dyn Profiler> = CallProfiler::shared().clone();
        Self::with_profiler(config, profiler)
    }

    /// Creates a new instance using a custom profiler.
    #[inline]
    pub fn with_profiler(config: ServerTimingConfig, profiler: Arc<dyn Profiler>) -> Self {
        Self {
            state: Arc::new(TimingState::new(config, profiler)),
        }
    }

    /// Creates a new instance from the `[server-timing]` table
    /// using the shared [`CallProfiler`].
    pub fn from_toml(config: &Table) -> Result<Self, Error> {
        let config = ServerTimingConfig::from_toml(config)
            .map_err(|err| err.wrap("invalid `server-timing` config"))?;
        Ok(Self::new(config))
    }

    /// Returns the config.
    #[inline]
    pub fn config(&self) -> &ServerTimingConfig {
        self.state.config()
    }
}

impl<S> Layer<S> for ServerTimingLayer {
    type Service = ServerTimingService<S>;

    #[inline]
    fn layer(&self, inner: S) -> Self::Service {
        ServerTimingService::new(inner, self.state.clone())
    }
}

impl fmt::Debug for ServerTimingLayer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ServerTimingLayer")
            .field("config", self.config())
            .finish()
    }
}
