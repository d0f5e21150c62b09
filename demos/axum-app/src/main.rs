//! An axum application which reports the time spent in tracked calls
//! through the `Server-Timing` header.
//!
//! ```sh
//! cargo run -p axum-app -- --env=dev
//! curl -i http://127.0.0.1:6080/
//! curl -i "http://127.0.0.1:6080/sleep?millis=300"
//! ```

use axum::{Router, body::Body, extract::Query, http::Request, routing::get};
use std::{collections::HashMap, fs, path::PathBuf, time::Duration};
use tempo_core::{error::Error, extension::TomlTableExt, profiler::CallProfiler};
use tempo_tower::ServerTimingLayer;
use toml::Table;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{Span, field::Empty};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt};

/// Default listening address.
const DEFAULT_ADDR: &str = "127.0.0.1:6080";

#[tokio::main]
async fn main() -> Result<(), Error> {
    let env = parse_env();
    let config = load_config(&env)?;
    init_tracing(&env, &config)?;

    let server_timing = config.get_table("server-timing").cloned().unwrap_or_default();
    let server_timing_layer = ServerTimingLayer::from_toml(&server_timing)?;
    let app = Router::new()
        .route("/", get(index))
        .route("/sleep", get(sleep))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(server_timing_layer),
        );

    let addr = config
        .get_table("main")
        .and_then(|main| main.get_str("addr"))
        .unwrap_or(DEFAULT_ADDR);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| Error::with_source(format!("fail to bind to `{addr}`"), err))?;
    tracing::info!(env = env.as_str(), addr, "listening for HTTP requests");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Parses the environment from the `--env=` command line argument.
fn parse_env() -> String {
    std::env::args()
        .find_map(|arg| arg.strip_prefix("--env=").map(|env| env.to_owned()))
        .unwrap_or_else(|| "dev".to_owned())
}

/// Loads the `config/config.{env}.toml` file.
fn load_config(env: &str) -> Result<Table, Error> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("config")
        .join(format!("config.{env}.toml"));
    let config = fs::read_to_string(&path).map_err(|err| {
        let path = path.display();
        Error::with_source(format!("fail to read the config file `{path}`"), err)
    })?;
    toml::from_str(&config).map_err(|err| Error::with_source("fail to parse the config", err))
}

/// Initializes the tracing subscriber.
fn init_tracing(env: &str, config: &Table) -> Result<(), Error> {
    let in_dev_mode = env == "dev";
    let mut event_format = if in_dev_mode { "pretty" } else { "json" };
    let mut env_filter = if in_dev_mode {
        "info,tempo_core=debug,tempo_tower=debug,axum_app=debug"
    } else {
        "warn,tempo_core=info,tempo_tower=info,axum_app=info"
    };
    if let Some(config) = config.get_table("tracing") {
        if let Some(format) = config.get_str("format") {
            event_format = format;
        }
        if let Some(filter) = config.get_str("filter") {
            env_filter = filter;
        }
    }

    let env_filter_layer = EnvFilter::builder()
        .parse(env_filter)
        .map_err(|err| Error::with_source("fail to parse the env filter", err))?;
    let fmt_layer = tracing_subscriber::fmt::layer().with_ansi(in_dev_mode);
    let subscriber = tracing_subscriber::registry().with(env_filter_layer);
    let result = if event_format == "json" {
        let json_fmt_layer = fmt_layer.json().with_current_span(true);
        tracing::subscriber::set_global_default(subscriber.with(json_fmt_layer))
    } else {
        tracing::subscriber::set_global_default(subscriber.with(fmt_layer.pretty()))
    };
    result.map_err(|err| Error::with_source("fail to set the default subscriber", err))
}

fn make_span(request: &Request<Body>) -> Span {
    let uri = request.uri();
    tracing::info_span!(
        "HTTP request",
        "http.method" = request.method().as_str(),
        "http.target" = uri.path_and_query().map(|p| p.as_str()),
        "http.response.header.server_timing" = Empty,
    )
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("fail to listen for the shutdown signal: {err}");
    }
    tracing::info!("shutting down");
}

async fn index() -> String {
    let profiler = CallProfiler::shared();
    let users = profiler.track("axum_app::db::query", db::query()).await;
    profiler.track_sync("axum_app::render", || render(&users))
}

async fn sleep(Query(params): Query<HashMap<String, String>>) -> String {
    let millis = params
        .get("millis")
        .and_then(|millis| millis.parse().ok())
        .unwrap_or(100);
    let sleep = tokio::time::sleep(Duration::from_millis(millis));
    CallProfiler::shared().track("axum_app::sleep", sleep).await;
    format!("slept for {millis} ms")
}

fn render(users: &[&str]) -> String {
    format!("users: {}", users.join(", "))
}

mod db {
    use std::time::Duration;

    /// Simulates a database query.
    pub(super) async fn query() -> Vec<&'static str> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        vec!["alice", "bob", "carol"]
    }
}
