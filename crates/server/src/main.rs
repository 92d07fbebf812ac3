use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use subway_transit::prelude::*;
use tracing_subscriber::EnvFilter;

mod routes;

#[derive(Parser, Debug)]
#[command(
    name = "subway-server",
    author,
    version,
    about = "Serve subway arrivals, alerts and nearby stations as JSON",
    long_about = "Loads the static station and line dataset, then answers station, line and \
                  nearby-station requests. Realtime feeds are fetched on demand, cached \
                  briefly, and reported as unavailable when an upstream group fails."
)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Station and line dataset JSON covering the whole network
    #[arg(short, long, env = "SUBWAY_DATASET")]
    dataset: PathBuf,

    /// Base URL of the realtime feed endpoints
    #[arg(long, default_value = MTA_FEED_BASE_URL)]
    feed_base_url: String,

    /// Access token sent with every feed request
    #[arg(long, env = "MTA_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Seconds a decoded feed is reused across requests
    #[arg(long, default_value_t = 20)]
    cache_ttl_secs: u64,

    /// Per-feed fetch timeout in milliseconds
    #[arg(long, default_value_t = 3000)]
    fetch_timeout_ms: u64,

    /// Overall feed deadline per request in milliseconds
    #[arg(long, default_value_t = 4000)]
    deadline_ms: u64,

    /// Maximum number of stations returned by nearby queries
    #[arg(long, default_value_t = 8)]
    nearby_limit: usize,

    /// Keep only the soonest N arrivals per line
    #[arg(long)]
    max_per_line: Option<usize>,

    /// Verbose output (show debug messages)
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn policy(&self) -> Result<AggregationPolicy> {
        let policy = AggregationPolicy {
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
            request_deadline: Duration::from_millis(self.deadline_ms),
            nearby_limit: self.nearby_limit,
            arrivals: ArrivalPolicy {
                max_per_line: self.max_per_line,
            },
            ..AggregationPolicy::default()
        };

        if policy.request_deadline.is_zero() || policy.fetch_timeout.is_zero() {
            bail!("Feed timeouts must be positive");
        }
        if policy.nearby_limit == 0 {
            bail!("--nearby-limit must be at least 1");
        }
        Ok(policy)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let policy = args.policy()?;

    let store = StaticReferenceStore::from_path(&args.dataset)
        .with_context(|| format!("Failed to load dataset {}", args.dataset.display()))?;

    let registry = FeedRegistry::mta(&args.feed_base_url);
    let missing = store.missing_lines(registry.lines());
    if !missing.is_empty() {
        let codes: Vec<&str> = missing.iter().map(|code| code.as_str()).collect();
        tracing::warn!(lines = ?codes, "dataset lacks lines served by the feeds; their stations will not resolve");
    }

    if args.api_key.is_none() {
        tracing::warn!("no feed API key configured; upstream may reject requests");
    }
    let source = HttpFeedSource::new(args.api_key.clone()).context("Failed to create feed client")?;

    let context = TransitContext::new(
        Arc::new(store),
        registry,
        Arc::new(source),
        policy,
    );

    let app = routes::create_router(Arc::new(context));

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
