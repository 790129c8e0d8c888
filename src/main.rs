use clap::Parser;
use quota_gateway::{
    config::{Args, LogFormat},
    rate_limit::RateLimiter,
    state::AppState,
    store,
    upstream::Upstream,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // parse cli arguments
    let args = Args::parse();
    init_tracing(args.log_format);

    let store = store::open(args.redis_url.as_deref(), args.memory_store)?;
    let limiter = RateLimiter::new(store, args.limits(), args.store_failure_policy);
    let upstream = Upstream::new(
        reqwest::Client::new(),
        args.upstream_url.clone(),
        args.api_key.clone(),
    );
    if !upstream.is_configured() {
        warn!("No upstream API key set, generate requests will return 503");
    }

    // creating shared state
    let state = Arc::new(AppState::new(limiter, upstream));
    let app = quota_gateway::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Gateway running on http://localhost:{}", args.port);
    info!("Forwarding to {}", args.upstream_url);
    info!(
        "Rate limit: {} requests/hour global, {} per client (store failure policy: {:?})",
        args.global_limit, args.user_limit, args.store_failure_policy
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}
