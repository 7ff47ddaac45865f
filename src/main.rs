use std::error::Error;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use tours_backend::{
    AppState, build_router,
    config::Config,
    mail::{LogMailer, ResetMailer, WebhookMailer},
    middleware::RateLimiter,
    store::{DocumentStore, MemoryStore, PgDocumentStore},
};
#[cfg(debug_assertions)]
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn DocumentStore> = match &config.database_url {
        Some(url) => Arc::new(PgDocumentStore::connect(url).await?),
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let mailer: Arc<dyn ResetMailer> = match &config.mail_webhook_url {
        Some(endpoint) => Arc::new(WebhookMailer::new(endpoint.clone())),
        None => Arc::new(LogMailer::new(config.mail_log_links)),
    };

    let rate_limiter = match &config.redis_url {
        Some(url) => Some(Arc::new(RateLimiter::new(redis::Client::open(url.as_str())?, &config))),
        None => {
            tracing::info!("REDIS_URL not set, rate limiting disabled");
            None
        }
    };

    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );

    let state = AppState::new(config, store, mailer).await?;
    let router = build_router(state, rate_limiter);

    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(CorsLayer::permissive())
    };

    tracing::info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
