//! Estate matcher API entry point.

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{header::HeaderValue, Method};
use tokio::signal;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowHeaders, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use estate_matcher::api::{create_routes, AppState};
use estate_matcher::config::{close_cache, init_optional_cache, init_rental_index, APP_CONFIG};
use estate_matcher::matching::{ImageFingerprinter, MatchingConfig, MatchingEngine};
use estate_matcher::services::ScraperService;

// High-performance memory allocator for non-MSVC targets
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Entry point for the estate matcher API.
#[tokio::main(flavor = "multi_thread")]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "estate_matcher=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Initialize Sentry
    let _guard = if APP_CONFIG.sentry_dsn.is_empty() {
        tracing::warn!("Sentry DSN not configured, error tracking disabled");
        None
    } else {
        Some(sentry::init((
            APP_CONFIG.sentry_dsn.clone(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                environment: Some(APP_CONFIG.environment_name().into()),
                traces_sample_rate: APP_CONFIG.sentry_traces_sample_rate,
                sample_rate: 1.0, // Capture all errors
                ..Default::default()
            },
        )))
    };

    tracing::info!("Starting Real Estate Matching Engine API...");

    // Load the rental index
    let index = match init_rental_index().await {
        Ok(index) => index,
        Err(e) => {
            tracing::error!("Error loading rental index: {}", e);
            std::process::exit(1);
        }
    };

    // Build the matching engine
    let matching_config = MatchingConfig::from_env();
    let fingerprinter = match ImageFingerprinter::new(&matching_config) {
        Ok(fingerprinter) => fingerprinter,
        Err(e) => {
            tracing::error!("Failed to build image client: {}", e);
            std::process::exit(1);
        }
    };
    let engine = MatchingEngine::new(index, matching_config, fingerprinter);

    // Optional scrape cache
    let cache = init_optional_cache().await;

    // Scraper workflows
    let scrapers = match ScraperService::from_config(&APP_CONFIG, cache) {
        Ok(service) => service,
        Err(e) => {
            tracing::error!("Failed to build scraper service: {}", e);
            std::process::exit(1);
        }
    };

    // Create application state
    let state = AppState::new(scrapers, engine)
        .with_top_k(APP_CONFIG.match_top_k, APP_CONFIG.scrape_match_top_k);

    // Configure CORS based on environment
    let cors = build_cors_layer();

    // Configure rate limiting with SmartIpKeyExtractor for better IP detection
    let governor_config = match GovernorConfigBuilder::default()
        .per_second(APP_CONFIG.rate_limit_per_second)
        .burst_size(APP_CONFIG.rate_limit_burst_size)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
    {
        Some(config) => config,
        None => {
            tracing::error!("Invalid rate limiter config: RATE_LIMIT_* must be non-zero");
            std::process::exit(1);
        }
    };

    // Create router with middleware
    // Layer order (bottom to top execution): CORS -> Compression -> Trace -> Rate Limit
    let app = create_routes(state)
        .layer(cors)
        .layer(
            CompressionLayer::new()
                .br(true)
                .gzip(true)
                .zstd(true)
                .quality(tower_http::compression::CompressionLevel::Default),
        )
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_config));

    // Determine server address
    let port = APP_CONFIG.server_port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(
        port = port,
        scrapers_configured = APP_CONFIG.scrapers_configured(),
        rate_limit_per_second = APP_CONFIG.rate_limit_per_second,
        rate_limit_burst = APP_CONFIG.rate_limit_burst_size,
        "Starting server"
    );

    // Create TCP listener
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, "Failed to bind to address: {}", e);
            std::process::exit(1);
        }
    };

    // Run server with graceful shutdown and ConnectInfo for rate limiting
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        tracing::error!("Server error: {}", e);
    }

    // Cleanup
    tracing::info!("Shutting down Real Estate Matching Engine API...");

    close_cache();

    // Flush Sentry events before exit
    if let Some(client) = sentry::Hub::current().client() {
        client.flush(Some(Duration::from_secs(2)));
    }

    tracing::info!("Shutdown complete");
}

/// Builds the CORS layer based on configuration.
///
/// Credentials are allowed for listed origins, so methods and headers mirror
/// the preflight request instead of using a wildcard.
fn build_cors_layer() -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];

    if APP_CONFIG.is_production && APP_CONFIG.cors_origins.trim() == "*" {
        tracing::warn!("CORS_ORIGINS=* is ignored in production");
    }

    if APP_CONFIG.cors_allow_any() {
        tracing::warn!("CORS is configured to allow all origins - not recommended for production");
        return CorsLayer::new()
            .allow_methods(methods)
            .allow_origin(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any);
    }

    let origins: Vec<HeaderValue> = APP_CONFIG
        .cors_origins()
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    tracing::info!(origins = ?origins, "CORS configured with specific origins");
    CorsLayer::new()
        .allow_methods(methods)
        .allow_origin(origins)
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Handles shutdown signals for graceful termination.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        },
    }
}
