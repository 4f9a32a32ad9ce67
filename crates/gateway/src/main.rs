//! Audience Forge API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Rate limiting
//! - Request routing
//! - Observability (logging, metrics, tracing)

mod handlers;
mod middleware;

use audience_common::{
    config::{AppConfig, ObservabilityConfig},
    extraction::{create_extractor, Extractor},
    index::{create_index, SearchIndex},
    metrics::{self, EXTRACTION_BUCKETS, INDEX_BUCKETS},
    VERSION,
};
use audience_reconcile::{AudiencePipeline, FieldMapping};
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::oneshot;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::middleware::{metrics::track_metrics, rate_limit::{rate_limit_middleware, RateLimit}};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub index: Arc<dyn SearchIndex>,
    pub pipeline: Arc<AudiencePipeline>,
    pub fields: FieldMapping,
}

impl AppState {
    pub fn new(config: AppConfig, index: Arc<dyn SearchIndex>, extractor: Arc<dyn Extractor>) -> Self {
        let pipeline = AudiencePipeline::new(extractor, index.clone(), &config);
        let fields = FieldMapping::new(config.index.exact_suffix.clone());

        Self {
            config: Arc::new(config),
            index,
            pipeline: Arc::new(pipeline),
            fields,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration; APP_CONFIG names a single file instead of the layers
    let config = match std::env::var("APP_CONFIG") {
        Ok(path) => AppConfig::from_file(&path)?,
        Err(_) => AppConfig::load()?,
    };

    // Initialize tracing
    init_tracing(&config.observability);

    info!(
        service = %config.observability.service_name,
        version = VERSION,
        "Starting Audience Forge API Gateway"
    );

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .set_buckets_for_metric(
                Matcher::Suffix("index_query_duration_seconds".to_string()),
                INDEX_BUCKETS,
            )?
            .set_buckets_for_metric(
                Matcher::Suffix("extraction_duration_seconds".to_string()),
                EXTRACTION_BUCKETS,
            )?
            .install()?;
        info!("Metrics exporter listening on {}", addr);
    }
    metrics::register_metrics();

    // Initialize collaborators
    let index = create_index(&config.index)?;
    info!(backend = index.backend(), url = %config.index.url, "Search index client ready");

    let extractor = create_extractor(&config.extraction)?;
    info!(model = extractor.model_name(), "Candidate extractor ready");

    // Create app state
    let host = config.server.host.clone();
    let port = config.server.port;
    let drain = config.shutdown_timeout();
    let state = AppState::new(config, index, extractor);

    // Build the router
    let app = create_router(state);

    // Start the server
    let listener = TcpListener::bind((host.as_str(), port)).await?;
    info!("Listening on {}", listener.local_addr()?);

    serve(listener, app, shutdown_signal(), drain).await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Serve until `signal` fires, then give in-flight requests `drain` to finish
async fn serve<S>(listener: TcpListener, app: Router, signal: S, drain: Duration) -> std::io::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            let _ = signalled_tx.send(());
        })
        .into_future();

    let deadline = async move {
        match signalled_rx.await {
            Ok(()) => tokio::time::sleep(drain).await,
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = server => result,
        _ = deadline => {
            warn!(drain_secs = drain.as_secs_f64(), "Shutdown drain timed out, dropping in-flight requests");
            Ok(())
        }
    }
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let mut api_routes = Router::new()
        // Probes
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Reconciliation endpoints
        .route("/reconcile", post(handlers::reconcile::reconcile))
        .route("/compile", post(handlers::compile::compile_rules))
        .route("/audience", post(handlers::audience::build_audience));

    if state.config.rate_limit.enabled {
        let limit = RateLimit::new(&state.config.rate_limit);
        api_routes = api_routes.route_layer(axum::middleware::from_fn_with_state(
            limit,
            rate_limit_middleware,
        ));
    }
    let api_routes = api_routes.route_layer(axum::middleware::from_fn(track_metrics));

    // Compose the app
    Router::new()
        .nest("/v2", api_routes)
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
