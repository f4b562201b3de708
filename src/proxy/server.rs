//! HTTP server setup and configuration.

use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    routing::{get, post},
    Router,
};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::config::{Config, ModelMap};

/// Clients upload entire conversation histories; the default axum limit
/// is far too small for them.
const MAX_BODY_BYTES: usize = 500 * 1024 * 1024;

/// Shared application state.
///
/// Everything here is read-only per request; no state is shared mutably
/// between in-flight requests.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub models: Arc<ModelMap>,
    pub http_client: Client,
}

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        // OpenAI-compatible endpoints
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/models", get(handlers::list_models))
        .route("/health", get(handlers::health))
        .route("/", get(handlers::root))
        // State and middleware
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Build the shared upstream HTTP client.
///
/// Long timeout for slow reasoning generations; pooled connections are
/// kept alive across requests.
pub fn build_http_client(config: &Config) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(config.upstream.timeout())
        .connect_timeout(Duration::from_secs(10))
        .tcp_keepalive(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .build()
}

/// Run the HTTP server.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let listen_addr = config.server.listen.clone();

    let http_client = build_http_client(&config)?;
    let models = Arc::new(config.model_map());

    let state = AppState {
        config: Arc::new(config),
        models,
        http_client,
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "Starting thinkgate proxy server");

    axum::serve(listener, app).await?;

    Ok(())
}
