//! HTTP server setup and lifecycle.
//!
//! [`router`] builds the axum application over an [`AppState`];
//! [`serve`] binds it to an address and runs until Ctrl-C.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use lookout_core::{LookoutConfig, LookoutError, ReviewConfig};
use lookout_review::github::{GitHubClient, HostingApi};
use lookout_review::llm::{ModelBackend, OllamaClient};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::routes;

/// Builds a hosting client for an access token.
pub type HostingConnector =
    Arc<dyn Fn(&str) -> Result<Arc<dyn HostingApi>, LookoutError> + Send + Sync>;

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState {
    /// Model that writes reviews.
    pub model: Arc<dyn ModelBackend>,
    /// Creates a hosting client for a token.
    pub connect: HostingConnector,
    /// Token used when a request does not carry one.
    pub default_token: Option<String>,
    /// Prompt settings.
    pub review: ReviewConfig,
}

impl AppState {
    /// State backed by GitHub and Ollama as configured.
    ///
    /// # Errors
    ///
    /// Returns [`LookoutError::Config`] if the model client cannot be built.
    pub fn from_config(config: &LookoutConfig) -> Result<Self, LookoutError> {
        let model = Arc::new(OllamaClient::new(&config.model)?);
        let api_url = config.github.api_url.clone();
        let connect: HostingConnector = Arc::new(move |token: &str| {
            let client = GitHubClient::new(token, &api_url)?;
            Ok(Arc::new(client) as Arc<dyn HostingApi>)
        });
        Ok(Self {
            model,
            connect,
            default_token: config.github.resolve_token(None),
            review: config.review.clone(),
        })
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/health", get(routes::health))
        .route("/models", get(routes::models))
        .route("/demo-review", get(routes::demo_review))
        .route("/review", post(routes::review))
        .route("/docs", get(routes::docs))
        .route("/api/docs", get(routes::api_docs))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the HTTP surface on `bind` until Ctrl-C.
///
/// # Errors
///
/// Returns [`LookoutError::Server`] if the address cannot be bound or the
/// server stops with an error.
///
/// # Examples
///
/// ```no_run
/// use lookout_core::LookoutConfig;
///
/// # async fn example() -> Result<(), lookout_core::LookoutError> {
/// let config = LookoutConfig::default();
/// lookout_server::server::serve(&config, "127.0.0.1:8000").await?;
/// # Ok(())
/// # }
/// ```
pub async fn serve(config: &LookoutConfig, bind: &str) -> Result<(), LookoutError> {
    let state = AppState::from_config(config)?;
    if state.default_token.is_none() {
        info!(
            token_env = %config.github.token_env,
            "no GitHub token configured, /review will run in demo mode unless a token is supplied"
        );
    }

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| LookoutError::Server(format!("failed to bind {bind}: {e}")))?;
    let addr = listener
        .local_addr()
        .map_err(|e| LookoutError::Server(e.to_string()))?;
    info!(%addr, model = %config.model.name, "lookout server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| LookoutError::Server(e.to_string()))?;

    info!("lookout server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
