use axum::extract::State;
use axum::response::Redirect;
use axum::Json;
use lookout_core::PrRef;
use lookout_review::demo::{sample_pull_request, DemoReviewer};
use lookout_review::llm::has_model;
use lookout_review::pipeline::{review_diff, ReviewOutcome, ReviewPipeline};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::error::ApiError;
use crate::server::AppState;

/// Body of `POST /review`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    /// Pull request number.
    pub pr_number: u64,
    /// Repository as `owner/repo`.
    pub repo_name: String,
    /// Token to use instead of the server's own.
    #[serde(default)]
    pub github_token: Option<String>,
    /// Review the built-in sample instead of fetching the PR.
    #[serde(default)]
    pub use_demo: bool,
    /// Produce sections without posting them.
    #[serde(default)]
    pub dry_run: bool,
}

/// A review result as returned over HTTP.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    /// Whether the sample diff and canned reviewer were used.
    pub demo_mode: bool,
    /// `complete`, `partial`, `failed`, or `dry-run` when nothing was posted.
    pub status: String,
    /// The run itself.
    #[serde(flatten)]
    pub outcome: ReviewOutcome,
}

impl ReviewResponse {
    fn new(outcome: ReviewOutcome, demo_mode: bool) -> Self {
        let status = outcome
            .posting
            .as_ref()
            .map_or_else(|| "dry-run".to_string(), |r| r.status().to_string());
        Self {
            demo_mode,
            status,
            outcome,
        }
    }
}

/// Service health as reported by `GET /health`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// `healthy` when the model is reachable and pulled, `degraded` otherwise.
    pub status: &'static str,
    /// Always `ok` when the server answers.
    pub api: &'static str,
    /// Whether a default GitHub token is configured.
    pub github_token: bool,
    /// `connected`, or the reason the model server is unusable.
    pub ollama: String,
    /// Configured model name.
    pub model: String,
    /// Whether the configured model is pulled.
    pub model_available: bool,
    /// Server version.
    pub version: &'static str,
}

/// `GET /`: service name, version and endpoint list.
pub async fn index() -> Json<Value> {
    Json(json!({
        "name": "lookout",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "GET /health",
            "models": "GET /models",
            "demoReview": "GET /demo-review",
            "review": "POST /review",
            "docs": "GET /docs",
        }
    }))
}

/// `GET /health`: GitHub token and model server status.
pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let model = state.model.model().to_string();
    let (ollama, model_available) = match state.model.list_models().await {
        Ok(models) => ("connected".to_string(), has_model(&models, &model)),
        Err(e) => (e.to_string(), false),
    };
    Json(HealthReport {
        status: if model_available { "healthy" } else { "degraded" },
        api: "ok",
        github_token: state.default_token.is_some(),
        ollama,
        model,
        model_available,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /models`: models pulled on the model server.
pub async fn models(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let models = state.model.list_models().await?;
    Ok(Json(json!({ "models": models })))
}

/// `GET /demo-review`: canned review of the built-in sample diff.
pub async fn demo_review(State(state): State<AppState>) -> Result<Json<ReviewResponse>, ApiError> {
    let diff = sample_pull_request()?;
    let reviewer = DemoReviewer::for_diff(&diff);
    let outcome = review_diff(&reviewer, &diff, state.review.prompt_char_budget).await?;
    Ok(Json(ReviewResponse::new(outcome, true)))
}

/// `POST /review`: review a pull request, or run in demo mode without a token.
pub async fn review(
    State(state): State<AppState>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<ReviewResponse>, ApiError> {
    let pr = PrRef::from_repository(&req.repo_name, req.pr_number)?;
    let token = req
        .github_token
        .filter(|t| !t.trim().is_empty())
        .or_else(|| state.default_token.clone());

    let token = match token {
        Some(token) if !req.use_demo => token,
        _ => {
            info!(pr = %pr, "reviewing sample diff in demo mode");
            let mut diff = sample_pull_request()?;
            diff.pr = pr;
            let reviewer = DemoReviewer::for_diff(&diff);
            let outcome = review_diff(&reviewer, &diff, state.review.prompt_char_budget).await?;
            return Ok(Json(ReviewResponse::new(outcome, true)));
        }
    };

    let hosting = (state.connect)(&token)?;
    let pipeline = ReviewPipeline::new(hosting, state.model.clone(), &state.review);
    let outcome = pipeline.run(&pr, req.dry_run).await?;
    Ok(Json(ReviewResponse::new(outcome, false)))
}

/// `GET /docs`: JSON description of the endpoints.
pub async fn docs() -> Json<Value> {
    Json(json!({
        "title": "lookout API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            {
                "method": "GET",
                "path": "/health",
                "description": "API status, GitHub token presence, Ollama reachability and model availability",
            },
            {
                "method": "GET",
                "path": "/models",
                "description": "Models reported by the Ollama server",
            },
            {
                "method": "GET",
                "path": "/demo-review",
                "description": "Review of a built-in sample diff; nothing is posted",
            },
            {
                "method": "POST",
                "path": "/review",
                "description": "Review a pull request and post each section as a comment",
                "body": {
                    "prNumber": "integer, required",
                    "repoName": "string owner/repo, required",
                    "githubToken": "string, optional; defaults to the server token",
                    "useDemo": "boolean, optional; review the sample diff instead",
                    "dryRun": "boolean, optional; produce sections without posting",
                },
            },
        ],
        "errors": {
            "400": "invalid request",
            "401": "GitHub token missing or rejected",
            "404": "repository or pull request not found",
            "429": "GitHub rate limit exceeded",
            "502": "GitHub or the model answered with an error",
            "503": "model server unavailable or model not pulled",
            "504": "model did not answer in time",
        },
    }))
}

/// `GET /api/docs`: permanent redirect to `/docs`.
pub async fn api_docs() -> Redirect {
    Redirect::permanent("/docs")
}
