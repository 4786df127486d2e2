use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use lookout_core::{LookoutError, PrRef, PullRequestDiff, ReviewConfig};
use lookout_review::github::HostingApi;
use lookout_review::llm::ModelBackend;
use lookout_server::{router, AppState, HostingConnector};
use serde_json::{json, Value};
use tower::ServiceExt;

struct FakeModel {
    available: bool,
}

#[async_trait]
impl ModelBackend for FakeModel {
    fn model(&self) -> &str {
        "llama3.2"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, LookoutError> {
        if !self.available {
            return Err(LookoutError::ModelUnavailable("connection refused".into()));
        }
        Ok("Summary:\nFine.\nIssues Found:\n- none\nSuggestions:\n- ship it".into())
    }

    async fn list_models(&self) -> Result<Vec<String>, LookoutError> {
        if self.available {
            Ok(vec!["llama3.2:latest".into(), "mistral:7b".into()])
        } else {
            Err(LookoutError::ModelUnavailable("connection refused".into()))
        }
    }
}

#[derive(Default)]
struct FakeHosting {
    posts: Mutex<Vec<String>>,
}

#[async_trait]
impl HostingApi for FakeHosting {
    async fn fetch_pull_request(&self, pr: &PrRef) -> Result<PullRequestDiff, LookoutError> {
        if pr.number == 404 {
            return Err(LookoutError::NotFound(format!("pull request {pr}")));
        }
        Ok(PullRequestDiff {
            pr: pr.clone(),
            title: "Real PR".into(),
            body: None,
            files: vec![],
        })
    }

    async fn post_comment(&self, _pr: &PrRef, body: &str) -> Result<(), LookoutError> {
        self.posts.lock().unwrap().push(body.to_string());
        Ok(())
    }
}

struct Server {
    app: Router,
    hosting: Arc<FakeHosting>,
    tokens: Arc<Mutex<Vec<String>>>,
}

impl Server {
    fn init(model_available: bool, default_token: Option<&str>) -> Self {
        let hosting = Arc::new(FakeHosting::default());
        let tokens = Arc::new(Mutex::new(Vec::new()));

        let connect: HostingConnector = {
            let hosting = hosting.clone();
            let tokens = tokens.clone();
            Arc::new(move |token: &str| {
                tokens.lock().unwrap().push(token.to_string());
                Ok(hosting.clone() as Arc<dyn HostingApi>)
            })
        };

        let state = AppState {
            model: Arc::new(FakeModel {
                available: model_available,
            }),
            connect,
            default_token: default_token.map(str::to_string),
            review: ReviewConfig::default(),
        };
        Self {
            app: router(state),
            hosting,
            tokens,
        }
    }

    async fn get(&self, uri: &str) -> Response<Body> {
        self.app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn post_json(&self, uri: &str, body: Value) -> Response<Body> {
        self.app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn index_lists_endpoints() {
    let server = Server::init(true, None);
    let response = server.get("/").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["endpoints"]["review"], "POST /review");
}

#[tokio::test]
async fn health_reports_model_and_token() {
    let server = Server::init(true, Some("ghp_test"));
    let body = json_body(server.get("/health").await).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["api"], "ok");
    assert_eq!(body["githubToken"], true);
    assert_eq!(body["ollama"], "connected");
    assert_eq!(body["modelAvailable"], true);
}

#[tokio::test]
async fn health_is_degraded_without_model_server() {
    let server = Server::init(false, None);
    let response = server.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["githubToken"], false);
    assert!(body["ollama"].as_str().unwrap().contains("connection refused"));
}

#[tokio::test]
async fn models_lists_pulled_models() {
    let server = Server::init(true, None);
    let body = json_body(server.get("/models").await).await;
    assert_eq!(body["models"], json!(["llama3.2:latest", "mistral:7b"]));
}

#[tokio::test]
async fn models_unavailable_is_503() {
    let server = Server::init(false, None);
    let response = server.get("/models").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["error"]["stage"], "model");
}

#[tokio::test]
async fn demo_review_uses_sample_diff() {
    // The canned reviewer works even when the model server is down.
    let server = Server::init(false, None);
    let response = server.get("/demo-review").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["demoMode"], true);
    assert_eq!(body["status"], "dry-run");
    assert_eq!(body["pr"]["owner"], "demo");
    let labels: Vec<_> = body["sections"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["label"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(labels, vec!["summary", "issuesFound", "suggestions"]);
}

#[tokio::test]
async fn review_without_token_falls_into_demo_mode() {
    let server = Server::init(true, None);
    let response = server
        .post_json("/review", json!({ "prNumber": 5, "repoName": "octocat/hello" }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["demoMode"], true);
    assert_eq!(body["pr"]["number"], 5);
    assert!(server.tokens.lock().unwrap().is_empty());
    assert!(server.hosting.posts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn review_posts_sections_with_request_token() {
    let server = Server::init(true, Some("server-token"));
    let response = server
        .post_json(
            "/review",
            json!({ "prNumber": 5, "repoName": "octocat/hello", "githubToken": "request-token" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["demoMode"], false);
    assert_eq!(body["status"], "complete");
    assert_eq!(body["title"], "Real PR");
    assert_eq!(*server.tokens.lock().unwrap(), vec!["request-token".to_string()]);
    assert_eq!(server.hosting.posts.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn review_dry_run_posts_nothing() {
    let server = Server::init(true, Some("server-token"));
    let response = server
        .post_json(
            "/review",
            json!({ "prNumber": 5, "repoName": "octocat/hello", "dryRun": true }),
        )
        .await;
    let body = json_body(response).await;
    assert_eq!(body["status"], "dry-run");
    assert_eq!(*server.tokens.lock().unwrap(), vec!["server-token".to_string()]);
    assert!(server.hosting.posts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn review_missing_pr_is_404_with_stage() {
    let server = Server::init(true, Some("server-token"));
    let response = server
        .post_json("/review", json!({ "prNumber": 404, "repoName": "octocat/hello" }))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"]["stage"], "fetch");
}

#[tokio::test]
async fn review_model_down_is_503() {
    let server = Server::init(false, Some("server-token"));
    let response = server
        .post_json("/review", json!({ "prNumber": 5, "repoName": "octocat/hello" }))
        .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(server.hosting.posts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn review_bad_repository_is_400() {
    let server = Server::init(true, Some("server-token"));
    let response = server
        .post_json("/review", json!({ "prNumber": 5, "repoName": "not-a-repo" }))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["stage"], "config");
}

#[tokio::test]
async fn api_docs_redirects_to_docs() {
    let server = Server::init(true, None);
    let response = server.get("/api/docs").await;
    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(response.headers()[header::LOCATION], "/docs");

    let body = json_body(server.get("/docs").await).await;
    assert_eq!(body["endpoints"].as_array().unwrap().len(), 4);
}
