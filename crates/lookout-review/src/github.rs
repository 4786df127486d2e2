use async_trait::async_trait;
use lookout_core::{ChangedFile, FileStatus, GitHubConfig, LookoutError, PrRef, PullRequestDiff};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

/// GitHub serves at most 3000 files per pull request, 100 per page.
const FILES_PER_PAGE: usize = 100;
const MAX_FILE_PAGES: u32 = 30;

/// The source-control hosting operations a review run needs.
///
/// [`GitHubClient`] is the production implementation; tests substitute
/// in-memory fakes.
#[async_trait]
pub trait HostingApi: Send + Sync {
    /// Fetch pull request metadata and its changed files.
    async fn fetch_pull_request(&self, pr: &PrRef) -> Result<PullRequestDiff, LookoutError>;

    /// Create one comment on the pull request conversation.
    async fn post_comment(&self, pr: &PrRef, body: &str) -> Result<(), LookoutError>;
}

/// GitHub REST client for fetching pull requests and posting comments.
///
/// # Examples
///
/// ```no_run
/// use lookout_review::github::GitHubClient;
///
/// let client = GitHubClient::new("ghp_xxxx", "https://api.github.com").unwrap();
/// ```
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl GitHubClient {
    /// Create a client for the API at `api_url` using `token`.
    ///
    /// # Errors
    ///
    /// Returns [`LookoutError::Auth`] if the token is blank, or
    /// [`LookoutError::Config`] if the HTTP client cannot be built.
    pub fn new(token: &str, api_url: &str) -> Result<Self, LookoutError> {
        if token.trim().is_empty() {
            return Err(LookoutError::Auth("access token is empty".into()));
        }
        let api_url = api_url.trim_end_matches('/').to_string();

        let http = reqwest::Client::builder()
            .user_agent(concat!("lookout/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LookoutError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_url,
            token: token.to_string(),
        })
    }

    /// Create a client from configuration, resolving the token from an
    /// explicit value or the configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`LookoutError::Auth`] if no token is available.
    pub fn from_config(config: &GitHubConfig, token: Option<&str>) -> Result<Self, LookoutError> {
        let token = config.resolve_token(token).ok_or_else(|| {
            LookoutError::Auth(format!(
                "{} not set. Pass --token or set {} (or GH_TOKEN)",
                config.token_env, config.token_env
            ))
        })?;
        Self::new(&token, &config.api_url)
    }

    /// Login of the user the token belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`LookoutError::Auth`] for a rejected token, or another fetch
    /// error on API failures.
    pub async fn current_user(&self) -> Result<String, LookoutError> {
        #[derive(Deserialize)]
        struct User {
            login: String,
        }
        let user: User = self.get_json("/user", "authenticated user").await?;
        Ok(user.login)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.api_url);
        debug!(%method, %url, "GitHub request");
        self.http
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", self.token))
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        what: &str,
    ) -> Result<T, LookoutError> {
        let response = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .map_err(|e| LookoutError::GitHub(format!("request for {what} failed: {e}")))?;

        let response = check_status(response, what).await?;
        response
            .json()
            .await
            .map_err(|e| LookoutError::GitHub(format!("unexpected {what} response: {e}")))
    }
}

#[derive(Deserialize)]
struct PullResponse {
    title: String,
    body: Option<String>,
}

#[derive(Deserialize)]
struct FileResponse {
    filename: String,
    status: FileStatus,
    additions: u32,
    deletions: u32,
    #[serde(default)]
    patch: Option<String>,
}

impl From<FileResponse> for ChangedFile {
    fn from(f: FileResponse) -> Self {
        ChangedFile {
            path: f.filename,
            status: f.status,
            additions: f.additions,
            deletions: f.deletions,
            patch: f.patch,
        }
    }
}

#[async_trait]
impl HostingApi for GitHubClient {
    async fn fetch_pull_request(&self, pr: &PrRef) -> Result<PullRequestDiff, LookoutError> {
        let what = format!("pull request {pr}");
        let base = format!("/repos/{}/{}/pulls/{}", pr.owner, pr.repo, pr.number);

        let meta: PullResponse = self.get_json(&base, &what).await?;

        let mut files = Vec::new();
        for page in 1..=MAX_FILE_PAGES {
            let path = format!("{base}/files?per_page={FILES_PER_PAGE}&page={page}");
            let batch: Vec<FileResponse> = self.get_json(&path, &what).await?;
            let last = batch.len() < FILES_PER_PAGE;
            files.extend(batch.into_iter().map(ChangedFile::from));
            if last {
                break;
            }
        }
        debug!(pr = %pr, files = files.len(), "fetched pull request files");

        Ok(PullRequestDiff {
            pr: pr.clone(),
            title: meta.title,
            body: meta.body.filter(|b| !b.trim().is_empty()),
            files,
        })
    }

    async fn post_comment(&self, pr: &PrRef, body: &str) -> Result<(), LookoutError> {
        let what = format!("comment on {pr}");
        let path = format!(
            "/repos/{}/{}/issues/{}/comments",
            pr.owner, pr.repo, pr.number
        );

        let response = self
            .request(reqwest::Method::POST, &path)
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await
            .map_err(|e| LookoutError::GitHub(format!("request for {what} failed: {e}")))?;

        check_status(response, &what).await?;
        Ok(())
    }
}

async fn check_status(
    response: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, LookoutError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let headers = response.headers().clone();
    let body = response.text().await.unwrap_or_default();
    Err(classify_failure(status, &headers, &body, what))
}

/// Map a failed GitHub response to the error taxonomy.
fn classify_failure(status: StatusCode, headers: &HeaderMap, body: &str, what: &str) -> LookoutError {
    let header_u64 = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
    };
    let quota_exhausted = header_u64("x-ratelimit-remaining") == Some(0);

    match status {
        StatusCode::UNAUTHORIZED => LookoutError::Auth(format!("token rejected for {what}")),
        StatusCode::TOO_MANY_REQUESTS => LookoutError::RateLimit {
            reset_at: header_u64("x-ratelimit-reset"),
        },
        StatusCode::FORBIDDEN if quota_exhausted => LookoutError::RateLimit {
            reset_at: header_u64("x-ratelimit-reset"),
        },
        StatusCode::FORBIDDEN => {
            LookoutError::Auth(format!("token lacks access to {what}: {}", body.trim()))
        }
        StatusCode::NOT_FOUND => LookoutError::NotFound(what.to_string()),
        _ => LookoutError::GitHub(format!("{status} for {what}: {}", body.trim())),
    }
}
