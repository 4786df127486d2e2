use std::time::Duration;

use async_trait::async_trait;
use lookout_core::{LookoutError, ModelConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

const TAGS_TIMEOUT: Duration = Duration::from_secs(5);

/// A text-generation service that turns one prompt into one completion.
///
/// [`OllamaClient`] is the production implementation; tests substitute
/// in-memory fakes.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Name of the model that answers prompts.
    fn model(&self) -> &str;

    /// Generate a completion for `prompt`, waiting at most the configured deadline.
    async fn generate(&self, prompt: &str) -> Result<String, LookoutError>;

    /// Models the backend can serve.
    async fn list_models(&self) -> Result<Vec<String>, LookoutError> {
        Ok(vec![self.model().to_string()])
    }
}

/// Sampling options sent with every generation request.
///
/// # Examples
///
/// ```
/// use lookout_review::llm::GenerateOptions;
///
/// let opts = GenerateOptions { temperature: 0.7, top_p: 0.9, num_predict: 2000 };
/// let json = serde_json::to_value(&opts).unwrap();
/// assert_eq!(json["num_predict"], 2000);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct GenerateOptions {
    /// Sampling temperature.
    pub temperature: f64,
    /// Nucleus sampling threshold.
    pub top_p: f64,
    /// Maximum number of tokens to generate.
    pub num_predict: u32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

/// Whether `name` is among `models`, treating an untagged name as any tag.
///
/// # Examples
///
/// ```
/// use lookout_review::llm::has_model;
///
/// let models = vec!["llama3.2:latest".to_string()];
/// assert!(has_model(&models, "llama3.2"));
/// assert!(!has_model(&models, "llama3.2:1b"));
/// ```
pub fn has_model(models: &[String], name: &str) -> bool {
    models.iter().any(|m| {
        m == name || (!name.contains(':') && m.split_once(':').is_some_and(|(base, _)| base == name))
    })
}

/// Client for a local Ollama server.
///
/// Sends non-streaming requests to `{endpoint}/api/generate` and enforces
/// the configured deadline on the whole exchange.
///
/// # Examples
///
/// ```
/// use lookout_core::ModelConfig;
/// use lookout_review::llm::{ModelBackend, OllamaClient};
///
/// let client = OllamaClient::new(&ModelConfig::default()).unwrap();
/// assert_eq!(client.model(), "llama3.2");
/// ```
pub struct OllamaClient {
    client: reqwest::Client,
    config: ModelConfig,
}

impl OllamaClient {
    /// Create a new client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LookoutError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &ModelConfig) -> Result<Self, LookoutError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| LookoutError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Base URL of the Ollama server.
    pub fn endpoint(&self) -> &str {
        self.config.endpoint.trim_end_matches('/')
    }

    fn options(&self) -> GenerateOptions {
        GenerateOptions {
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            num_predict: self.config.max_tokens,
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> LookoutError {
        if err.is_timeout() {
            LookoutError::Timeout {
                timeout_ms: self.config.timeout_ms,
            }
        } else if err.is_connect() {
            LookoutError::ModelUnavailable(format!("cannot reach {}: {err}", self.endpoint()))
        } else {
            LookoutError::Generation(format!("request failed: {err}"))
        }
    }
}

#[async_trait]
impl ModelBackend for OllamaClient {
    fn model(&self) -> &str {
        &self.config.name
    }

    async fn generate(&self, prompt: &str) -> Result<String, LookoutError> {
        let url = format!("{}/api/generate", self.endpoint());
        let body = GenerateRequest {
            model: &self.config.name,
            prompt,
            stream: false,
            options: self.options(),
        };
        debug!(
            %url,
            model = %self.config.name,
            prompt_chars = prompt.chars().count(),
            "generating"
        );

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(LookoutError::ModelUnavailable(format!(
                "model '{}' is not available; run `ollama pull {}`",
                self.config.name, self.config.name
            )));
        }
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(LookoutError::Generation(format!(
                "model server error {status}: {body_text}"
            )));
        }

        let text = response.text().await.map_err(|e| self.transport_error(e))?;
        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| LookoutError::Generation(format!("failed to parse response: {e}")))?;

        if let Some(error) = parsed.error {
            return Err(LookoutError::Generation(error));
        }
        match parsed.response {
            Some(content) if !content.trim().is_empty() => Ok(content),
            _ => Err(LookoutError::Generation("model returned an empty response".into())),
        }
    }

    /// List the models the server has pulled.
    ///
    /// # Errors
    ///
    /// Returns [`LookoutError::ModelUnavailable`] if the server cannot be reached,
    /// or [`LookoutError::Generation`] if it answers with something unexpected.
    async fn list_models(&self) -> Result<Vec<String>, LookoutError> {
        let url = format!("{}/api/tags", self.endpoint());
        let response = self
            .client
            .get(&url)
            .timeout(TAGS_TIMEOUT)
            .send()
            .await
            .map_err(|e| LookoutError::ModelUnavailable(format!("cannot reach {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookoutError::Generation(format!(
                "model server returned {status} for {url}"
            )));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| LookoutError::Generation(format!("failed to parse model list: {e}")))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}
