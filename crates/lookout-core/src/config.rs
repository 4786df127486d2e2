use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LookoutError;

/// Top-level configuration loaded from `.lookout.toml`.
///
/// Supports layered resolution: CLI flags > env vars > local config > defaults.
/// Every component receives the section it needs at construction time.
///
/// # Examples
///
/// ```
/// use lookout_core::LookoutConfig;
///
/// let config = LookoutConfig::default();
/// assert_eq!(config.model.name, "llama3.2");
/// assert_eq!(config.review.prompt_char_budget, 24_000);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LookoutConfig {
    /// GitHub access settings.
    #[serde(default)]
    pub github: GitHubConfig,
    /// Model server settings.
    #[serde(default)]
    pub model: ModelConfig,
    /// Prompt and comment settings.
    #[serde(default)]
    pub review: ReviewConfig,
    /// HTTP surface settings.
    #[serde(default)]
    pub server: ServerConfig,
}

impl LookoutConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LookoutError::Io`] if the file cannot be read, or
    /// [`LookoutError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use lookout_core::LookoutConfig;
    /// use std::path::Path;
    ///
    /// let config = LookoutConfig::from_file(Path::new(".lookout.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, LookoutError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`LookoutError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use lookout_core::LookoutConfig;
    ///
    /// let toml = r#"
    /// [model]
    /// name = "mistral"
    /// "#;
    /// let config = LookoutConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.model.name, "mistral");
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, LookoutError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }
}

/// GitHub access configuration.
///
/// The token itself is never stored in the file; `token_env` names the
/// environment variable that holds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Default repository (`owner/repo`) when none is given on the command line.
    pub repository: Option<String>,
    /// Environment variable holding the access token (default: `GITHUB_TOKEN`).
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// REST API base URL (default: `https://api.github.com`).
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".into()
}

fn default_api_url() -> String {
    "https://api.github.com".into()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            repository: None,
            token_env: default_token_env(),
            api_url: default_api_url(),
        }
    }
}

impl GitHubConfig {
    /// Resolve the access token: an explicit value wins, then `token_env`,
    /// then `GH_TOKEN`. Blank values count as missing.
    ///
    /// # Examples
    ///
    /// ```
    /// use lookout_core::GitHubConfig;
    ///
    /// let config = GitHubConfig::default();
    /// assert_eq!(config.resolve_token(Some("ghp_x")).as_deref(), Some("ghp_x"));
    /// ```
    pub fn resolve_token(&self, explicit: Option<&str>) -> Option<String> {
        if let Some(token) = explicit.filter(|t| !t.trim().is_empty()) {
            return Some(token.to_string());
        }
        [self.token_env.as_str(), "GH_TOKEN"]
            .into_iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|t| !t.trim().is_empty())
    }
}

/// Model server configuration.
///
/// # Examples
///
/// ```
/// use lookout_core::ModelConfig;
///
/// let config = ModelConfig::default();
/// assert_eq!(config.endpoint, "http://localhost:11434");
/// assert_eq!(config.timeout_ms, 60_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of the Ollama server.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Model name, as shown by `ollama list`.
    #[serde(default = "default_model_name")]
    pub name: String,
    /// Deadline for one generation, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Nucleus sampling threshold.
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    /// Maximum number of tokens to generate.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_endpoint() -> String {
    "http://localhost:11434".into()
}

fn default_model_name() -> String {
    "llama3.2".into()
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_temperature() -> f64 {
    0.7
}

fn default_top_p() -> f64 {
    0.9
}

fn default_max_tokens() -> u32 {
    2000
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            name: default_model_name(),
            timeout_ms: default_timeout_ms(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Review behavior configuration.
///
/// # Examples
///
/// ```
/// use lookout_core::ReviewConfig;
///
/// let config = ReviewConfig::default();
/// assert_eq!(config.prompt_char_budget, 24_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Upper bound on prompt length, in characters (default: 24000).
    #[serde(default = "default_prompt_char_budget")]
    pub prompt_char_budget: usize,
}

fn default_prompt_char_budget() -> usize {
    24_000
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            prompt_char_budget: default_prompt_char_budget(),
        }
    }
}

/// HTTP surface configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on (default: `0.0.0.0:8000`).
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "0.0.0.0:8000".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}
