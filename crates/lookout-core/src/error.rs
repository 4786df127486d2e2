use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Errors that can occur while reviewing a pull request.
///
/// Each variant belongs to one [`Stage`] of the review run. Library crates
/// return this type directly; the binary renders it through `miette`.
///
/// # Examples
///
/// ```
/// use lookout_core::{LookoutError, Stage};
///
/// let err = LookoutError::NotFound("octocat/hello#7".into());
/// assert!(err.to_string().contains("octocat/hello#7"));
/// assert_eq!(err.stage(), Stage::Fetch);
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum LookoutError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    #[diagnostic(code(lookout::io))]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(code(lookout::config))]
    Config(String),

    /// The access token is missing, invalid, or lacks the required scope.
    #[error("GitHub authentication failed: {0}")]
    #[diagnostic(
        code(lookout::auth),
        help("set GITHUB_TOKEN (or pass --token) with repository read/write scope")
    )]
    Auth(String),

    /// The repository or pull request does not exist or is not visible.
    #[error("not found: {0}")]
    #[diagnostic(code(lookout::not_found))]
    NotFound(String),

    /// The GitHub API quota is exhausted.
    #[error("GitHub rate limit exceeded{}", reset_suffix(.reset_at))]
    #[diagnostic(code(lookout::rate_limit))]
    RateLimit {
        /// Epoch seconds at which the quota resets, when GitHub reported it.
        reset_at: Option<u64>,
    },

    /// Any other GitHub API failure.
    #[error("GitHub API error: {0}")]
    #[diagnostic(code(lookout::github))]
    GitHub(String),

    /// The model server could not be reached or does not have the model.
    #[error("model server unavailable: {0}")]
    #[diagnostic(
        code(lookout::model_unavailable),
        help("start Ollama with `ollama serve` and pull the model with `ollama pull <name>`")
    )]
    ModelUnavailable(String),

    /// The model did not answer within the configured deadline.
    #[error("model did not respond within {timeout_ms} ms")]
    #[diagnostic(
        code(lookout::timeout),
        help("raise [model] timeout_ms or use a smaller model")
    )]
    Timeout {
        /// Deadline that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The model answered with something unusable.
    #[error("model generation failed: {0}")]
    #[diagnostic(code(lookout::generation))]
    Generation(String),

    /// Input text (a diff or a reference) could not be parsed.
    #[error("parse error: {0}")]
    #[diagnostic(code(lookout::parse))]
    Parse(String),

    /// The HTTP server could not start or stopped with an error.
    #[error("server error: {0}")]
    #[diagnostic(code(lookout::server))]
    Server(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    #[diagnostic(code(lookout::serialization))]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    #[diagnostic(code(lookout::toml))]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    #[diagnostic(code(lookout::file_not_found))]
    FileNotFound(PathBuf),
}

fn reset_suffix(reset_at: &Option<u64>) -> String {
    match reset_at {
        Some(epoch) => format!(" (resets at epoch {epoch})"),
        None => String::new(),
    }
}

/// The step of a review run an error belongs to.
///
/// # Examples
///
/// ```
/// use lookout_core::Stage;
///
/// assert_eq!(Stage::Model.to_string(), "model");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Loading configuration or reading local input.
    Config,
    /// Fetching the pull request from GitHub.
    Fetch,
    /// Invoking the model.
    Model,
    /// Running the HTTP surface.
    Server,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Config => write!(f, "config"),
            Stage::Fetch => write!(f, "fetch"),
            Stage::Model => write!(f, "model"),
            Stage::Server => write!(f, "server"),
        }
    }
}

impl LookoutError {
    /// The stage of the run that produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            LookoutError::Auth(_)
            | LookoutError::NotFound(_)
            | LookoutError::RateLimit { .. }
            | LookoutError::GitHub(_) => Stage::Fetch,
            LookoutError::ModelUnavailable(_)
            | LookoutError::Timeout { .. }
            | LookoutError::Generation(_) => Stage::Model,
            LookoutError::Server(_) => Stage::Server,
            LookoutError::Io(_)
            | LookoutError::Config(_)
            | LookoutError::Parse(_)
            | LookoutError::Serialization(_)
            | LookoutError::Toml(_)
            | LookoutError::FileNotFound(_) => Stage::Config,
        }
    }
}
