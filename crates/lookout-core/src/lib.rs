//! Core types, configuration, and error handling for lookout.
//!
//! This crate provides the shared foundation used by the other lookout crates:
//! - [`LookoutError`]: the error taxonomy, one variant family per run [`Stage`]
//! - [`LookoutConfig`]: configuration loaded from `.lookout.toml`
//! - Shared types: [`PrRef`], [`PullRequestDiff`], [`ReviewSection`],
//!   [`PostReport`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{GitHubConfig, LookoutConfig, ModelConfig, ReviewConfig, ServerConfig};
pub use error::{LookoutError, Stage};
pub use types::{
    ChangedFile, FileStatus, OutputFormat, PostFailure, PostReport, PrRef, PullRequestDiff,
    ReviewSection, RunStatus, SectionLabel,
};

/// A convenience `Result` type for lookout operations.
pub type Result<T> = std::result::Result<T, LookoutError>;
