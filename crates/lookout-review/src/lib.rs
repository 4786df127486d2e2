//! Pull request review orchestration for lookout.
//!
//! Fetches a pull request from GitHub, builds a bounded prompt, asks a local
//! Ollama model for a review, splits the answer into sections, and posts each
//! section as a PR comment.

pub mod demo;
pub mod diff;
pub mod github;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod sections;
