//! Optional HTTP surface for lookout.
//!
//! Exposes health and model checks, a demo review of a built-in sample diff,
//! and `POST /review` for triggering a review by hand.
//!
//! # Examples
//!
//! ```no_run
//! use lookout_core::LookoutConfig;
//!
//! # async fn example() -> Result<(), lookout_core::LookoutError> {
//! lookout_server::server::serve(&LookoutConfig::default(), "0.0.0.0:8000").await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod routes;
pub mod server;

pub use server::{router, serve, AppState, HostingConnector};
