//! Network collaborators for anjin.
//!
//! This crate provides the implementations of the core collaborator traits
//! that talk to the outside world:
//! - [`PypiClient`]: latest version lookup
//! - [`ChangelogClient`]: changelog retrieval from GitHub or HTTP, range-filtered
//! - [`OpenAiClient`] / [`DebugSummarizer`]: changelog summaries
//!
//! All of them share one [`FetchClient`].

pub mod changelog;
pub mod error;
pub mod fetch;
pub mod openai;
pub mod pypi;
pub mod rate_limit;

pub use changelog::ChangelogClient;
pub use error::ClientError;
pub use fetch::{FetchClient, FetchConfig, FetchResponse};
pub use openai::{DebugSummarizer, OpenAiClient, OpenAiConfig};
pub use pypi::PypiClient;
pub use rate_limit::RateLimiter;
