//! Upstream client adapter.
//!
//! Uniform wrappers around the three upstream endpoints the crawler
//! consumes, the fetch error taxonomy, and the wire models. Every call
//! surfaces rate-limit metadata and a measured duration regardless of
//! outcome.

pub mod client;
pub mod error;
pub mod models;

pub use client::{effective_page, ClientBuildError, GithubClient};
pub use error::FetchError;
pub use models::{
    Account, CallReport, Comment, Fetched, Issue, Page, RateSnapshot, Reactions, PER_PAGE,
};
