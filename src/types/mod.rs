//! Core domain types for the comment crawler.
//!
//! Identifiers are newtypes so that an owner, a repository name and a raw
//! issue URL cannot be mixed up silently.

pub mod ids;

pub use ids::{InvalidIssueUrl, IssueRef, RepoId};
