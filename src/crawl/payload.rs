//! Job payloads.
//!
//! Three job shapes share no fields, so they are a tagged union: the tag
//! is the `type` column of the queue and the payload is the canonical
//! JSON encoding of the matching struct. Canonical means the bytes are
//! deterministic (serde writes fields in declaration order), which is
//! what makes `(type, payload)` a usable dedup key.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The job types the queue knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Repo,
    User,
    Issue,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::Repo, JobKind::User, JobKind::Issue];

    /// The `type` column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Repo => "repo",
            JobKind::User => "user",
            JobKind::Issue => "issue",
        }
    }

    pub fn parse(s: &str) -> Option<JobKind> {
        match s {
            "repo" => Some(JobKind::Repo),
            "user" => Some(JobKind::User),
            "issue" => Some(JobKind::Issue),
            _ => None,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors decoding a queue row into a payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("don't know what to do with job of type {0:?}")]
    UnknownKind(String),

    #[error("undecodable {kind} payload: {source}")]
    Undecodable {
        kind: JobKind,
        source: serde_json::Error,
    },
}

/// One page of a repository's issue listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoPage {
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub page: u32,
}

/// One page of the issues a user commented on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPage {
    pub login: String,
    #[serde(default)]
    pub page: u32,
}

/// One page of a single issue's comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuePage {
    pub url: String,
    #[serde(default)]
    pub page: u32,
}

/// A decoded job payload. Page 0 means "first page" in all three shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPayload {
    Repo(RepoPage),
    User(UserPage),
    Issue(IssuePage),
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::Repo(_) => JobKind::Repo,
            JobPayload::User(_) => JobKind::User,
            JobPayload::Issue(_) => JobKind::Issue,
        }
    }

    /// The canonical bytes stored in the queue's `payload` column.
    pub fn encode(&self) -> Vec<u8> {
        let encoded = match self {
            JobPayload::Repo(p) => serde_json::to_vec(p),
            JobPayload::User(p) => serde_json::to_vec(p),
            JobPayload::Issue(p) => serde_json::to_vec(p),
        };
        encoded.expect("payload serialization cannot fail")
    }

    /// Decodes a queue row. An unknown type or malformed bytes is a
    /// permanent failure for the job.
    pub fn decode(kind: &str, bytes: &[u8]) -> Result<Self, PayloadError> {
        let kind = JobKind::parse(kind).ok_or_else(|| PayloadError::UnknownKind(kind.to_string()))?;

        let undecodable = |source| PayloadError::Undecodable { kind, source };
        match kind {
            JobKind::Repo => serde_json::from_slice(bytes)
                .map(JobPayload::Repo)
                .map_err(undecodable),
            JobKind::User => serde_json::from_slice(bytes)
                .map(JobPayload::User)
                .map_err(undecodable),
            JobKind::Issue => serde_json::from_slice(bytes)
                .map(JobPayload::Issue)
                .map_err(undecodable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_round_trip() {
        for kind in JobKind::ALL {
            assert_eq!(JobKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(JobKind::parse("mystery"), None);
    }

    #[test]
    fn encoding_is_byte_stable() {
        let payload = JobPayload::Repo(RepoPage {
            owner: "octocat".into(),
            name: "hello".into(),
            page: 0,
        });
        // Equal payloads must encode to equal bytes or queue dedup breaks.
        assert_eq!(payload.encode(), payload.encode());
        assert_eq!(
            payload.encode(),
            br#"{"owner":"octocat","name":"hello","page":0}"#
        );
    }

    #[test]
    fn encode_decode_round_trips() {
        let payloads = [
            JobPayload::Repo(RepoPage {
                owner: "octocat".into(),
                name: "hello".into(),
                page: 2,
            }),
            JobPayload::User(UserPage {
                login: "octocat".into(),
                page: 0,
            }),
            JobPayload::Issue(IssuePage {
                url: "https://api.github.com/repos/o/r/issues/1".into(),
                page: 3,
            }),
        ];

        for payload in payloads {
            let decoded = JobPayload::decode(payload.kind().as_str(), &payload.encode()).unwrap();
            assert_eq!(decoded, payload);
        }
    }

    #[test]
    fn missing_page_defaults_to_zero() {
        let decoded = JobPayload::decode("user", br#"{"login":"octocat"}"#).unwrap();
        assert_eq!(
            decoded,
            JobPayload::User(UserPage {
                login: "octocat".into(),
                page: 0,
            })
        );
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(matches!(
            JobPayload::decode("gist", b"{}"),
            Err(PayloadError::UnknownKind(_))
        ));
    }

    #[test]
    fn malformed_bytes_are_rejected() {
        assert!(matches!(
            JobPayload::decode("repo", b"not json"),
            Err(PayloadError::Undecodable { kind: JobKind::Repo, .. })
        ));
    }
}
