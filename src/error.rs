//! Error types for bundle loading and realtime feed access.
//!
//! Each failure class gets its own variant so callers can tell an
//! unreachable upstream apart from a payload that failed to decode, and
//! both apart from a feed that simply had no entities.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("request to {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("upstream {url} answered with status {status}")]
    UpstreamStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("invalid upstream url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("feed payload could not be decoded: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bundle archive is unreadable: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("bundle is missing {name}")]
    MissingTable { name: &'static str },

    #[error("{name} could not be parsed: {source}")]
    Table {
        name: &'static str,
        #[source]
        source: csv::Error,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// `true` for failures reaching the upstream (transport or HTTP status).
    pub fn is_upstream_unavailable(&self) -> bool {
        matches!(self, Error::Fetch { .. } | Error::UpstreamStatus { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
