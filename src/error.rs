//! Error types for the exporter

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// The HTTP exchange itself failed; no status or body is available.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[source] ureq::Error),
    #[error("failed to read response body: {0}")]
    Body(#[source] ureq::Error),
}

/// Failure talking to the provider API: the request never produced a usable
/// JSON body.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },
    #[error("invalid response from {url} (HTTP {status}): {source}")]
    Decode {
        url: String,
        status: u16,
        #[source]
        source: serde_json::Error,
    },
}

/// A well-formed `success=false` answer. Carries the provider's own message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderRejection {
    pub code: Option<String>,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("malformed {endpoint} response: missing {field}")]
    Malformed {
        endpoint: &'static str,
        field: &'static str,
    },
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("device limit exceeded: {0}")]
    DeviceLimitExceeded(String),
    #[error("cannot resolve stream for {channel}: {message}")]
    Resolution { channel: String, message: String },
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("no device selected")]
    Declined,
    #[error("device removal rejected: {0}")]
    Rejected(ProviderRejection),
}

#[derive(Error, Debug)]
#[error("EPG fetch for {day} failed: {source}")]
pub struct EpgFetchError {
    pub day: NaiveDate,
    #[source]
    pub source: ApiError,
}

#[derive(Error, Debug)]
#[error("failed to write {}: {source}", path.display())]
pub struct ArtifactWriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Error, Debug)]
pub enum DeviceIdError {
    #[error("failed to read device id from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to store device id in {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid market code '{0}' (expected two lowercase letters, e.g. cz or sk)")]
    InvalidMarket(String),
    #[error("invalid channel id list '{0}'")]
    InvalidChannelIds(String),
    #[error("missing credentials: set username and password")]
    MissingCredentials,
}

/// Errors that end a run.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("channel catalog unavailable: {0}")]
    Catalog(#[source] ApiError),
    #[error("stream resolution aborted: {0}")]
    Stream(#[source] ApiError),
}
